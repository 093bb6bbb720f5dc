//! Inbound and outbound message envelopes for the file-transfer and
//! firmware-update protocols (§6.1 of the specification this crate
//! implements). These are plain typed records — the actual wire encoding
//! and the pub/sub transport that carries them are a caller's concern.

use serde::{Deserialize, Serialize};

use crate::status::{FirmwareError, FirmwareStatus, TransferError, TransferStatus};

// -- Inbound to the file management service --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileUploadInitiate {
    pub name: String,
    pub size: u64,
    /// Lowercase hex MD5 of the complete file.
    pub hash: String,
}

/// Payload layout: 32 bytes previous-chunk SHA-256 || file bytes || 32 bytes
/// current-chunk SHA-256. Hashes here are raw bytes, not hex.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileBinaryResponse {
    pub payload: Vec<u8>,
}

/// A parsed, validated [`FileBinaryResponse`] payload.
#[derive(Debug, Clone)]
pub struct ParsedBinaryResponse {
    pub previous_hash: [u8; 32],
    pub data: Vec<u8>,
    pub current_hash: [u8; 32],
}

/// Error parsing a raw `FileBinaryResponse` payload: too short to contain
/// both 32-byte hash fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("file binary response payload too short: {0} bytes (need at least 64)")]
pub struct PayloadTooShort(pub usize);

impl FileBinaryResponse {
    /// Split the raw payload into its previous-hash, data, and current-hash parts.
    ///
    /// Replaces the exception-for-control-flow parsing of the original
    /// implementation with an explicit length check: the payload must be
    /// at least 64 bytes (two 32-byte hashes with no data in between).
    pub fn parse(&self) -> Result<ParsedBinaryResponse, PayloadTooShort> {
        const HASH_LEN: usize = 32;
        if self.payload.len() < HASH_LEN * 2 {
            return Err(PayloadTooShort(self.payload.len()));
        }
        let len = self.payload.len();
        let mut previous_hash = [0u8; HASH_LEN];
        previous_hash.copy_from_slice(&self.payload[0..HASH_LEN]);
        let mut current_hash = [0u8; HASH_LEN];
        current_hash.copy_from_slice(&self.payload[len - HASH_LEN..len]);
        let data = self.payload[HASH_LEN..len - HASH_LEN].to_vec();
        Ok(ParsedBinaryResponse {
            previous_hash,
            data,
            current_hash,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileUploadAbort {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileUrlDownloadInitiate {
    pub url: String,
}

/// Abort the URL-download session for a device. The original protocol
/// carries no file name for this command — a device has at most one
/// active URL-download session at a time (see DESIGN.md).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileUrlDownloadAbort;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileListRequest;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileDelete {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilePurge;

// -- Outbound from the file management service --

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileBinaryRequest {
    pub name: String,
    pub chunk_index: u64,
}

impl FileBinaryRequest {
    /// The sentinel "nothing to request" response: an empty name marks it invalid.
    pub fn none() -> Self {
        Self {
            name: String::new(),
            chunk_index: 0,
        }
    }

    pub fn is_none(&self) -> bool {
        self.name.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileUploadStatus {
    pub status: TransferStatus,
    pub error: TransferError,
}

impl FileUploadStatus {
    pub fn new(status: TransferStatus, error: TransferError) -> Self {
        Self { status, error }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileListResponse {
    pub names: Vec<String>,
}

// -- Firmware update protocol --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirmwareInstall {
    pub device_keys: Vec<String>,
    pub file_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirmwareAbort {
    pub device_keys: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirmwareUpdateStatus {
    pub device_keys: Vec<String>,
    pub status: FirmwareStatus,
    pub error: FirmwareError,
}

impl FirmwareUpdateStatus {
    pub fn new(device_keys: Vec<String>, status: FirmwareStatus, error: FirmwareError) -> Self {
        Self {
            device_keys,
            status,
            error,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirmwareVersion {
    pub device_key: String,
    pub version: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rejects_short_payload() {
        let msg = FileBinaryResponse { payload: vec![0u8; 10] };
        assert_eq!(msg.parse().unwrap_err(), PayloadTooShort(10));
    }

    #[test]
    fn parse_splits_prev_data_current() {
        let mut payload = vec![1u8; 32];
        payload.extend_from_slice(b"hello");
        payload.extend(vec![2u8; 32]);
        let msg = FileBinaryResponse { payload };
        let parsed = msg.parse().unwrap();
        assert_eq!(parsed.previous_hash, [1u8; 32]);
        assert_eq!(parsed.data, b"hello");
        assert_eq!(parsed.current_hash, [2u8; 32]);
    }

    #[test]
    fn empty_data_chunk_parses() {
        let payload = vec![0u8; 64];
        let msg = FileBinaryResponse { payload };
        let parsed = msg.parse().unwrap();
        assert!(parsed.data.is_empty());
    }

    #[test]
    fn binary_request_none_is_sentinel() {
        assert!(FileBinaryRequest::none().is_none());
        assert!(!FileBinaryRequest {
            name: "f".into(),
            chunk_index: 0
        }
        .is_none());
    }
}
