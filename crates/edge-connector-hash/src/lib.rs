//! Deterministic byte hashing and hex helpers shared by the repository,
//! the file-transfer session, and the URL downloader.
//!
//! Every function here is pure: same input, same output, no I/O.

use md5::{Digest as Md5Digest, Md5};
use sha2::{Digest as Sha256Digest, Sha256};

/// Errors produced while decoding hex text back into bytes.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HexError {
    #[error("hex string has odd length {0}")]
    OddLength(usize),
    #[error("hex string contains a non-hex-digit character at byte offset {0}")]
    MalformedHex(usize),
}

/// SHA-256 digest of `bytes`.
pub fn sha256(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

/// MD5 digest of `bytes`.
pub fn md5(bytes: &[u8]) -> [u8; 16] {
    let mut hasher = Md5::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

/// Lowercase hex encoding of `bytes`.
pub fn to_hex(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

/// Decode a hex string into bytes.
///
/// Fails with [`HexError::OddLength`] on an odd-length input and with
/// [`HexError::MalformedHex`] on any non-hex-digit character.
pub fn from_hex(text: &str) -> Result<Vec<u8>, HexError> {
    if text.len() % 2 != 0 {
        return Err(HexError::OddLength(text.len()));
    }
    hex::decode(text).map_err(|_| {
        let offset = text
            .bytes()
            .position(|b| !b.is_ascii_hexdigit())
            .unwrap_or(0);
        HexError::MalformedHex(offset)
    })
}

/// The zero hash used as the "previous hash" of chunk index 0.
pub fn zero_hash_hex() -> String {
    to_hex(&[0u8; 32])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_known_vector() {
        let digest = sha256(b"abc");
        assert_eq!(
            to_hex(&digest),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn md5_known_vector() {
        let digest = md5(b"");
        assert_eq!(to_hex(&digest), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn hex_roundtrip() {
        let bytes = sha256(b"roundtrip me").to_vec();
        let encoded = to_hex(&bytes);
        assert_eq!(from_hex(&encoded).unwrap(), bytes);
    }

    #[test]
    fn from_hex_rejects_odd_length() {
        assert_eq!(from_hex("abc"), Err(HexError::OddLength(3)));
    }

    #[test]
    fn from_hex_rejects_non_hex() {
        assert!(matches!(from_hex("zz"), Err(HexError::MalformedHex(_))));
    }

    #[test]
    fn zero_hash_is_64_zero_chars() {
        assert_eq!(zero_hash_hex(), "0".repeat(64));
    }
}
