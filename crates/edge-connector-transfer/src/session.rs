//! The per-transfer state machine (§4.6). Two flavors — chunked
//! platform-upload and wrapped URL-download — share one type so that
//! [`crate::command_buffer::CommandBuffer`] wiring and terminal-status
//! reporting live in exactly one place.

use std::sync::{Arc, Mutex, Weak};

use edge_connector_hash::{md5, sha256, to_hex};
use edge_connector_types::{FileBinaryRequest, FileChunk, ParsedBinaryResponse, TransferError, TransferStatus};

use crate::command_buffer::CommandBuffer;
use crate::downloader::Downloader;

const MAX_RETRY_COUNT: u32 = 3;

/// Invoked once per terminal transition, off the transport thread.
pub type TerminalCallback = Arc<dyn Fn(TransferStatus, TransferError) + Send + Sync>;

enum Flavor {
    Platform {
        expected_size: u64,
        expected_md5_hex: String,
        chunks: Vec<FileChunk>,
        collected: u64,
        retry_count: u32,
    },
    Url {
        url: String,
        downloader: Arc<dyn Downloader>,
    },
}

pub struct FileTransferSession {
    name: String,
    status: TransferStatus,
    error: TransferError,
    done: bool,
    flavor: Flavor,
    command_buffer: Arc<CommandBuffer>,
    on_terminal: TerminalCallback,
}

fn post_terminal(
    command_buffer: &CommandBuffer,
    on_terminal: &TerminalCallback,
    status: TransferStatus,
    error: TransferError,
) {
    let callback = on_terminal.clone();
    command_buffer.push(move || callback(status, error));
}

impl FileTransferSession {
    pub fn new_platform_upload(
        name: impl Into<String>,
        expected_size: u64,
        expected_md5_hex: impl Into<String>,
        command_buffer: Arc<CommandBuffer>,
        on_terminal: TerminalCallback,
    ) -> Self {
        Self {
            name: name.into(),
            status: TransferStatus::FileTransfer,
            error: TransferError::None,
            done: false,
            flavor: Flavor::Platform {
                expected_size,
                expected_md5_hex: expected_md5_hex.into(),
                chunks: Vec::new(),
                collected: 0,
                retry_count: 0,
            },
            command_buffer,
            on_terminal,
        }
    }

    pub fn new_url_download(
        url: impl Into<String>,
        downloader: Arc<dyn Downloader>,
        command_buffer: Arc<CommandBuffer>,
        on_terminal: TerminalCallback,
    ) -> Self {
        Self {
            name: String::new(),
            status: TransferStatus::FileTransfer,
            error: TransferError::None,
            done: false,
            flavor: Flavor::Url { url: url.into(), downloader },
            command_buffer,
            on_terminal,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> TransferStatus {
        self.status
    }

    pub fn error(&self) -> TransferError {
        self.error
    }

    pub fn done(&self) -> bool {
        self.done
    }

    pub fn is_platform_transfer(&self) -> bool {
        matches!(self.flavor, Flavor::Platform { .. })
    }

    pub fn is_url_download(&self) -> bool {
        matches!(self.flavor, Flavor::Url { .. })
    }

    /// Bytes committed so far, for the platform-upload flavor. Empty for a
    /// URL download (its bytes live in the downloader until `FILE_READY`).
    pub fn collected_bytes(&self) -> Vec<u8> {
        match &self.flavor {
            Flavor::Platform { chunks, .. } => chunks.iter().flat_map(|c| c.data.clone()).collect(),
            Flavor::Url { downloader, .. } => downloader.bytes(),
        }
    }

    pub fn next_chunk_request(&self) -> FileBinaryRequest {
        match &self.flavor {
            Flavor::Platform {
                expected_size,
                chunks,
                collected,
                ..
            } => {
                if !self.done && *collected < *expected_size {
                    FileBinaryRequest {
                        name: self.name.clone(),
                        chunk_index: chunks.len() as u64,
                    }
                } else {
                    FileBinaryRequest::none()
                }
            }
            Flavor::Url { .. } => FileBinaryRequest::none(),
        }
    }

    /// Apply one inbound chunk. See §4.6 for the exact ordering of checks.
    pub fn push_chunk(&mut self, msg: ParsedBinaryResponse) -> TransferError {
        if matches!(self.flavor, Flavor::Url { .. }) {
            return TransferError::TransferProtocolDisabled;
        }
        if self.done {
            return TransferError::None;
        }

        let previous_hash_hex = to_hex(&msg.previous_hash);
        let current_hash_hex = to_hex(&msg.current_hash);
        let computed_hash_hex = to_hex(&sha256(&msg.data));

        let Flavor::Platform {
            expected_size,
            expected_md5_hex,
            chunks,
            collected,
            retry_count,
        } = &mut self.flavor
        else {
            unreachable!("url-download flavor already returned above");
        };

        if *collected >= *expected_size {
            return TransferError::UnsupportedFileSize;
        }

        if let Some(last) = chunks.last() {
            if previous_hash_hex != last.current_hash {
                *retry_count += 1;
                if *retry_count > MAX_RETRY_COUNT {
                    self.status = TransferStatus::ErrorTransfer;
                    self.error = TransferError::RetryCountExceeded;
                    self.done = true;
                    post_terminal(&self.command_buffer, &self.on_terminal, self.status, self.error);
                    return TransferError::RetryCountExceeded;
                }
                return TransferError::FileHashMismatch;
            }
        }

        if computed_hash_hex != current_hash_hex {
            *retry_count += 1;
            if *retry_count > MAX_RETRY_COUNT {
                self.status = TransferStatus::ErrorTransfer;
                self.error = TransferError::RetryCountExceeded;
                self.done = true;
                post_terminal(&self.command_buffer, &self.on_terminal, self.status, self.error);
                return TransferError::RetryCountExceeded;
            }
            return TransferError::FileHashMismatch;
        }

        *collected += msg.data.len() as u64;
        chunks.push(FileChunk {
            previous_hash: previous_hash_hex,
            data: msg.data,
            current_hash: current_hash_hex,
        });

        if *collected >= *expected_size {
            let whole_file: Vec<u8> = chunks.iter().flat_map(|c| c.data.clone()).collect();
            let actual_hex = to_hex(&md5(&whole_file));
            self.done = true;
            if actual_hex == *expected_md5_hex {
                self.status = TransferStatus::FileReady;
                self.error = TransferError::None;
            } else {
                self.status = TransferStatus::ErrorTransfer;
                self.error = TransferError::FileHashMismatch;
            }
            post_terminal(&self.command_buffer, &self.on_terminal, self.status, self.error);
            return self.error;
        }

        TransferError::None
    }

    /// Clear in-flight state and transition to `ABORTED`. Idempotent:
    /// calling this on an already-terminal session is a no-op.
    pub fn abort(&mut self) {
        if self.done {
            return;
        }
        if let Flavor::Platform {
            chunks,
            collected,
            retry_count,
            ..
        } = &mut self.flavor
        {
            chunks.clear();
            *collected = 0;
            *retry_count = 0;
        }
        if let Flavor::Url { downloader, .. } = &self.flavor {
            downloader.abort();
        }
        self.status = TransferStatus::Aborted;
        self.error = TransferError::None;
        self.done = true;
        post_terminal(&self.command_buffer, &self.on_terminal, self.status, self.error);
    }

    fn apply_download_status(&mut self, status: TransferStatus, error: TransferError, filename: String) {
        self.status = status;
        self.error = error;
        if !filename.is_empty() {
            self.name = filename;
        }
        if status.is_terminal() && !self.done {
            self.done = true;
            post_terminal(&self.command_buffer, &self.on_terminal, self.status, self.error);
        }
    }

    /// Kick off the wrapped downloader for a URL-download session. No-op on
    /// a platform-upload session.
    ///
    /// Takes the owning `Arc<Mutex<_>>` rather than `&mut self`: the
    /// downloader's status callback runs on its own background thread and
    /// needs a handle back into the session that does not keep it alive
    /// past its owner (see §9's weak-back-reference design note).
    pub fn trigger_download(session: &Arc<Mutex<FileTransferSession>>) {
        let (url, downloader) = {
            let guard = session.lock().expect("session lock poisoned");
            match &guard.flavor {
                Flavor::Url { url, downloader } => (url.clone(), downloader.clone()),
                Flavor::Platform { .. } => return,
            }
        };

        let weak: Weak<Mutex<FileTransferSession>> = Arc::downgrade(session);
        downloader.download(
            url,
            Box::new(move |status, error, filename| {
                if let Some(session) = weak.upgrade() {
                    let mut guard = session.lock().expect("session lock poisoned");
                    guard.apply_download_status(status, error, filename);
                }
            }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edge_connector_hash::zero_hash_hex;
    use std::sync::mpsc;

    fn harness() -> (Arc<CommandBuffer>, TerminalCallback, mpsc::Receiver<(TransferStatus, TransferError)>) {
        let buffer = Arc::new(CommandBuffer::new());
        let (tx, rx) = mpsc::channel();
        let cb: TerminalCallback = Arc::new(move |status, error| {
            let _ = tx.send((status, error));
        });
        (buffer, cb, rx)
    }

    fn chunk_payload(previous_hash_hex: &str, data: &[u8]) -> ParsedBinaryResponse {
        let previous_hash: [u8; 32] = hex_to_array(previous_hash_hex);
        let current_hash = sha256(data);
        ParsedBinaryResponse {
            previous_hash,
            data: data.to_vec(),
            current_hash,
        }
    }

    fn hex_to_array(hex_str: &str) -> [u8; 32] {
        let bytes = edge_connector_hash::from_hex(hex_str).unwrap();
        let mut array = [0u8; 32];
        array.copy_from_slice(&bytes);
        array
    }

    #[test]
    fn single_chunk_upload_reaches_file_ready() {
        let (buffer, cb, rx) = harness();
        let data = vec![0x41u8; 100];
        let expected_hash = to_hex(&edge_connector_hash::md5(&data));
        let mut session =
            FileTransferSession::new_platform_upload("t.file", data.len() as u64, expected_hash, buffer, cb);

        let msg = chunk_payload(&zero_hash_hex(), &data);
        assert_eq!(session.push_chunk(msg), TransferError::None);
        assert_eq!(session.status(), TransferStatus::FileReady);
        assert!(session.done());
        assert!(session.next_chunk_request().is_none());
        assert_eq!(rx.recv().unwrap(), (TransferStatus::FileReady, TransferError::None));
    }

    #[test]
    fn abort_mid_transfer_clears_chunks_and_is_idempotent() {
        let (buffer, cb, rx) = harness();
        let mut session = FileTransferSession::new_platform_upload("t.file", 1, "deadbeef", buffer, cb);
        assert!(!session.next_chunk_request().is_none());

        session.abort();
        assert_eq!(session.status(), TransferStatus::Aborted);
        assert_eq!(rx.recv().unwrap(), (TransferStatus::Aborted, TransferError::None));

        session.abort();
        assert!(rx.try_recv().is_err());

        let msg = chunk_payload(&zero_hash_hex(), &[0x01]);
        assert_eq!(session.push_chunk(msg), TransferError::None);
        assert!(session.collected_bytes().is_empty());
    }

    #[test]
    fn retry_exhaustion_terminates_after_four_bad_chunks() {
        let (buffer, cb, rx) = harness();
        let mut session = FileTransferSession::new_platform_upload("t.file", 40, "irrelevant", buffer, cb);

        let bad_current_hash = [0xffu8; 32];
        let mut last = TransferError::None;
        for _ in 0..4 {
            let msg = ParsedBinaryResponse {
                previous_hash: hex_to_array(&zero_hash_hex()),
                data: vec![1, 2, 3],
                current_hash: bad_current_hash,
            };
            last = session.push_chunk(msg);
        }

        assert_eq!(last, TransferError::RetryCountExceeded);
        assert_eq!(session.status(), TransferStatus::ErrorTransfer);
        assert_eq!(session.error(), TransferError::RetryCountExceeded);
        assert!(session.done());
        assert_eq!(
            rx.recv().unwrap(),
            (TransferStatus::ErrorTransfer, TransferError::RetryCountExceeded)
        );
    }

    #[test]
    fn whole_file_hash_mismatch_is_terminal_error() {
        let (buffer, cb, rx) = harness();
        let data = vec![0x09u8; 8];
        let mut session = FileTransferSession::new_platform_upload("t.file", data.len() as u64, "0".repeat(32), buffer, cb);

        let msg = chunk_payload(&zero_hash_hex(), &data);
        assert_eq!(session.push_chunk(msg), TransferError::FileHashMismatch);
        assert_eq!(session.status(), TransferStatus::ErrorTransfer);
        assert_eq!(
            rx.recv().unwrap(),
            (TransferStatus::ErrorTransfer, TransferError::FileHashMismatch)
        );
    }

    #[test]
    fn push_chunk_on_url_session_is_rejected() {
        let (buffer, cb, _rx) = harness();
        let downloader: Arc<dyn Downloader> = Arc::new(crate::downloader::HttpDownloader::new());
        let mut session =
            FileTransferSession::new_url_download("https://example.com/f.bin", downloader, buffer, cb);
        let msg = chunk_payload(&zero_hash_hex(), &[1, 2, 3]);
        assert_eq!(session.push_chunk(msg), TransferError::TransferProtocolDisabled);
    }

    #[test]
    fn zero_size_transfer_reports_unsupported_size_without_appending() {
        let (buffer, cb, _rx) = harness();
        let mut session = FileTransferSession::new_platform_upload("t.file", 0, "irrelevant", buffer, cb);
        let msg = chunk_payload(&zero_hash_hex(), &[0x02]);
        assert_eq!(session.push_chunk(msg), TransferError::UnsupportedFileSize);
        assert!(!session.done());
        assert!(session.collected_bytes().is_empty());
    }
}
