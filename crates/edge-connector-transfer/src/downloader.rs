//! URL-fetching capability (§4.5): a polymorphic sink that turns a URL into
//! bytes, reporting status transitions and supporting abort from any state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use edge_connector_hash::{sha256, to_hex};
use edge_connector_types::{TransferError, TransferStatus};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

static URL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^https?://(www\.)?[-a-zA-Z0-9@:%._+~#=]{1,256}\.[a-zA-Z0-9()]{1,6}\b([-a-zA-Z0-9()@:%_+.~#?&/=]*)$",
    )
    .expect("URL pattern is a valid regex")
});

pub fn is_valid_url(url: &str) -> bool {
    URL_PATTERN.is_match(url)
}

/// Called from the downloader's background thread whenever status or error
/// changes, and once more with the final filename when it becomes known.
pub type StatusCallback = Box<dyn Fn(TransferStatus, TransferError, String) + Send>;

/// Capability set consumed by [`crate::session::FileTransferSession`]'s
/// URL-download flavor. HTTP(S) is the only variant shipped here; tests
/// supply their own mock implementors.
pub trait Downloader: Send + Sync {
    fn status(&self) -> TransferStatus;
    fn name(&self) -> String;
    fn bytes(&self) -> Vec<u8>;
    fn download(&self, url: String, status_cb: StatusCallback);
    fn abort(&self);
}

struct State {
    status: TransferStatus,
    name: String,
    bytes: Vec<u8>,
}

/// Blocking HTTP(S) downloader. Every `download` call blocks on socket IO on
/// its own dedicated thread so the caller's thread never stalls on network
/// activity; `abort` only flips a flag checked between blocking steps since
/// an in-flight `reqwest::blocking` request cannot be cancelled directly.
pub struct HttpDownloader {
    client: reqwest::blocking::Client,
    state: Arc<Mutex<State>>,
    aborted: Arc<AtomicBool>,
}

impl HttpDownloader {
    pub fn new() -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
            state: Arc::new(Mutex::new(State {
                status: TransferStatus::AwaitingDevice,
                name: String::new(),
                bytes: Vec::new(),
            })),
            aborted: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl Default for HttpDownloader {
    fn default() -> Self {
        Self::new()
    }
}

fn filename_from_url(url: &str) -> String {
    url.split('?')
        .next()
        .unwrap_or("")
        .rsplit('/')
        .next()
        .unwrap_or("")
        .to_string()
}

impl Downloader for HttpDownloader {
    fn status(&self) -> TransferStatus {
        self.state.lock().expect("downloader state lock poisoned").status
    }

    fn name(&self) -> String {
        self.state.lock().expect("downloader state lock poisoned").name.clone()
    }

    fn bytes(&self) -> Vec<u8> {
        self.state.lock().expect("downloader state lock poisoned").bytes.clone()
    }

    fn download(&self, url: String, status_cb: StatusCallback) {
        let client = self.client.clone();
        let state = self.state.clone();
        let aborted = self.aborted.clone();
        aborted.store(false, Ordering::SeqCst);

        {
            let mut guard = state.lock().expect("downloader state lock poisoned");
            guard.status = TransferStatus::FileTransfer;
        }
        status_cb(TransferStatus::FileTransfer, TransferError::None, String::new());

        std::thread::spawn(move || {
            if !is_valid_url(&url) {
                let mut guard = state.lock().expect("downloader state lock poisoned");
                guard.status = TransferStatus::ErrorTransfer;
                drop(guard);
                status_cb(TransferStatus::ErrorTransfer, TransferError::MalformedUrl, String::new());
                return;
            }

            let response = client.get(&url).send().and_then(|r| r.error_for_status());
            if aborted.load(Ordering::SeqCst) {
                let mut guard = state.lock().expect("downloader state lock poisoned");
                guard.status = TransferStatus::Aborted;
                return;
            }

            let body = match response.and_then(|r| r.bytes()) {
                Ok(body) => body,
                Err(err) => {
                    warn!("url download failed for {}: {}", url, err);
                    let mut guard = state.lock().expect("downloader state lock poisoned");
                    guard.status = TransferStatus::ErrorTransfer;
                    drop(guard);
                    status_cb(TransferStatus::ErrorTransfer, TransferError::MalformedUrl, String::new());
                    return;
                }
            };

            if aborted.load(Ordering::SeqCst) {
                let mut guard = state.lock().expect("downloader state lock poisoned");
                guard.status = TransferStatus::Aborted;
                return;
            }

            let bytes = body.to_vec();
            let name = {
                let candidate = filename_from_url(&url);
                if candidate.is_empty() {
                    to_hex(&sha256(&bytes))
                } else {
                    candidate
                }
            };

            let mut guard = state.lock().expect("downloader state lock poisoned");
            guard.status = TransferStatus::FileReady;
            guard.name = name.clone();
            guard.bytes = bytes;
            drop(guard);

            status_cb(TransferStatus::FileReady, TransferError::None, name);
        });
    }

    fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
        let mut guard = self.state.lock().expect("downloader state lock poisoned");
        if guard.status != TransferStatus::FileReady {
            guard.status = TransferStatus::Aborted;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_http_scheme() {
        assert!(!is_valid_url("ftp://example.com/file.bin"));
    }

    #[test]
    fn accepts_plain_https_url() {
        assert!(is_valid_url("https://example.com/firmware/v1.bin"));
    }

    #[test]
    fn accepts_url_with_query_string() {
        assert!(is_valid_url("https://example.com/firmware/v1.bin?token=abc"));
    }

    #[test]
    fn rejects_missing_host() {
        assert!(!is_valid_url("https://"));
    }

    #[test]
    fn filename_is_last_path_segment_before_query() {
        assert_eq!(
            filename_from_url("https://example.com/a/b/firmware.bin?x=1"),
            "firmware.bin"
        );
    }

    #[test]
    fn filename_is_empty_when_url_ends_in_slash() {
        assert_eq!(filename_from_url("https://example.com/a/"), "");
    }

    #[test]
    fn fresh_downloader_reports_awaiting_device() {
        let downloader = HttpDownloader::new();
        assert_eq!(downloader.status(), TransferStatus::AwaitingDevice);
        assert_eq!(downloader.name(), "");
        assert!(downloader.bytes().is_empty());
    }

    #[test]
    fn abort_before_any_download_marks_aborted() {
        let downloader = HttpDownloader::new();
        downloader.abort();
        assert_eq!(downloader.status(), TransferStatus::Aborted);
    }
}
