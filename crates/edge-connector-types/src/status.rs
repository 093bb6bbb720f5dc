use serde::{Deserialize, Serialize};

/// Status of a single file transfer session (upload or URL download).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferStatus {
    FileTransfer,
    FileReady,
    Aborted,
    ErrorTransfer,
    AwaitingDevice,
}

impl TransferStatus {
    /// A status is terminal once no further chunk/download activity will occur for the session.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TransferStatus::FileReady | TransferStatus::Aborted | TransferStatus::ErrorTransfer
        )
    }
}

/// Error accompanying a [`TransferStatus`] change. `None` means no error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferError {
    None,
    UnsupportedFileSize,
    MalformedUrl,
    FileHashMismatch,
    RetryCountExceeded,
    TransferProtocolDisabled,
    FileSystemError,
}

/// Status of a firmware installation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FirmwareStatus {
    Installation,
    Completed,
    Aborted,
    Error,
}

/// Error accompanying a [`FirmwareStatus`] change. `None` means no error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FirmwareError {
    None,
    UnspecifiedError,
    FileNotPresent,
    FileSystemError,
    InstallationFailed,
}
