use serde::{Deserialize, Serialize};

/// A committed file as recorded by the file repository: its expected content
/// hash and where it lives on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub name: String,
    /// Lowercase hex MD5 of the file's full contents.
    pub hash: String,
    pub path: String,
}

impl FileInfo {
    pub fn new(name: impl Into<String>, hash: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hash: hash.into(),
            path: path.into(),
        }
    }
}

/// One chunk of a platform-upload transfer, as reconstructed from a
/// `FileBinaryResponse` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChunk {
    /// Lowercase hex SHA-256 of the prior chunk's payload (or the zero hash for index 0).
    pub previous_hash: String,
    pub data: Vec<u8>,
    /// Lowercase hex SHA-256 of `data`.
    pub current_hash: String,
}
