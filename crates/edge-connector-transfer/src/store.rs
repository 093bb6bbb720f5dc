//! Side-effect-free-on-failure file writer (§4.3). Every transfer that
//! reaches `FILE_READY` is committed here before it is registered in the
//! file repository.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::warn;

/// Write `bytes` to `path` atomically: write to a sibling temp file, then
/// rename it into place. Returns `false` on any filesystem failure, leaving
/// no partial file visible at `path`.
pub fn create_binary(path: &Path, bytes: &[u8]) -> bool {
    let tmp_path = match path.file_name() {
        Some(name) => {
            let mut tmp_name = std::ffi::OsString::from(".");
            tmp_name.push(name);
            tmp_name.push(".tmp");
            path.with_file_name(tmp_name)
        }
        None => return false,
    };

    let write_result = (|| -> std::io::Result<()> {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)?;
        Ok(())
    })();

    match write_result {
        Ok(()) => true,
        Err(err) => {
            warn!("failed to write {}: {}", path.display(), err);
            let _ = fs::remove_file(&tmp_path);
            false
        }
    }
}

/// Materializes completed transfers under a configured directory.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Write `bytes` as `name` under the store's directory. Returns the
    /// absolute path on success, `None` on any filesystem failure.
    pub fn write_file(&self, name: &str, bytes: &[u8]) -> Option<PathBuf> {
        let path = self.dir.join(name);
        if create_binary(&path, bytes) {
            Some(path)
        } else {
            None
        }
    }

    pub fn delete_file(&self, name: &str) -> bool {
        let path = self.dir.join(name);
        match fs::remove_file(&path) {
            Ok(()) => true,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => true,
            Err(err) => {
                warn!("failed to delete {}: {}", path.display(), err);
                false
            }
        }
    }

    /// Remove every file directly under the store's directory, keeping the
    /// directory itself. Best-effort: logs and continues past entries that
    /// fail to delete instead of aborting the purge.
    pub fn clear(&self) -> bool {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) => {
                warn!("failed to read store directory {}: {}", self.dir.display(), err);
                return false;
            }
        };

        let mut all_ok = true;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_file() {
                if let Err(err) = fs::remove_file(&path) {
                    warn!("failed to delete {}: {}", path.display(), err);
                    all_ok = false;
                }
            }
        }
        all_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_file_then_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();
        let path = store.write_file("t.file", b"hello").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"hello");
        assert!(path.is_absolute() || dir.path().is_absolute());
    }

    #[test]
    fn no_temp_file_left_behind_on_success() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();
        store.write_file("t.file", b"hello").unwrap();
        let entries: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("t.file")]);
    }

    #[test]
    fn write_file_fails_under_nonexistent_parent() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist-subdir");
        let store = FileStore { dir: missing };
        assert!(store.write_file("t.file", b"x").is_none());
    }

    #[test]
    fn delete_missing_file_is_noop_success() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();
        assert!(store.delete_file("never-existed"));
    }

    #[test]
    fn clear_removes_all_files_but_keeps_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();
        store.write_file("a", b"1").unwrap();
        store.write_file("b", b"2").unwrap();
        assert!(store.clear());
        assert!(fs::read_dir(dir.path()).unwrap().next().is_none());
    }
}
