pub mod migrations;
pub mod queries;

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;
use tracing::info;

/// Anything that can go wrong persisting or reading a [`FileInfo`](edge_connector_types::FileInfo).
///
/// Mirrors §4.2: "any I/O error surfaces as `RepositoryError`".
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("file repository storage error: {0}")]
    Storage(#[from] rusqlite::Error),
    #[error("file repository lock poisoned")]
    LockPoisoned,
}

/// Persistent key -> record map (name -> `FileInfo`), backed by SQLite.
///
/// Single connection guarded by a `Mutex`, same rationale as the teacher's
/// `Database` wrapper: `rusqlite::Connection` is `Send` but not `Sync`.
/// Concurrent access is serialized here so callers never need their own lock.
pub struct FileRepository {
    conn: Mutex<Connection>,
}

impl FileRepository {
    pub fn open(path: &Path) -> Result<Self, RepositoryError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        migrations::run(&conn)?;

        info!("file repository opened at {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// An in-memory repository, useful for tests.
    pub fn open_in_memory() -> Result<Self, RepositoryError> {
        let conn = Connection::open_in_memory()?;
        migrations::run(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T, RepositoryError>
    where
        F: FnOnce(&Connection) -> Result<T, RepositoryError>,
    {
        let conn = self.conn.lock().map_err(|_| RepositoryError::LockPoisoned)?;
        f(&conn)
    }
}
