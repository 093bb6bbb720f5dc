use rusqlite::Connection;
use tracing::info;

use crate::RepositoryError;

/// Current schema version. Increment this and add a new migration function
/// to the `MIGRATIONS` array when the schema changes.
const CURRENT_VERSION: u32 = 1;

type MigrationFn = fn(&Connection) -> Result<(), RepositoryError>;

const MIGRATIONS: &[MigrationFn] = &[migrate_v1];

pub fn run(conn: &Connection) -> Result<(), RepositoryError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version     INTEGER NOT NULL,
            applied_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let current = get_current_version(conn)?;
    info!("file repository schema version: {} (latest: {})", current, CURRENT_VERSION);

    if current >= CURRENT_VERSION {
        return Ok(());
    }

    for version in (current + 1)..=CURRENT_VERSION {
        let idx = (version - 1) as usize;
        MIGRATIONS[idx](conn)?;
        conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
        info!("applied file repository migration v{}", version);
    }

    Ok(())
}

fn get_current_version(conn: &Connection) -> Result<u32, RepositoryError> {
    let version: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;
    Ok(version)
}

/// Version 1: the single `files` table backing the file repository (§4.2).
fn migrate_v1(conn: &Connection) -> Result<(), RepositoryError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS files (
            name    TEXT PRIMARY KEY,
            hash    TEXT NOT NULL,
            path    TEXT NOT NULL
        );
        ",
    )?;
    Ok(())
}
