use rusqlite::OptionalExtension;

use edge_connector_types::FileInfo;

use crate::{FileRepository, RepositoryError};

impl FileRepository {
    /// Upsert a file record by name. Idempotent.
    pub fn store(&self, info: &FileInfo) -> Result<(), RepositoryError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO files (name, hash, path) VALUES (?1, ?2, ?3)
                 ON CONFLICT(name) DO UPDATE SET hash = excluded.hash, path = excluded.path",
                rusqlite::params![info.name, info.hash, info.path],
            )?;
            Ok(())
        })
    }

    pub fn get_info(&self, name: &str) -> Result<Option<FileInfo>, RepositoryError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT name, hash, path FROM files WHERE name = ?1",
                [name],
                |row| {
                    Ok(FileInfo {
                        name: row.get(0)?,
                        hash: row.get(1)?,
                        path: row.get(2)?,
                    })
                },
            )
            .optional()
            .map_err(RepositoryError::from)
        })
    }

    /// All known file names. Order is unspecified; duplicates cannot occur
    /// because `name` is the primary key.
    pub fn list_names(&self) -> Result<Vec<String>, RepositoryError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT name FROM files")?;
            let names = stmt
                .query_map([], |row| row.get(0))?
                .collect::<Result<Vec<String>, rusqlite::Error>>()?;
            Ok(names)
        })
    }

    /// Remove a file record by name. No-op if absent.
    pub fn remove(&self, name: &str) -> Result<(), RepositoryError> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM files WHERE name = ?1", [name])?;
            Ok(())
        })
    }

    /// Clear every file record.
    pub fn remove_all(&self) -> Result<(), RepositoryError> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM files", [])?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(name: &str) -> FileInfo {
        FileInfo::new(name, "deadbeef", format!("/tmp/{name}"))
    }

    #[test]
    fn store_then_get_info_roundtrips() {
        let repo = FileRepository::open_in_memory().unwrap();
        let info = info("t.file");
        repo.store(&info).unwrap();
        assert_eq!(repo.get_info("t.file").unwrap(), Some(info));
    }

    #[test]
    fn get_info_missing_is_none() {
        let repo = FileRepository::open_in_memory().unwrap();
        assert_eq!(repo.get_info("nope").unwrap(), None);
    }

    #[test]
    fn store_is_idempotent_upsert() {
        let repo = FileRepository::open_in_memory().unwrap();
        repo.store(&info("a")).unwrap();
        let updated = FileInfo::new("a", "newhash", "/tmp/a-new");
        repo.store(&updated).unwrap();
        assert_eq!(repo.get_info("a").unwrap(), Some(updated));
        assert_eq!(repo.list_names().unwrap(), vec!["a".to_string()]);
    }

    #[test]
    fn remove_missing_is_noop() {
        let repo = FileRepository::open_in_memory().unwrap();
        assert!(repo.remove("nope").is_ok());
    }

    #[test]
    fn remove_all_empties_list() {
        let repo = FileRepository::open_in_memory().unwrap();
        repo.store(&info("a")).unwrap();
        repo.store(&info("b")).unwrap();
        repo.remove_all().unwrap();
        assert!(repo.list_names().unwrap().is_empty());
    }

    #[test]
    fn list_names_has_no_duplicates() {
        let repo = FileRepository::open_in_memory().unwrap();
        repo.store(&info("a")).unwrap();
        repo.store(&info("a")).unwrap();
        assert_eq!(repo.list_names().unwrap(), vec!["a".to_string()]);
    }
}
