//! Append-only log of permanent facts

use super::database::{Database, Journal, StoreError};
use rusqlite::params;
use std::path::Path;

const MIGRATIONS: &[&str] = &[r#"
    CREATE TABLE permanent_facts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        fact TEXT NOT NULL,
        created_at TEXT NOT NULL
    );
    "#];

/// Durable store behind `remember:`
///
/// Facts are only ever inserted; there is no update or delete path.
pub struct FactStore {
    db: Database,
}

impl FactStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Ok(Self {
            db: Database::open(path, MIGRATIONS, Journal::Wal)?,
        })
    }

    /// Append one fact; returns its sequence number
    pub fn append(&self, fact: &str) -> Result<i64, StoreError> {
        let conn = self.db.get_conn()?;
        conn.execute(
            "INSERT INTO permanent_facts (fact, created_at) VALUES (?1, ?2)",
            params![fact, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// All facts in insertion order
    pub fn load_all(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.db.get_conn()?;
        let mut stmt = conn.prepare("SELECT fact FROM permanent_facts ORDER BY id")?;
        let facts = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(facts)
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        self.db.count("permanent_facts")
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_facts_survive_reopen_in_order() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("facts.sqlite");

        {
            let store = FactStore::open(&path).unwrap();
            assert!(store.is_empty().unwrap());
            store.append("Client is the landlord").unwrap();
            store.append("Lease signed 2019-03-01").unwrap();
        }

        let store = FactStore::open(&path).unwrap();
        assert_eq!(
            store.load_all().unwrap(),
            vec!["Client is the landlord", "Lease signed 2019-03-01"]
        );
        assert_eq!(store.len().unwrap(), 2);
    }

    #[test]
    fn test_duplicates_are_kept() {
        let temp = TempDir::new().unwrap();
        let store = FactStore::open(&temp.path().join("facts.sqlite")).unwrap();
        let first = store.append("same").unwrap();
        let second = store.append("same").unwrap();
        assert!(second > first);
        assert_eq!(store.load_all().unwrap().len(), 2);
    }
}
