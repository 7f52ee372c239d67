//! SQLite database management with migrations
//!
//! Each store (the corpus index, the fact log) owns one database file and
//! its own migration list.

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },
}

/// How the database journals writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Journal {
    /// Write-ahead log for long-lived, concurrently read stores
    Wal,
    /// Rollback journal; the file is self-contained once the pool is
    /// dropped, so it can be renamed into place
    Rollback,
}

/// Database manager with migration support
pub struct Database {
    pool: DbPool,
    path: PathBuf,
}

impl Database {
    /// Open (creating if needed) a database and bring it up to date
    pub fn open(db_path: &Path, migrations: &[&str], journal: Journal) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Io {
                source: e,
                context: format!("Failed to create database directory: {:?}", parent),
            })?;
        }

        let pragmas = match journal {
            Journal::Wal => {
                "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = 5000;"
            }
            Journal::Rollback => {
                "PRAGMA journal_mode = DELETE;
                 PRAGMA synchronous = FULL;
                 PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = 5000;"
            }
        };

        let manager = SqliteConnectionManager::file(db_path).with_init(move |c| c.execute_batch(pragmas));

        let pool = Pool::builder().max_size(8).build(manager)?;

        let db = Self {
            pool,
            path: db_path.to_path_buf(),
        };
        db.migrate(migrations)?;

        Ok(db)
    }

    /// Get a connection from the pool
    pub fn get_conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>, StoreError> {
        Ok(self.pool.get()?)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply the migrations this file has not seen yet
    fn migrate(&self, migrations: &[&str]) -> Result<(), StoreError> {
        let mut conn = self.get_conn()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )?;

        let current_version: i64 = conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM _migrations",
            [],
            |row| row.get(0),
        )?;

        for (version, migration) in migrations.iter().enumerate() {
            let version = version as i64 + 1;

            if version > current_version {
                tracing::debug!("Applying migration {} to {:?}", version, self.path);

                let tx = conn.transaction()?;
                tx.execute_batch(migration)?;
                tx.execute(
                    "INSERT INTO _migrations (version, applied_at) VALUES (?1, datetime('now'))",
                    params![version],
                )?;
                tx.commit()?;
            }
        }

        Ok(())
    }

    /// Number of rows in a table
    pub fn count(&self, table: &str) -> Result<usize, StoreError> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
            row.get(0)
        })?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const TEST_MIGRATIONS: &[&str] = &[
        "CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT NOT NULL);",
        "ALTER TABLE notes ADD COLUMN created_at TEXT;",
    ];

    #[test]
    fn test_database_creation_and_migrations() {
        let temp = TempDir::new().unwrap();
        let db_path = temp.path().join("nested").join("test.db");

        let db = Database::open(&db_path, TEST_MIGRATIONS, Journal::Wal).unwrap();
        assert!(db_path.exists());

        let conn = db.get_conn().unwrap();
        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM _migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, 2);

        conn.execute(
            "INSERT INTO notes (body, created_at) VALUES ('x', 'now')",
            [],
        )
        .unwrap();
        drop(conn);
        assert_eq!(db.count("notes").unwrap(), 1);
    }

    #[test]
    fn test_reopen_does_not_reapply() {
        let temp = TempDir::new().unwrap();
        let db_path = temp.path().join("test.db");

        {
            let db = Database::open(&db_path, TEST_MIGRATIONS, Journal::Rollback).unwrap();
            db.get_conn()
                .unwrap()
                .execute("INSERT INTO notes (body) VALUES ('kept')", [])
                .unwrap();
        }

        let db = Database::open(&db_path, TEST_MIGRATIONS, Journal::Rollback).unwrap();
        assert_eq!(db.count("notes").unwrap(), 1);
    }
}
