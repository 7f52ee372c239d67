//! Persisted chunk table and build metadata

use crate::chunking::Chunk;
use crate::storage::{Database, Journal, StoreError};
use rusqlite::{params, OptionalExtension};
use std::collections::BTreeMap;
use std::path::Path;

const MIGRATIONS: &[&str] = &[r#"
    CREATE TABLE chunks (
        id INTEGER PRIMARY KEY,
        source_file TEXT NOT NULL,
        sequence_position INTEGER NOT NULL,
        text TEXT NOT NULL,
        metadata TEXT NOT NULL,
        content_hash TEXT NOT NULL,
        embedding BLOB NOT NULL
    );

    CREATE INDEX idx_chunks_source ON chunks(source_file);

    CREATE TABLE index_meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );
    "#];

/// What a persisted index was built from
#[derive(Debug, Clone, PartialEq)]
pub struct IndexMeta {
    pub embedding_model: String,
    pub dimension: usize,
    /// Corpus fingerprint at build time, if known
    pub corpus_fingerprint: Option<String>,
    pub built_at: String,
    pub chunk_count: usize,
}

/// One persisted chunk row
pub struct StoredChunk {
    pub id: u64,
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

pub struct IndexStore {
    db: Database,
}

impl IndexStore {
    pub fn open(path: &Path, journal: Journal) -> Result<Self, StoreError> {
        Ok(Self {
            db: Database::open(path, MIGRATIONS, journal)?,
        })
    }

    /// Write every row and the metadata in a single transaction
    pub fn write_all(
        &self,
        rows: &[(u64, &Chunk, &[f32])],
        meta: &IndexMeta,
    ) -> Result<(), StoreError> {
        let mut conn = self.db.get_conn()?;
        let tx = conn.transaction()?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO chunks
                    (id, source_file, sequence_position, text, metadata, content_hash, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;

            for (id, chunk, embedding) in rows {
                let metadata = serde_json::to_string(&chunk.extra_metadata)
                    .unwrap_or_else(|_| "{}".to_string());
                stmt.execute(params![
                    *id as i64,
                    chunk.source_file,
                    chunk.sequence_position as i64,
                    chunk.text,
                    metadata,
                    chunk.content_hash(),
                    encode_vector(embedding),
                ])?;
            }
        }

        let mut entries = vec![
            ("embedding_model", meta.embedding_model.clone()),
            ("dimension", meta.dimension.to_string()),
            ("built_at", meta.built_at.clone()),
            ("chunk_count", meta.chunk_count.to_string()),
        ];
        if let Some(fingerprint) = &meta.corpus_fingerprint {
            entries.push(("corpus_fingerprint", fingerprint.clone()));
        }
        for (key, value) in entries {
            tx.execute(
                "INSERT OR REPLACE INTO index_meta (key, value) VALUES (?1, ?2)",
                params![key, value],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    /// Build metadata, or None if no build ever committed
    pub fn read_meta(&self) -> Result<Option<IndexMeta>, StoreError> {
        let conn = self.db.get_conn()?;
        let mut stmt = conn.prepare("SELECT key, value FROM index_meta")?;
        let values: BTreeMap<String, String> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<_, _>>()?;

        let (Some(model), Some(built_at)) = (values.get("embedding_model"), values.get("built_at"))
        else {
            return Ok(None);
        };

        Ok(Some(IndexMeta {
            embedding_model: model.clone(),
            dimension: parse_or_zero(values.get("dimension")),
            corpus_fingerprint: values.get("corpus_fingerprint").cloned(),
            built_at: built_at.clone(),
            chunk_count: parse_or_zero(values.get("chunk_count")),
        }))
    }

    /// Every chunk with its vector, in id order
    pub fn load_chunks(&self) -> Result<Vec<StoredChunk>, StoreError> {
        let conn = self.db.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, source_file, sequence_position, text, metadata, embedding
             FROM chunks ORDER BY id",
        )?;

        let rows = stmt
            .query_map([], |row| {
                let metadata: String = row.get(4)?;
                let blob: Vec<u8> = row.get(5)?;
                Ok(StoredChunk {
                    id: row.get::<_, i64>(0)? as u64,
                    chunk: Chunk {
                        source_file: row.get(1)?,
                        sequence_position: row.get::<_, i64>(2)? as usize,
                        text: row.get(3)?,
                        extra_metadata: serde_json::from_str(&metadata).unwrap_or_default(),
                    },
                    embedding: decode_vector(&blob),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    /// Value of a single metadata key
    pub fn meta_value(&self, key: &str) -> Result<Option<String>, StoreError> {
        let conn = self.db.get_conn()?;
        Ok(conn
            .query_row(
                "SELECT value FROM index_meta WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?)
    }
}

fn parse_or_zero(value: Option<&String>) -> usize {
    value.and_then(|v| v.parse().ok()).unwrap_or(0)
}

/// Little-endian f32 bytes
fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|x| x.to_le_bytes()).collect()
}

fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn meta(count: usize) -> IndexMeta {
        IndexMeta {
            embedding_model: "hash".to_string(),
            dimension: 3,
            corpus_fingerprint: Some("abc".to_string()),
            built_at: "2024-01-01T00:00:00Z".to_string(),
            chunk_count: count,
        }
    }

    #[test]
    fn test_empty_store_has_no_meta() {
        let temp = TempDir::new().unwrap();
        let store = IndexStore::open(&temp.path().join("i.sqlite"), Journal::Rollback).unwrap();
        assert!(store.read_meta().unwrap().is_none());
        assert!(store.load_chunks().unwrap().is_empty());
    }

    #[test]
    fn test_rows_and_meta_persist() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("i.sqlite");

        let mut chunk = Chunk::new("Clause 4 applies.", "lease.pdf", 2);
        chunk
            .extra_metadata
            .insert("page".to_string(), serde_json::json!(3));
        let vector = [0.25f32, -1.5, 3.0];

        {
            let store = IndexStore::open(&path, Journal::Rollback).unwrap();
            store
                .write_all(&[(0, &chunk, &vector[..])], &meta(1))
                .unwrap();
        }

        let store = IndexStore::open(&path, Journal::Wal).unwrap();
        assert_eq!(store.read_meta().unwrap(), Some(meta(1)));
        assert_eq!(
            store.meta_value("corpus_fingerprint").unwrap().as_deref(),
            Some("abc")
        );

        let rows = store.load_chunks().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, 0);
        assert_eq!(rows[0].chunk, chunk);
        assert_eq!(rows[0].embedding, vector.to_vec());
    }

    #[test]
    fn test_vector_encoding() {
        let v = vec![1.0f32, f32::MIN_POSITIVE, -0.0];
        assert_eq!(decode_vector(&encode_vector(&v)), v);
    }
}
