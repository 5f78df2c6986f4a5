use thiserror::Error;
use tokio_rusqlite::Connection;
use rusqlite::{params, OptionalExtension};
use serde::Serialize;
use std::cmp::Ordering;
use std::path::Path;
use std::sync::Arc;
use log::info;

use crate::database::similarity::{cosine_similarity, decode_vector, encode_vector};

#[derive(Error, Debug)]
pub enum VectorDBError {
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Operation failed: {0}")]
    Operation(#[from] tokio_rusqlite::Error),
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),
    #[error("Vector dimension mismatch: collection expects {expected}, got {found}")]
    DimensionMismatch { expected: usize, found: usize },
    #[error("Got {chunks} chunks but {vectors} vectors")]
    LengthMismatch { chunks: usize, vectors: usize },
}

/// A chunk as it goes into the store.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub seq: usize,
    pub text: String,
    pub source: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub id: String,
    pub seq: usize,
    pub text: String,
    pub source: String,
    pub score: f32,
}

/// Collections of chunk vectors kept in a local SQLite file. Search is an
/// exact cosine scan over one collection.
#[derive(Clone)]
pub struct VectorDB {
    conn: Arc<Connection>,
}

impl VectorDB {
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, VectorDBError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| VectorDBError::Connection(e.to_string()))?;
        }

        let conn = Connection::open(&path)
            .await
            .map_err(|e| VectorDBError::Connection(e.to_string()))?;

        let db = Self { conn: Arc::new(conn) };
        db.initialize().await?;
        info!("Vector store opened at {}", path.display());
        Ok(db)
    }

    pub async fn open_in_memory() -> Result<Self, VectorDBError> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| VectorDBError::Connection(e.to_string()))?;

        let db = Self { conn: Arc::new(conn) };
        db.initialize().await?;
        Ok(db)
    }

    async fn initialize(&self) -> Result<(), VectorDBError> {
        self.conn
            .call(|conn| {
                conn.execute_batch(
                    "PRAGMA foreign_keys = ON;
                    CREATE TABLE IF NOT EXISTS collections (
                        name TEXT PRIMARY KEY,
                        dimension INTEGER NOT NULL,
                        created_at TEXT NOT NULL
                    );
                    CREATE TABLE IF NOT EXISTS chunks (
                        collection TEXT NOT NULL REFERENCES collections(name) ON DELETE CASCADE,
                        id TEXT NOT NULL,
                        seq INTEGER NOT NULL,
                        text TEXT NOT NULL,
                        source TEXT NOT NULL,
                        embedding BLOB NOT NULL,
                        PRIMARY KEY (collection, id)
                    );",
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn create_collection(
        &self,
        name: &str,
        dimension: usize,
    ) -> Result<(), VectorDBError> {
        if let Some(existing) = self.collection_dimension(name).await? {
            if existing != dimension {
                return Err(VectorDBError::DimensionMismatch {
                    expected: existing,
                    found: dimension,
                });
            }
            info!("Collection {} already exists, skipping creation", name);
            return Ok(());
        }

        let name = name.to_string();
        let created_at = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO collections (name, dimension, created_at) VALUES (?1, ?2, ?3)",
                    params![name, dimension as i64, created_at],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn collection_dimension(&self, name: &str) -> Result<Option<usize>, VectorDBError> {
        let name = name.to_string();
        let dimension = self.conn
            .call(move |conn| {
                let dimension = conn
                    .query_row(
                        "SELECT dimension FROM collections WHERE name = ?1",
                        params![name],
                        |row| row.get::<_, i64>(0),
                    )
                    .optional()?;
                Ok(dimension)
            })
            .await?;
        Ok(dimension.map(|d| d as usize))
    }

    pub async fn list_collections(&self) -> Result<Vec<String>, VectorDBError> {
        let names = self.conn
            .call(|conn| {
                let mut stmt = conn.prepare("SELECT name FROM collections ORDER BY name")?;
                let names = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(names)
            })
            .await?;
        Ok(names)
    }

    /// Returns whether the collection existed.
    pub async fn delete_collection(&self, name: &str) -> Result<bool, VectorDBError> {
        let name = name.to_string();
        let deleted = self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute("DELETE FROM chunks WHERE collection = ?1", params![name])?;
                let deleted = tx.execute("DELETE FROM collections WHERE name = ?1", params![name])?;
                tx.commit()?;
                Ok(deleted)
            })
            .await?;
        Ok(deleted > 0)
    }

    /// Inserts chunks with their vectors in one transaction. Chunk ids are the
    /// sequence numbers, so re-storing a document replaces its rows.
    pub async fn store_vectors(
        &self,
        collection: &str,
        records: Vec<ChunkRecord>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<usize, VectorDBError> {
        if records.len() != vectors.len() {
            return Err(VectorDBError::LengthMismatch {
                chunks: records.len(),
                vectors: vectors.len(),
            });
        }

        let expected = self.collection_dimension(collection).await?
            .ok_or_else(|| VectorDBError::CollectionNotFound(collection.to_string()))?;
        if let Some(bad) = vectors.iter().find(|v| v.len() != expected) {
            return Err(VectorDBError::DimensionMismatch {
                expected,
                found: bad.len(),
            });
        }

        let collection = collection.to_string();
        let stored = self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                {
                    let mut stmt = tx.prepare(
                        "INSERT OR REPLACE INTO chunks (collection, id, seq, text, source, embedding)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    )?;
                    for (record, vector) in records.iter().zip(vectors.iter()) {
                        stmt.execute(params![
                            collection,
                            record.seq.to_string(),
                            record.seq as i64,
                            record.text,
                            record.source,
                            encode_vector(vector),
                        ])?;
                    }
                }
                tx.commit()?;
                Ok(records.len())
            })
            .await?;
        Ok(stored)
    }

    pub async fn count(&self, collection: &str) -> Result<usize, VectorDBError> {
        let collection = collection.to_string();
        let count = self.conn
            .call(move |conn| {
                let count = conn.query_row(
                    "SELECT COUNT(*) FROM chunks WHERE collection = ?1",
                    params![collection],
                    |row| row.get::<_, i64>(0),
                )?;
                Ok(count)
            })
            .await?;
        Ok(count as usize)
    }

    pub async fn search_vectors(
        &self,
        collection: &str,
        query_vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredChunk>, VectorDBError> {
        let expected = self.collection_dimension(collection).await?
            .ok_or_else(|| VectorDBError::CollectionNotFound(collection.to_string()))?;
        if query_vector.len() != expected {
            return Err(VectorDBError::DimensionMismatch {
                expected,
                found: query_vector.len(),
            });
        }
        if limit == 0 {
            return Ok(Vec::new());
        }

        let collection = collection.to_string();
        let query = query_vector.to_vec();
        let results = self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, seq, text, source, embedding FROM chunks WHERE collection = ?1",
                )?;
                let mut scored = stmt
                    .query_map(params![collection], |row| {
                        let embedding: Vec<u8> = row.get(4)?;
                        Ok(ScoredChunk {
                            id: row.get(0)?,
                            seq: row.get::<_, i64>(1)? as usize,
                            text: row.get(2)?,
                            source: row.get(3)?,
                            score: cosine_similarity(&query, &decode_vector(&embedding)),
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;

                scored.sort_by(|a, b| {
                    b.score
                        .partial_cmp(&a.score)
                        .unwrap_or(Ordering::Equal)
                        .then(a.seq.cmp(&b.seq))
                });
                scored.truncate(limit);
                Ok(scored)
            })
            .await?;
        Ok(results)
    }
}
