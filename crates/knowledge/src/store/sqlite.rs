//! SQLite-backed [`KnowledgeStore`].
//!
//! Chunks, manifests, cached answers and metadata live in one database file
//! (`.recall/index.sqlite` by default). Blocking SQLite calls run on the
//! tokio blocking pool.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use recall_core::{AppError, AppResult};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{KnowledgeStore, StoreStats};
use crate::types::{AnswerCacheEntry, DocumentManifest, KnowledgeChunk, Metadata};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    document_id TEXT PRIMARY KEY,
    checksum TEXT NOT NULL,
    version INTEGER NOT NULL,
    updated_at TEXT NOT NULL,
    unit_count INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS chunks (
    id TEXT PRIMARY KEY,
    document_id TEXT NOT NULL,
    origin TEXT NOT NULL,
    position INTEGER NOT NULL,
    text TEXT NOT NULL,
    embedding BLOB,
    metadata TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(document_id);

CREATE TABLE IF NOT EXISTS answer_cache (
    normalized_query TEXT PRIMARY KEY,
    answer TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

const CHUNK_COLUMNS: &str = "id, document_id, origin, position, text, embedding, metadata";

/// Store persisted in a single SQLite file.
pub struct SqliteStore {
    conn: Arc<Mutex<Option<Connection>>>,
}

impl SqliteStore {
    /// Open (or create) the database at `db_path`.
    pub fn open(db_path: &Path) -> AppResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::Storage(format!("Failed to create index directory: {}", e))
            })?;
        }

        let conn = Connection::open(db_path)
            .map_err(|e| AppError::Storage(format!("Failed to open SQLite index: {}", e)))?;

        conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get::<_, String>(0))
            .map_err(|e| AppError::Storage(format!("Failed to enable WAL: {}", e)))?;

        conn.execute_batch(SCHEMA)
            .map_err(|e| AppError::Storage(format!("Failed to create tables: {}", e)))?;

        tracing::debug!("Opened SQLite index at {:?}", db_path);
        Ok(Self {
            conn: Arc::new(Mutex::new(Some(conn))),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, op: &'static str, f: F) -> AppResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().unwrap_or_else(|e| e.into_inner());
            let conn = guard
                .as_mut()
                .ok_or_else(|| AppError::Storage("Store is closed".to_string()))?;
            f(conn).map_err(|e| AppError::Storage(format!("Failed to {}: {}", op, e)))
        })
        .await
        .map_err(|e| AppError::Storage(format!("Storage task failed: {}", e)))?
    }
}

#[async_trait]
impl KnowledgeStore for SqliteStore {
    fn backend(&self) -> &str {
        "sqlite"
    }

    async fn replace_document(
        &self,
        manifest: &DocumentManifest,
        chunks: &[KnowledgeChunk],
    ) -> AppResult<usize> {
        let manifest = manifest.clone();
        let chunks = chunks.to_vec();

        self.with_conn("replace document", move |conn| {
            let tx = conn.transaction()?;
            let removed = tx.execute(
                "DELETE FROM chunks WHERE document_id = ?1",
                params![manifest.document_id],
            )?;

            {
                let mut insert = tx.prepare(
                    "INSERT INTO chunks (id, document_id, origin, position, text, embedding, metadata)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                )?;
                for chunk in &chunks {
                    let metadata = serde_json::to_string(&chunk.metadata)
                        .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
                    insert.execute(params![
                        chunk.id,
                        chunk.document_id,
                        chunk.origin,
                        chunk.position,
                        chunk.text,
                        chunk.embedding.as_deref().map(embedding_to_bytes),
                        metadata,
                    ])?;
                }
            }

            tx.execute(
                "INSERT INTO documents (document_id, checksum, version, updated_at, unit_count)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(document_id) DO UPDATE SET
                    checksum = excluded.checksum,
                    version = excluded.version,
                    updated_at = excluded.updated_at,
                    unit_count = excluded.unit_count",
                params![
                    manifest.document_id,
                    manifest.checksum,
                    manifest.version,
                    manifest.updated_at.to_rfc3339(),
                    manifest.unit_count as i64,
                ],
            )?;

            tx.commit()?;
            Ok(removed)
        })
        .await
    }

    async fn all_chunks(&self) -> AppResult<Vec<KnowledgeChunk>> {
        self.with_conn("load chunks", |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM chunks ORDER BY document_id, position",
                CHUNK_COLUMNS
            ))?;
            let rows = stmt.query_map([], chunk_from_row)?;
            rows.collect()
        })
        .await
    }

    async fn chunks_for_document(&self, document_id: &str) -> AppResult<Vec<KnowledgeChunk>> {
        let document_id = document_id.to_string();
        self.with_conn("load document chunks", move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM chunks WHERE document_id = ?1 ORDER BY position",
                CHUNK_COLUMNS
            ))?;
            let rows = stmt.query_map(params![document_id], chunk_from_row)?;
            rows.collect()
        })
        .await
    }

    async fn get_manifest(&self, document_id: &str) -> AppResult<Option<DocumentManifest>> {
        let document_id = document_id.to_string();
        self.with_conn("load manifest", move |conn| {
            conn.query_row(
                "SELECT document_id, checksum, version, updated_at, unit_count
                 FROM documents WHERE document_id = ?1",
                params![document_id],
                |row| {
                    Ok(DocumentManifest {
                        document_id: row.get(0)?,
                        checksum: row.get(1)?,
                        version: row.get(2)?,
                        updated_at: timestamp_from_row(row, 3)?,
                        unit_count: row.get::<_, i64>(4)? as usize,
                    })
                },
            )
            .optional()
        })
        .await
    }

    async fn get_cached_answer(
        &self,
        normalized_query: &str,
    ) -> AppResult<Option<AnswerCacheEntry>> {
        let key = normalized_query.to_string();
        self.with_conn("load cached answer", move |conn| {
            conn.query_row(
                "SELECT normalized_query, answer, created_at FROM answer_cache
                 WHERE normalized_query = ?1",
                params![key],
                cache_entry_from_row,
            )
            .optional()
        })
        .await
    }

    async fn put_cached_answer(&self, entry: &AnswerCacheEntry) -> AppResult<()> {
        let answer = serde_json::to_string(&entry.answer)?;
        let key = entry.normalized_query.clone();
        let created_at = entry.created_at.to_rfc3339();
        self.with_conn("store cached answer", move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO answer_cache (normalized_query, answer, created_at)
                 VALUES (?1, ?2, ?3)",
                params![key, answer, created_at],
            )?;
            Ok(())
        })
        .await
    }

    async fn delete_cached_answers(&self, keys: &[String]) -> AppResult<usize> {
        if keys.is_empty() {
            return Ok(0);
        }
        let keys = keys.to_vec();
        self.with_conn("delete cached answers", move |conn| {
            let tx = conn.transaction()?;
            let mut deleted = 0;
            for key in &keys {
                deleted += tx.execute(
                    "DELETE FROM answer_cache WHERE normalized_query = ?1",
                    params![key],
                )?;
            }
            tx.commit()?;
            Ok(deleted)
        })
        .await
    }

    async fn cached_answers(&self) -> AppResult<Vec<AnswerCacheEntry>> {
        self.with_conn("scan answer cache", |conn| {
            let mut stmt =
                conn.prepare("SELECT normalized_query, answer, created_at FROM answer_cache")?;
            let rows = stmt.query_map([], cache_entry_from_row)?;
            rows.collect()
        })
        .await
    }

    async fn clear_cache(&self) -> AppResult<usize> {
        self.with_conn("clear answer cache", |conn| {
            conn.execute("DELETE FROM answer_cache", [])
        })
        .await
    }

    async fn get_meta(&self, key: &str) -> AppResult<Option<String>> {
        let key = key.to_string();
        self.with_conn("read metadata", move |conn| {
            conn.query_row(
                "SELECT value FROM meta WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
        })
        .await
    }

    async fn put_meta(&self, key: &str, value: &str) -> AppResult<()> {
        let key = key.to_string();
        let value = value.to_string();
        self.with_conn("write metadata", move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)",
                params![key, value],
            )?;
            Ok(())
        })
        .await
    }

    async fn stats(&self) -> AppResult<StoreStats> {
        self.with_conn("count rows", |conn| {
            let count = |table: &str| -> rusqlite::Result<usize> {
                conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                    row.get::<_, i64>(0)
                })
                .map(|n| n as usize)
            };
            Ok(StoreStats {
                chunk_count: count("chunks")?,
                document_count: count("documents")?,
                cache_entries: count("answer_cache")?,
            })
        })
        .await
    }

    async fn clear_all(&self) -> AppResult<()> {
        self.with_conn("reset index", |conn| {
            conn.execute_batch(
                "BEGIN;
                 DELETE FROM chunks;
                 DELETE FROM documents;
                 DELETE FROM answer_cache;
                 DELETE FROM meta;
                 COMMIT;",
            )
        })
        .await
    }

    async fn close(&self) -> AppResult<()> {
        let conn = Arc::clone(&self.conn);
        let taken = conn.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(conn) = taken {
            conn.close()
                .map_err(|(_, e)| AppError::Storage(format!("Failed to close index: {}", e)))?;
            tracing::debug!("SQLite index closed");
        }
        Ok(())
    }
}

fn chunk_from_row(row: &Row<'_>) -> rusqlite::Result<KnowledgeChunk> {
    let embedding = row
        .get::<_, Option<Vec<u8>>>(5)?
        .map(|bytes| bytes_to_embedding(&bytes))
        .transpose()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Blob, Box::new(e)))?;

    let metadata_json: String = row.get(6)?;
    let metadata: Metadata = serde_json::from_str(&metadata_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e)))?;

    Ok(KnowledgeChunk {
        id: row.get(0)?,
        document_id: row.get(1)?,
        origin: row.get(2)?,
        position: row.get(3)?,
        text: row.get(4)?,
        embedding,
        metadata,
    })
}

fn cache_entry_from_row(row: &Row<'_>) -> rusqlite::Result<AnswerCacheEntry> {
    let answer_json: String = row.get(1)?;
    let answer = serde_json::from_str(&answer_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?;

    Ok(AnswerCacheEntry {
        normalized_query: row.get(0)?,
        answer,
        created_at: timestamp_from_row(row, 2)?,
    })
}

fn timestamp_from_row(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Convert an embedding vector to little-endian bytes.
fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for &value in embedding {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Convert stored bytes back to an embedding vector.
fn bytes_to_embedding(bytes: &[u8]) -> AppResult<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(AppError::Storage(
            "Invalid embedding bytes length".to_string(),
        ));
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}
