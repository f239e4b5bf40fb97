//! SQLite-backed document store.
//!
//! Embeddings are stored as the raw little-endian bytes of the f32 vector
//! in a nullable BLOB column; a NULL blob means "not yet computed".

use std::path::PathBuf;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use super::{Document, DocumentStore};
use crate::config::AppPaths;
use crate::embedding::EmbeddingExtractor;
use crate::errors::RagError;

pub struct SqliteDocumentStore {
    pool: SqlitePool,
    #[allow(dead_code)]
    db_path: PathBuf,
}

impl SqliteDocumentStore {
    pub async fn new(paths: &AppPaths) -> Result<Self, RagError> {
        Self::with_path(paths.db_path.clone()).await
    }

    pub async fn with_path(db_path: PathBuf) -> Result<Self, RagError> {
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(RagError::internal)?;

        let store = Self { pool, db_path };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), RagError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS documents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                text TEXT NOT NULL,
                embedding BLOB
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(RagError::internal)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS store_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(RagError::internal)?;

        Ok(())
    }

    fn validate_text(text: &str) -> Result<(), RagError> {
        if text.trim().is_empty() {
            return Err(RagError::Validation(
                "document text must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Record which extractor model produced the stored vectors. A later
    /// model swap makes old vectors incomparable with new queries, so a
    /// mismatch is logged; no migration is attempted.
    async fn note_embedding_model(&self, tag: &str) -> Result<(), RagError> {
        match self.embedding_model().await? {
            None => {
                sqlx::query(
                    "INSERT OR REPLACE INTO store_meta (key, value, updated_at)
                     VALUES ('embedding_model', ?1, STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))",
                )
                .bind(tag)
                .execute(&self.pool)
                .await
                .map_err(RagError::internal)?;
            }
            Some(current) if current != tag => {
                tracing::warn!(
                    "embedding model changed from '{}' to '{}'; stored vectors are stale",
                    current,
                    tag
                );
            }
            Some(_) => {}
        }
        Ok(())
    }

    async fn insert_row(&self, text: &str, embedding: Option<&[f32]>) -> Result<i64, RagError> {
        let blob = embedding.map(serialize_embedding);

        let result = sqlx::query("INSERT INTO documents (text, embedding) VALUES (?1, ?2)")
            .bind(text)
            .bind(blob)
            .execute(&self.pool)
            .await
            .map_err(RagError::internal)?;

        Ok(result.last_insert_rowid())
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn insert(&self, text: &str) -> Result<i64, RagError> {
        Self::validate_text(text)?;
        self.insert_row(text, None).await
    }

    async fn insert_with_embedding(
        &self,
        text: &str,
        extractor: &dyn EmbeddingExtractor,
    ) -> Result<i64, RagError> {
        Self::validate_text(text)?;
        let embedding = extractor.extract(text).await?;
        self.note_embedding_model(extractor.model_tag()).await?;
        self.insert_row(text, Some(&embedding)).await
    }

    async fn scan_all(&self) -> Result<Vec<Document>, RagError> {
        let rows = sqlx::query("SELECT id, text, embedding FROM documents ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(RagError::internal)?;

        Ok(rows
            .iter()
            .map(|row| {
                let embedding_bytes: Option<Vec<u8>> = row.get("embedding");
                let embedding = embedding_bytes
                    .filter(|bytes| !bytes.is_empty())
                    .map(|bytes| deserialize_embedding(&bytes));

                Document {
                    id: row.get("id"),
                    text: row.get("text"),
                    embedding,
                }
            })
            .collect())
    }

    async fn backfill_embeddings(
        &self,
        extractor: &dyn EmbeddingExtractor,
    ) -> Result<usize, RagError> {
        let rows = sqlx::query("SELECT id, text FROM documents WHERE embedding IS NULL ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(RagError::internal)?;

        let mut updated = 0usize;
        let mut failed_ids = Vec::new();

        for row in rows {
            let id: i64 = row.get("id");
            let text: String = row.get("text");

            let embedding = match extractor.extract(&text).await {
                Ok(embedding) => embedding,
                Err(err) => {
                    tracing::warn!("embedding backfill failed for document {}: {}", id, err);
                    failed_ids.push(id);
                    continue;
                }
            };

            sqlx::query("UPDATE documents SET embedding = ?1 WHERE id = ?2")
                .bind(serialize_embedding(&embedding))
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(RagError::internal)?;
            updated += 1;
        }

        if updated > 0 {
            self.note_embedding_model(extractor.model_tag()).await?;
        }

        if failed_ids.is_empty() {
            Ok(updated)
        } else {
            Err(RagError::PartialFailure { failed_ids })
        }
    }

    async fn count(&self) -> Result<usize, RagError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await
            .map_err(RagError::internal)?;
        Ok(count as usize)
    }

    async fn embedding_model(&self) -> Result<Option<String>, RagError> {
        sqlx::query_scalar("SELECT value FROM store_meta WHERE key = 'embedding_model'")
            .fetch_optional(&self.pool)
            .await
            .map_err(RagError::internal)
    }
}

fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
