//! SQLite-backed vector collection.
//!
//! One database file per layer with a single `chunks` table:
//! - `metadata` is a JSON object; filters compile to `json_extract` equality
//! - `embedding` is a little-endian `f32` blob
//!
//! Similarity is brute force: matching rows are loaded and ranked in Rust.

use async_trait::async_trait;
use policygate_core::policy::fields;
use policygate_core::{
    ChunkRecord, Metadata, MetadataFilter, RetrievalError, ScoredChunk, VectorCollection,
};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

use crate::vector;

/// A durable per-layer collection stored in SQLite.
pub struct SqliteCollection {
    name: String,
    pool: SqlitePool,
}

const POLICY_ID_EXPR: &str = "json_extract(metadata, '$.policy_id')";

fn json_path(field: &str) -> String {
    format!("$.\"{}\"", field.replace('"', ""))
}

fn storage_err(context: &str, e: impl std::fmt::Display) -> RetrievalError {
    RetrievalError::unavailable(format!("{context}: {e}"))
}

impl SqliteCollection {
    /// Open (or create) the collection at `path`.
    ///
    /// Pass `"sqlite::memory:"` for an ephemeral database (useful for tests).
    pub async fn new(name: impl Into<String>, path: &str) -> Result<Self, RetrievalError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| storage_err("Invalid SQLite path", e))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        // Every connection to an in-memory database sees its own database.
        let max_connections = if path.contains(":memory:") { 1 } else { 4 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| storage_err("Failed to open SQLite", e))?;

        let collection = Self {
            name: name.into(),
            pool,
        };
        collection.run_migrations().await?;
        info!(collection = %collection.name, "SQLite collection initialized at {path}");
        Ok(collection)
    }

    async fn run_migrations(&self) -> Result<(), RetrievalError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                iid        INTEGER PRIMARY KEY AUTOINCREMENT,
                id         TEXT UNIQUE NOT NULL,
                text       TEXT NOT NULL,
                metadata   TEXT NOT NULL DEFAULT '{}',
                embedding  BLOB NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| storage_err("chunks table", e))?;

        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS idx_chunks_policy ON chunks({POLICY_ID_EXPR})"
        ))
        .execute(&self.pool)
        .await
        .map_err(|e| storage_err("policy_id index", e))?;

        debug!(collection = %self.name, "SQLite migrations complete");
        Ok(())
    }

    /// Compile a filter into a `WHERE` clause whose positional parameters
    /// start at `?{first_param}`. Returns the clause and the values to bind
    /// in order.
    ///
    /// `policy_id` is matched through the literal path so the expression
    /// index on it applies; other fields bind their JSON path.
    fn filter_clause(filter: &MetadataFilter, first_param: usize) -> (String, Vec<String>) {
        if filter.is_empty() {
            return ("1 = 1".into(), Vec::new());
        }
        let mut conditions = Vec::new();
        let mut binds = Vec::new();
        let mut param = first_param;
        for (field, value) in filter.conditions() {
            if field == fields::POLICY_ID {
                conditions.push(format!("{POLICY_ID_EXPR} = ?{param}"));
            } else {
                conditions.push(format!("json_extract(metadata, ?{param}) = ?{}", param + 1));
                binds.push(json_path(field));
                param += 1;
            }
            binds.push(value.clone());
            param += 1;
        }
        (conditions.join(" AND "), binds)
    }

    fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn blob_to_embedding(blob: &[u8]) -> Vec<f32> {
        blob.chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<ChunkRecord, RetrievalError> {
        let id: String = row.try_get("id").map_err(|e| storage_err("id column", e))?;
        let text: String = row.try_get("text").map_err(|e| storage_err("text column", e))?;
        let metadata_json: String = row
            .try_get("metadata")
            .map_err(|e| storage_err("metadata column", e))?;
        let blob: Vec<u8> = row
            .try_get("embedding")
            .map_err(|e| storage_err("embedding column", e))?;

        let metadata: Metadata = serde_json::from_str(&metadata_json)
            .map_err(|e| storage_err("metadata json", e))?;

        Ok(ChunkRecord {
            id,
            text,
            embedding: Self::blob_to_embedding(&blob),
            metadata,
        })
    }
}

#[async_trait]
impl VectorCollection for SqliteCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn add(&self, records: Vec<ChunkRecord>) -> Result<(), RetrievalError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| storage_err("BEGIN failed", e))?;

        for record in &records {
            let metadata_json = serde_json::to_string(&record.metadata)
                .map_err(|e| storage_err("metadata serialization", e))?;
            sqlx::query(
                r#"
                INSERT INTO chunks (id, text, metadata, embedding)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(id) DO UPDATE SET
                    text = excluded.text,
                    metadata = excluded.metadata,
                    embedding = excluded.embedding
                "#,
            )
            .bind(&record.id)
            .bind(&record.text)
            .bind(&metadata_json)
            .bind(Self::embedding_to_blob(&record.embedding))
            .execute(&mut *tx)
            .await
            .map_err(|e| storage_err("INSERT failed", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| storage_err("COMMIT failed", e))?;
        debug!(collection = %self.name, count = records.len(), "Stored chunks");
        Ok(())
    }

    async fn delete(&self, filter: &MetadataFilter) -> Result<usize, RetrievalError> {
        let (clause, binds) = Self::filter_clause(filter, 1);
        let sql = format!("DELETE FROM chunks WHERE {clause}");
        let mut query = sqlx::query(&sql);
        for value in binds {
            query = query.bind(value);
        }
        let result = query
            .execute(&self.pool)
            .await
            .map_err(|e| storage_err("DELETE failed", e))?;
        Ok(result.rows_affected() as usize)
    }

    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<ScoredChunk>, RetrievalError> {
        let (clause, binds) = Self::filter_clause(filter, 1);
        let sql = format!("SELECT id, text, metadata, embedding FROM chunks WHERE {clause} ORDER BY iid");
        let mut query = sqlx::query(&sql);
        for value in binds {
            query = query.bind(value);
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| storage_err("Vector scan", e))?;

        let records = rows
            .iter()
            .map(Self::row_to_record)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(vector::rank_by_similarity(&records, vector, k, filter))
    }

    async fn update_metadata(
        &self,
        filter: &MetadataFilter,
        field: &str,
        value: &str,
    ) -> Result<usize, RetrievalError> {
        let (clause, binds) = Self::filter_clause(filter, 3);
        let sql = format!("UPDATE chunks SET metadata = json_set(metadata, ?1, ?2) WHERE {clause}");
        let mut query = sqlx::query(&sql)
            .bind(json_path(field))
            .bind(value.to_string());
        for b in binds {
            query = query.bind(b);
        }
        let result = query
            .execute(&self.pool)
            .await
            .map_err(|e| storage_err("UPDATE failed", e))?;
        Ok(result.rows_affected() as usize)
    }

    async fn count(&self, filter: &MetadataFilter) -> Result<usize, RetrievalError> {
        let (clause, binds) = Self::filter_clause(filter, 1);
        let sql = format!("SELECT COUNT(*) AS cnt FROM chunks WHERE {clause}");
        let mut query = sqlx::query(&sql);
        for value in binds {
            query = query.bind(value);
        }
        let row = query
            .fetch_one(&self.pool)
            .await
            .map_err(|e| storage_err("COUNT", e))?;
        let cnt: i64 = row.try_get("cnt").map_err(|e| storage_err("cnt column", e))?;
        Ok(cnt as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_collection() -> SqliteCollection {
        SqliteCollection::new("base_policy", "sqlite::memory:").await.unwrap()
    }

    fn record(id: &str, policy: &str, state: &str, embedding: Vec<f32>) -> ChunkRecord {
        ChunkRecord {
            id: id.into(),
            text: format!("text of {id}"),
            embedding,
            metadata: Metadata::from([
                ("policy_id".to_string(), policy.to_string()),
                ("state".to_string(), state.to_string()),
                ("status".to_string(), "active".to_string()),
            ]),
        }
    }

    #[test]
    fn filter_clause_numbers_parameters() {
        let filter = MetadataFilter::new().with("status", "active").with("state", "ALL");
        let (clause, binds) = SqliteCollection::filter_clause(&filter, 3);
        assert_eq!(
            clause,
            "json_extract(metadata, ?3) = ?4 AND json_extract(metadata, ?5) = ?6"
        );
        assert_eq!(binds, vec!["$.\"status\"", "active", "$.\"state\"", "ALL"]);
    }

    #[test]
    fn policy_id_condition_uses_indexed_expression() {
        let filter = MetadataFilter::new()
            .with("policy_id", "ALL::ALL::base_policy::v1")
            .with("status", "active");
        let (clause, binds) = SqliteCollection::filter_clause(&filter, 1);
        assert_eq!(
            clause,
            "json_extract(metadata, '$.policy_id') = ?1 AND json_extract(metadata, ?2) = ?3"
        );
        assert_eq!(binds, vec!["ALL::ALL::base_policy::v1", "$.\"status\"", "active"]);
    }

    #[test]
    fn embedding_blob_round_trip() {
        let v = vec![0.25f32, -1.5, 3.0];
        let blob = SqliteCollection::embedding_to_blob(&v);
        assert_eq!(blob.len(), 12);
        assert_eq!(SqliteCollection::blob_to_embedding(&blob), v);
    }

    #[tokio::test]
    async fn add_query_with_filter() {
        let col = test_collection().await;
        col.add(vec![
            record("a", "p1", "Goa", vec![1.0, 0.0]),
            record("b", "p2", "ALL", vec![0.9, 0.1]),
            record("c", "p2", "ALL", vec![0.0, 1.0]),
        ])
        .await
        .unwrap();

        let filter = MetadataFilter::new().with("status", "active").with("state", "ALL");
        let hits = col.query(&[1.0, 0.0], 5, &filter).await.unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
        assert_eq!(hits[0].policy_id(), Some("p2"));
    }

    #[tokio::test]
    async fn upsert_on_conflict() {
        let col = test_collection().await;
        col.add(vec![record("a", "p1", "Goa", vec![1.0])]).await.unwrap();
        let mut updated = record("a", "p1", "Kerala", vec![1.0]);
        updated.text = "rewritten".into();
        col.add(vec![updated]).await.unwrap();

        assert_eq!(col.count(&MetadataFilter::new()).await.unwrap(), 1);
        let hits = col.query(&[1.0], 1, &MetadataFilter::new()).await.unwrap();
        assert_eq!(hits[0].text, "rewritten");
        assert_eq!(hits[0].metadata.get("state").map(String::as_str), Some("Kerala"));
    }

    #[tokio::test]
    async fn delete_and_count_by_policy() {
        let col = test_collection().await;
        col.add(vec![
            record("a", "p1", "Goa", vec![1.0]),
            record("b", "p1", "Goa", vec![1.0]),
            record("c", "p2", "Goa", vec![1.0]),
        ])
        .await
        .unwrap();

        let by_p1 = MetadataFilter::new().with("policy_id", "p1");
        assert_eq!(col.count(&by_p1).await.unwrap(), 2);
        assert_eq!(col.delete(&by_p1).await.unwrap(), 2);
        assert_eq!(col.count(&by_p1).await.unwrap(), 0);
        assert_eq!(col.count(&MetadataFilter::new()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn update_metadata_rewrites_field() {
        let col = test_collection().await;
        col.add(vec![
            record("a", "p1", "Goa", vec![1.0]),
            record("b", "p2", "Goa", vec![1.0]),
        ])
        .await
        .unwrap();

        let touched = col
            .update_metadata(&MetadataFilter::new().with("policy_id", "p1"), "status", "draft")
            .await
            .unwrap();
        assert_eq!(touched, 1);

        let drafts = MetadataFilter::new().with("status", "draft");
        let hits = col.query(&[1.0], 5, &drafts).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "a");
    }

    #[tokio::test]
    async fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = format!("sqlite://{}", dir.path().join("base_policy.sqlite").display());

        let col = SqliteCollection::new("base_policy", &path).await.unwrap();
        col.add(vec![record("a", "p1", "Goa", vec![0.5, 0.5])]).await.unwrap();
        drop(col);

        let reopened = SqliteCollection::new("base_policy", &path).await.unwrap();
        let hits = reopened.query(&[0.5, 0.5], 1, &MetadataFilter::new()).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "a");
    }
}
