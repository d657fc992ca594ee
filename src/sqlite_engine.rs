//! SQLite-backed [`VectorEngine`].
//!
//! One row per stored unit in `knowledge_units`; embeddings are
//! little-endian f32 BLOBs. Nearest-neighbour search is brute-force cosine
//! distance over every row that passes the metadata filter, which is
//! applied to the decoded JSON in Rust.

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use chronic_kb_core::embedding::{blob_to_vec, cosine_distance, vec_to_blob};
use chronic_kb_core::models::Metadata;
use chronic_kb_core::store::{
    matches_filter, rank, MetadataFilter, ScoredUnit, StoredUnit, UnitRecord, VectorEngine,
};

use crate::{db, migrate};

pub struct SqliteEngine {
    pool: SqlitePool,
}

impl SqliteEngine {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to `path`, creating the file and schema if needed.
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = db::connect(path).await?;
        migrate::ensure_schema(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn load(&self, filter: &MetadataFilter) -> Result<Vec<(StoredUnit, Vec<u8>)>> {
        let rows = sqlx::query(
            "SELECT id, document, metadata_json, embedding FROM knowledge_units ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let unit = row_to_unit(row)?;
            if matches_filter(filter, &unit.metadata) {
                out.push((unit, row.get("embedding")));
            }
        }
        Ok(out)
    }
}

fn row_to_unit(row: &SqliteRow) -> Result<StoredUnit> {
    let id: String = row.get("id");
    let metadata_json: String = row.get("metadata_json");
    let metadata: Metadata = serde_json::from_str(&metadata_json)
        .with_context(|| format!("corrupt metadata for unit {}", id))?;
    Ok(StoredUnit {
        id,
        document: row.get("document"),
        metadata,
    })
}

#[async_trait]
impl VectorEngine for SqliteEngine {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn upsert(&self, records: Vec<UnitRecord>) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        for record in &records {
            let metadata_json = serde_json::to_string(&record.metadata)?;
            sqlx::query(
                r#"
                INSERT INTO knowledge_units (id, document, metadata_json, embedding, created_at)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    document = excluded.document,
                    metadata_json = excluded.metadata_json,
                    embedding = excluded.embedding
                "#,
            )
            .bind(&record.id)
            .bind(&record.document)
            .bind(&metadata_json)
            .bind(vec_to_blob(&record.embedding))
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn query(
        &self,
        embedding: &[f32],
        k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<ScoredUnit>> {
        let scored = self
            .load(filter)
            .await?
            .into_iter()
            .map(|(unit, blob)| ScoredUnit {
                distance: cosine_distance(embedding, &blob_to_vec(&blob)),
                unit,
            })
            .collect();
        Ok(rank(scored, k))
    }

    async fn get(&self, ids: &[String]) -> Result<Vec<StoredUnit>> {
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            let row = sqlx::query(
                "SELECT id, document, metadata_json FROM knowledge_units WHERE id = ?",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
            if let Some(row) = row {
                out.push(row_to_unit(&row)?);
            }
        }
        Ok(out)
    }

    async fn delete(&self, ids: &[String]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        let mut removed = 0u64;
        for id in ids {
            removed += sqlx::query("DELETE FROM knowledge_units WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        tx.commit().await?;
        Ok(removed as usize)
    }

    async fn get_all(&self, filter: &MetadataFilter) -> Result<Vec<StoredUnit>> {
        Ok(self
            .load(filter)
            .await?
            .into_iter()
            .map(|(unit, _)| unit)
            .collect())
    }

    async fn count(&self, filter: &MetadataFilter) -> Result<usize> {
        if filter.is_empty() {
            let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM knowledge_units")
                .fetch_one(&self.pool)
                .await?;
            return Ok(n as usize);
        }
        Ok(self.load(filter).await?.len())
    }

    async fn drop_and_recreate(&self) -> Result<()> {
        sqlx::query("DROP TABLE IF EXISTS knowledge_units")
            .execute(&self.pool)
            .await?;
        migrate::ensure_schema(&self.pool).await
    }
}
