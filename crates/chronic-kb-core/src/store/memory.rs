//! In-memory [`VectorEngine`] for tests and offline use.
//!
//! Units live in a `BTreeMap` behind `std::sync::RwLock`, so iteration is
//! already in id order. Queries are brute-force cosine distance.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::embedding::cosine_distance;

use super::{matches_filter, rank, MetadataFilter, ScoredUnit, StoredUnit, UnitRecord, VectorEngine};

struct Entry {
    unit: StoredUnit,
    embedding: Vec<f32>,
}

pub struct InMemoryEngine {
    entries: RwLock<BTreeMap<String, Entry>>,
}

impl InMemoryEngine {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<String, Entry>>> {
        self.entries
            .read()
            .map_err(|_| anyhow!("in-memory engine lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<String, Entry>>> {
        self.entries
            .write()
            .map_err(|_| anyhow!("in-memory engine lock poisoned"))
    }
}

impl Default for InMemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorEngine for InMemoryEngine {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn upsert(&self, records: Vec<UnitRecord>) -> Result<()> {
        let mut entries = self.write()?;
        for r in records {
            entries.insert(
                r.id.clone(),
                Entry {
                    unit: StoredUnit {
                        id: r.id,
                        document: r.document,
                        metadata: r.metadata,
                    },
                    embedding: r.embedding,
                },
            );
        }
        Ok(())
    }

    async fn query(
        &self,
        embedding: &[f32],
        k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<ScoredUnit>> {
        let entries = self.read()?;
        let scored = entries
            .values()
            .filter(|e| matches_filter(filter, &e.unit.metadata))
            .map(|e| ScoredUnit {
                unit: e.unit.clone(),
                distance: cosine_distance(embedding, &e.embedding),
            })
            .collect();
        Ok(rank(scored, k))
    }

    async fn get(&self, ids: &[String]) -> Result<Vec<StoredUnit>> {
        let entries = self.read()?;
        Ok(ids
            .iter()
            .filter_map(|id| entries.get(id).map(|e| e.unit.clone()))
            .collect())
    }

    async fn delete(&self, ids: &[String]) -> Result<usize> {
        let mut entries = self.write()?;
        Ok(ids.iter().filter(|id| entries.remove(*id).is_some()).count())
    }

    async fn get_all(&self, filter: &MetadataFilter) -> Result<Vec<StoredUnit>> {
        let entries = self.read()?;
        Ok(entries
            .values()
            .filter(|e| matches_filter(filter, &e.unit.metadata))
            .map(|e| e.unit.clone())
            .collect())
    }

    async fn count(&self, filter: &MetadataFilter) -> Result<usize> {
        let entries = self.read()?;
        Ok(entries
            .values()
            .filter(|e| matches_filter(filter, &e.unit.metadata))
            .count())
    }

    async fn drop_and_recreate(&self) -> Result<()> {
        self.write()?.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: &str, embedding: Vec<f32>, disease: &str) -> UnitRecord {
        UnitRecord {
            id: id.to_string(),
            embedding,
            document: format!("doc {}", id),
            metadata: json!({ "disease": disease }).as_object().cloned().unwrap(),
        }
    }

    async fn seeded() -> InMemoryEngine {
        let engine = InMemoryEngine::new();
        engine
            .upsert(vec![
                record("a", vec![1.0, 0.0], "asthma"),
                record("b", vec![0.0, 1.0], "diabetes"),
                record("c", vec![0.7, 0.7], "diabetes"),
            ])
            .await
            .unwrap();
        engine
    }

    #[tokio::test]
    async fn test_query_ranks_by_distance() {
        let engine = seeded().await;
        let hits = engine.query(&[1.0, 0.0], 3, &MetadataFilter::new()).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.unit.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c", "b"]);
        assert!(hits[0].distance.abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_query_respects_filter_and_k() {
        let engine = seeded().await;
        let mut filter = MetadataFilter::new();
        filter.insert("disease".into(), json!("diabetes"));
        let hits = engine.query(&[1.0, 0.0], 1, &filter).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].unit.id, "c");
    }

    #[tokio::test]
    async fn test_upsert_replaces() {
        let engine = seeded().await;
        engine
            .upsert(vec![record("a", vec![0.0, 1.0], "copd")])
            .await
            .unwrap();
        assert_eq!(engine.count(&MetadataFilter::new()).await.unwrap(), 3);
        let got = engine.get(&["a".to_string()]).await.unwrap();
        assert_eq!(got[0].meta_str("disease"), Some("copd"));
    }

    #[tokio::test]
    async fn test_delete_counts_existing_only() {
        let engine = seeded().await;
        let removed = engine
            .delete(&["a".to_string(), "zzz".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(engine.count(&MetadataFilter::new()).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_get_all_and_drop() {
        let engine = seeded().await;
        let all = engine.get_all(&MetadataFilter::new()).await.unwrap();
        let ids: Vec<&str> = all.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);

        engine.drop_and_recreate().await.unwrap();
        assert_eq!(engine.count(&MetadataFilter::new()).await.unwrap(), 0);
    }
}
