//! Vector engine abstraction.
//!
//! The [`VectorEngine`] trait is the contract the knowledge store relies on
//! for persistence and nearest-neighbour search. Embedding happens before
//! the engine is called; engines only see vectors.
//!
//! # Operations
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`upsert`](VectorEngine::upsert) | Insert or replace units by id |
//! | [`query`](VectorEngine::query) | `k` nearest units by cosine distance, filtered |
//! | [`get`](VectorEngine::get) | Units by id, missing ids skipped |
//! | [`delete`](VectorEngine::delete) | Remove units by id, returns how many existed |
//! | [`get_all`](VectorEngine::get_all) | Every unit matching a filter, ordered by id |
//! | [`count`](VectorEngine::count) | Number of units matching a filter |
//! | [`drop_and_recreate`](VectorEngine::drop_and_recreate) | Empty the collection |
//!
//! Query results are ordered by ascending distance, ties broken by id, so
//! that identical inputs always produce identical rankings.

pub mod memory;

use std::cmp::Ordering;
use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::models::Metadata;

/// A stored unit as written by the knowledge store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredUnit {
    pub id: String,
    pub document: String,
    pub metadata: Metadata,
}

impl StoredUnit {
    /// String value of a metadata key, if present and a string.
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }
}

/// A unit returned from a nearest-neighbour query.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredUnit {
    #[serde(flatten)]
    pub unit: StoredUnit,
    /// Cosine distance `1 - cos` to the query vector.
    pub distance: f64,
}

/// Input to [`VectorEngine::upsert`].
#[derive(Debug, Clone)]
pub struct UnitRecord {
    pub id: String,
    pub embedding: Vec<f32>,
    pub document: String,
    pub metadata: Metadata,
}

/// Equality constraints on metadata keys. Empty matches everything.
pub type MetadataFilter = BTreeMap<String, Value>;

/// True if every constraint in `filter` equals the unit's metadata value.
pub fn matches_filter(filter: &MetadataFilter, metadata: &Metadata) -> bool {
    filter
        .iter()
        .all(|(key, expected)| metadata.get(key) == Some(expected))
}

/// Sort by ascending distance, then id, and keep the first `k`.
pub fn rank(mut scored: Vec<ScoredUnit>, k: usize) -> Vec<ScoredUnit> {
    scored.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.unit.id.cmp(&b.unit.id))
    });
    scored.truncate(k);
    scored
}

#[async_trait]
pub trait VectorEngine: Send + Sync {
    /// Short backend name for logs and `stats`.
    fn name(&self) -> &'static str;

    async fn upsert(&self, records: Vec<UnitRecord>) -> Result<()>;

    async fn query(
        &self,
        embedding: &[f32],
        k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<ScoredUnit>>;

    async fn get(&self, ids: &[String]) -> Result<Vec<StoredUnit>>;

    async fn delete(&self, ids: &[String]) -> Result<usize>;

    async fn get_all(&self, filter: &MetadataFilter) -> Result<Vec<StoredUnit>>;

    async fn count(&self, filter: &MetadataFilter) -> Result<usize>;

    async fn drop_and_recreate(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scored(id: &str, distance: f64) -> ScoredUnit {
        ScoredUnit {
            unit: StoredUnit {
                id: id.to_string(),
                document: String::new(),
                metadata: Metadata::new(),
            },
            distance,
        }
    }

    #[test]
    fn test_matches_filter() {
        let meta = json!({"disease": "asthma", "category": "treatment"})
            .as_object()
            .cloned()
            .unwrap();
        let mut filter = MetadataFilter::new();
        assert!(matches_filter(&filter, &meta));
        filter.insert("disease".into(), json!("asthma"));
        assert!(matches_filter(&filter, &meta));
        filter.insert("category".into(), json!("symptoms"));
        assert!(!matches_filter(&filter, &meta));
    }

    #[test]
    fn test_rank_orders_by_distance_then_id() {
        let ranked = rank(
            vec![scored("c", 0.5), scored("b", 0.1), scored("a", 0.5)],
            2,
        );
        let ids: Vec<&str> = ranked.iter().map(|s| s.unit.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }
}
