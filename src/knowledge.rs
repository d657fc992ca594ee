//! Governed knowledge store.
//!
//! [`KnowledgeStore`] is the only write path into the vector engine. Every
//! ingestion runs the governance validator first; nothing is chunked,
//! embedded or stored unless the metadata passes.
//!
//! # Ingestion
//!
//! ```text
//! metadata ──▶ validate_and_normalize ──▶ system fields ──▶ chunk? ──▶ embed ──▶ upsert
//!                   │ fail
//!                   ▼
//!              KbError::Governance / KbError::Registry (nothing written)
//! ```
//!
//! Content longer than `chunk_size` characters is split; chunk `i` is
//! stored under `{doc_id}_chunk_{i}` with `chunk_index` / `total_chunks`
//! tags. Shorter content is stored as one unit under `doc_id`.
//!
//! Multi-chunk documents are written in a single upsert call but are not
//! transactional relative to concurrent readers of the in-memory engine.

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use chrono::{Datelike, Utc};
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use chronic_kb_core::chunk::Chunker;
use chronic_kb_core::embedding::Embedder;
use chronic_kb_core::error::GovernanceError;
use chronic_kb_core::governance::{
    EvidenceLevel, GovernanceValidator, RegistrySource, DOCUMENT_VERSION, EVIDENCE_LEVEL,
    SOURCE_ID,
};
use chronic_kb_core::models::{DiseaseKnowledge, Metadata};
use chronic_kb_core::store::{MetadataFilter, ScoredUnit, StoredUnit, UnitRecord, VectorEngine};
use chronic_kb_core::{KbError, Result};

/// Tags owned by the store; callers cannot overwrite them on update.
const SYSTEM_TAGS: &[&str] = &[
    "disease",
    "category",
    "doc_id",
    "created_at",
    "chunk_index",
    "total_chunks",
];

/// Category tag for documents built from structured disease records.
pub const COMPREHENSIVE_CATEGORY: &str = "comprehensive";

/// Source used by structured ingestion when a disease has no mapping.
pub const FALLBACK_SOURCE_ID: &str = "guideline-consensus-global";

const DISEASE_SOURCE_IDS: &[(&str, &str)] = &[
    ("diabetes_type1", "ada-2026-soc"),
    ("diabetes_type2", "ada-2026-soc"),
    ("hypertension", "nice-ng136"),
    ("copd", "gold-2026-report"),
    ("asthma", "gina-2025-strategy"),
];

/// Registered source for a structured record's disease id.
pub fn default_source_id(disease_id: &str) -> &'static str {
    DISEASE_SOURCE_IDS
        .iter()
        .find(|(id, _)| *id == disease_id)
        .map(|(_, source)| *source)
        .unwrap_or(FALLBACK_SOURCE_ID)
}

fn year_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(19|20)\d{2}").expect("static regex"))
}

/// Unit counts per disease and per category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetadataSummary {
    pub diseases: BTreeMap<String, usize>,
    pub categories: BTreeMap<String, usize>,
}

pub struct KnowledgeStore {
    engine: Arc<dyn VectorEngine>,
    embedder: Arc<dyn Embedder>,
    validator: GovernanceValidator,
    chunker: Chunker,
}

impl KnowledgeStore {
    pub fn new(
        engine: Arc<dyn VectorEngine>,
        embedder: Arc<dyn Embedder>,
        registry: Arc<dyn RegistrySource>,
        chunker: Chunker,
    ) -> Self {
        Self {
            engine,
            embedder,
            validator: GovernanceValidator::new(registry),
            chunker,
        }
    }

    pub fn validator(&self) -> &GovernanceValidator {
        &self.validator
    }

    pub fn engine_name(&self) -> &'static str {
        self.engine.name()
    }

    pub fn embedder(&self) -> &dyn Embedder {
        self.embedder.as_ref()
    }

    pub fn chunker(&self) -> Chunker {
        self.chunker
    }

    /// Validate, tag, chunk, embed and store a document.
    ///
    /// Returns the document id. Governance or registry failures leave the
    /// store untouched.
    pub async fn ingest(
        &self,
        content: &str,
        disease: &str,
        category: &str,
        metadata: &Metadata,
    ) -> Result<String> {
        let mut doc_metadata = match self.validator.validate_and_normalize(metadata) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(disease, category, error = %e, "ingestion rejected");
                return Err(e);
            }
        };

        let doc_id = Uuid::new_v4().to_string();
        doc_metadata.insert("disease".into(), Value::from(disease));
        doc_metadata.insert("category".into(), Value::from(category));
        doc_metadata.insert("doc_id".into(), Value::from(doc_id.clone()));
        doc_metadata.insert("created_at".into(), Value::from(Utc::now().to_rfc3339()));

        let (ids, documents, metadatas) = if content.chars().count() > self.chunker.chunk_size() {
            let chunks = self.chunker.split(content)?;
            let total = chunks.len();
            let mut ids = Vec::with_capacity(total);
            let mut metadatas = Vec::with_capacity(total);
            for i in 0..total {
                let mut meta = doc_metadata.clone();
                meta.insert("chunk_index".into(), Value::from(i));
                meta.insert("total_chunks".into(), Value::from(total));
                ids.push(format!("{}_chunk_{}", doc_id, i));
                metadatas.push(meta);
            }
            (ids, chunks, metadatas)
        } else {
            (
                vec![doc_id.clone()],
                vec![content.to_string()],
                vec![doc_metadata],
            )
        };

        let vectors = self.embedder.embed(&documents).await?;
        if vectors.len() != documents.len() {
            return Err(KbError::Store(anyhow::anyhow!(
                "embedder returned {} vectors for {} units",
                vectors.len(),
                documents.len()
            )));
        }

        let units = ids.len();
        let records = ids
            .into_iter()
            .zip(documents)
            .zip(metadatas)
            .zip(vectors)
            .map(|(((id, document), metadata), embedding)| UnitRecord {
                id,
                embedding,
                document,
                metadata,
            })
            .collect();
        self.engine.upsert(records).await?;

        tracing::info!(doc_id = %doc_id, disease, category, units, "document ingested");
        Ok(doc_id)
    }

    /// Ingest a structured disease record as one composite document.
    ///
    /// The record must cite at least one source. `document_version` is the
    /// first year found in the primary citation, else the year of
    /// `last_updated`.
    pub async fn ingest_structured(&self, knowledge: &DiseaseKnowledge) -> Result<String> {
        let Some(primary_source) = knowledge.sources.first() else {
            return Err(GovernanceError::MissingSources.into());
        };

        let document_version = year_pattern()
            .find(primary_source)
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| knowledge.last_updated.year().to_string());
        let source_id = default_source_id(&knowledge.disease_id);

        let mut metadata = Metadata::new();
        metadata.insert("disease_id".into(), Value::from(knowledge.disease_id.clone()));
        metadata.insert("disease_name".into(), Value::from(knowledge.name.clone()));
        metadata.insert(
            "disease_category".into(),
            Value::from(knowledge.category.as_str()),
        );
        metadata.insert(
            "last_updated".into(),
            Value::from(knowledge.last_updated.to_rfc3339()),
        );
        metadata.insert("sources".into(), Value::from(knowledge.sources.clone()));
        metadata.insert("source".into(), Value::from(primary_source.clone()));
        metadata.insert(SOURCE_ID.into(), Value::from(source_id));
        metadata.insert(DOCUMENT_VERSION.into(), Value::from(document_version));
        metadata.insert(
            EVIDENCE_LEVEL.into(),
            Value::from(EvidenceLevel::GuidelineConsensus.as_str()),
        );

        self.ingest(
            &knowledge.composite_text(),
            &knowledge.name,
            COMPREHENSIVE_CATEGORY,
            &metadata,
        )
        .await
    }

    /// Nearest units to `query`, optionally restricted by exact disease
    /// and category tags.
    pub async fn search(
        &self,
        query: &str,
        disease: Option<&str>,
        category: Option<&str>,
        n_results: usize,
    ) -> Result<Vec<ScoredUnit>> {
        let mut filter = MetadataFilter::new();
        if let Some(d) = disease.filter(|d| !d.is_empty()) {
            filter.insert("disease".into(), Value::from(d));
        }
        if let Some(c) = category.filter(|c| !c.is_empty()) {
            filter.insert("category".into(), Value::from(c));
        }

        let embedding = self
            .embedder
            .embed(&[query.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| KbError::Store(anyhow::anyhow!("empty embedding response")))?;

        let hits = self.engine.query(&embedding, n_results, &filter).await?;
        tracing::debug!(k = n_results, ?filter, hits = hits.len(), "knowledge search");
        Ok(hits)
    }

    /// The unit stored under `id`, or every chunk of document `id` in
    /// chunk order.
    pub async fn get_document(&self, id: &str) -> Result<Vec<StoredUnit>> {
        let direct = self.engine.get(&[id.to_string()]).await?;
        if !direct.is_empty() {
            return Ok(direct);
        }

        let mut chunks = self.engine.get_all(&doc_filter(id)).await?;
        if chunks.is_empty() {
            return Err(KbError::NotFound(format!("document {}", id)));
        }
        chunks.sort_by_key(|u| {
            u.metadata
                .get("chunk_index")
                .and_then(Value::as_u64)
                .unwrap_or(u64::MAX)
        });
        Ok(chunks)
    }

    pub async fn get_by_disease(&self, disease: &str) -> Result<Vec<StoredUnit>> {
        let mut filter = MetadataFilter::new();
        filter.insert("disease".into(), Value::from(disease));
        Ok(self.engine.get_all(&filter).await?)
    }

    /// Distinct disease tags, sorted.
    pub async fn all_diseases(&self) -> Result<Vec<String>> {
        let units = self.engine.get_all(&MetadataFilter::new()).await?;
        let mut diseases: Vec<String> = units
            .iter()
            .filter_map(|u| u.meta_str("disease"))
            .filter(|d| !d.is_empty())
            .map(str::to_string)
            .collect();
        diseases.sort();
        diseases.dedup();
        Ok(diseases)
    }

    /// Units per disease and per category. A unit missing one tag still
    /// counts on the other axis.
    pub async fn metadata_summary(&self) -> Result<MetadataSummary> {
        let units = self.engine.get_all(&MetadataFilter::new()).await?;
        let mut summary = MetadataSummary::default();
        for unit in &units {
            if let Some(d) = unit.meta_str("disease").filter(|d| !d.is_empty()) {
                *summary.diseases.entry(d.to_string()).or_default() += 1;
            }
            if let Some(c) = unit.meta_str("category").filter(|c| !c.is_empty()) {
                *summary.categories.entry(c.to_string()).or_default() += 1;
            }
        }
        Ok(summary)
    }

    /// Replace the text and/or governance metadata of the unit stored
    /// under `id`.
    ///
    /// Replacement metadata goes through the validator exactly as on
    /// ingestion; system tags (`disease`, `category`, `doc_id`, chunk
    /// position, `created_at`) carry over from the stored unit. The unit
    /// is re-embedded from its final text and stamped with `updated_at`.
    /// Passing neither argument leaves the unit untouched.
    pub async fn update(
        &self,
        id: &str,
        content: Option<&str>,
        metadata: Option<&Metadata>,
    ) -> Result<StoredUnit> {
        let existing = self
            .engine
            .get(&[id.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| KbError::NotFound(format!("document {}", id)))?;
        if content.is_none() && metadata.is_none() {
            return Ok(existing);
        }

        let mut next_metadata = match metadata {
            Some(replacement) => {
                let mut validated = match self.validator.validate_and_normalize(replacement) {
                    Ok(m) => m,
                    Err(e) => {
                        tracing::warn!(id, error = %e, "update rejected");
                        return Err(e);
                    }
                };
                for key in SYSTEM_TAGS {
                    if let Some(value) = existing.metadata.get(*key) {
                        validated.insert((*key).to_string(), value.clone());
                    }
                }
                validated
            }
            None => existing.metadata.clone(),
        };
        next_metadata.insert("updated_at".into(), Value::from(Utc::now().to_rfc3339()));

        let document = content.map_or(existing.document, str::to_string);
        let embedding = self
            .embedder
            .embed(std::slice::from_ref(&document))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| KbError::Store(anyhow::anyhow!("empty embedding response")))?;

        self.engine
            .upsert(vec![UnitRecord {
                id: id.to_string(),
                embedding,
                document: document.clone(),
                metadata: next_metadata.clone(),
            }])
            .await?;

        tracing::info!(
            id,
            content_changed = content.is_some(),
            metadata_changed = metadata.is_some(),
            "document updated"
        );
        Ok(StoredUnit {
            id: id.to_string(),
            document,
            metadata: next_metadata,
        })
    }

    /// Remove a document and all of its chunks. `false` if nothing matched.
    pub async fn delete(&self, doc_id: &str) -> Result<bool> {
        let mut ids: Vec<String> = self
            .engine
            .get_all(&doc_filter(doc_id))
            .await?
            .into_iter()
            .map(|u| u.id)
            .collect();
        if !ids.iter().any(|id| id == doc_id) {
            ids.push(doc_id.to_string());
        }

        let removed = self.engine.delete(&ids).await?;
        tracing::info!(doc_id, removed, "document deleted");
        Ok(removed > 0)
    }

    pub async fn count(&self, disease: Option<&str>) -> Result<usize> {
        let mut filter = MetadataFilter::new();
        if let Some(d) = disease {
            filter.insert("disease".into(), Value::from(d));
        }
        Ok(self.engine.count(&filter).await?)
    }

    pub async fn clear(&self) -> Result<()> {
        self.engine.drop_and_recreate().await?;
        tracing::warn!(engine = self.engine.name(), "knowledge store cleared");
        Ok(())
    }
}

fn doc_filter(doc_id: &str) -> MetadataFilter {
    let mut filter = MetadataFilter::new();
    filter.insert("doc_id".into(), Value::from(doc_id));
    filter
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_source_ids() {
        assert_eq!(default_source_id("diabetes_type2"), "ada-2026-soc");
        assert_eq!(default_source_id("hypertension"), "nice-ng136");
        assert_eq!(default_source_id("arthritis_osteo"), FALLBACK_SOURCE_ID);
    }

    #[test]
    fn test_year_pattern_finds_first_year() {
        let m = year_pattern().find("ADA Standards of Care 2026 (rev. 2027)");
        assert_eq!(m.map(|m| m.as_str()), Some("2026"));
        assert!(year_pattern().find("NICE guideline NG136").is_none());
    }
}
