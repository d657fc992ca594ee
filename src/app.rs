//! Composition root.
//!
//! Builds the engine, embedder, registry, store, model and orchestrator
//! from a [`Config`]. Nothing in the crate is a process-global; callers
//! own what these functions return.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;

use chronic_kb_core::chunk::Chunker;
use chronic_kb_core::models::{MetricRecord, PatientSnapshot};
use chronic_kb_core::store::memory::InMemoryEngine;
use chronic_kb_core::store::VectorEngine;

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::knowledge::KnowledgeStore;
use crate::llm::create_model;
use crate::orchestrator::Orchestrator;
use crate::patients::{InMemoryPatientDirectory, PatientDirectory};
use crate::registry::FileRegistry;
use crate::sqlite_engine::SqliteEngine;

pub async fn open_engine(config: &Config) -> Result<Arc<dyn VectorEngine>> {
    let engine: Arc<dyn VectorEngine> = match config.store.backend.as_str() {
        "sqlite" => Arc::new(SqliteEngine::open(&config.store.path).await?),
        _ => Arc::new(InMemoryEngine::new()),
    };
    tracing::debug!(engine = engine.name(), "vector engine ready");
    Ok(engine)
}

pub async fn open_store(config: &Config) -> Result<Arc<KnowledgeStore>> {
    let engine = open_engine(config).await?;
    let embedder = create_embedder(&config.embedding)?;
    let registry = Arc::new(FileRegistry::new(&config.governance.registry_path));
    let chunker = Chunker::new(config.chunking.chunk_size, config.chunking.overlap)?;
    Ok(Arc::new(KnowledgeStore::new(
        engine, embedder, registry, chunker,
    )))
}

pub fn build_orchestrator(
    config: &Config,
    store: Arc<KnowledgeStore>,
    patients: Arc<dyn PatientDirectory>,
) -> Result<Orchestrator> {
    let model = create_model(&config.llm)?;
    Ok(Orchestrator::new(store, model, patients))
}

/// A patient record with its metric history, as stored in a JSON file.
#[derive(Debug, Deserialize)]
pub struct PatientFile {
    #[serde(flatten)]
    pub patient: PatientSnapshot,
    #[serde(default)]
    pub metrics: Vec<MetricRecord>,
}

/// Load a patient file into a fresh directory. Returns the directory and
/// the patient id.
pub fn load_patient_file(path: &Path) -> Result<(Arc<InMemoryPatientDirectory>, String)> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read patient file: {}", path.display()))?;
    let file: PatientFile = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse patient file: {}", path.display()))?;

    let id = file.patient.id.clone();
    let directory = InMemoryPatientDirectory::new();
    directory.add_patient(file.patient);
    for metric in file.metrics {
        directory.record_metric(&id, metric)?;
    }
    Ok((Arc::new(directory), id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_config_opens_memory_store() {
        let store = open_store(&Config::default()).await.unwrap();
        assert_eq!(store.engine_name(), "memory");
        assert_eq!(store.chunker().chunk_size(), 512);
    }

    #[test]
    fn test_load_shipped_patient_file() {
        let path =
            Path::new(env!("CARGO_MANIFEST_DIR")).join("data/patients/sample_patient.json");
        let (directory, id) = load_patient_file(&path).unwrap();
        assert_eq!(id, "patient-001");
        let patient = directory.patient(&id).unwrap();
        assert!(!patient.chronic_conditions.is_empty());
        let metrics = directory.recent_metrics(&id, 10);
        assert_eq!(metrics.len(), 3);
        assert!(metrics.iter().any(|m| m.is_abnormal));
    }
}
