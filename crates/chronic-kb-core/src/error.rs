//! Error taxonomy shared by the ingestion and retrieval pipeline.
//!
//! | Variant | Meaning | Caller treatment |
//! |---------|---------|------------------|
//! | [`KbError::Governance`] | A document's provenance metadata was rejected | Report the reason; nothing was written |
//! | [`KbError::Registry`] | The source registry is unreadable or empty | Configuration fault; all ingestion fails closed |
//! | [`KbError::Chunking`] | Chunker parameters cannot make progress | Configuration fault |
//! | [`KbError::NotFound`] | Unknown document or patient identifier | Explicit not-found outcome |
//! | [`KbError::Store`] | Vector engine or embedding I/O failed | Generic service error |
//!
//! Generative-model failures are deliberately absent: they are rendered
//! inline as bracketed text by the provider implementations.

use thiserror::Error;

/// Rejection reasons for governance metadata, in the order they are checked.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GovernanceError {
    #[error("knowledge metadata missing required governance field: {0}")]
    MissingField(&'static str),

    #[error("Invalid source_id format '{0}'. Expected lowercase slug like 'ada-2026-soc'")]
    InvalidSourceId(String),

    #[error("Unknown source_id '{source_id}'. Register it in {registry}")]
    UnknownSourceId { source_id: String, registry: String },

    #[error("Invalid document_version format '{0}'. Use alphanumeric version like '2026.1' or 'NG136'")]
    InvalidDocumentVersion(String),

    #[error("Invalid evidence_level '{given}'. Allowed values: {allowed}")]
    InvalidEvidenceLevel { given: String, allowed: String },

    #[error("disease knowledge must include at least one source citation")]
    MissingSources,
}

/// The source registry could not provide any usable `source_id`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("source registry not readable at {location}: {reason}")]
    Unreadable { location: String, reason: String },

    #[error("no source_id entries found in registry: {0}")]
    Empty(String),
}

/// Chunker parameters that would not terminate or produce empty windows.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChunkError {
    #[error("chunk_size must be > 0")]
    ZeroChunkSize,

    #[error("overlap ({overlap}) must be smaller than chunk_size ({chunk_size})")]
    OverlapTooLarge { chunk_size: usize, overlap: usize },

    #[error("chunk cursor did not advance past position {0}")]
    Stalled(usize),
}

#[derive(Debug, Error)]
pub enum KbError {
    #[error(transparent)]
    Governance(#[from] GovernanceError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Chunking(#[from] ChunkError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("store error: {0}")]
    Store(#[from] anyhow::Error),
}

impl KbError {
    /// True for faults that mean the deployment is misconfigured rather
    /// than that a single request was bad.
    pub fn is_configuration_fault(&self) -> bool {
        matches!(self, KbError::Registry(_) | KbError::Chunking(_))
    }
}

pub type Result<T> = std::result::Result<T, KbError>;
