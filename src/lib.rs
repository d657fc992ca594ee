//! # Chronic KB
//!
//! A governed knowledge store and retrieval-augmented agent pipeline for
//! chronic-disease questions.
//!
//! Documents enter through [`knowledge::KnowledgeStore`], which refuses
//! anything whose provenance metadata fails the governance check, then
//! chunks, embeds and stores the rest. Queries run through three agents
//! composed by [`orchestrator::Orchestrator`]: classification, grounded
//! answer synthesis, and personalized recommendations.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────┐   ┌───────────────┐
//! │ Documents  │──▶│  Governance  │──▶│ Chunk + Embed │──▶ VectorEngine
//! │ / records  │   │  (registry)  │   └───────────────┘   (sqlite | memory)
//! └────────────┘   └──────────────┘                              │
//!                                                                ▼
//!   query ──▶ QueryAgent ──▶ RetrievalAgent ──▶ QueryResponse ◀──┤
//!   patient ─────────────▶ RecommendationAgent ──▶ Recommendations
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`app`] | Composition root: engine, store, orchestrator |
//! | [`knowledge`] | Governed ingestion, search and aggregates |
//! | [`agents`] | Query, retrieval and recommendation agents |
//! | [`orchestrator`] | Request-level pipeline |
//! | [`llm`] | Generative-model providers |
//! | [`embedding`] | Embedding providers |
//! | [`registry`] | File-backed source registry |
//! | [`patients`] | Patient snapshot and metric lookup |
//! | [`sqlite_engine`] | SQLite vector engine |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |
//! | [`stats`] | Store statistics |
//!
//! Pure domain logic (models, chunking, governance, parsing, metric rules,
//! the in-memory engine) lives in the I/O-free `chronic-kb-core` crate.

pub mod agents;
pub mod app;
pub mod config;
pub mod db;
pub mod embedding;
pub mod knowledge;
pub mod llm;
pub mod migrate;
pub mod orchestrator;
pub mod patients;
pub mod registry;
pub mod sqlite_engine;
pub mod stats;

pub use chronic_kb_core as core;
