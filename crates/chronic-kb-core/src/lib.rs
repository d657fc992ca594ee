//! # chronic-kb core
//!
//! I/O-free building blocks of the chronic-disease knowledge pipeline:
//! data models, the sentence-aware chunker, the governance validator,
//! parse-with-fallback helpers for model output, metric classification,
//! and the embedding / vector engine abstractions with in-memory
//! implementations.
//!
//! Network providers, SQLite persistence, configuration and the agents
//! live in the `chronic-kb` app crate.

pub mod chunk;
pub mod embedding;
pub mod error;
pub mod governance;
pub mod metrics;
pub mod models;
pub mod parse;
pub mod store;

pub use error::{KbError, Result};
