//! The agent pipeline.
//!
//! | Agent | Input | Output | Model calls |
//! |-------|-------|--------|-------------|
//! | [`QueryAgent`] | raw query | [`QueryAnalysis`](chronic_kb_core::models::QueryAnalysis) | 1 (temperature 0.3) |
//! | [`RetrievalAgent`] | query + analysis + patient context | [`QueryResponse`](chronic_kb_core::models::QueryResponse) | 2 (answer 0.5, related questions 0.7) |
//! | [`RecommendationAgent`] | request + patient + metrics | [`RecommendationResponse`](chronic_kb_core::models::RecommendationResponse) | 1 (temperature 0.4) |
//!
//! Agents hold no per-request state and can be shared across tasks.
//! Model failures arrive as sentinel text and flow through as content;
//! only store failures surface as errors.

mod query;
mod recommendation;
mod retrieval;

pub use query::{classification_prompt, QueryAgent};
pub use recommendation::{
    build_patient_context, identify_cautions, overall_priority, RecommendationAgent,
};
pub use retrieval::{
    check_warnings, heuristic_recommendations, relevance_from_distance, RetrievalAgent,
};
