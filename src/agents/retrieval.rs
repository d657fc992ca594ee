use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use chronic_kb_core::models::{
    KnowledgeResult, PatientContext, QueryAnalysis, QueryResponse, DEFAULT_SOURCE,
};
use chronic_kb_core::parse::parse_numbered_lines;
use chronic_kb_core::store::ScoredUnit;
use chronic_kb_core::Result;

use crate::knowledge::KnowledgeStore;
use crate::llm::LanguageModel;

const ANSWER_TEMPERATURE: f32 = 0.5;
const ANSWER_MAX_TOKENS: u32 = 1000;
const RELATED_TEMPERATURE: f32 = 0.7;
const RELATED_MAX_TOKENS: u32 = 200;
const RELATED_LIMIT: usize = 3;
const SNIPPET_CHARS: usize = 100;

const EMERGENCY_KEYWORDS: &[&str] = &[
    "chest pain",
    "difficulty breathing",
    "loss of consciousness",
    "severe bleeding",
    "stroke",
    "heart attack",
    "胸痛",
    "呼吸困难",
    "昏迷",
    "严重出血",
    "中风",
    "心脏病",
];

pub const URGENT_WARNING: &str = "⚠️ These symptoms may indicate an emergency. Call emergency \
     services or go to the nearest emergency department immediately.";
pub const DISCLAIMER: &str =
    "This answer is for reference only and is not a substitute for professional medical advice.";

/// Rule table: query-type keyword → canned advice.
const ADVICE_RULES: &[(&str, [&str; 2])] = &[
    (
        "symptom",
        [
            "If symptoms persist or worsen, seek medical attention promptly",
            "Keep a record of when symptoms occur and how severe they are",
        ],
    ),
    (
        "treatment",
        [
            "Follow your physician's treatment plan and do not adjust medication on your own",
            "Schedule regular follow-ups to monitor treatment effectiveness",
        ],
    ),
    (
        "lifestyle",
        [
            "Change habits gradually to build sustainable healthy behaviors",
            "Consult a dietitian for a personalized eating plan",
        ],
    ),
];
const GENERIC_ADVICE: &str = "If you have any questions, consult a qualified healthcare professional";

/// Similarity in `[0, 1]` from a cosine distance.
pub fn relevance_from_distance(distance: f64) -> f64 {
    (1.0 - distance).clamp(0.0, 1.0)
}

/// Deterministic advice for the classified query type.
pub fn heuristic_recommendations(query_type: &str) -> Vec<String> {
    let query_type = query_type.to_lowercase();
    let mut out: Vec<String> = ADVICE_RULES
        .iter()
        .filter(|(keyword, _)| query_type.contains(keyword))
        .flat_map(|(_, advice)| advice.iter().map(|a| a.to_string()))
        .collect();
    if out.is_empty() {
        out.push(GENERIC_ADVICE.to_string());
    }
    out
}

/// Urgent-care warning for emergency keywords, then the standing disclaimer.
pub fn check_warnings(query: &str) -> Vec<String> {
    let lowered = query.to_lowercase();
    let mut warnings = Vec::with_capacity(2);
    if EMERGENCY_KEYWORDS.iter().any(|k| lowered.contains(k)) {
        warnings.push(URGENT_WARNING.to_string());
    }
    warnings.push(DISCLAIMER.to_string());
    warnings
}

fn to_result(hit: ScoredUnit) -> KnowledgeResult {
    let meta = &hit.unit.metadata;
    let text = |key: &str| meta.get(key).and_then(Value::as_str).map(str::to_string);
    KnowledgeResult {
        source: text("source")
            .or_else(|| text("source_id"))
            .unwrap_or_else(|| DEFAULT_SOURCE.to_string()),
        disease: text("disease"),
        category: text("category"),
        relevance_score: relevance_from_distance(hit.distance),
        content: hit.unit.document,
        metadata: hit.unit.metadata,
    }
}

/// Numbered grounding block, with the patient context appended if given.
fn build_context(results: &[KnowledgeResult], patient: Option<&PatientContext>) -> String {
    let mut parts: Vec<String> = results
        .iter()
        .enumerate()
        .map(|(i, r)| format!("[{}] {}", i + 1, r.content))
        .collect();
    if let Some(p) = patient {
        parts.push(format!("\nPatient Context: {}", p));
    }
    parts.join("\n\n")
}

fn answer_prompt(query: &str, context: &str) -> String {
    format!(
        "Based on the following medical knowledge, answer the user's question accurately and concisely.\n\
         \n\
         User Question: {query}\n\
         \n\
         Medical Knowledge:\n\
         {context}\n\
         \n\
         Guidelines:\n\
         - Provide accurate medical information\n\
         - Be clear and easy to understand\n\
         - Include relevant warnings if applicable\n\
         - Suggest consulting a healthcare provider for personalized advice\n\
         \n\
         Answer:"
    )
}

fn related_prompt(query: &str, results: &[KnowledgeResult]) -> String {
    let snippets = results
        .iter()
        .take(3)
        .map(|r| r.content.chars().take(SNIPPET_CHARS).collect::<String>())
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Given this medical query and related information, suggest 3 related questions the user might want to ask:\n\
         \n\
         Original Query: {query}\n\
         \n\
         Related Information:\n\
         {snippets}\n\
         \n\
         Generate 3 related questions:\n\
         1.\n\
         2.\n\
         3."
    )
}

/// Retrieval-augmented answer synthesis.
pub struct RetrievalAgent {
    store: Arc<KnowledgeStore>,
    model: Arc<dyn LanguageModel>,
}

impl RetrievalAgent {
    pub fn new(store: Arc<KnowledgeStore>, model: Arc<dyn LanguageModel>) -> Self {
        Self { store, model }
    }

    /// Answer `query` from the knowledge store.
    ///
    /// Only store failures are errors; model failures show up as sentinel
    /// text in `answer` and produce no related questions.
    pub async fn answer(
        &self,
        query: &str,
        analysis: Option<&QueryAnalysis>,
        patient: Option<&PatientContext>,
        n_results: usize,
    ) -> Result<QueryResponse> {
        let start = Instant::now();

        let mut enhanced = query.to_string();
        if let Some(disease) = analysis.and_then(QueryAnalysis::named_disease) {
            enhanced.push(' ');
            enhanced.push_str(disease);
        }

        // over-fetch, keep the engine's top n
        let hits = self
            .store
            .search(&enhanced, None, None, n_results.saturating_mul(2))
            .await?;
        let results: Vec<KnowledgeResult> =
            hits.into_iter().take(n_results).map(to_result).collect();

        let context = build_context(&results, patient);
        let answer = self
            .model
            .complete(&answer_prompt(query, &context), ANSWER_TEMPERATURE, ANSWER_MAX_TOKENS)
            .await;

        let confidence = if results.is_empty() {
            0.0
        } else {
            results.iter().map(|r| r.relevance_score).sum::<f64>() / results.len() as f64
        };

        let sources: Vec<String> = results
            .iter()
            .map(|r| r.source.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let related = self
            .model
            .complete(
                &related_prompt(query, &results),
                RELATED_TEMPERATURE,
                RELATED_MAX_TOKENS,
            )
            .await;
        let related_questions = parse_numbered_lines(&related, RELATED_LIMIT);

        let recommendations =
            heuristic_recommendations(analysis.map(|a| a.query_type.as_str()).unwrap_or(""));
        let warnings = check_warnings(query);

        let processing_time_ms = start.elapsed().as_millis() as u64;
        tracing::info!(
            results = results.len(),
            confidence,
            warnings = warnings.len(),
            elapsed_ms = processing_time_ms,
            "answer synthesized"
        );

        Ok(QueryResponse {
            query_id: format!("query_{}", Uuid::new_v4().simple()),
            query: query.to_string(),
            answer,
            confidence,
            results,
            sources,
            related_questions,
            recommendations,
            warnings,
            processing_time_ms,
            timestamp: Utc::now(),
            patient_context_applied: patient.is_some(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relevance_is_clamped() {
        assert_eq!(relevance_from_distance(0.0), 1.0);
        assert!((relevance_from_distance(0.25) - 0.75).abs() < 1e-12);
        assert_eq!(relevance_from_distance(1.6), 0.0);
        assert_eq!(relevance_from_distance(-0.1), 1.0);
    }

    #[test]
    fn test_heuristic_recommendations() {
        assert_eq!(heuristic_recommendations("Symptoms").len(), 2);
        assert_eq!(heuristic_recommendations("treatment / lifestyle").len(), 4);
        assert_eq!(
            heuristic_recommendations("unknown"),
            vec![GENERIC_ADVICE.to_string()]
        );
        assert_eq!(heuristic_recommendations(""), vec![GENERIC_ADVICE.to_string()]);
    }

    #[test]
    fn test_warnings() {
        let w = check_warnings("I have Chest Pain after climbing stairs");
        assert_eq!(w, vec![URGENT_WARNING.to_string(), DISCLAIMER.to_string()]);

        let w = check_warnings("突然胸痛怎么办");
        assert_eq!(w.len(), 2);

        let w = check_warnings("what should I eat with diabetes?");
        assert_eq!(w, vec![DISCLAIMER.to_string()]);
    }

    #[test]
    fn test_build_context_numbers_results() {
        let r = |c: &str| KnowledgeResult {
            content: c.to_string(),
            source: DEFAULT_SOURCE.to_string(),
            disease: None,
            category: None,
            relevance_score: 0.5,
            metadata: Default::default(),
        };
        let ctx = build_context(&[r("alpha"), r("beta")], None);
        assert_eq!(ctx, "[1] alpha\n\n[2] beta");
    }
}
