use std::sync::Arc;

use chronic_kb_core::models::QueryAnalysis;
use chronic_kb_core::parse::{extract_field, extract_list};

use crate::llm::LanguageModel;

const TEMPERATURE: f32 = 0.3;
const MAX_TOKENS: u32 = 1000;

/// Fixed five-field classification prompt.
pub fn classification_prompt(query: &str) -> String {
    format!(
        "Analyze this medical query and extract key information:\n\
         \n\
         Query: {query}\n\
         \n\
         Provide analysis in this format:\n\
         1. Query Type: [symptoms | treatment | diagnosis | prevention | lifestyle | emergency | general]\n\
         2. Disease Mentioned: [disease name or \"none\"]\n\
         3. Urgency Level: [low | medium | high | emergency]\n\
         4. Key Entities: [list important medical terms]\n\
         5. Intent: [what the user wants to know]\n\
         \n\
         Analysis:"
    )
}

/// Classifies a query into type, disease, urgency, entities and intent.
pub struct QueryAgent {
    model: Arc<dyn LanguageModel>,
}

impl QueryAgent {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    /// Never fails: unparseable model output yields `"unknown"` fields and
    /// an empty entity list.
    pub async fn classify(&self, query: &str) -> QueryAnalysis {
        let raw = self
            .model
            .complete(&classification_prompt(query), TEMPERATURE, MAX_TOKENS)
            .await;

        let analysis = QueryAnalysis {
            query: query.to_string(),
            query_type: extract_field(&raw, "Query Type"),
            disease: extract_field(&raw, "Disease Mentioned"),
            urgency: extract_field(&raw, "Urgency Level"),
            entities: extract_list(&raw, "Key Entities"),
            intent: extract_field(&raw, "Intent"),
            analysis_raw: raw,
        };
        tracing::debug!(
            query_type = %analysis.query_type,
            disease = %analysis.disease,
            urgency = %analysis.urgency,
            "query classified"
        );
        analysis
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Fixed(&'static str);

    #[async_trait]
    impl LanguageModel for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn complete(&self, _prompt: &str, _temperature: f32, _max_tokens: u32) -> String {
            self.0.to_string()
        }
    }

    #[tokio::test]
    async fn test_classify_parses_fields() {
        let agent = QueryAgent::new(Arc::new(Fixed(
            "1. Query Type: treatment\n\
             2. Disease Mentioned: hypertension\n\
             3. Urgency Level: low\n\
             4. Key Entities: [ACE inhibitors, blood pressure]\n\
             5. Intent: compare first-line drugs",
        )));
        let a = agent.classify("What drugs treat high blood pressure?").await;
        assert_eq!(a.query_type, "treatment");
        assert_eq!(a.named_disease(), Some("hypertension"));
        assert_eq!(a.entities, vec!["ACE inhibitors", "blood pressure"]);
        assert!(a.analysis_raw.contains("Urgency Level"));
    }

    #[tokio::test]
    async fn test_classify_sentinel_output_falls_back() {
        let agent = QueryAgent::new(Arc::new(Fixed("[Error: 503]")));
        let a = agent.classify("anything").await;
        assert_eq!(a.query_type, "unknown");
        assert_eq!(a.disease, "unknown");
        assert!(a.entities.is_empty());
        assert_eq!(a.analysis_raw, "[Error: 503]");
    }

    #[test]
    fn test_prompt_lists_all_fields() {
        let p = classification_prompt("q?");
        for label in ["Query Type", "Disease Mentioned", "Urgency Level", "Key Entities", "Intent"] {
            assert!(p.contains(label));
        }
        assert!(p.contains("Query: q?"));
    }
}
