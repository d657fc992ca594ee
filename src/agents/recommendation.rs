use std::sync::Arc;

use chrono::Utc;

use chronic_kb_core::models::{
    MetricRecord, PatientSnapshot, Priority, RecommendationRequest, RecommendationResponse,
};
use chronic_kb_core::parse::parse_recommendations;
use chronic_kb_core::Result;

use crate::knowledge::KnowledgeStore;
use crate::llm::LanguageModel;

const TEMPERATURE: f32 = 0.4;
const MAX_TOKENS: u32 = 1000;
const GUIDELINE_SNIPPETS: usize = 3;
const CONTEXT_METRICS: usize = 3;

/// Conditions that escalate the overall priority, compared after
/// lowercasing and dropping everything but letters and digits.
const HIGH_RISK_CONDITIONS: &[&str] = &[
    "heartdisease",
    "diabetestype1",
    "type1diabetes",
    "severehypertension",
    "insulindependentdiabetes",
];

fn normalize_condition(condition: &str) -> String {
    condition
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Compact patient description for the recommendation prompt.
///
/// `metrics` is chronological; only the last three are included.
pub fn build_patient_context(patient: Option<&PatientSnapshot>, metrics: &[MetricRecord]) -> String {
    let Some(p) = patient else {
        return "No patient information available".to_string();
    };

    let mut lines = vec![format!("Age: {}, Gender: {}", p.age, p.gender)];
    if !p.chronic_conditions.is_empty() {
        lines.push(format!("Conditions: {}", p.chronic_conditions.join(", ")));
    }
    if !p.allergies.is_empty() {
        lines.push(format!("Allergies: {}", p.allergies.join(", ")));
    }
    if !metrics.is_empty() {
        lines.push("Recent Health Metrics:".to_string());
        let skip = metrics.len().saturating_sub(CONTEXT_METRICS);
        lines.extend(metrics[skip..].iter().map(|m| format!("  - {}", m)));
    }
    lines.join("\n")
}

/// `High` if any condition is on the high-risk list, else `Medium`.
pub fn overall_priority(patient: Option<&PatientSnapshot>) -> Priority {
    let high_risk = patient
        .map(|p| {
            p.chronic_conditions.iter().any(|c| {
                let c = normalize_condition(c);
                HIGH_RISK_CONDITIONS.iter().any(|risk| c.contains(risk))
            })
        })
        .unwrap_or(false);
    if high_risk {
        Priority::High
    } else {
        Priority::Medium
    }
}

pub fn identify_cautions(
    request: &RecommendationRequest,
    patient: Option<&PatientSnapshot>,
) -> Vec<String> {
    let mut cautions = Vec::new();
    if let Some(p) = patient.filter(|p| !p.allergies.is_empty()) {
        cautions.push(format!("Allergy history: {}", p.allergies.join(", ")));
    }
    if request.recommendation_type.trim().eq_ignore_ascii_case("medication") {
        cautions.push("All medication changes must be directed by a physician".to_string());
    }
    if patient.is_some_and(|p| !p.current_medications.is_empty()) {
        cautions.push("Watch for interactions with current medications".to_string());
    }
    cautions
}

fn rationale(patient: Option<&PatientSnapshot>) -> String {
    match patient.filter(|p| !p.chronic_conditions.is_empty()) {
        Some(p) => format!(
            "These recommendations are based on your health conditions ({}) and evidence-based medical guidelines.",
            p.chronic_conditions.join(", ")
        ),
        None => "These recommendations are based on general health principles. \
                 Consult a physician for personalized advice."
            .to_string(),
    }
}

fn recommendation_prompt(
    patient_context: &str,
    request: &RecommendationRequest,
    guidelines: &str,
) -> String {
    let context = request
        .context
        .as_deref()
        .filter(|c| !c.trim().is_empty())
        .unwrap_or("General");
    let constraints = if request.constraints.is_empty() {
        "None".to_string()
    } else {
        request.constraints.join(", ")
    };
    format!(
        "Generate personalized health recommendations based on patient profile.\n\
         \n\
         Patient Information:\n\
         {patient_context}\n\
         \n\
         Recommendation Type: {kind}\n\
         Context: {context}\n\
         Constraints: {constraints}\n\
         \n\
         Medical Guidelines:\n\
         {guidelines}\n\
         \n\
         Provide recommendations in this format:\n\
         1. Recommendation: [specific actionable advice]\n   \
         Rationale: [why this helps]\n   \
         Priority: [high/medium/low]\n\
         \n\
         Generate 3-5 personalized recommendations:",
        kind = request.recommendation_type,
    )
}

/// Personalized recommendations grounded in the knowledge store.
pub struct RecommendationAgent {
    store: Arc<KnowledgeStore>,
    model: Arc<dyn LanguageModel>,
}

impl RecommendationAgent {
    pub fn new(store: Arc<KnowledgeStore>, model: Arc<dyn LanguageModel>) -> Self {
        Self { store, model }
    }

    pub async fn recommend(
        &self,
        request: &RecommendationRequest,
        patient: Option<&PatientSnapshot>,
        metrics: &[MetricRecord],
    ) -> Result<RecommendationResponse> {
        let patient_context = build_patient_context(patient, metrics);

        let search = format!(
            "{} recommendations {}",
            request.recommendation_type,
            request.context.as_deref().unwrap_or("")
        );
        let guidelines = self
            .store
            .search(search.trim(), None, None, GUIDELINE_SNIPPETS)
            .await?
            .into_iter()
            .map(|hit| hit.unit.document)
            .collect::<Vec<_>>()
            .join("\n");

        let text = self
            .model
            .complete(
                &recommendation_prompt(&patient_context, request, &guidelines),
                TEMPERATURE,
                MAX_TOKENS,
            )
            .await;
        let recommendations = parse_recommendations(&text);

        tracing::info!(
            patient_id = %request.patient_id,
            kind = %request.recommendation_type,
            items = recommendations.len(),
            "recommendations generated"
        );

        Ok(RecommendationResponse {
            patient_id: request.patient_id.clone(),
            recommendations,
            priority_level: overall_priority(patient),
            rationale: rationale(patient),
            cautions: identify_cautions(request, patient),
            timestamp: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronic_kb_core::models::{Gender, MetricType};
    use serde_json::json;

    fn patient(conditions: &[&str]) -> PatientSnapshot {
        PatientSnapshot {
            id: "p1".to_string(),
            name: "Test".to_string(),
            age: 58,
            gender: Gender::Female,
            chronic_conditions: conditions.iter().map(|c| c.to_string()).collect(),
            allergies: vec!["penicillin".to_string()],
            current_medications: vec![],
        }
    }

    fn request(kind: &str) -> RecommendationRequest {
        RecommendationRequest {
            patient_id: "p1".to_string(),
            recommendation_type: kind.to_string(),
            context: None,
            constraints: vec![],
        }
    }

    fn glucose(value: f64) -> MetricRecord {
        MetricRecord {
            id: String::new(),
            patient_id: "p1".to_string(),
            metric_type: MetricType::BloodGlucose,
            value: json!({ "value": value }).as_object().cloned().unwrap(),
            unit: "mg/dL".to_string(),
            timestamp: Utc::now(),
            context: None,
            notes: None,
            is_abnormal: false,
        }
    }

    #[test]
    fn test_overall_priority() {
        assert_eq!(overall_priority(None), Priority::Medium);
        assert_eq!(overall_priority(Some(&patient(&[]))), Priority::Medium);
        assert_eq!(
            overall_priority(Some(&patient(&["hypertension"]))),
            Priority::Medium
        );
        assert_eq!(
            overall_priority(Some(&patient(&["Coronary Heart Disease"]))),
            Priority::High
        );
        assert_eq!(
            overall_priority(Some(&patient(&["diabetes_type1"]))),
            Priority::High
        );
    }

    #[test]
    fn test_cautions() {
        let mut p = patient(&[]);
        assert_eq!(
            identify_cautions(&request("diet"), Some(&p)),
            vec!["Allergy history: penicillin"]
        );

        p.current_medications = vec!["metformin".to_string()];
        let cautions = identify_cautions(&request("Medication"), Some(&p));
        assert_eq!(cautions.len(), 3);
        assert_eq!(cautions[1], "All medication changes must be directed by a physician");

        assert!(identify_cautions(&request("exercise"), None).is_empty());
    }

    #[test]
    fn test_patient_context_keeps_last_three_metrics() {
        let metrics: Vec<MetricRecord> = [90.0, 100.0, 110.0, 120.0].map(glucose).into();
        let ctx = build_patient_context(Some(&patient(&["hypertension"])), &metrics);
        let lines: Vec<&str> = ctx.lines().collect();
        assert_eq!(lines[0], "Age: 58, Gender: female");
        assert_eq!(lines[1], "Conditions: hypertension");
        assert_eq!(lines[2], "Allergies: penicillin");
        assert_eq!(lines[3], "Recent Health Metrics:");
        assert_eq!(lines.len(), 7);
        assert!(lines[4].contains("value=100"));
    }

    #[test]
    fn test_patient_context_without_patient() {
        assert_eq!(
            build_patient_context(None, &[]),
            "No patient information available"
        );
    }

    #[test]
    fn test_rationale_mentions_conditions() {
        assert!(rationale(Some(&patient(&["asthma"]))).contains("(asthma)"));
        assert!(rationale(None).starts_with("These recommendations are based on general"));
    }
}
