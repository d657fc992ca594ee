//! Core data models that flow through ingestion, retrieval and synthesis.
//!
//! Everything here is a plain value type. Stored units live in
//! [`crate::store`]; the types below are either inputs supplied by callers
//! (structured knowledge records, patient snapshots, requests) or
//! ephemeral outputs produced per request (analysis, responses).

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Free-form metadata attached to every stored unit.
pub type Metadata = serde_json::Map<String, Value>;

/// Sentinel used by the output parsers when a field is absent.
pub const UNKNOWN: &str = "unknown";

/// Sentinel the query classifier emits when no disease is mentioned.
pub const NO_DISEASE: &str = "none";

/// Source tag used when a stored unit carries no provenance label.
pub const DEFAULT_SOURCE: &str = "medical_knowledge_base";

// ─── Retrieval ──────────────────────────────────────────────────────

/// A single knowledge snippet returned to the caller of a query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeResult {
    pub content: String,
    pub source: String,
    pub disease: Option<String>,
    pub category: Option<String>,
    /// Similarity in `[0.0, 1.0]`, derived from the engine's distance.
    pub relevance_score: f64,
    #[serde(default)]
    pub metadata: Metadata,
}

/// Structured reading of a raw query produced by the query classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryAnalysis {
    pub query: String,
    pub query_type: String,
    pub disease: String,
    pub urgency: String,
    pub entities: Vec<String>,
    pub intent: String,
    /// Model text the fields were parsed from, kept for auditing.
    pub analysis_raw: String,
}

impl QueryAnalysis {
    /// The disease named by the analysis, if it names a real one.
    ///
    /// Both the classifier's "none" answer and the parser's "unknown"
    /// fallback count as no disease.
    pub fn named_disease(&self) -> Option<&str> {
        let disease = self.disease.trim();
        if disease.is_empty()
            || disease.eq_ignore_ascii_case(NO_DISEASE)
            || disease.eq_ignore_ascii_case(UNKNOWN)
        {
            None
        } else {
            Some(disease)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default)]
    pub patient_id: Option<String>,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

fn default_max_results() -> usize {
    5
}

impl QueryRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            patient_id: None,
            max_results: default_max_results(),
        }
    }
}

/// Grounded answer with provenance, produced once per query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    /// Unique per response; not derived from wall-clock time.
    pub query_id: String,
    pub query: String,
    pub answer: String,
    pub confidence: f64,
    pub results: Vec<KnowledgeResult>,
    pub sources: Vec<String>,
    pub related_questions: Vec<String>,
    pub recommendations: Vec<String>,
    pub warnings: Vec<String>,
    pub processing_time_ms: u64,
    pub timestamp: DateTime<Utc>,
    pub patient_context_applied: bool,
}

/// Patient details that may be folded into an answer's grounding context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientContext {
    pub age: u32,
    pub gender: Gender,
    pub conditions: Vec<String>,
    pub allergies: Vec<String>,
}

impl PatientContext {
    pub fn from_snapshot(patient: &PatientSnapshot) -> Self {
        Self {
            age: patient.age,
            gender: patient.gender,
            conditions: patient.chronic_conditions.clone(),
            allergies: patient.allergies.clone(),
        }
    }
}

impl fmt::Display for PatientContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "age {}, gender {}", self.age, self.gender)?;
        if !self.conditions.is_empty() {
            write!(f, ", conditions: {}", self.conditions.join(", "))?;
        }
        if !self.allergies.is_empty() {
            write!(f, ", allergies: {}", self.allergies.join(", "))?;
        }
        Ok(())
    }
}

// ─── Recommendations ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    /// Lenient parse of model output; anything unrecognised is `Medium`.
    pub fn parse_lenient(text: &str) -> Self {
        let lower = text.trim().to_lowercase();
        let word = lower
            .trim_matches(|c: char| c == '[' || c == ']' || c == '.' || c == '*')
            .trim();
        if word.starts_with("high") {
            Priority::High
        } else if word.starts_with("low") {
            Priority::Low
        } else {
            Priority::Medium
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendationItem {
    pub recommendation: String,
    pub rationale: String,
    pub priority: Priority,
}

impl RecommendationItem {
    pub fn new(recommendation: impl Into<String>) -> Self {
        Self {
            recommendation: recommendation.into(),
            rationale: String::new(),
            priority: Priority::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationRequest {
    pub patient_id: String,
    /// `lifestyle`, `medication`, `diet`, `exercise`, ...
    pub recommendation_type: String,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub constraints: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationResponse {
    pub patient_id: String,
    pub recommendations: Vec<RecommendationItem>,
    pub priority_level: Priority,
    pub rationale: String,
    pub cautions: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

// ─── Patients & metrics ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Gender::Male => "male",
            Gender::Female => "female",
            Gender::Other => "other",
        })
    }
}

/// Read-only view of a patient record at the time of a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientSnapshot {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub age: u32,
    pub gender: Gender,
    #[serde(default)]
    pub chronic_conditions: Vec<String>,
    #[serde(default)]
    pub allergies: Vec<String>,
    #[serde(default)]
    pub current_medications: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    BloodPressure,
    BloodGlucose,
    Weight,
    Bmi,
    HeartRate,
    OxygenSaturation,
    Temperature,
    Hba1c,
    Cholesterol,
    Steps,
    Sleep,
    MedicationAdherence,
    Custom,
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| "custom".to_string());
        f.write_str(&s)
    }
}

/// One health measurement.
///
/// `value` keeps the reading's own shape, e.g. `{"systolic": 120,
/// "diastolic": 80}` for blood pressure or `{"value": 95}` for glucose.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub patient_id: String,
    pub metric_type: MetricType,
    pub value: Metadata,
    pub unit: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub is_abnormal: bool,
}

impl MetricRecord {
    /// Numeric field of the reading, if present.
    pub fn number(&self, key: &str) -> Option<f64> {
        self.value.get(key).and_then(Value::as_f64)
    }
}

impl fmt::Display for MetricRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reading = self
            .value
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(", ");
        write!(
            f,
            "{} {} {} at {}",
            self.metric_type,
            reading,
            self.unit,
            self.timestamp.format("%Y-%m-%d %H:%M")
        )?;
        if let Some(ctx) = &self.context {
            write!(f, " ({})", ctx)?;
        }
        Ok(())
    }
}

// ─── Structured knowledge ───────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiseaseCategory {
    Endocrine,
    Cardiovascular,
    Respiratory,
    Musculoskeletal,
    Neurological,
    Gastrointestinal,
    Renal,
    Other,
}

impl DiseaseCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiseaseCategory::Endocrine => "endocrine",
            DiseaseCategory::Cardiovascular => "cardiovascular",
            DiseaseCategory::Respiratory => "respiratory",
            DiseaseCategory::Musculoskeletal => "musculoskeletal",
            DiseaseCategory::Neurological => "neurological",
            DiseaseCategory::Gastrointestinal => "gastrointestinal",
            DiseaseCategory::Renal => "renal",
            DiseaseCategory::Other => "other",
        }
    }
}

/// Labelled groups of items, e.g. `{"common": [...], "severe": [...]}`.
pub type Sections = BTreeMap<String, Vec<String>>;

/// Comprehensive, structured knowledge about one disease.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiseaseKnowledge {
    pub disease_id: String,
    pub name: String,
    pub category: DiseaseCategory,
    pub overview: String,
    #[serde(default)]
    pub symptoms: Sections,
    #[serde(default)]
    pub causes: Vec<String>,
    #[serde(default)]
    pub risk_factors: Sections,
    #[serde(default)]
    pub diagnosis: Sections,
    #[serde(default)]
    pub treatments: Sections,
    #[serde(default)]
    pub complications: Vec<String>,
    #[serde(default)]
    pub prevention: Vec<String>,
    #[serde(default)]
    pub prognosis: Option<String>,
    #[serde(default)]
    pub sources: Vec<String>,
    pub last_updated: DateTime<Utc>,
}

impl DiseaseKnowledge {
    /// Human-readable composite text, one paragraph per non-empty section
    /// in a fixed order.
    pub fn composite_text(&self) -> String {
        let mut parts = vec![
            format!("Disease: {}", self.name),
            format!("Category: {}", self.category.as_str()),
        ];
        if !self.overview.trim().is_empty() {
            parts.push(format!("Overview: {}", self.overview.trim()));
        }
        push_sections(&mut parts, "Symptoms", &self.symptoms);
        push_list(&mut parts, "Causes", &self.causes);
        push_sections(&mut parts, "Risk factors", &self.risk_factors);
        push_sections(&mut parts, "Diagnosis", &self.diagnosis);
        push_sections(&mut parts, "Treatments", &self.treatments);
        push_list(&mut parts, "Complications", &self.complications);
        push_list(&mut parts, "Prevention", &self.prevention);
        if let Some(prognosis) = self.prognosis.as_deref().map(str::trim) {
            if !prognosis.is_empty() {
                parts.push(format!("Prognosis: {}", prognosis));
            }
        }
        parts.join("\n\n")
    }
}

fn push_list(parts: &mut Vec<String>, label: &str, items: &[String]) {
    if !items.is_empty() {
        parts.push(format!("{}: {}", label, items.join(", ")));
    }
}

fn push_sections(parts: &mut Vec<String>, label: &str, sections: &Sections) {
    let rendered: Vec<String> = sections
        .iter()
        .filter(|(_, items)| !items.is_empty())
        .map(|(name, items)| format!("{}: {}", name, items.join(", ")))
        .collect();
    if !rendered.is_empty() {
        parts.push(format!("{}: {}", label, rendered.join("; ")));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> DiseaseKnowledge {
        DiseaseKnowledge {
            disease_id: "diabetes_type2".to_string(),
            name: "Type 2 diabetes".to_string(),
            category: DiseaseCategory::Endocrine,
            overview: "A chronic metabolic disease.".to_string(),
            symptoms: BTreeMap::from([
                ("severe".to_string(), vec!["confusion".to_string()]),
                ("common".to_string(), vec!["thirst".to_string(), "fatigue".to_string()]),
            ]),
            causes: vec![],
            risk_factors: BTreeMap::new(),
            diagnosis: BTreeMap::from([("tests".to_string(), vec![])]),
            treatments: BTreeMap::new(),
            complications: vec!["neuropathy".to_string()],
            prevention: vec![],
            prognosis: Some("  ".to_string()),
            sources: vec!["ADA Standards of Care 2026".to_string()],
            last_updated: Utc::now(),
        }
    }

    #[test]
    fn test_composite_text_skips_empty_sections() {
        let text = record().composite_text();
        let paragraphs: Vec<&str> = text.split("\n\n").collect();
        assert_eq!(
            paragraphs,
            vec![
                "Disease: Type 2 diabetes",
                "Category: endocrine",
                "Overview: A chronic metabolic disease.",
                "Symptoms: common: thirst, fatigue; severe: confusion",
                "Complications: neuropathy",
            ]
        );
    }

    #[test]
    fn test_named_disease_ignores_sentinels() {
        let mut analysis = QueryAnalysis {
            query: "q".to_string(),
            query_type: UNKNOWN.to_string(),
            disease: "None".to_string(),
            urgency: UNKNOWN.to_string(),
            entities: vec![],
            intent: UNKNOWN.to_string(),
            analysis_raw: String::new(),
        };
        assert_eq!(analysis.named_disease(), None);
        analysis.disease = "unknown".to_string();
        assert_eq!(analysis.named_disease(), None);
        analysis.disease = "hypertension".to_string();
        assert_eq!(analysis.named_disease(), Some("hypertension"));
    }

    #[test]
    fn test_priority_parse_lenient() {
        assert_eq!(Priority::parse_lenient("High"), Priority::High);
        assert_eq!(Priority::parse_lenient("[low]"), Priority::Low);
        assert_eq!(Priority::parse_lenient("urgent"), Priority::Medium);
        assert_eq!(Priority::parse_lenient(""), Priority::Medium);
    }

    #[test]
    fn test_metric_type_display_is_snake_case() {
        assert_eq!(MetricType::BloodPressure.to_string(), "blood_pressure");
        assert_eq!(MetricType::Hba1c.to_string(), "hba1c");
    }
}
