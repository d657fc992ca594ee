//! Provenance gate for everything that enters the knowledge store.
//!
//! Every stored unit must carry three governance fields:
//!
//! | Field | Format | Normalization |
//! |-------|--------|---------------|
//! | `source_id` | `^[a-z0-9][a-z0-9-]{1,63}$`, registered in the source registry | trimmed, lower-cased |
//! | `document_version` | `^[A-Za-z0-9][A-Za-z0-9._-]{0,31}$` | trimmed |
//! | `evidence_level` | one of [`EvidenceLevel`] | trimmed, upper-cased |
//!
//! Checks run in a fixed order and stop at the first failure:
//! presence (in field order) → `source_id` format → registry membership →
//! `document_version` format → `evidence_level` membership.
//!
//! The registry is read through a [`RegistrySource`] the first time it is
//! needed and cached for the validator's lifetime. A registry that cannot
//! be read or declares no sources is a [`RegistryError`], never a
//! per-document rejection, and blocks every write.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{GovernanceError, KbError, RegistryError};
use crate::models::Metadata;

pub const SOURCE_ID: &str = "source_id";
pub const DOCUMENT_VERSION: &str = "document_version";
pub const EVIDENCE_LEVEL: &str = "evidence_level";

/// Governance fields in the order their presence is checked.
pub const REQUIRED_FIELDS: [&str; 3] = [SOURCE_ID, DOCUMENT_VERSION, EVIDENCE_LEVEL];

fn source_id_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z0-9][a-z0-9-]{1,63}$").expect("static regex"))
}

fn document_version_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]{0,31}$").expect("static regex"))
}

fn declaration_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"source_id:\s*"?([a-z0-9][a-z0-9-]{1,63})"?"#).expect("static regex")
    })
}

// ─── Evidence levels ────────────────────────────────────────────────

/// Closed grading of how strong the evidence behind a unit is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EvidenceLevel {
    GradeHigh,
    GradeModerate,
    GradeLow,
    GuidelineConsensus,
    ExpertOpinion,
}

impl EvidenceLevel {
    pub const ALL: [EvidenceLevel; 5] = [
        EvidenceLevel::GradeHigh,
        EvidenceLevel::GradeModerate,
        EvidenceLevel::GradeLow,
        EvidenceLevel::GuidelineConsensus,
        EvidenceLevel::ExpertOpinion,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EvidenceLevel::GradeHigh => "GRADE_HIGH",
            EvidenceLevel::GradeModerate => "GRADE_MODERATE",
            EvidenceLevel::GradeLow => "GRADE_LOW",
            EvidenceLevel::GuidelineConsensus => "GUIDELINE_CONSENSUS",
            EvidenceLevel::ExpertOpinion => "EXPERT_OPINION",
        }
    }

    fn allowed_list() -> String {
        let mut names: Vec<&str> = Self::ALL.iter().map(EvidenceLevel::as_str).collect();
        names.sort_unstable();
        names.join(", ")
    }
}

impl fmt::Display for EvidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EvidenceLevel {
    type Err = GovernanceError;

    /// Exact match on the upper-case name; normalization is the caller's job.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|level| level.as_str() == s)
            .ok_or_else(|| GovernanceError::InvalidEvidenceLevel {
                given: s.to_string(),
                allowed: Self::allowed_list(),
            })
    }
}

/// Typed view of a governance block, used when building metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernanceMetadata {
    pub source_id: String,
    pub document_version: String,
    pub evidence_level: EvidenceLevel,
}

impl GovernanceMetadata {
    pub fn new(
        source_id: impl Into<String>,
        document_version: impl Into<String>,
        evidence_level: EvidenceLevel,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            document_version: document_version.into(),
            evidence_level,
        }
    }

    pub fn to_metadata(&self) -> Metadata {
        let mut m = Metadata::new();
        m.insert(SOURCE_ID.to_string(), Value::from(self.source_id.clone()));
        m.insert(
            DOCUMENT_VERSION.to_string(),
            Value::from(self.document_version.clone()),
        );
        m.insert(
            EVIDENCE_LEVEL.to_string(),
            Value::from(self.evidence_level.as_str()),
        );
        m
    }
}

// ─── Registry ───────────────────────────────────────────────────────

/// Where the list of registered sources comes from.
pub trait RegistrySource: Send + Sync {
    /// Human-readable location, used in error messages.
    fn location(&self) -> String;

    /// Read the raw registry text.
    fn read(&self) -> Result<String, RegistryError>;
}

/// Registry text held in memory.
#[derive(Debug, Clone)]
pub struct InlineRegistry {
    text: String,
}

impl InlineRegistry {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Registry declaring exactly the given ids.
    pub fn with_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let text = ids
            .into_iter()
            .map(|id| format!("- source_id: \"{}\"\n", id.as_ref()))
            .collect::<String>();
        Self { text }
    }
}

impl RegistrySource for InlineRegistry {
    fn location(&self) -> String {
        "<inline registry>".to_string()
    }

    fn read(&self) -> Result<String, RegistryError> {
        Ok(self.text.clone())
    }
}

/// Extract every `source_id: "<slug>"` declaration, one per line at most.
///
/// Tolerant of surrounding syntax (YAML list markers, indentation, quotes).
pub fn parse_registry(text: &str) -> BTreeSet<String> {
    text.lines()
        .filter_map(|line| declaration_pattern().captures(line))
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

// ─── Validator ──────────────────────────────────────────────────────

pub struct GovernanceValidator {
    source: Arc<dyn RegistrySource>,
    cache: RwLock<Option<Arc<BTreeSet<String>>>>,
}

impl GovernanceValidator {
    pub fn new(source: Arc<dyn RegistrySource>) -> Self {
        Self {
            source,
            cache: RwLock::new(None),
        }
    }

    pub fn registry_location(&self) -> String {
        self.source.location()
    }

    /// Registered source ids, loading the registry on first use.
    ///
    /// Concurrent first calls may each parse the registry; the parsed set
    /// is identical so whichever write lands last is equivalent.
    pub fn registered_ids(&self) -> Result<Arc<BTreeSet<String>>, RegistryError> {
        if let Some(ids) = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            return Ok(Arc::clone(ids));
        }

        let text = self.source.read()?;
        let ids = parse_registry(&text);
        if ids.is_empty() {
            return Err(RegistryError::Empty(self.source.location()));
        }
        tracing::info!(
            registry = %self.source.location(),
            entries = ids.len(),
            "source registry loaded"
        );

        let ids = Arc::new(ids);
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(cache.get_or_insert(ids)))
    }

    /// Drop the cached registry; the next validation reloads it.
    pub fn invalidate(&self) {
        *self.cache.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Validate the governance block of `metadata` and return a normalized
    /// copy. The input is never modified.
    ///
    /// # Errors
    ///
    /// - [`KbError::Governance`] naming the first violated rule.
    /// - [`KbError::Registry`] if the registry cannot be loaded.
    pub fn validate_and_normalize(&self, metadata: &Metadata) -> Result<Metadata, KbError> {
        let mut values = Vec::with_capacity(REQUIRED_FIELDS.len());
        for field in REQUIRED_FIELDS {
            match field_text(metadata, field) {
                Some(v) => values.push(v),
                None => return Err(GovernanceError::MissingField(field).into()),
            }
        }

        let source_id = values[0].trim().to_lowercase();
        let document_version = values[1].trim().to_string();
        let evidence_level = values[2].trim().to_uppercase();

        if !source_id_pattern().is_match(&source_id) {
            return Err(GovernanceError::InvalidSourceId(source_id).into());
        }

        let registered = self.registered_ids()?;
        if !registered.contains(&source_id) {
            return Err(GovernanceError::UnknownSourceId {
                source_id,
                registry: self.source.location(),
            }
            .into());
        }

        if !document_version_pattern().is_match(&document_version) {
            return Err(GovernanceError::InvalidDocumentVersion(document_version).into());
        }

        let level: EvidenceLevel = evidence_level.parse()?;

        let mut normalized = metadata.clone();
        normalized.insert(SOURCE_ID.to_string(), Value::from(source_id));
        normalized.insert(DOCUMENT_VERSION.to_string(), Value::from(document_version));
        normalized.insert(EVIDENCE_LEVEL.to_string(), Value::from(level.as_str()));
        Ok(normalized)
    }
}

/// Text of a metadata field, or `None` when absent or empty-like.
fn field_text(metadata: &Metadata, field: &str) -> Option<String> {
    match metadata.get(field)? {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::Array(a) if a.is_empty() => None,
        Value::Object(o) if o.is_empty() => None,
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn validator() -> GovernanceValidator {
        GovernanceValidator::new(Arc::new(InlineRegistry::with_ids([
            "ada-2026-soc",
            "nice-ng136",
        ])))
    }

    fn meta(value: serde_json::Value) -> Metadata {
        value.as_object().cloned().unwrap()
    }

    fn valid() -> Metadata {
        meta(json!({
            "source_id": "ada-2026-soc",
            "document_version": "2026.1",
            "evidence_level": "GRADE_LOW"
        }))
    }

    #[test]
    fn test_accepts_and_normalizes() {
        let input = meta(json!({
            "source_id": "  ADA-2026-SOC ",
            "document_version": " 2026.1",
            "evidence_level": "grade_low",
            "language": "en"
        }));
        let out = validator().validate_and_normalize(&input).unwrap();
        assert_eq!(out["source_id"], "ada-2026-soc");
        assert_eq!(out["document_version"], "2026.1");
        assert_eq!(out["evidence_level"], "GRADE_LOW");
        assert_eq!(out["language"], "en");
        // caller's map untouched
        assert_eq!(input["evidence_level"], "grade_low");
    }

    #[test]
    fn test_valid_metadata_passes() {
        assert!(validator().validate_and_normalize(&valid()).is_ok());
    }

    #[test]
    fn test_missing_source_id() {
        let mut m = valid();
        m.remove("source_id");
        let err = validator().validate_and_normalize(&m).unwrap_err();
        assert!(err.to_string().contains("source_id"));
        assert!(matches!(
            err,
            KbError::Governance(GovernanceError::MissingField("source_id"))
        ));
    }

    #[test]
    fn test_missing_fields_reported_in_order() {
        let m = meta(json!({ "evidence_level": "" }));
        let err = validator().validate_and_normalize(&m).unwrap_err();
        assert!(matches!(
            err,
            KbError::Governance(GovernanceError::MissingField("source_id"))
        ));

        let m = meta(json!({ "source_id": "ada-2026-soc", "document_version": null }));
        let err = validator().validate_and_normalize(&m).unwrap_err();
        assert!(matches!(
            err,
            KbError::Governance(GovernanceError::MissingField("document_version"))
        ));

        let m = meta(json!({ "source_id": "ada-2026-soc", "document_version": "1" }));
        let err = validator().validate_and_normalize(&m).unwrap_err();
        assert!(matches!(
            err,
            KbError::Governance(GovernanceError::MissingField("evidence_level"))
        ));
    }

    #[test]
    fn test_bad_source_id_format() {
        let mut m = valid();
        m.insert("source_id".into(), json!("ada_2026"));
        let err = validator().validate_and_normalize(&m).unwrap_err();
        assert!(matches!(
            err,
            KbError::Governance(GovernanceError::InvalidSourceId(_))
        ));
    }

    #[test]
    fn test_unknown_source_id() {
        let mut m = valid();
        m.insert("source_id".into(), json!("unknown-source-id"));
        let err = validator().validate_and_normalize(&m).unwrap_err();
        assert!(err.to_string().contains("Unknown source_id"));
    }

    #[test]
    fn test_format_checked_before_registry() {
        // malformed id must not trigger a registry load
        let v = GovernanceValidator::new(Arc::new(InlineRegistry::new("")));
        let mut m = valid();
        m.insert("source_id".into(), json!("!bad"));
        let err = v.validate_and_normalize(&m).unwrap_err();
        assert!(matches!(err, KbError::Governance(_)));
    }

    #[test]
    fn test_bad_document_version() {
        let mut m = valid();
        m.insert("document_version".into(), json!("v 1"));
        let err = validator().validate_and_normalize(&m).unwrap_err();
        assert!(matches!(
            err,
            KbError::Governance(GovernanceError::InvalidDocumentVersion(_))
        ));
    }

    #[test]
    fn test_version_checked_before_evidence() {
        let mut m = valid();
        m.insert("document_version".into(), json!(".hidden"));
        m.insert("evidence_level".into(), json!("UNKNOWN_LEVEL"));
        let err = validator().validate_and_normalize(&m).unwrap_err();
        assert!(matches!(
            err,
            KbError::Governance(GovernanceError::InvalidDocumentVersion(_))
        ));
    }

    #[test]
    fn test_invalid_evidence_level() {
        let mut m = valid();
        m.insert("evidence_level".into(), json!("UNKNOWN_LEVEL"));
        let err = validator().validate_and_normalize(&m).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Invalid evidence_level"));
        assert!(msg.contains("GUIDELINE_CONSENSUS"));
    }

    #[test]
    fn test_numeric_version_is_stringified() {
        let mut m = valid();
        m.insert("document_version".into(), json!(2026));
        let out = validator().validate_and_normalize(&m).unwrap();
        assert_eq!(out["document_version"], "2026");
    }

    #[test]
    fn test_empty_registry_fails_closed() {
        let v = GovernanceValidator::new(Arc::new(InlineRegistry::new("# nothing here\n")));
        let err = v.validate_and_normalize(&valid()).unwrap_err();
        assert!(matches!(err, KbError::Registry(RegistryError::Empty(_))));
        assert!(err.is_configuration_fault());
    }

    #[test]
    fn test_parse_registry_tolerates_syntax() {
        let text = r#"
sources:
  - source_id: "ada-2026-soc"
    title: ADA Standards of Care
  - source_id: nice-ng136
  -   source_id:   "gold-2026-report"   # trailing comment
  - name: no id here
"#;
        let ids = parse_registry(text);
        let expected: BTreeSet<String> = ["ada-2026-soc", "gold-2026-report", "nice-ng136"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(ids, expected);
    }

    struct CountingRegistry {
        reads: AtomicUsize,
    }

    impl RegistrySource for CountingRegistry {
        fn location(&self) -> String {
            "counting".to_string()
        }

        fn read(&self) -> Result<String, RegistryError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok("source_id: ada-2026-soc".to_string())
        }
    }

    #[test]
    fn test_registry_loaded_once_and_reloaded_after_invalidate() {
        let registry = Arc::new(CountingRegistry {
            reads: AtomicUsize::new(0),
        });
        let v = GovernanceValidator::new(registry.clone());
        v.validate_and_normalize(&valid()).unwrap();
        v.validate_and_normalize(&valid()).unwrap();
        assert_eq!(registry.reads.load(Ordering::SeqCst), 1);

        v.invalidate();
        v.validate_and_normalize(&valid()).unwrap();
        assert_eq!(registry.reads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_evidence_level_from_str() {
        assert_eq!(
            "EXPERT_OPINION".parse::<EvidenceLevel>().unwrap(),
            EvidenceLevel::ExpertOpinion
        );
        assert!("expert_opinion".parse::<EvidenceLevel>().is_err());
    }
}
