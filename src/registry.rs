//! File-backed source registry.
//!
//! The registry is a line-oriented YAML-ish file maintained outside the
//! program. Only `source_id: "<slug>"` declarations matter; everything else
//! in the file (titles, publishers, comments) is ignored:
//!
//! ```yaml
//! sources:
//!   - source_id: "ada-2026-soc"
//!     title: "ADA Standards of Care in Diabetes 2026"
//!   - source_id: "nice-ng136"
//! ```
//!
//! Reading happens lazily through
//! [`GovernanceValidator`](chronic_kb_core::governance::GovernanceValidator),
//! which caches the parsed set.

use std::path::{Path, PathBuf};

use chronic_kb_core::error::RegistryError;
use chronic_kb_core::governance::RegistrySource;

#[derive(Debug, Clone)]
pub struct FileRegistry {
    path: PathBuf,
}

impl FileRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RegistrySource for FileRegistry {
    fn location(&self) -> String {
        self.path.display().to_string()
    }

    fn read(&self) -> Result<String, RegistryError> {
        std::fs::read_to_string(&self.path).map_err(|e| RegistryError::Unreadable {
            location: self.location(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronic_kb_core::governance::GovernanceValidator;
    use chronic_kb_core::KbError;
    use serde_json::json;
    use std::sync::Arc;

    fn metadata() -> chronic_kb_core::models::Metadata {
        json!({
            "source_id": "nice-ng136",
            "document_version": "NG136",
            "evidence_level": "guideline_consensus"
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    #[test]
    fn test_reads_registry_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("source_registry.yaml");
        std::fs::write(
            &path,
            "sources:\n  - source_id: \"nice-ng136\"\n    title: NICE NG136\n",
        )
        .unwrap();

        let validator = GovernanceValidator::new(Arc::new(FileRegistry::new(&path)));
        let out = validator.validate_and_normalize(&metadata()).unwrap();
        assert_eq!(out["evidence_level"], "GUIDELINE_CONSENSUS");
    }

    #[test]
    fn test_missing_file_is_configuration_fault() {
        let dir = tempfile::tempdir().unwrap();
        let validator = GovernanceValidator::new(Arc::new(FileRegistry::new(
            dir.path().join("absent.yaml"),
        )));
        let err = validator.validate_and_normalize(&metadata()).unwrap_err();
        assert!(matches!(
            err,
            KbError::Registry(RegistryError::Unreadable { .. })
        ));
        assert!(err.is_configuration_fault());
    }

    #[test]
    fn test_shipped_registry_parses() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("data/sources/source_registry.yaml");
        let text = FileRegistry::new(path).read().unwrap();
        let ids = chronic_kb_core::governance::parse_registry(&text);
        assert!(ids.contains("ada-2026-soc"));
        assert!(ids.contains("guideline-consensus-global"));
    }
}
