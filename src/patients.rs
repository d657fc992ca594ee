//! Patient snapshot and metric lookup.
//!
//! The agents never own patient records. They receive read-only
//! [`PatientSnapshot`]s and recent [`MetricRecord`]s from a
//! [`PatientDirectory`], and a request without a patient is a fully
//! supported mode.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use uuid::Uuid;

use chronic_kb_core::metrics::{self, RiskLevel};
use chronic_kb_core::models::{MetricRecord, PatientSnapshot};
use chronic_kb_core::{KbError, Result};

/// Metrics considered by [`InMemoryPatientDirectory::risk_level`].
pub const RISK_WINDOW: usize = 10;

pub trait PatientDirectory: Send + Sync {
    fn patient(&self, id: &str) -> Option<PatientSnapshot>;

    /// The most recent `limit` metrics for `id`, oldest first.
    fn recent_metrics(&self, id: &str, limit: usize) -> Vec<MetricRecord>;
}

#[derive(Default)]
pub struct InMemoryPatientDirectory {
    patients: RwLock<HashMap<String, PatientSnapshot>>,
    metrics: RwLock<HashMap<String, Vec<MetricRecord>>>,
}

impl InMemoryPatientDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a patient.
    pub fn add_patient(&self, patient: PatientSnapshot) {
        let mut patients = self.patients.write().unwrap_or_else(PoisonError::into_inner);
        patients.insert(patient.id.clone(), patient);
    }

    /// Store a metric for a known patient, assigning an id and the
    /// abnormal flag.
    pub fn record_metric(&self, patient_id: &str, mut metric: MetricRecord) -> Result<MetricRecord> {
        if self.patient(patient_id).is_none() {
            return Err(KbError::NotFound(format!("patient {}", patient_id)));
        }

        metric.id = Uuid::new_v4().to_string();
        metric.patient_id = patient_id.to_string();
        metric.is_abnormal = metrics::is_abnormal(&metric);
        if metric.is_abnormal {
            tracing::warn!(patient_id, metric = %metric, "abnormal reading recorded");
        }

        let mut all = self.metrics.write().unwrap_or_else(PoisonError::into_inner);
        let series = all.entry(patient_id.to_string()).or_default();
        series.push(metric.clone());
        series.sort_by_key(|m| m.timestamp);
        Ok(metric)
    }

    pub fn risk_level(&self, patient_id: &str) -> Result<RiskLevel> {
        let patient = self
            .patient(patient_id)
            .ok_or_else(|| KbError::NotFound(format!("patient {}", patient_id)))?;
        let recent = self.recent_metrics(patient_id, RISK_WINDOW);
        Ok(metrics::risk_level(&patient, &recent))
    }
}

impl PatientDirectory for InMemoryPatientDirectory {
    fn patient(&self, id: &str) -> Option<PatientSnapshot> {
        self.patients
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    fn recent_metrics(&self, id: &str, limit: usize) -> Vec<MetricRecord> {
        let all = self.metrics.read().unwrap_or_else(PoisonError::into_inner);
        all.get(id)
            .map(|series| series[series.len().saturating_sub(limit)..].to_vec())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use chronic_kb_core::models::{Gender, Metadata, MetricType};
    use serde_json::json;

    fn patient(conditions: &[&str]) -> PatientSnapshot {
        PatientSnapshot {
            id: "p1".to_string(),
            name: "Li Wei".to_string(),
            age: 64,
            gender: Gender::Male,
            chronic_conditions: conditions.iter().map(|c| c.to_string()).collect(),
            allergies: vec![],
            current_medications: vec![],
        }
    }

    fn reading(metric_type: MetricType, value: serde_json::Value, minutes_ago: i64) -> MetricRecord {
        let value: Metadata = value.as_object().cloned().unwrap();
        MetricRecord {
            id: String::new(),
            patient_id: String::new(),
            metric_type,
            value,
            unit: "mmHg".to_string(),
            timestamp: Utc::now() - Duration::minutes(minutes_ago),
            context: None,
            notes: None,
            is_abnormal: false,
        }
    }

    fn bp(systolic: u32, diastolic: u32, minutes_ago: i64) -> MetricRecord {
        reading(
            MetricType::BloodPressure,
            json!({ "systolic": systolic, "diastolic": diastolic }),
            minutes_ago,
        )
    }

    #[test]
    fn test_record_metric_flags_abnormal() {
        let dir = InMemoryPatientDirectory::new();
        dir.add_patient(patient(&[]));

        let normal = dir.record_metric("p1", bp(120, 80, 5)).unwrap();
        assert!(!normal.is_abnormal);
        assert_eq!(normal.patient_id, "p1");
        assert!(!normal.id.is_empty());

        let high = dir.record_metric("p1", bp(150, 85, 1)).unwrap();
        assert!(high.is_abnormal);

        let glucose = reading(MetricType::BloodGlucose, json!({ "value": 210 }), 0);
        assert!(dir.record_metric("p1", glucose).unwrap().is_abnormal);
    }

    #[test]
    fn test_unknown_patient_is_not_found() {
        let dir = InMemoryPatientDirectory::new();
        assert!(matches!(
            dir.record_metric("ghost", bp(120, 80, 0)),
            Err(KbError::NotFound(_))
        ));
        assert!(matches!(dir.risk_level("ghost"), Err(KbError::NotFound(_))));
        assert!(dir.patient("ghost").is_none());
    }

    #[test]
    fn test_recent_metrics_are_chronological() {
        let dir = InMemoryPatientDirectory::new();
        dir.add_patient(patient(&[]));
        for (i, systolic) in [118, 122, 126, 130].into_iter().enumerate() {
            // recorded out of order on purpose
            let minutes_ago = if i % 2 == 0 { 10 + i as i64 } else { i as i64 };
            dir.record_metric("p1", bp(systolic, 80, minutes_ago)).unwrap();
        }
        let recent = dir.recent_metrics("p1", 2);
        assert_eq!(recent.len(), 2);
        assert!(recent[0].timestamp <= recent[1].timestamp);
        assert_eq!(recent[0].number("systolic"), Some(130.0));
        assert_eq!(recent[1].number("systolic"), Some(122.0));
    }

    #[test]
    fn test_risk_levels() {
        let dir = InMemoryPatientDirectory::new();
        dir.add_patient(patient(&[]));
        assert_eq!(dir.risk_level("p1").unwrap(), RiskLevel::Low);

        dir.record_metric("p1", bp(160, 100, 1)).unwrap();
        assert_eq!(dir.risk_level("p1").unwrap(), RiskLevel::Moderate);

        dir.add_patient(patient(&["diabetes", "hypertension", "ckd"]));
        assert_eq!(dir.risk_level("p1").unwrap(), RiskLevel::High);
    }
}
