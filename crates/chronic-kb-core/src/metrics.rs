//! Classification rules for health metrics.
//!
//! # Blood pressure (mmHg)
//!
//! | Category | Rule (first match wins) |
//! |----------|-------------------------|
//! | `hypotension` | systolic < 90 or diastolic < 60 |
//! | `normal` | systolic ≤ 120 and diastolic ≤ 80 |
//! | `elevated` | systolic ≤ 129 and diastolic ≤ 84 |
//! | `stage1_hypertension` | systolic ≤ 139 or diastolic ≤ 89 |
//! | `stage2_hypertension` | otherwise |
//!
//! # Blood glucose (mg/dL)
//!
//! | Context | hypoglycemia | normal | prediabetes | diabetes |
//! |---------|--------------|--------|-------------|----------|
//! | fasting | < 70 | ≤ 100 | ≤ 125 | > 125 |
//! | postprandial | < 70 | ≤ 140 | ≤ 199 | ≥ 200 |
//! | random | < 70 | ≤ 140 | (inconclusive) | ≥ 200 |
//!
//! A random reading between 141 and 199 cannot be graded on its own and is
//! reported as `unknown`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::models::{MetricRecord, MetricType, PatientSnapshot};

/// Readings above these flag a metric as abnormal when recorded.
pub const ABNORMAL_SYSTOLIC: f64 = 140.0;
pub const ABNORMAL_DIASTOLIC: f64 = 90.0;
pub const ABNORMAL_GLUCOSE: f64 = 180.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BloodPressureCategory {
    Hypotension,
    Normal,
    Elevated,
    Stage1Hypertension,
    Stage2Hypertension,
}

impl BloodPressureCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            BloodPressureCategory::Hypotension => "hypotension",
            BloodPressureCategory::Normal => "normal",
            BloodPressureCategory::Elevated => "elevated",
            BloodPressureCategory::Stage1Hypertension => "stage1_hypertension",
            BloodPressureCategory::Stage2Hypertension => "stage2_hypertension",
        }
    }
}

impl fmt::Display for BloodPressureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn classify_blood_pressure(systolic: u32, diastolic: u32) -> BloodPressureCategory {
    if systolic < 90 || diastolic < 60 {
        BloodPressureCategory::Hypotension
    } else if systolic <= 120 && diastolic <= 80 {
        BloodPressureCategory::Normal
    } else if systolic <= 129 && diastolic <= 84 {
        BloodPressureCategory::Elevated
    } else if systolic <= 139 || diastolic <= 89 {
        BloodPressureCategory::Stage1Hypertension
    } else {
        BloodPressureCategory::Stage2Hypertension
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GlucoseContext {
    Fasting,
    Postprandial,
    #[default]
    Random,
}

impl GlucoseContext {
    pub fn as_str(&self) -> &'static str {
        match self {
            GlucoseContext::Fasting => "fasting",
            GlucoseContext::Postprandial => "postprandial",
            GlucoseContext::Random => "random",
        }
    }
}

impl FromStr for GlucoseContext {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fasting" => Ok(GlucoseContext::Fasting),
            "postprandial" | "after_meal" => Ok(GlucoseContext::Postprandial),
            "random" => Ok(GlucoseContext::Random),
            other => Err(format!(
                "unknown glucose context '{}': expected fasting, postprandial or random",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GlucoseCategory {
    Hypoglycemia,
    Normal,
    Prediabetes,
    Diabetes,
    Unknown,
}

impl GlucoseCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            GlucoseCategory::Hypoglycemia => "hypoglycemia",
            GlucoseCategory::Normal => "normal",
            GlucoseCategory::Prediabetes => "prediabetes",
            GlucoseCategory::Diabetes => "diabetes",
            GlucoseCategory::Unknown => "unknown",
        }
    }
}

impl fmt::Display for GlucoseCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn classify_glucose(value: f64, context: GlucoseContext) -> GlucoseCategory {
    if value < 70.0 {
        return GlucoseCategory::Hypoglycemia;
    }
    match context {
        GlucoseContext::Fasting => {
            if value <= 100.0 {
                GlucoseCategory::Normal
            } else if value <= 125.0 {
                GlucoseCategory::Prediabetes
            } else {
                GlucoseCategory::Diabetes
            }
        }
        GlucoseContext::Postprandial => {
            if value <= 140.0 {
                GlucoseCategory::Normal
            } else if value < 200.0 {
                GlucoseCategory::Prediabetes
            } else {
                GlucoseCategory::Diabetes
            }
        }
        GlucoseContext::Random => {
            if value <= 140.0 {
                GlucoseCategory::Normal
            } else if value < 200.0 {
                GlucoseCategory::Unknown
            } else {
                GlucoseCategory::Diabetes
            }
        }
    }
}

/// Whether a freshly recorded metric should be flagged.
///
/// Only blood pressure and glucose have alert thresholds; other metric
/// types are never flagged.
pub fn is_abnormal(metric: &MetricRecord) -> bool {
    match metric.metric_type {
        MetricType::BloodPressure => {
            metric.number("systolic").unwrap_or(0.0) > ABNORMAL_SYSTOLIC
                || metric.number("diastolic").unwrap_or(0.0) > ABNORMAL_DIASTOLIC
        }
        MetricType::BloodGlucose => metric.number("value").unwrap_or(0.0) > ABNORMAL_GLUCOSE,
        _ => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RiskLevel::Low => "low",
            RiskLevel::Moderate => "moderate",
            RiskLevel::High => "high",
        })
    }
}

/// Overall risk from the condition list and the flagged share of the
/// recent metrics (callers pass at most the last 10).
pub fn risk_level(patient: &PatientSnapshot, recent: &[MetricRecord]) -> RiskLevel {
    let conditions = patient.chronic_conditions.len();
    let abnormal = recent.iter().filter(|m| m.is_abnormal).count();
    if conditions > 2 || abnormal > 3 {
        RiskLevel::High
    } else if conditions > 0 || abnormal > 0 {
        RiskLevel::Moderate
    } else {
        RiskLevel::Low
    }
}
