// src/envelope.rs
//! Result envelope returned to callers and stored in the cache.
//! Serialized in camelCase for the dashboard badges/panels.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::discrepancy::Discrepancy;
use crate::normalize::NormalizedRecord;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEnvelope {
    pub data: Vec<NormalizedRecord>,
    pub metadata: EnvelopeMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeMetadata {
    /// Winning provider id.
    pub source: String,
    pub reliability: f64,
    pub fetched_at: DateTime<Utc>,
    pub validation: Option<ValidationReport>,
    pub cached: bool,
    #[serde(default)]
    pub dropped_records: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    /// In `[0.0, 1.0]`.
    pub confidence_score: f64,
    pub discrepancies: Vec<Discrepancy>,
    pub source_switch: Option<SourceSwitch>,
    /// Provider the winner was cross-checked against, if any.
    #[serde(default)]
    pub compared_with: Option<String>,
    #[serde(default)]
    pub joined_records: usize,
    #[serde(default)]
    pub unmatched_records: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSwitch {
    pub from: String,
    pub to: String,
    pub reason: SwitchReason,
}

/// Controlled vocabulary for why a primary provider was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchReason {
    IntegrityCheckFailed,
    GovernmentDataConflicts,
    SourceUnavailable,
}

impl SwitchReason {
    pub fn as_str(self) -> &'static str {
        match self {
            SwitchReason::IntegrityCheckFailed => "integrity_check_failed",
            SwitchReason::GovernmentDataConflicts => "government_data_conflicts",
            SwitchReason::SourceUnavailable => "source_unavailable",
        }
    }
}

impl std::fmt::Display for SwitchReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn metadata_shape_is_camel_case() {
        let meta = EnvelopeMetadata {
            source: "kff".into(),
            reliability: 0.88,
            fetched_at: "2025-01-02T03:04:05Z".parse().unwrap(),
            validation: Some(ValidationReport {
                confidence_score: 0.88,
                discrepancies: vec![],
                source_switch: Some(SourceSwitch {
                    from: "cdc".into(),
                    to: "kff".into(),
                    reason: SwitchReason::GovernmentDataConflicts,
                }),
                compared_with: Some("cdc".into()),
                joined_records: 1,
                unmatched_records: 0,
            }),
            cached: false,
            dropped_records: 0,
        };
        let v = serde_json::to_value(&meta).unwrap();
        assert_eq!(v["fetchedAt"], json!("2025-01-02T03:04:05Z"));
        assert_eq!(v["validation"]["confidenceScore"], json!(0.88));
        assert_eq!(
            v["validation"]["sourceSwitch"]["reason"],
            json!("government_data_conflicts")
        );
        assert_eq!(v["cached"], json!(false));
    }
}
