//! Discrepancy detector: cross-checks two normalized datasets for the same
//! category and reports joined rows whose values diverge beyond a threshold.
//!
//! Join key: `(category, period)`, plus `demographicSegment` when both sides
//! carry one, plus `location` when both sides carry a real (non-defaulted)
//! location. Each record joins at most once. Rows present on one side only
//! are counted as unmatched, never reported as discrepancies.

use serde::{Deserialize, Serialize};

use crate::normalize::NormalizedRecord;

pub const DEFAULT_THRESHOLD_PCT: f64 = 15.0;

/// Guards the ratio base against zero.
const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Discrepancy {
    pub field: String,
    pub period: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub demographic_segment: Option<String>,
    pub primary_value: f64,
    pub comparison_value: f64,
    pub percent_difference: f64,
    pub primary_source: String,
    pub comparison_source: String,
}

/// Outcome of one comparison.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Comparison {
    pub discrepancies: Vec<Discrepancy>,
    pub joined: usize,
    pub unmatched: usize,
}

impl Comparison {
    pub fn has_discrepancies(&self) -> bool {
        !self.discrepancies.is_empty()
    }

    /// Fraction of joined rows above threshold; 0 when nothing joined.
    pub fn discrepancy_rate(&self) -> f64 {
        if self.joined == 0 {
            0.0
        } else {
            self.discrepancies.len() as f64 / self.joined as f64
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiscrepancyDetector {
    threshold_pct: f64,
}

impl Default for DiscrepancyDetector {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD_PCT)
    }
}

impl DiscrepancyDetector {
    /// Non-finite or negative thresholds fall back to the default.
    pub fn new(threshold_pct: f64) -> Self {
        let threshold_pct = if threshold_pct.is_finite() && threshold_pct >= 0.0 {
            threshold_pct
        } else {
            DEFAULT_THRESHOLD_PCT
        };
        Self { threshold_pct }
    }

    pub fn threshold_pct(&self) -> f64 {
        self.threshold_pct
    }

    pub fn compare(&self, primary: &[NormalizedRecord], secondary: &[NormalizedRecord]) -> Comparison {
        self.compare_field("value", primary, secondary)
    }

    /// Same as [`compare`](Self::compare), labelling discrepancies with `field`.
    pub fn compare_field(
        &self,
        field: &str,
        primary: &[NormalizedRecord],
        secondary: &[NormalizedRecord],
    ) -> Comparison {
        let mut used = vec![false; secondary.len()];
        let mut out = Comparison::default();

        for p in primary {
            let partner = secondary
                .iter()
                .enumerate()
                .find(|(i, s)| !used[*i] && joinable(p, s));
            let Some((idx, s)) = partner else {
                out.unmatched += 1;
                continue;
            };
            used[idx] = true;
            out.joined += 1;

            let pct = percent_difference(p.value, s.value);
            if pct > self.threshold_pct {
                out.discrepancies.push(Discrepancy {
                    field: field.to_string(),
                    period: p.period.clone(),
                    demographic_segment: p
                        .demographic_segment
                        .clone()
                        .or_else(|| s.demographic_segment.clone()),
                    primary_value: p.value,
                    comparison_value: s.value,
                    percent_difference: pct,
                    primary_source: p.source_provider_id.clone(),
                    comparison_source: s.source_provider_id.clone(),
                });
            }
        }

        out.unmatched += used.iter().filter(|u| !**u).count();
        out
    }
}

/// `|a - b| / max(min(|a|, |b|), ε) * 100`. Symmetric in its arguments.
pub fn percent_difference(a: f64, b: f64) -> f64 {
    let base = a.abs().min(b.abs()).max(EPSILON);
    (a - b).abs() * 100.0 / base
}

fn joinable(p: &NormalizedRecord, s: &NormalizedRecord) -> bool {
    if p.category != s.category || !p.period.eq_ignore_ascii_case(&s.period) {
        return false;
    }
    let segment_ok = match (&p.demographic_segment, &s.demographic_segment) {
        (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
        _ => true,
    };
    let location_ok = p.location_defaulted()
        || s.location_defaulted()
        || p.location.eq_ignore_ascii_case(&s.location);
    segment_ok && location_ok
}
