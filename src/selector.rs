//! Source selector: decides which provider's data to trust for one request.
//!
//! The selector is a step-driven state machine with no I/O of its own. The
//! driver asks [`Selector::next_step`] what to do, performs the fetch it is told
//! to, and hands the normalized result back through [`Selector::record_result`].
//! [`decide_with`] is a synchronous driver over a plain closure.
//!
//! ```text
//! Evaluating ──► UsePrimary
//!            ├─► UseFallbackBySwitch   (integrity flag / cross-source conflict)
//!            ├─► UseFallbackByError    (unavailable / transport / schema / empty)
//!            └─► AllSourcesExhausted
//! ```

use serde::Serialize;

use crate::discrepancy::{Comparison, DiscrepancyDetector};
use crate::envelope::{SourceSwitch, SwitchReason};
use crate::error::{FailedAttempt, ProviderError};
use crate::normalize::NormalizedBatch;
use crate::registry::ProviderDescriptor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectorState {
    Evaluating,
    UsePrimary,
    UseFallbackBySwitch,
    UseFallbackByError,
    AllSourcesExhausted,
}

#[derive(Debug, Clone)]
pub struct SelectionPolicy {
    /// Watch-listed categories are always cross-checked against a second provider.
    pub watch_listed: bool,
    pub detector: DiscrepancyDetector,
    /// Label for the value field in discrepancy reports.
    pub field: String,
}

impl SelectionPolicy {
    pub fn new(watch_listed: bool, detector: DiscrepancyDetector, field: &str) -> Self {
        Self {
            watch_listed,
            detector,
            field: field.to_string(),
        }
    }
}

/// Cross-check performed before finalizing.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonOutcome {
    /// The provider the winner was compared with.
    pub provider_id: String,
    pub comparison: Comparison,
}

#[derive(Debug, Clone)]
pub struct Decision {
    pub state: SelectorState,
    pub chosen: ProviderDescriptor,
    pub batch: NormalizedBatch,
    pub comparison: Option<ComparisonOutcome>,
    pub source_switch: Option<SourceSwitch>,
}

#[derive(Debug, Clone)]
pub enum Step {
    Fetch(String),
    Done(Box<Decision>),
    Exhausted(Vec<FailedAttempt>),
}

#[derive(Debug)]
enum Phase {
    FindSubject,
    AwaitSubject(usize),
    FindComparison {
        subject: usize,
        batch: NormalizedBatch,
    },
    AwaitComparison {
        subject: usize,
        batch: NormalizedBatch,
        against: usize,
    },
    Done(Box<Decision>),
    Exhausted,
}

#[derive(Debug)]
pub struct Selector {
    candidates: Vec<ProviderDescriptor>,
    policy: SelectionPolicy,
    /// Next candidate index not yet considered.
    cursor: usize,
    phase: Phase,
    /// Most recent subject rejection: (provider id, reason).
    last_rejection: Option<(String, SwitchReason)>,
    attempts: Vec<FailedAttempt>,
}

impl Selector {
    /// `candidates` must already be in preference order.
    pub fn new(candidates: Vec<ProviderDescriptor>, policy: SelectionPolicy) -> Self {
        Self {
            candidates,
            policy,
            cursor: 0,
            phase: Phase::FindSubject,
            last_rejection: None,
            attempts: Vec::new(),
        }
    }

    pub fn state(&self) -> SelectorState {
        match &self.phase {
            Phase::Done(d) => d.state,
            Phase::Exhausted => SelectorState::AllSourcesExhausted,
            _ => SelectorState::Evaluating,
        }
    }

    pub fn attempts(&self) -> &[FailedAttempt] {
        &self.attempts
    }

    pub fn next_step(&mut self) -> Step {
        loop {
            match std::mem::replace(&mut self.phase, Phase::Exhausted) {
                Phase::FindSubject => match self.next_eligible(true) {
                    Some(i) => self.phase = Phase::AwaitSubject(i),
                    None => {
                        tracing::warn!(attempts = self.attempts.len(), "all sources exhausted");
                        return Step::Exhausted(self.attempts.clone());
                    }
                },
                Phase::AwaitSubject(i) => {
                    self.phase = Phase::AwaitSubject(i);
                    return Step::Fetch(self.candidates[i].id.clone());
                }
                Phase::FindComparison { subject, batch } => match self.next_eligible(false) {
                    Some(against) => {
                        self.phase = Phase::AwaitComparison {
                            subject,
                            batch,
                            against,
                        }
                    }
                    None => {
                        tracing::warn!(
                            provider = %self.candidates[subject].id,
                            "no comparison source available; accepting without cross-check"
                        );
                        self.phase = Phase::Done(Box::new(self.finish(subject, batch, None)));
                    }
                },
                Phase::AwaitComparison {
                    subject,
                    batch,
                    against,
                } => {
                    let id = self.candidates[against].id.clone();
                    self.phase = Phase::AwaitComparison {
                        subject,
                        batch,
                        against,
                    };
                    return Step::Fetch(id);
                }
                Phase::Done(d) => {
                    let step = Step::Done(d.clone());
                    self.phase = Phase::Done(d);
                    return step;
                }
                Phase::Exhausted => return Step::Exhausted(self.attempts.clone()),
            }
        }
    }

    /// Feed the outcome of the fetch requested by the last [`Step::Fetch`].
    /// Results for any other provider are ignored.
    pub fn record_result(&mut self, provider_id: &str, result: Result<NormalizedBatch, ProviderError>) {
        let result = result.and_then(|b| {
            if b.is_empty() {
                Err(ProviderError::Empty {
                    provider: provider_id.to_string(),
                })
            } else {
                Ok(b)
            }
        });

        match std::mem::replace(&mut self.phase, Phase::Exhausted) {
            Phase::AwaitSubject(i) if self.candidates[i].id == provider_id => match result {
                // Only the top-ranked candidate is cross-checked; a fallback
                // subject is already the answer to the primary's rejection.
                Ok(batch) if self.policy.watch_listed && self.last_rejection.is_none() => {
                    self.phase = Phase::FindComparison { subject: i, batch };
                }
                Ok(batch) => {
                    self.phase = Phase::Done(Box::new(self.finish(i, batch, None)));
                }
                Err(e) => {
                    tracing::warn!(provider = provider_id, error = %e, "primary fetch failed; falling back");
                    self.reject(i, SwitchReason::SourceUnavailable, e.to_string());
                    self.phase = Phase::FindSubject;
                }
            },
            Phase::AwaitComparison {
                subject,
                batch,
                against,
            } if self.candidates[against].id == provider_id => match result {
                Ok(other) => {
                    let comparison =
                        self.policy
                            .detector
                            .compare_field(&self.policy.field, &batch.records, &other.records);
                    let decision = if comparison.has_discrepancies() {
                        tracing::warn!(
                            rejected = %self.candidates[subject].id,
                            chosen = provider_id,
                            discrepancies = comparison.discrepancies.len(),
                            joined = comparison.joined,
                            "cross-source conflict above threshold; switching source"
                        );
                        self.last_rejection = Some((
                            self.candidates[subject].id.clone(),
                            SwitchReason::GovernmentDataConflicts,
                        ));
                        let compared = ComparisonOutcome {
                            provider_id: self.candidates[subject].id.clone(),
                            comparison,
                        };
                        self.finish(against, other, Some(compared))
                    } else {
                        let compared = ComparisonOutcome {
                            provider_id: provider_id.to_string(),
                            comparison,
                        };
                        self.finish(subject, batch, Some(compared))
                    };
                    self.phase = Phase::Done(Box::new(decision));
                }
                Err(e) => {
                    tracing::warn!(provider = provider_id, error = %e, "comparison fetch failed");
                    self.attempts.push(FailedAttempt {
                        provider_id: provider_id.to_string(),
                        reason: e.to_string(),
                    });
                    self.phase = Phase::FindComparison { subject, batch };
                }
            },
            other => {
                tracing::debug!(provider = provider_id, "ignoring unrequested fetch result");
                self.phase = other;
            }
        }
    }

    /// Advance the cursor to the next usable candidate. Skipped subjects are
    /// recorded as rejections; skipped comparison sources are not.
    fn next_eligible(&mut self, as_subject: bool) -> Option<usize> {
        while self.cursor < self.candidates.len() {
            let i = self.cursor;
            self.cursor += 1;
            let c = &self.candidates[i];

            let skip = if !c.available {
                Some((SwitchReason::SourceUnavailable, "provider marked unavailable"))
            } else if self.policy.watch_listed && c.integrity_verified == Some(false) {
                Some((SwitchReason::IntegrityCheckFailed, "integrity not verified"))
            } else {
                None
            };

            match skip {
                None => return Some(i),
                Some((reason, why)) if as_subject => self.reject(i, reason, why.to_string()),
                Some((_, why)) => {
                    tracing::debug!(provider = %c.id, why, "skipping comparison candidate")
                }
            }
        }
        None
    }

    fn reject(&mut self, i: usize, reason: SwitchReason, detail: String) {
        let id = self.candidates[i].id.clone();
        tracing::info!(provider = %id, %reason, "rejecting candidate");
        self.attempts.push(FailedAttempt {
            provider_id: id.clone(),
            reason: format!("{reason}: {detail}"),
        });
        self.last_rejection = Some((id, reason));
    }

    fn finish(
        &self,
        chosen: usize,
        batch: NormalizedBatch,
        comparison: Option<ComparisonOutcome>,
    ) -> Decision {
        let (state, source_switch) = match (&self.last_rejection, chosen) {
            (None, _) | (_, 0) => (SelectorState::UsePrimary, None),
            (Some((from, reason)), _) => {
                let state = match reason {
                    SwitchReason::SourceUnavailable => SelectorState::UseFallbackByError,
                    SwitchReason::IntegrityCheckFailed | SwitchReason::GovernmentDataConflicts => {
                        SelectorState::UseFallbackBySwitch
                    }
                };
                let switch = SourceSwitch {
                    from: from.clone(),
                    to: self.candidates[chosen].id.clone(),
                    reason: *reason,
                };
                (state, Some(switch))
            }
        };

        tracing::info!(
            chosen = %self.candidates[chosen].id,
            state = ?state,
            compared = comparison.is_some(),
            "source selected"
        );

        Decision {
            state,
            chosen: self.candidates[chosen].clone(),
            batch,
            comparison,
            source_switch,
        }
    }
}

/// Drive a selector to completion with a synchronous fetch function.
pub fn decide_with<F>(
    candidates: Vec<ProviderDescriptor>,
    policy: SelectionPolicy,
    mut fetch: F,
) -> Result<Decision, Vec<FailedAttempt>>
where
    F: FnMut(&str) -> Result<NormalizedBatch, ProviderError>,
{
    let mut sel = Selector::new(candidates, policy);
    loop {
        match sel.next_step() {
            Step::Fetch(id) => {
                let res = fetch(&id);
                sel.record_result(&id, res);
            }
            Step::Done(d) => return Ok(*d),
            Step::Exhausted(attempts) => return Err(attempts),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::NormalizedRecord;
    use crate::registry::TrustTier;
    use std::collections::HashMap;

    fn gov(id: &str, rel: f64) -> ProviderDescriptor {
        ProviderDescriptor::new(id, id, TrustTier::Government, rel, &["lgbtq-health"])
    }

    fn alt(id: &str, rel: f64) -> ProviderDescriptor {
        ProviderDescriptor::new(id, id, TrustTier::Alternative, rel, &["lgbtq-health"])
    }

    fn batch(provider: &str, rows: &[(&str, f64)]) -> NormalizedBatch {
        NormalizedBatch {
            records: rows
                .iter()
                .map(|(period, value)| NormalizedRecord {
                    location: "United States".into(),
                    value: *value,
                    category: "lgbtq-health".into(),
                    period: period.to_string(),
                    demographic_segment: None,
                    source_provider_id: provider.into(),
                    was_defaulted: false,
                    defaulted_fields: vec![],
                })
                .collect(),
            dropped: 0,
        }
    }

    fn policy(watch_listed: bool) -> SelectionPolicy {
        SelectionPolicy::new(watch_listed, DiscrepancyDetector::default(), "lgbtqHealthcareAccess")
    }

    type Table = HashMap<&'static str, Result<Vec<(&'static str, f64)>, ()>>;

    /// Returns the decision and the ids fetched, in order.
    fn run(
        candidates: Vec<ProviderDescriptor>,
        watch_listed: bool,
        table: Table,
    ) -> (Result<Decision, Vec<FailedAttempt>>, Vec<String>) {
        let mut calls = Vec::new();
        let out = decide_with(candidates, policy(watch_listed), |id| {
            calls.push(id.to_string());
            match table.get(id) {
                Some(Ok(rows)) => Ok(batch(id, rows)),
                _ => Err(ProviderError::transport(id, "connection refused")),
            }
        });
        (out, calls)
    }

    #[test]
    fn unwatched_primary_is_used_without_comparison() {
        let table = Table::from([("gov", Ok(vec![("2024", 10.0)])), ("alt", Ok(vec![("2024", 99.0)]))]);
        let (d, calls) = run(vec![gov("gov", 0.9), alt("alt", 0.8)], false, table);
        let d = d.unwrap();
        assert_eq!(d.state, SelectorState::UsePrimary);
        assert_eq!(d.chosen.id, "gov");
        assert!(d.comparison.is_none());
        assert!(d.source_switch.is_none());
        assert_eq!(calls, vec!["gov"]);
    }

    #[test]
    fn watched_agreement_keeps_primary() {
        let table = Table::from([("gov", Ok(vec![("2024", 70.0)])), ("alt", Ok(vec![("2024", 69.0)]))]);
        let (d, calls) = run(vec![gov("gov", 0.9), alt("alt", 0.8)], true, table);
        let d = d.unwrap();
        assert_eq!(d.state, SelectorState::UsePrimary);
        assert_eq!(d.chosen.id, "gov");
        assert!(d.source_switch.is_none());
        let cmp = d.comparison.unwrap();
        assert_eq!(cmp.provider_id, "alt");
        assert_eq!(cmp.comparison.joined, 1);
        assert_eq!(calls, vec!["gov", "alt"]);
    }

    #[test]
    fn watched_conflict_switches_to_comparison_source() {
        let table = Table::from([
            ("gov", Ok(vec![("2023", 70.0), ("2024", 85.0)])),
            ("alt", Ok(vec![("2023", 70.0), ("2024", 69.0)])),
        ]);
        let (d, _) = run(vec![gov("gov", 0.9), alt("alt", 0.8)], true, table);
        let d = d.unwrap();
        assert_eq!(d.state, SelectorState::UseFallbackBySwitch);
        assert_eq!(d.chosen.id, "alt");
        assert_eq!(
            d.source_switch,
            Some(SourceSwitch {
                from: "gov".into(),
                to: "alt".into(),
                reason: SwitchReason::GovernmentDataConflicts,
            })
        );
        assert!(d.batch.records.iter().all(|r| r.source_provider_id == "alt"));
        let cmp = d.comparison.unwrap();
        assert_eq!(cmp.provider_id, "gov");
        assert_eq!(cmp.comparison.discrepancies.len(), 1);
    }

    #[test]
    fn primary_error_falls_back_without_comparison_when_unwatched() {
        let table = Table::from([("gov", Err(())), ("alt", Ok(vec![("2024", 1.0)]))]);
        let (d, calls) = run(vec![gov("gov", 0.9), alt("alt", 0.8)], false, table);
        let d = d.unwrap();
        assert_eq!(d.state, SelectorState::UseFallbackByError);
        assert_eq!(d.chosen.id, "alt");
        assert_eq!(d.source_switch.unwrap().reason, SwitchReason::SourceUnavailable);
        assert_eq!(calls, vec!["gov", "alt"]);
    }

    #[test]
    fn unavailable_primary_is_skipped_without_fetch() {
        let table = Table::from([("alt", Ok(vec![("2024", 1.0)]))]);
        let (d, calls) = run(vec![gov("gov", 0.9).unavailable(), alt("alt", 0.8)], false, table);
        let d = d.unwrap();
        assert_eq!(d.state, SelectorState::UseFallbackByError);
        assert_eq!(calls, vec!["alt"]);
    }

    #[test]
    fn unverified_integrity_on_watched_category_is_skipped() {
        let table = Table::from([
            ("gov", Ok(vec![("2024", 1.0)])),
            ("alt", Ok(vec![("2024", 5.0)])),
            ("alt2", Ok(vec![("2024", 5.0)])),
        ]);
        let cands = vec![gov("gov", 0.9).with_integrity(false), alt("alt", 0.8), alt("alt2", 0.7)];
        let (d, calls) = run(cands, true, table);
        let d = d.unwrap();
        assert_eq!(d.state, SelectorState::UseFallbackBySwitch);
        assert_eq!(d.chosen.id, "alt");
        assert!(d.comparison.is_none());
        assert_eq!(
            d.source_switch,
            Some(SourceSwitch {
                from: "gov".into(),
                to: "alt".into(),
                reason: SwitchReason::IntegrityCheckFailed,
            })
        );
        assert_eq!(calls, vec!["alt"]);
    }

    #[test]
    fn fallback_subject_on_watched_category_is_not_cross_checked() {
        let table = Table::from([
            ("alt", Ok(vec![("2024", 85.0)])),
            ("alt2", Ok(vec![("2024", 69.0)])),
        ]);
        let cands = vec![gov("gov", 0.9).unavailable(), alt("alt", 0.8), alt("alt2", 0.7)];
        let (d, calls) = run(cands, true, table);
        let d = d.unwrap();
        assert_eq!(d.state, SelectorState::UseFallbackByError);
        assert_eq!(d.chosen.id, "alt");
        assert!(d.comparison.is_none());
        assert_eq!(
            d.source_switch,
            Some(SourceSwitch {
                from: "gov".into(),
                to: "alt".into(),
                reason: SwitchReason::SourceUnavailable,
            })
        );
        assert_eq!(calls, vec!["alt"]);
    }

    #[test]
    fn primary_fetch_error_on_watched_category_skips_comparison() {
        let table = Table::from([
            ("gov", Err(())),
            ("alt", Ok(vec![("2024", 85.0)])),
            ("alt2", Ok(vec![("2024", 69.0)])),
        ]);
        let (d, calls) = run(vec![gov("gov", 0.9), alt("alt", 0.8), alt("alt2", 0.7)], true, table);
        let d = d.unwrap();
        assert_eq!(d.chosen.id, "alt");
        assert_eq!(d.source_switch.unwrap().from, "gov");
        assert_eq!(calls, vec!["gov", "alt"]);
    }

    #[test]
    fn unverified_integrity_is_ignored_for_unwatched_category() {
        let table = Table::from([("gov", Ok(vec![("2024", 1.0)]))]);
        let (d, _) = run(vec![gov("gov", 0.9).with_integrity(false)], false, table);
        assert_eq!(d.unwrap().state, SelectorState::UsePrimary);
    }

    #[test]
    fn comparison_failure_tries_next_then_accepts_subject() {
        let table = Table::from([("gov", Ok(vec![("2024", 10.0)])), ("alt", Err(()))]);
        let (d, calls) = run(vec![gov("gov", 0.9), alt("alt", 0.8)], true, table);
        let d = d.unwrap();
        assert_eq!(d.state, SelectorState::UsePrimary);
        assert!(d.comparison.is_none());
        assert_eq!(calls, vec!["gov", "alt"]);
    }

    #[test]
    fn empty_response_counts_as_failure() {
        let table = Table::from([("gov", Ok(vec![])), ("alt", Ok(vec![("2024", 3.0)]))]);
        let (d, _) = run(vec![gov("gov", 0.9), alt("alt", 0.8)], false, table);
        assert_eq!(d.unwrap().chosen.id, "alt");
    }

    #[test]
    fn every_candidate_failing_is_exhausted() {
        let table = Table::from([("gov", Err(()))]);
        let (d, calls) = run(vec![gov("gov", 0.9), alt("alt", 0.8).unavailable()], false, table);
        let attempts = d.unwrap_err();
        assert_eq!(attempts.len(), 2);
        assert_eq!(attempts[0].provider_id, "gov");
        assert!(attempts[1].reason.starts_with("source_unavailable"));
        assert_eq!(calls, vec!["gov"]);
    }

    #[test]
    fn no_candidates_is_exhausted() {
        let (d, calls) = run(vec![], false, Table::new());
        assert!(d.unwrap_err().is_empty());
        assert!(calls.is_empty());
    }

    #[test]
    fn state_tracks_progress_and_ignores_stray_results() {
        let mut sel = Selector::new(vec![gov("gov", 0.9)], policy(false));
        assert_eq!(sel.state(), SelectorState::Evaluating);
        let Step::Fetch(id) = sel.next_step() else {
            panic!("expected fetch")
        };
        sel.record_result("someone-else", Ok(batch("x", &[("2024", 1.0)])));
        assert_eq!(sel.state(), SelectorState::Evaluating);
        sel.record_result(&id, Ok(batch(&id, &[("2024", 1.0)])));
        assert!(matches!(sel.next_step(), Step::Done(_)));
        assert_eq!(sel.state(), SelectorState::UsePrimary);
    }
}
