// src/hub.rs
//! Fetch orchestrator: the single entry point the dashboard calls.
//!
//! cache lookup -> selector (drives provider adapters + normalizers) ->
//! confidence scoring -> cache write -> envelope.

use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, histogram};
use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{CacheKey, ResponseCache, DEFAULT_CACHE_TTL};
use crate::config::hub::HubConfig;
use crate::discrepancy::{DiscrepancyDetector, DEFAULT_THRESHOLD_PCT};
use crate::envelope::{EnvelopeMetadata, ResultEnvelope, ValidationReport};
use crate::error::{HubError, ProviderError, Result};
use crate::normalize::{self, metric_for};
use crate::providers::{DataProvider, QueryParams};
use crate::registry::{category_slug, SourceRegistry, SourcesInfo};
use crate::selector::{Decision, SelectionPolicy, Selector, Step};

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("hub_cache_hits_total", "Requests served from the response cache.");
        describe_counter!("hub_cache_misses_total", "Requests that ran the selector.");
        describe_counter!("hub_provider_errors_total", "Provider fetch/normalize failures.");
        describe_counter!(
            "hub_source_switch_total",
            "Results served by a fallback provider."
        );
        describe_counter!(
            "hub_records_dropped_total",
            "Malformed records dropped by normalizers."
        );
        describe_counter!("hub_no_data_total", "Requests with every candidate exhausted.");
        describe_histogram!("hub_fetch_ms", "End-to-end uncached fetch time in milliseconds.");
        describe_histogram!("hub_provider_fetch_ms", "Single provider fetch time in milliseconds.");
        describe_counter!("hub_health_checks_total", "Provider health-check rounds.");
        describe_gauge!("hub_providers_unhealthy", "Providers failing the last health check.");
    });
}

/// Tunables that are configuration, not code.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HubSettings {
    pub cache_ttl: Duration,
    pub discrepancy_threshold_pct: f64,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            cache_ttl: DEFAULT_CACHE_TTL,
            discrepancy_threshold_pct: DEFAULT_THRESHOLD_PCT,
        }
    }
}

pub struct HealthDataHub {
    registry: Arc<SourceRegistry>,
    adapters: HashMap<String, Arc<dyn DataProvider>>,
    cache: ResponseCache,
    detector: DiscrepancyDetector,
}

impl HealthDataHub {
    pub fn new(
        registry: Arc<SourceRegistry>,
        adapters: Vec<Arc<dyn DataProvider>>,
        settings: HubSettings,
    ) -> Self {
        ensure_metrics_described();
        let adapters = adapters
            .into_iter()
            .map(|a| (a.id().to_string(), a))
            .collect();
        Self {
            registry,
            adapters,
            cache: ResponseCache::new(settings.cache_ttl),
            detector: DiscrepancyDetector::new(settings.discrepancy_threshold_pct),
        }
    }

    /// Build registry and adapters from configuration.
    pub fn from_config(cfg: &HubConfig) -> anyhow::Result<Self> {
        let registry = Arc::new(cfg.build_registry());
        let adapters = cfg.build_adapters()?;
        Ok(Self::new(registry, adapters, cfg.settings()))
    }

    pub fn registry(&self) -> &Arc<SourceRegistry> {
        &self.registry
    }

    pub fn adapters(&self) -> Vec<Arc<dyn DataProvider>> {
        self.adapters.values().cloned().collect()
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn get_sources_info(&self) -> SourcesInfo {
        self.registry.sources_info()
    }

    /// Drop the cached envelope for this exact request.
    pub fn invalidate(&self, category: &str, params: &QueryParams) -> bool {
        let slug = category_slug(category);
        let key = self.cache_key(&slug);
        key.map(|k| self.cache.invalidate(&CacheKey::new(&k, &slug, params)))
            .unwrap_or(false)
    }

    pub async fn fetch_health_data(
        &self,
        category: &str,
        params: &QueryParams,
    ) -> Result<ResultEnvelope> {
        let slug = category_slug(category);
        let candidates = self.registry.list_providers(&slug);
        if candidates.is_empty() {
            return Err(HubError::CategoryNotFound(category.to_string()));
        }

        let ids: Vec<&str> = candidates.iter().map(|c| c.id.as_str()).collect();
        let key = CacheKey::new(&CacheKey::provider_set_id(&ids), &slug, params);

        if let Some(mut hit) = self.cache.get(&key) {
            counter!("hub_cache_hits_total").increment(1);
            tracing::debug!(category = %slug, key = %key.fingerprint(), "cache hit");
            hit.metadata.cached = true;
            return Ok(hit);
        }
        counter!("hub_cache_misses_total").increment(1);
        tracing::debug!(category = %slug, key = %key.fingerprint(), "cache miss");

        let t0 = std::time::Instant::now();
        let policy = SelectionPolicy::new(
            self.registry.is_watch_listed(&slug),
            self.detector,
            metric_for(&slug),
        );
        let mut selector = Selector::new(candidates, policy);
        let mut fetched_at: HashMap<String, DateTime<Utc>> = HashMap::new();

        let decision = loop {
            match selector.next_step() {
                Step::Fetch(id) => {
                    let res = self.fetch_one(&id, &slug, params).await;
                    let res = res.map(|(batch, at)| {
                        fetched_at.insert(id.clone(), at);
                        batch
                    });
                    if res.is_err() {
                        counter!("hub_provider_errors_total", "provider" => id.clone()).increment(1);
                    }
                    selector.record_result(&id, res);
                }
                Step::Done(d) => break *d,
                Step::Exhausted(attempts) => {
                    counter!("hub_no_data_total").increment(1);
                    return Err(HubError::NoDataAvailable {
                        category: slug,
                        attempts,
                    });
                }
            }
        };

        let fetched = fetched_at
            .get(&decision.chosen.id)
            .copied()
            .unwrap_or_else(Utc::now);
        let envelope = assemble(decision, fetched);
        if envelope
            .metadata
            .validation
            .as_ref()
            .is_some_and(|v| v.source_switch.is_some())
        {
            counter!("hub_source_switch_total").increment(1);
        }
        histogram!("hub_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

        self.cache.put(key, envelope.clone());
        Ok(envelope)
    }

    /// Fetch and normalize one provider's response, applying query filters.
    async fn fetch_one(
        &self,
        provider_id: &str,
        category: &str,
        params: &QueryParams,
    ) -> std::result::Result<(normalize::NormalizedBatch, DateTime<Utc>), ProviderError> {
        let adapter = self
            .adapters
            .get(provider_id)
            .ok_or_else(|| ProviderError::NoAdapter(provider_id.to_string()))?;
        let raw = adapter.fetch(category, params).await?;
        let mut batch = normalize::normalize(&raw, category)
            .map_err(|e| ProviderError::schema(provider_id, e))?;
        if batch.dropped > 0 {
            tracing::warn!(
                provider = provider_id,
                category,
                dropped = batch.dropped,
                "dropped malformed records"
            );
            counter!("hub_records_dropped_total").increment(batch.dropped as u64);
        }
        batch.retain_matching(params);
        Ok((batch, raw.fetched_at))
    }

    fn cache_key(&self, slug: &str) -> Option<String> {
        let candidates = self.registry.list_providers(slug);
        if candidates.is_empty() {
            return None;
        }
        let ids: Vec<&str> = candidates.iter().map(|c| c.id.as_str()).collect();
        Some(CacheKey::provider_set_id(&ids))
    }
}

/// Confidence: the winner's reliability, scaled down by the fraction of joined
/// rows that disagreed when a cross-check ran.
pub fn confidence_score(reliability: f64, discrepancy_rate: Option<f64>) -> f64 {
    match discrepancy_rate {
        None => reliability,
        Some(rate) => reliability * (1.0 - rate.clamp(0.0, 1.0)),
    }
}

fn assemble(decision: Decision, fetched_at: DateTime<Utc>) -> ResultEnvelope {
    let Decision {
        chosen,
        batch,
        comparison,
        source_switch,
        ..
    } = decision;

    let rate = comparison.as_ref().map(|c| c.comparison.discrepancy_rate());
    let validation = match comparison {
        Some(c) => ValidationReport {
            confidence_score: confidence_score(chosen.reliability, rate),
            compared_with: Some(c.provider_id),
            joined_records: c.comparison.joined,
            unmatched_records: c.comparison.unmatched,
            discrepancies: c.comparison.discrepancies,
            source_switch,
        },
        None => ValidationReport {
            confidence_score: confidence_score(chosen.reliability, None),
            discrepancies: Vec::new(),
            source_switch,
            compared_with: None,
            joined_records: 0,
            unmatched_records: 0,
        },
    };

    ResultEnvelope {
        data: batch.records,
        metadata: EnvelopeMetadata {
            source: chosen.id,
            reliability: chosen.reliability,
            fetched_at,
            validation: Some(validation),
            cached: false,
            dropped_records: batch.dropped,
        },
    }
}
