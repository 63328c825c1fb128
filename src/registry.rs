//! # Source Registry
//!
//! Static catalogue of upstream health-data providers: identity, trust tier,
//! declared reliability, supported categories and an availability flag.
//!
//! - Built once from configuration (or the built-in `default_seed()`).
//! - Category tags are compared as slugs (`"LGBTQ Health"` == `"lgbtq-health"`).
//! - Providers come back in preference order: government tier first, then
//!   descending reliability, then id.
//! - Availability is the only runtime mutation. It combines two independent
//!   atomics: the operator switch (config `available`, admin routes) and the
//!   health-check result. A provider is available only when the operator has
//!   not disabled it and its last health check passed. Concurrent toggles are
//!   last-write-wins per flag.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{HubError, Result};

/// Trust tier of a provider. Government feeds rank above alternative ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustTier {
    Government,
    Alternative,
}

impl TrustTier {
    fn rank(self) -> u8 {
        match self {
            TrustTier::Government => 1,
            TrustTier::Alternative => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderDescriptor {
    pub id: String,
    pub name: String,
    pub tier: TrustTier,
    /// Declared reliability in `[0.0, 1.0]`.
    pub reliability: f64,
    pub categories: BTreeSet<String>,
    #[serde(rename = "availabilityFlag")]
    pub available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrity_verified: Option<bool>,
}

impl ProviderDescriptor {
    pub fn new(id: &str, name: &str, tier: TrustTier, reliability: f64, categories: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            tier,
            reliability,
            categories: categories.iter().map(|c| category_slug(c)).collect(),
            available: true,
            integrity_verified: None,
        }
    }

    pub fn with_integrity(mut self, verified: bool) -> Self {
        self.integrity_verified = Some(verified);
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    pub fn supports(&self, category: &str) -> bool {
        self.categories.contains(category)
    }
}

/// Transparency view consumed by the dashboard's "data sources" panel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourcesInfo {
    pub government: Vec<ProviderDescriptor>,
    pub alternative: Vec<ProviderDescriptor>,
    pub watch_list_categories: Vec<String>,
}

#[derive(Debug)]
struct Entry {
    descriptor: ProviderDescriptor,
    operator_disabled: AtomicBool,
    healthy: AtomicBool,
}

impl Entry {
    fn is_available(&self) -> bool {
        !self.operator_disabled.load(Ordering::Relaxed) && self.healthy.load(Ordering::Relaxed)
    }

    fn snapshot(&self) -> ProviderDescriptor {
        let mut d = self.descriptor.clone();
        d.available = self.is_available();
        d
    }
}

#[derive(Debug)]
pub struct SourceRegistry {
    /// Kept sorted in preference order.
    entries: Vec<Entry>,
    watch_list: BTreeSet<String>,
}

impl SourceRegistry {
    pub fn new<I, S>(providers: Vec<ProviderDescriptor>, watch_list: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut entries: Vec<Entry> = providers
            .into_iter()
            .map(|mut d| {
                d.reliability = clamp01(d.reliability);
                d.categories = d.categories.iter().map(|c| category_slug(c)).collect();
                let operator_disabled = AtomicBool::new(!d.available);
                Entry {
                    descriptor: d,
                    operator_disabled,
                    healthy: AtomicBool::new(true),
                }
            })
            .collect();

        entries.sort_by(|a, b| {
            let (a, b) = (&a.descriptor, &b.descriptor);
            b.tier
                .rank()
                .cmp(&a.tier.rank())
                .then_with(|| b.reliability.total_cmp(&a.reliability))
                .then_with(|| a.id.cmp(&b.id))
        });

        let watch_list = watch_list
            .into_iter()
            .map(|c| category_slug(c.as_ref()))
            .filter(|c| !c.is_empty())
            .collect();

        Self {
            entries,
            watch_list,
        }
    }

    /// Providers supporting `category`, in preference order.
    /// Unavailable providers are included (with `available == false`) so the
    /// selector can record why it skipped them.
    pub fn list_providers(&self, category: &str) -> Vec<ProviderDescriptor> {
        let slug = category_slug(category);
        self.entries
            .iter()
            .filter(|e| e.descriptor.supports(&slug))
            .map(Entry::snapshot)
            .collect()
    }

    pub fn get_provider(&self, id: &str) -> Result<ProviderDescriptor> {
        self.entry(id).map(Entry::snapshot)
    }

    pub fn mark_unavailable(&self, id: &str) -> Result<()> {
        self.set_available(id, false)
    }

    pub fn mark_available(&self, id: &str) -> Result<()> {
        self.set_available(id, true)
    }

    /// Operator switch. A disabled provider stays unavailable whatever the
    /// health check reports.
    pub fn set_available(&self, id: &str, available: bool) -> Result<()> {
        let e = self.entry(id)?;
        let prev = e.operator_disabled.swap(!available, Ordering::Relaxed);
        if prev == available {
            tracing::info!(provider = id, available, "provider availability changed by operator");
        }
        Ok(())
    }

    /// Health-check result. Never re-enables a provider the operator disabled.
    pub fn set_healthy(&self, id: &str, healthy: bool) -> Result<()> {
        let e = self.entry(id)?;
        let prev = e.healthy.swap(healthy, Ordering::Relaxed);
        if prev != healthy {
            tracing::info!(provider = id, healthy, "provider health changed");
        }
        Ok(())
    }

    pub fn is_operator_disabled(&self, id: &str) -> Result<bool> {
        Ok(self.entry(id)?.operator_disabled.load(Ordering::Relaxed))
    }

    pub fn is_watch_listed(&self, category: &str) -> bool {
        self.watch_list.contains(&category_slug(category))
    }

    pub fn provider_ids(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.descriptor.id.clone()).collect()
    }

    pub fn sources_info(&self) -> SourcesInfo {
        let (government, alternative): (Vec<_>, Vec<_>) = self
            .entries
            .iter()
            .map(Entry::snapshot)
            .partition(|d| d.tier == TrustTier::Government);
        SourcesInfo {
            government,
            alternative,
            watch_list_categories: self.watch_list.iter().cloned().collect(),
        }
    }

    fn entry(&self, id: &str) -> Result<&Entry> {
        self.entries
            .iter()
            .find(|e| e.descriptor.id == id)
            .ok_or_else(|| HubError::ProviderNotFound(id.to_string()))
    }

    /// Registry over the built-in catalogue.
    pub fn default_seed() -> Self {
        Self::new(seed_providers(), SEED_WATCH_LIST)
    }
}

/// Categories whose government feed has a history of integrity concerns.
pub const SEED_WATCH_LIST: [&str; 2] = ["lgbtq-health", "maternal-health"];

/// Built-in catalogue, used when no configuration file is found.
pub fn seed_providers() -> Vec<ProviderDescriptor> {
    vec![
        ProviderDescriptor::new(
            "cdc-places",
            "CDC PLACES",
            TrustTier::Government,
            0.95,
            &["chronic-disease", "mental-health", "vaccination", "maternal-health"],
        )
        .with_integrity(true),
        ProviderDescriptor::new(
            "cdc-brfss",
            "CDC Behavioral Risk Factor Surveillance System",
            TrustTier::Government,
            0.92,
            &["chronic-disease", "lgbtq-health", "mental-health", "substance-use"],
        ),
        ProviderDescriptor::new(
            "williams-institute",
            "Williams Institute (UCLA)",
            TrustTier::Alternative,
            0.90,
            &["lgbtq-health"],
        ),
        ProviderDescriptor::new(
            "kff",
            "KFF State Health Facts",
            TrustTier::Alternative,
            0.88,
            &[
                "chronic-disease",
                "lgbtq-health",
                "maternal-health",
                "mental-health",
                "vaccination",
            ],
        ),
        ProviderDescriptor::new(
            "ihme",
            "IHME Global Health Data Exchange",
            TrustTier::Alternative,
            0.87,
            &["chronic-disease", "mental-health", "substance-use"],
        ),
    ]
}

/// Lowercase, trim, and collapse runs of non-alphanumerics into `-`.
pub fn category_slug(s: &str) -> String {
    static RE_SEP: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re = RE_SEP.get_or_init(|| regex::Regex::new(r"[^a-z0-9]+").expect("category slug regex"));
    let lower = s.trim().to_ascii_lowercase();
    re.replace_all(&lower, "-").trim_matches('-').to_string()
}

/// Clamp to [0.0, 1.0]; NaN becomes 0.
pub(crate) fn clamp01(x: f64) -> f64 {
    if x.is_nan() || x < 0.0 {
        0.0
    } else if x > 1.0 {
        1.0
    } else {
        x
    }
}
