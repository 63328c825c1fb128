// src/config/hub.rs
//! Hub configuration: cache TTL, discrepancy threshold, watch list and the
//! provider catalogue with per-provider adapter wiring.
//!
//! Resolution order:
//! 1) $HEALTH_HUB_CONFIG_PATH
//! 2) config/hub.toml
//! 3) config/hub.json
//! 4) built-in seed (`HubConfig::default_seed()`)
//!
//! Env overrides applied afterwards: `HUB_CACHE_TTL_SECS`,
//! `HUB_DISCREPANCY_THRESHOLD_PCT`, `HUB_HEALTH_CHECK_INTERVAL_SECS`.

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::discrepancy::DEFAULT_THRESHOLD_PCT;
use crate::hub::HubSettings;
use crate::providers::{DataProvider, JsonFeedProvider};
use crate::registry::{seed_providers, ProviderDescriptor, SourceRegistry, TrustTier, SEED_WATCH_LIST};

pub const ENV_CONFIG_PATH: &str = "HEALTH_HUB_CONFIG_PATH";
pub const ENV_CACHE_TTL_SECS: &str = "HUB_CACHE_TTL_SECS";
pub const ENV_THRESHOLD_PCT: &str = "HUB_DISCREPANCY_THRESHOLD_PCT";
pub const ENV_HEALTH_CHECK_SECS: &str = "HUB_HEALTH_CHECK_INTERVAL_SECS";

fn default_cache_ttl_secs() -> u64 {
    30 * 60
}
fn default_threshold_pct() -> f64 {
    DEFAULT_THRESHOLD_PCT
}
fn default_health_check_secs() -> u64 {
    300
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    pub name: String,
    pub tier: TrustTier,
    pub reliability: f64,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default = "default_true")]
    pub available: bool,
    #[serde(default)]
    pub integrity_verified: Option<bool>,
    /// Live JSON endpoint (`GET {endpoint}/{category}`).
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Static tables file, relative paths resolve against the config file.
    #[serde(default)]
    pub fixture_path: Option<String>,
}

impl ProviderConfig {
    pub fn descriptor(&self) -> ProviderDescriptor {
        let cats: Vec<&str> = self.categories.iter().map(String::as_str).collect();
        let mut d = ProviderDescriptor::new(&self.id, &self.name, self.tier, self.reliability, &cats);
        d.available = self.available;
        d.integrity_verified = self.integrity_verified;
        d
    }
}

impl From<&ProviderDescriptor> for ProviderConfig {
    fn from(d: &ProviderDescriptor) -> Self {
        Self {
            id: d.id.clone(),
            name: d.name.clone(),
            tier: d.tier,
            reliability: d.reliability,
            categories: d.categories.iter().cloned().collect(),
            available: d.available,
            integrity_verified: d.integrity_verified,
            endpoint: None,
            fixture_path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HubConfig {
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_threshold_pct")]
    pub discrepancy_threshold_pct: f64,
    #[serde(default = "default_health_check_secs")]
    pub health_check_interval_secs: u64,
    #[serde(default)]
    pub watch_list: Vec<String>,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    /// Directory the config was read from; anchors relative fixture paths.
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

impl HubConfig {
    /// Built-in catalogue; no adapters are wired (no endpoints, no fixtures).
    pub fn default_seed() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl_secs(),
            discrepancy_threshold_pct: default_threshold_pct(),
            health_check_interval_secs: default_health_check_secs(),
            watch_list: SEED_WATCH_LIST.iter().map(|s| s.to_string()).collect(),
            providers: seed_providers().iter().map(ProviderConfig::from).collect(),
            base_dir: None,
        }
    }

    pub fn settings(&self) -> HubSettings {
        HubSettings {
            cache_ttl: Duration::from_secs(self.cache_ttl_secs),
            discrepancy_threshold_pct: self.discrepancy_threshold_pct,
        }
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs)
    }

    pub fn build_registry(&self) -> SourceRegistry {
        let providers = self.providers.iter().map(ProviderConfig::descriptor).collect();
        SourceRegistry::new(providers, &self.watch_list)
    }

    /// One adapter per provider that declares a fixture file or an endpoint.
    /// A fixture wins when both are present.
    pub fn build_adapters(&self) -> Result<Vec<Arc<dyn DataProvider>>> {
        let mut out: Vec<Arc<dyn DataProvider>> = Vec::new();
        for p in &self.providers {
            if let Some(rel) = &p.fixture_path {
                let path = self.resolve(rel);
                out.push(Arc::new(JsonFeedProvider::from_fixture_path(&p.id, &path)?));
            } else if let Some(endpoint) = &p.endpoint {
                out.push(Arc::new(JsonFeedProvider::from_endpoint(&p.id, endpoint)?));
            } else {
                tracing::warn!(provider = %p.id, "no fixture_path or endpoint; provider has no adapter");
            }
        }
        Ok(out)
    }

    fn resolve(&self, rel: &str) -> PathBuf {
        let p = PathBuf::from(rel);
        match &self.base_dir {
            Some(base) if p.is_relative() => base.join(p),
            _ => p,
        }
    }

    /// Sanitize tunables and reject catalogues the registry cannot hold.
    fn validate(mut self) -> Result<Self> {
        if self.cache_ttl_secs == 0 {
            self.cache_ttl_secs = default_cache_ttl_secs();
        }
        if !(0.0..=100.0).contains(&self.discrepancy_threshold_pct) {
            self.discrepancy_threshold_pct = default_threshold_pct();
        }
        if self.health_check_interval_secs == 0 {
            self.health_check_interval_secs = default_health_check_secs();
        }

        let mut seen = BTreeSet::new();
        for p in &self.providers {
            let id = p.id.trim();
            if id.is_empty() {
                bail!("provider with empty id");
            }
            if !seen.insert(id.to_string()) {
                bail!("duplicate provider id: {id}");
            }
            if !p.reliability.is_finite() {
                bail!("provider {id}: reliability must be a number");
            }
        }
        Ok(self)
    }

    fn apply_env_overrides(mut self) -> Self {
        if let Some(v) = env_parse::<u64>(ENV_CACHE_TTL_SECS) {
            if v > 0 {
                self.cache_ttl_secs = v;
            }
        }
        if let Some(v) = env_parse::<f64>(ENV_THRESHOLD_PCT) {
            self.discrepancy_threshold_pct = v.clamp(0.0, 100.0);
        }
        if let Some(v) = env_parse::<u64>(ENV_HEALTH_CHECK_SECS) {
            if v > 0 {
                self.health_check_interval_secs = v;
            }
        }
        self
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self::default_seed()
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Load from an explicit path. Supports TOML or JSON formats.
pub fn load_hub_config_from(path: &Path) -> Result<HubConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading hub config from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let mut cfg = parse_hub_config(&content, &ext)
        .with_context(|| format!("parsing hub config in {}", path.display()))?;
    cfg.base_dir = path.parent().map(Path::to_path_buf);
    Ok(cfg.validate()?.apply_env_overrides())
}

/// Load using env var + fallbacks (see module docs).
pub fn load_hub_config_default() -> Result<HubConfig> {
    if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_hub_config_from(&pb);
        }
        return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
    }
    let toml_p = PathBuf::from("config/hub.toml");
    if toml_p.exists() {
        return load_hub_config_from(&toml_p);
    }
    let json_p = PathBuf::from("config/hub.json");
    if json_p.exists() {
        return load_hub_config_from(&json_p);
    }
    Ok(HubConfig::default_seed().apply_env_overrides())
}

fn parse_hub_config(s: &str, hint_ext: &str) -> Result<HubConfig> {
    if hint_ext == "json" {
        return serde_json::from_str(s).context("invalid JSON");
    }
    match toml::from_str::<HubConfig>(s) {
        Ok(cfg) => Ok(cfg),
        Err(toml_err) => serde_json::from_str(s)
            .map_err(|_| anyhow!("unsupported hub config format: {toml_err}")),
    }
}
