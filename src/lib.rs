// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod cache;
pub mod config;
pub mod discrepancy;
pub mod envelope;
pub mod error;
pub mod health_check;
pub mod hub;
pub mod metrics;
pub mod normalize;
pub mod providers;
pub mod registry;
pub mod selector;

// ---- Re-exports for stable public API ----
pub use crate::api::router;
pub use crate::config::{load_hub_config_default, HubConfig};
pub use crate::envelope::{EnvelopeMetadata, ResultEnvelope, SourceSwitch, SwitchReason, ValidationReport};
pub use crate::error::{HubError, ProviderError, SchemaError};
pub use crate::hub::{HealthDataHub, HubSettings};
pub use crate::providers::{DataProvider, JsonFeedProvider, QueryParams};
pub use crate::registry::{ProviderDescriptor, SourceRegistry, SourcesInfo, TrustTier};

use std::sync::Arc;

/// Build the full in-process app from an already-loaded config:
/// API routes plus `/metrics`. Does not start the health-check task.
pub fn app_from_config(cfg: &HubConfig) -> anyhow::Result<(shuttle_axum::axum::Router, Arc<HealthDataHub>)> {
    let metrics = crate::metrics::Metrics::init(cfg.settings().cache_ttl)?;
    let hub = Arc::new(HealthDataHub::from_config(cfg)?);
    let router = api::router(hub.clone()).merge(metrics.router());
    Ok((router, hub))
}

/// Same as [`app_from_config`], resolving configuration the default way
/// (`$HEALTH_HUB_CONFIG_PATH`, `config/hub.toml`, `config/hub.json`, seed).
pub async fn app() -> anyhow::Result<shuttle_axum::axum::Router> {
    let cfg = load_hub_config_default()?;
    let (router, _hub) = app_from_config(&cfg)?;
    Ok(router)
}
