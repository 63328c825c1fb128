//! Health Data Hub: binary entrypoint
//! Boots the Axum HTTP server: loads configuration, builds the hub, starts the
//! provider health check and mounts `/metrics`.

use health_data_hub::{app_from_config, health_check::spawn_health_check_task, load_hub_config_default};
use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Enable compact tracing logs in development only.
/// Activation requires BOTH:
///   - dev environment (debug build OR SHUTTLE_ENV in {local, development, dev})
///   - HUB_DEV_LOG=1
fn enable_dev_tracing() {
    let dev_flag = std::env::var("HUB_DEV_LOG")
        .ok()
        .is_some_and(|v| v == "1");

    let is_dev_env = cfg!(debug_assertions)
        || matches!(
            std::env::var("SHUTTLE_ENV")
                .unwrap_or_default()
                .to_ascii_lowercase()
                .as_str(),
            "local" | "development" | "dev"
        );

    if !(dev_flag && is_dev_env) {
        return;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("health_data_hub=info,warn"));

    // Shuttle may already have a global subscriber installed.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .try_init();
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    enable_dev_tracing();

    let cfg = load_hub_config_default()?;
    tracing::info!(
        providers = cfg.providers.len(),
        cache_ttl_secs = cfg.cache_ttl_secs,
        threshold_pct = cfg.discrepancy_threshold_pct,
        "hub config loaded"
    );

    let (router, hub) = app_from_config(&cfg)?;

    spawn_health_check_task(
        hub.registry().clone(),
        hub.adapters(),
        cfg.health_check_interval(),
    );

    Ok(router.into())
}
