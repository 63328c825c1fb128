// tests/config_loading.rs
//
// The shipped demo configuration loads, wires every provider to an adapter
// and agrees with the built-in seed catalogue.

use std::path::Path;

use health_data_hub::config::{load_hub_config_from, HubConfig};
use health_data_hub::registry::SourceRegistry;
use health_data_hub::{HealthDataHub, QueryParams};

fn demo() -> HubConfig {
    load_hub_config_from(Path::new("config/hub.toml")).expect("config/hub.toml should load")
}

#[test]
fn demo_config_matches_seed_catalogue() {
    let cfg = demo();
    assert_eq!(cfg.cache_ttl_secs, 1800);
    assert_eq!(cfg.discrepancy_threshold_pct, 15.0);

    let reg = cfg.build_registry();
    assert_eq!(reg.provider_ids(), SourceRegistry::default_seed().provider_ids());
    assert!(reg.is_watch_listed("LGBTQ Health"));
    assert!(!reg.is_watch_listed("chronic-disease"));
}

#[test]
fn every_demo_provider_has_an_adapter() {
    let cfg = demo();
    let adapters = cfg.build_adapters().expect("fixtures load");
    assert_eq!(adapters.len(), cfg.providers.len());
}

#[tokio::test]
async fn substance_use_fills_missing_deaths_with_zero() {
    let hub = HealthDataHub::from_config(&demo()).expect("hub");
    let env = hub
        .fetch_health_data("substance-use", &QueryParams::new())
        .await
        .expect("substance-use envelope");
    assert_eq!(env.metadata.source, "cdc-brfss");
    let vermont = env
        .data
        .iter()
        .find(|r| r.location == "Vermont")
        .expect("vermont row kept");
    assert_eq!(vermont.value, 0.0);
    assert!(vermont.was_defaulted);
    assert_eq!(vermont.defaulted_fields, vec!["overdoseDeaths".to_string()]);
}
