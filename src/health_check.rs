// src/health_check.rs
//! Periodic provider liveness probe. Pings every adapter and writes the
//! outcome into the registry's health flags, so the selector skips providers
//! that are down without paying a failed fetch first. Operator-disabled
//! providers are not pinged and stay disabled.

use metrics::{counter, gauge};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::providers::DataProvider;
use crate::registry::SourceRegistry;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthCheckReport {
    pub healthy: Vec<String>,
    pub unhealthy: Vec<String>,
}

/// One probe round. Adapters whose id is not in the registry are ignored.
pub async fn run_health_check(
    registry: &SourceRegistry,
    adapters: &[Arc<dyn DataProvider>],
) -> HealthCheckReport {
    let mut report = HealthCheckReport::default();
    for adapter in adapters {
        let id = adapter.id().to_string();
        match registry.is_operator_disabled(&id) {
            Ok(false) => {}
            Ok(true) => {
                tracing::debug!(provider = %id, "health check: disabled by operator");
                continue;
            }
            Err(_) => {
                tracing::debug!(provider = %id, "health check: adapter not in registry");
                continue;
            }
        }
        let up = match adapter.ping().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(provider = %id, error = %e, "health check failed");
                false
            }
        };
        if registry.set_healthy(&id, up).is_err() {
            continue;
        }
        if up {
            report.healthy.push(id);
        } else {
            report.unhealthy.push(id);
        }
    }

    counter!("hub_health_checks_total").increment(1);
    gauge!("hub_providers_unhealthy").set(report.unhealthy.len() as f64);
    report
}

/// Spawn the probe loop on the current runtime. The first tick fires at once.
pub fn spawn_health_check_task(
    registry: Arc<SourceRegistry>,
    adapters: Vec<Arc<dyn DataProvider>>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let report = run_health_check(&registry, &adapters).await;
            tracing::info!(
                healthy = report.healthy.len(),
                unhealthy = report.unhealthy.len(),
                "provider health check tick"
            );
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::providers::{JsonFeedProvider, QueryParams, RawProviderResponse};
    use crate::registry::{ProviderDescriptor, TrustTier};
    use async_trait::async_trait;

    struct Probe {
        id: &'static str,
        up: bool,
    }

    #[async_trait]
    impl DataProvider for Probe {
        fn id(&self) -> &str {
            self.id
        }

        async fn fetch(
            &self,
            _category: &str,
            _params: &QueryParams,
        ) -> Result<RawProviderResponse, ProviderError> {
            Err(ProviderError::Empty {
                provider: self.id.to_string(),
            })
        }

        async fn ping(&self) -> Result<(), ProviderError> {
            if self.up {
                Ok(())
            } else {
                Err(ProviderError::transport(self.id, "connection refused"))
            }
        }
    }

    #[tokio::test]
    async fn flags_follow_ping_results() {
        let registry = SourceRegistry::new(
            vec![
                ProviderDescriptor::new("a", "A", TrustTier::Government, 0.9, &["x"]),
                ProviderDescriptor::new("b", "B", TrustTier::Alternative, 0.8, &["x"]),
            ],
            Vec::<String>::new(),
        );
        let adapters: Vec<Arc<dyn DataProvider>> = vec![
            Arc::new(Probe { id: "a", up: true }),
            Arc::new(Probe { id: "b", up: false }),
            Arc::new(Probe { id: "ghost", up: true }),
        ];

        let report = run_health_check(&registry, &adapters).await;
        assert_eq!(report.healthy, vec!["a".to_string()]);
        assert_eq!(report.unhealthy, vec!["b".to_string()]);
        assert!(registry.get_provider("a").unwrap().available);
        assert!(!registry.get_provider("b").unwrap().available);

        // b recovers on the next round.
        let adapters: Vec<Arc<dyn DataProvider>> = vec![Arc::new(Probe { id: "b", up: true })];
        run_health_check(&registry, &adapters).await;
        assert!(registry.get_provider("b").unwrap().available);
    }

    #[tokio::test]
    async fn operator_disabled_providers_stay_disabled() {
        let registry = SourceRegistry::new(
            vec![
                ProviderDescriptor::new("cfg-off", "Config off", TrustTier::Government, 0.9, &["x"])
                    .unavailable(),
                ProviderDescriptor::new("admin-off", "Admin off", TrustTier::Alternative, 0.8, &["x"]),
            ],
            Vec::<String>::new(),
        );
        registry.mark_unavailable("admin-off").unwrap();
        let adapters: Vec<Arc<dyn DataProvider>> = vec![
            Arc::new(JsonFeedProvider::from_tables("cfg-off", Default::default())),
            Arc::new(JsonFeedProvider::from_tables("admin-off", Default::default())),
        ];

        let report = run_health_check(&registry, &adapters).await;
        assert!(report.healthy.is_empty());
        assert!(report.unhealthy.is_empty());
        assert!(!registry.get_provider("cfg-off").unwrap().available);
        assert!(!registry.get_provider("admin-off").unwrap().available);

        // Re-enabling through the operator switch takes effect immediately.
        registry.mark_available("admin-off").unwrap();
        run_health_check(&registry, &adapters).await;
        assert!(registry.get_provider("admin-off").unwrap().available);
    }
}
