// src/providers/mod.rs
pub mod json_feed;

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::error::ProviderError;

/// Query parameters. A `BTreeMap` so iteration (and cache keys) are order-independent.
pub type QueryParams = BTreeMap<String, String>;

/// Payload as returned by one provider for one (category, params) query.
/// Ephemeral: discarded once normalized.
#[derive(Debug, Clone, PartialEq)]
pub struct RawProviderResponse {
    pub provider_id: String,
    pub category: String,
    pub fetched_at: DateTime<Utc>,
    pub payload: serde_json::Value,
}

/// Adapter for one upstream provider. The transport must fail within a bounded time.
#[async_trait::async_trait]
pub trait DataProvider: Send + Sync {
    fn id(&self) -> &str;

    async fn fetch(
        &self,
        category: &str,
        params: &QueryParams,
    ) -> Result<RawProviderResponse, ProviderError>;

    /// Cheap liveness probe used by the availability health check.
    async fn ping(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}

pub use json_feed::JsonFeedProvider;
