use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use metrics::histogram;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use super::{DataProvider, QueryParams, RawProviderResponse};
use crate::error::ProviderError;
use crate::registry::category_slug;

/// JSON feed adapter. Serves either static tables injected from configuration
/// or a live HTTP endpoint exposing `GET {endpoint}/{category}?params`.
pub struct JsonFeedProvider {
    id: String,
    mode: Mode,
}

enum Mode {
    /// category slug -> raw payload
    Fixture(HashMap<String, Value>),
    Http {
        endpoint: String,
        client: reqwest::Client,
    },
}

impl JsonFeedProvider {
    pub fn from_tables(id: &str, tables: HashMap<String, Value>) -> Self {
        let tables = tables
            .into_iter()
            .map(|(k, v)| (category_slug(&k), v))
            .collect();
        Self {
            id: id.to_string(),
            mode: Mode::Fixture(tables),
        }
    }

    /// Load tables from a JSON file shaped `{ "<category>": <payload>, ... }`.
    pub fn from_fixture_path(id: &str, path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading fixture tables from {}", path.display()))?;
        let tables: HashMap<String, Value> = serde_json::from_str(&content)
            .with_context(|| format!("parsing fixture tables in {}", path.display()))?;
        Ok(Self::from_tables(id, tables))
    }

    pub fn from_endpoint(id: &str, endpoint: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("health-data-hub/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(10))
            .build()
            .context("building reqwest client")?;
        Ok(Self {
            id: id.to_string(),
            mode: Mode::Http {
                endpoint: endpoint.trim_end_matches('/').to_string(),
                client,
            },
        })
    }

    async fn fetch_http(
        &self,
        client: &reqwest::Client,
        endpoint: &str,
        category: &str,
        params: &QueryParams,
    ) -> Result<Value, ProviderError> {
        let url = format!("{endpoint}/{category}");
        let resp = client
            .get(&url)
            .query(params)
            .send()
            .await
            .map_err(|e| ProviderError::transport(&self.id, e))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ProviderError::transport(
                &self.id,
                format!("GET {url} returned {status}"),
            ));
        }
        resp.json::<Value>()
            .await
            .map_err(|e| ProviderError::transport(&self.id, format!("decoding body: {e}")))
    }
}

#[async_trait]
impl DataProvider for JsonFeedProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn fetch(
        &self,
        category: &str,
        params: &QueryParams,
    ) -> Result<RawProviderResponse, ProviderError> {
        let t0 = std::time::Instant::now();
        let slug = category_slug(category);
        let payload = match &self.mode {
            Mode::Fixture(tables) => tables.get(&slug).cloned().ok_or_else(|| {
                ProviderError::Unsupported {
                    provider: self.id.clone(),
                    category: slug.clone(),
                }
            }),
            Mode::Http { endpoint, client } => {
                self.fetch_http(client, endpoint, &slug, params).await
            }
        };

        // Timed on failure as well.
        let result = if payload.is_ok() { "ok" } else { "error" };
        histogram!("hub_provider_fetch_ms", "provider" => self.id.clone(), "result" => result)
            .record(t0.elapsed().as_secs_f64() * 1_000.0);
        let payload = payload?;

        Ok(RawProviderResponse {
            provider_id: self.id.clone(),
            category: slug,
            fetched_at: Utc::now(),
            payload,
        })
    }

    async fn ping(&self) -> Result<(), ProviderError> {
        match &self.mode {
            Mode::Fixture(_) => Ok(()),
            Mode::Http { endpoint, client } => {
                let resp = client
                    .get(endpoint.as_str())
                    .send()
                    .await
                    .map_err(|e| ProviderError::transport(&self.id, e))?;
                if resp.status().is_server_error() {
                    return Err(ProviderError::transport(
                        &self.id,
                        format!("health probe returned {}", resp.status()),
                    ));
                }
                Ok(())
            }
        }
    }
}
