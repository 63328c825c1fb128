//! Error taxonomy for the retrieval layer.
//!
//! `HubError` is what callers of [`crate::hub::HealthDataHub`] see.
//! `ProviderError` stays inside the selector: every variant is a provider-level
//! failure that triggers fallback to the next candidate, and only surfaces
//! (wrapped in `NoDataAvailable`) once every candidate has failed.

use serde::Serialize;
use thiserror::Error;

/// Result alias for hub operations.
pub type Result<T> = std::result::Result<T, HubError>;

#[derive(Debug, Error)]
pub enum HubError {
    /// No registry entry supports the requested category. Never retried.
    #[error("no provider supports category `{0}`")]
    CategoryNotFound(String),

    /// Every candidate for the category failed or was unavailable.
    #[error("no data available for category `{category}` ({} attempt(s) failed)", attempts.len())]
    NoDataAvailable {
        category: String,
        attempts: Vec<FailedAttempt>,
    },

    #[error("provider `{0}` not found")]
    ProviderNotFound(String),
}

impl HubError {
    /// Short machine-readable kind, used by the HTTP layer.
    pub fn kind(&self) -> &'static str {
        match self {
            HubError::CategoryNotFound(_) => "category_not_found",
            HubError::NoDataAvailable { .. } => "no_data_available",
            HubError::ProviderNotFound(_) => "provider_not_found",
        }
    }
}

/// One candidate the selector gave up on, kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedAttempt {
    pub provider_id: String,
    pub reason: String,
}

/// A normalizer could not find any alias for a required field across a whole
/// response, or the payload had no recognizable record container.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("schema error in `{category}` response: no recognized field for `{field}`")]
pub struct SchemaError {
    pub category: String,
    pub field: String,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    /// Network or payload decoding failure.
    #[error("transport error from `{provider}`: {message}")]
    Transport { provider: String, message: String },

    #[error("provider `{provider}`: {source}")]
    Schema {
        provider: String,
        #[source]
        source: SchemaError,
    },

    /// The response normalized to zero usable records.
    #[error("provider `{provider}` returned no usable records")]
    Empty { provider: String },

    #[error("provider `{provider}` does not serve category `{category}`")]
    Unsupported { provider: String, category: String },

    /// Registered in the catalogue but no adapter was configured for it.
    #[error("no adapter configured for provider `{0}`")]
    NoAdapter(String),
}

impl ProviderError {
    pub fn transport(provider: impl Into<String>, err: impl std::fmt::Display) -> Self {
        ProviderError::Transport {
            provider: provider.into(),
            message: err.to_string(),
        }
    }

    pub fn schema(provider: impl Into<String>, source: SchemaError) -> Self {
        ProviderError::Schema {
            provider: provider.into(),
            source,
        }
    }
}
