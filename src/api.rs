// src/api.rs
//! HTTP surface for the dashboard: health-data lookups, the sources
//! transparency panel, and admin toggles for provider availability.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;
use shuttle_axum::axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::envelope::ResultEnvelope;
use crate::error::HubError;
use crate::hub::HealthDataHub;
use crate::providers::QueryParams;
use crate::registry::{category_slug, ProviderDescriptor, SourcesInfo};

#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<HealthDataHub>,
}

/// Build the router the binary serves (and the tests drive via `oneshot`).
pub fn router(hub: Arc<HealthDataHub>) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/api/health-data/{category}", get(get_health_data))
        .route("/api/sources", get(get_sources))
        .route("/admin/providers/{id}/enable", post(enable_provider))
        .route("/admin/providers/{id}/disable", post(disable_provider))
        .route("/admin/cache/{category}/invalidate", post(invalidate_category))
        .layer(CorsLayer::very_permissive())
        .with_state(AppState { hub })
}

/// Wire form of [`HubError`]: `{ "error": kind, "message": ..., "attempts"?: [...] }`.
pub struct ApiError(HubError);

impl From<HubError> for ApiError {
    fn from(e: HubError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            HubError::CategoryNotFound(_) | HubError::ProviderNotFound(_) => StatusCode::NOT_FOUND,
            HubError::NoDataAvailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        };
        let mut body = json!({
            "error": self.0.kind(),
            "message": self.0.to_string(),
        });
        if let HubError::NoDataAvailable { attempts, .. } = &self.0 {
            body["attempts"] = json!(attempts);
        }
        (status, Json(body)).into_response()
    }
}

async fn get_health_data(
    State(state): State<AppState>,
    Path(category): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<ResultEnvelope>, ApiError> {
    let params: QueryParams = params.into_iter().collect();
    let envelope = state.hub.fetch_health_data(&category, &params).await?;
    Ok(Json(envelope))
}

async fn get_sources(State(state): State<AppState>) -> Json<SourcesInfo> {
    Json(state.hub.get_sources_info())
}

async fn enable_provider(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ProviderDescriptor>, ApiError> {
    set_availability(&state, &id, true)
}

async fn disable_provider(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ProviderDescriptor>, ApiError> {
    set_availability(&state, &id, false)
}

fn set_availability(
    state: &AppState,
    id: &str,
    available: bool,
) -> Result<Json<ProviderDescriptor>, ApiError> {
    let registry = state.hub.registry();
    registry.set_available(id, available)?;
    Ok(Json(registry.get_provider(id)?))
}

async fn invalidate_category(
    State(state): State<AppState>,
    Path(category): Path<String>,
) -> Json<serde_json::Value> {
    let removed = state.hub.cache().invalidate_category(&category_slug(&category));
    tracing::info!(category = %category, removed, "cache invalidated");
    Json(json!({ "removed": removed }))
}
