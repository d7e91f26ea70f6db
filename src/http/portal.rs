//! Portal API endpoints.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::config::SiteConfig;
use crate::http::server::AppState;

#[derive(Debug, Serialize)]
pub struct PortalConfigResponse {
    pub sites: Vec<SiteConfig>,
    pub rate_limit: RateLimitInfo,
}

#[derive(Debug, Serialize)]
pub struct RateLimitInfo {
    pub enabled: bool,
    pub max_requests: u32,
    pub window_secs: u64,
}

/// `GET /api/config`: site shortcuts and the effective rate limit.
pub async fn config_handler(State(state): State<AppState>) -> Json<PortalConfigResponse> {
    Json(PortalConfigResponse {
        sites: state.config.portal.sites.clone(),
        rate_limit: RateLimitInfo {
            enabled: state.limiter.is_enabled(),
            max_requests: state.limiter.max_requests(),
            window_secs: state.limiter.window().as_secs(),
        },
    })
}

/// `GET /health`. Never touches an upstream.
pub async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}
