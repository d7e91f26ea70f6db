//! Remote-browser session endpoints.
//!
//! # Responsibilities
//! - Expose start / status / frame / action / stop over JSON
//! - Apply the host allowlist before a browser is launched
//! - Answer 503 when remote-browser mode is disabled

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::http::proxy::validate_target;
use crate::http::response::ProxyError;
use crate::http::server::AppState;
use crate::remote::{BrowserAction, SessionError, SessionInfo, SessionManager};

#[derive(Debug, Deserialize)]
pub struct StartSession {
    pub url: String,
}

fn sessions(state: &AppState) -> Result<&Arc<SessionManager>, ProxyError> {
    state.sessions.as_ref().ok_or(ProxyError::RemoteBrowserDisabled)
}

/// `POST /api/session`
pub async fn start_session(
    State(state): State<AppState>,
    Json(body): Json<StartSession>,
) -> Result<(StatusCode, Json<SessionInfo>), ProxyError> {
    let manager = sessions(&state)?;
    let target = validate_target(body.url.trim(), &state.allowlist)?;
    Ok((StatusCode::CREATED, Json(manager.start(target))))
}

/// `GET /api/session/{id}`
pub async fn session_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionInfo>, ProxyError> {
    Ok(Json(sessions(&state)?.status(&id)?))
}

/// `GET /api/session/{id}/frame`: PNG, or 202 while the browser opens.
pub async fn session_frame(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ProxyError> {
    match sessions(&state)?.frame(&id).await {
        Ok(png) => Ok((
            [
                (header::CONTENT_TYPE, "image/png"),
                (header::CACHE_CONTROL, "no-store"),
            ],
            png,
        )
            .into_response()),
        Err(SessionError::NotReady) => {
            Ok((StatusCode::ACCEPTED, Json(json!({"status": "initializing"}))).into_response())
        }
        Err(e) => Err(e.into()),
    }
}

/// `POST /api/session/{id}/action`
pub async fn session_action(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(action): Json<BrowserAction>,
) -> Result<StatusCode, ProxyError> {
    sessions(&state)?.action(&id, &action).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /api/session/{id}`
pub async fn stop_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ProxyError> {
    sessions(&state)?.stop(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}
