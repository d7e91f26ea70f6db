//! Error responses.
//!
//! # Responsibilities
//! - Map every per-request failure to a status code and body
//! - Keep JSON bodies for API callers and an HTML page for the iframe
//!
//! # Design Decisions
//! - Client-caused failures (4xx) answer JSON with an `error` field
//! - Upstream failures (502/504) render HTML, since the iframe shows them
//!   directly to a person; the page links back to the portal root
//! - Remote-session endpoints are API-only and always answer JSON

use std::time::Duration;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::remote::SessionError;
use crate::upstream::UpstreamError;

/// Why the target URL was refused before any upstream contact.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TargetError {
    #[error("missing url parameter")]
    Missing,

    #[error("invalid url: {0}")]
    Invalid(String),

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("host not allowed: {0}")]
    HostNotAllowed(String),
}

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error(transparent)]
    Target(#[from] TargetError),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error("rate limit exceeded")]
    RateLimited { retry_after: Duration },

    #[error("request body too large")]
    BodyTooLarge,

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("remote browser mode is disabled")]
    RemoteBrowserDisabled,
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::Target(TargetError::HostNotAllowed(_)) => StatusCode::FORBIDDEN,
            ProxyError::Target(_) => StatusCode::BAD_REQUEST,
            ProxyError::Upstream(e) if e.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ProxyError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ProxyError::BodyTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ProxyError::Session(SessionError::NotFound(_)) => StatusCode::NOT_FOUND,
            ProxyError::Session(SessionError::NotReady) => StatusCode::CONFLICT,
            ProxyError::Session(SessionError::InvalidAction(_)) => StatusCode::BAD_REQUEST,
            ProxyError::Session(SessionError::Driver(_)) => StatusCode::BAD_GATEWAY,
            ProxyError::RemoteBrowserDisabled => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            ProxyError::Target(TargetError::HostNotAllowed(host)) => (
                status,
                Json(json!({"error": "Host not allowed", "host": host})),
            )
                .into_response(),
            ProxyError::RateLimited { retry_after } => {
                let secs = retry_after.as_secs().max(1);
                let mut response = (
                    status,
                    Json(json!({"error": "Too many requests", "retry_after_secs": secs})),
                )
                    .into_response();
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(secs));
                response
            }
            ProxyError::Upstream(e) => (status, Html(error_page(status, &e.to_string()))).into_response(),
            other => (status, Json(json!({"error": other.to_string()}))).into_response(),
        }
    }
}

/// Minimal page shown inside the iframe for 5xx upstream failures.
pub fn error_page(status: StatusCode, message: &str) -> String {
    let reason = status.canonical_reason().unwrap_or("Error");
    format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>{code} {reason}</title></head>\
         <body style=\"font-family:sans-serif;padding:2em\">\
         <h1>{code} {reason}</h1><p>{message}</p>\
         <p><a href=\"/\" target=\"_top\">Back to portal</a></p></body></html>\n",
        code = status.as_u16(),
        reason = reason,
        message = escape_html(message),
    )
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ProxyError::from(TargetError::Missing).status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ProxyError::from(TargetError::UnsupportedScheme("ftp".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ProxyError::from(TargetError::HostNotAllowed("evil.com".into())).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ProxyError::from(UpstreamError::Timeout(Duration::from_secs(60))).status(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            ProxyError::from(UpstreamError::HostNotFound("x.invalid".into())).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(ProxyError::RemoteBrowserDisabled.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_rate_limited_headers() {
        let response = ProxyError::RateLimited { retry_after: Duration::from_secs(42) }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "42");
    }

    #[test]
    fn test_upstream_errors_render_html() {
        let response = ProxyError::from(UpstreamError::Protocol("bad".into())).into_response();
        let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
        assert!(content_type.starts_with("text/html"));
    }

    #[test]
    fn test_error_page_links_home_and_escapes() {
        let page = error_page(StatusCode::BAD_GATEWAY, "<script>");
        assert!(page.contains("href=\"/\""));
        assert!(page.contains("&lt;script&gt;"));
        assert!(page.contains("502 Bad Gateway"));
    }
}
