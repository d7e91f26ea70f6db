//! Proxy orchestration.
//!
//! # Responsibilities
//! - Validate the `url` query parameter against the allowlist
//! - Dispatch upstream with the client's method, headers and body
//! - Sanitize response headers on every response
//! - Rewrite textual bodies, stream everything else
//!
//! # Data Flow
//! ```text
//! Validating  → target parsed, scheme checked, host allowlisted
//! Dispatching → Dispatcher::dispatch (timeout, redirect policy)
//! Sanitizing  → headers::sanitize_response_headers
//! Responding  → buffered + rewritten (HTML/CSS/JS) | streamed (anything else)
//! ```
//!
//! # Design Decisions
//! - Rewritten bodies are fully buffered because Content-Length depends on
//!   the rewritten size; passthrough bodies are never buffered
//! - A rewrite failure forwards the original bytes, never an error
//! - Dropping the response body (client gone) drops the upstream stream

use std::fmt;
use std::time::Instant;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use url::Url;

use crate::http::request::RequestIdExt;
use crate::http::response::{ProxyError, TargetError};
use crate::http::server::AppState;
use crate::observability::metrics::{self, Outcome};
use crate::rewrite::{is_rewritable, rewrite_body, RewriteContext, RewriteError};
use crate::security::allowlist::Allowlist;
use crate::security::headers::{forwardable_request_headers, sanitize_response_headers};
use crate::upstream::{UpstreamRequest, UpstreamResponse};

/// Where in the pipeline a request failed. Logged with every failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyStage {
    Validating,
    Dispatching,
    Responding,
}

impl fmt::Display for ProxyStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProxyStage::Validating => "validating",
            ProxyStage::Dispatching => "dispatching",
            ProxyStage::Responding => "responding",
        };
        f.write_str(name)
    }
}

/// Handler for the proxy endpoint.
pub async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let request_id = request.request_id();
    let method = request.method().clone();

    match forward(&state, request, &request_id).await {
        Ok((response, outcome)) => {
            metrics::record_request(method.as_str(), response.status().as_u16(), outcome, start);
            response
        }
        Err((stage, err)) => {
            let outcome = match &err {
                ProxyError::Upstream(e) => {
                    metrics::record_upstream_error(e.kind());
                    tracing::warn!(
                        request_id = %request_id,
                        stage = %stage,
                        error = %err,
                        "Upstream request failed"
                    );
                    Outcome::UpstreamError
                }
                _ => {
                    tracing::info!(
                        request_id = %request_id,
                        stage = %stage,
                        error = %err,
                        "Proxy request rejected"
                    );
                    Outcome::Rejected
                }
            };
            metrics::record_request(method.as_str(), err.status().as_u16(), outcome, start);
            err.into_response()
        }
    }
}

async fn forward(
    state: &AppState,
    request: Request<Body>,
    request_id: &str,
) -> Result<(Response, Outcome), (ProxyStage, ProxyError)> {
    let target = parse_target(request.uri().query(), &state.allowlist)
        .map_err(|e| (ProxyStage::Validating, ProxyError::from(e)))?;

    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, state.config.security.max_body_size)
        .await
        .map_err(|_| (ProxyStage::Validating, ProxyError::BodyTooLarge))?;

    tracing::debug!(
        request_id = %request_id,
        method = %parts.method,
        target = %target,
        "Proxying request"
    );

    let upstream = state
        .dispatcher
        .dispatch(UpstreamRequest {
            method: parts.method.clone(),
            target,
            headers: forwardable_request_headers(&parts.headers),
            body: (!body.is_empty()).then_some(body),
        })
        .await
        .map_err(|e| (ProxyStage::Dispatching, ProxyError::from(e)))?;

    let ctx = RewriteContext::new(upstream.final_url().clone(), state.config.portal.proxy_path.as_str());
    let headers = sanitize_response_headers(upstream.headers(), &ctx);
    let status = upstream.status();

    tracing::debug!(
        request_id = %request_id,
        status = status.as_u16(),
        final_url = %upstream.final_url(),
        "Upstream responded"
    );

    if wants_rewrite(&parts.method, status, upstream.content_type()) {
        let body = upstream
            .buffered()
            .await
            .map_err(|e| (ProxyStage::Responding, ProxyError::from(e)))?;
        let response = rewritten_response(status, headers, body, &ctx, request_id);
        Ok((response, Outcome::Rewritten))
    } else {
        Ok((streamed_response(status, headers, upstream), Outcome::Streamed))
    }
}

/// Extract and validate the `url` query parameter.
pub fn parse_target(query: Option<&str>, allowlist: &Allowlist) -> Result<Url, TargetError> {
    let raw = query
        .and_then(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .find(|(key, _)| key == "url")
                .map(|(_, value)| value.into_owned())
        })
        .filter(|value| !value.trim().is_empty())
        .ok_or(TargetError::Missing)?;

    validate_target(raw.trim(), allowlist)
}

/// Parse an absolute http(s) URL whose host the allowlist accepts.
pub fn validate_target(raw: &str, allowlist: &Allowlist) -> Result<Url, TargetError> {
    let target = Url::parse(raw).map_err(|e| TargetError::Invalid(e.to_string()))?;

    if !matches!(target.scheme(), "http" | "https") {
        return Err(TargetError::UnsupportedScheme(target.scheme().to_string()));
    }

    let host = target
        .host_str()
        .ok_or_else(|| TargetError::Invalid("missing host".into()))?;

    if !allowlist.is_allowed(host) {
        return Err(TargetError::HostNotAllowed(host.to_string()));
    }
    Ok(target)
}

fn wants_rewrite(method: &Method, status: StatusCode, content_type: Option<&str>) -> bool {
    *method != Method::HEAD
        && status != StatusCode::NO_CONTENT
        && status != StatusCode::NOT_MODIFIED
        && content_type.is_some_and(is_rewritable)
}

fn rewritten_response(
    status: StatusCode,
    mut headers: HeaderMap,
    original: Bytes,
    ctx: &RewriteContext,
    request_id: &str,
) -> Response {
    let body = match rewrite_payload(&original, &headers, ctx) {
        Ok(text) => {
            metrics::record_rewrite(true);
            headers.remove(header::ETAG);
            Bytes::from(text)
        }
        Err(e) => {
            metrics::record_rewrite(false);
            tracing::warn!(request_id = %request_id, error = %e, "Rewrite skipped, forwarding original body");
            original
        }
    };

    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(body.len()));
    build_response(status, headers, Body::from(body))
}

fn rewrite_payload(body: &[u8], headers: &HeaderMap, ctx: &RewriteContext) -> Result<String, RewriteError> {
    if let Some(encoding) = headers
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().eq_ignore_ascii_case("identity"))
    {
        return Err(RewriteError::CompressedBody(encoding.to_string()));
    }
    rewrite_body(body, ctx)
}

fn streamed_response(status: StatusCode, headers: HeaderMap, upstream: UpstreamResponse) -> Response {
    build_response(status, headers, Body::from_stream(upstream.into_stream()))
}

fn build_response(status: StatusCode, headers: HeaderMap, body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}
