//! Outbound request dispatch.
//!
//! # Responsibilities
//! - Issue the request to the target with browser-like defaults
//! - Enforce connect timeout and response deadline
//! - Surface or follow redirects according to the configured mode; followed
//!   redirects stay on allowlisted http(s) hosts
//! - Hand back the response for buffering (rewrite) or streaming (passthrough)

use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use bytes::Bytes;
use futures_util::Stream;
use reqwest::redirect::Policy;
use url::Url;

use crate::config::{RedirectMode, UpstreamConfig};
use crate::resilience::timeouts::idle_timeout_stream;
use crate::security::allowlist::Allowlist;
use crate::upstream::error::UpstreamError;

/// A validated outbound request.
#[derive(Debug)]
pub struct UpstreamRequest {
    pub method: Method,
    pub target: Url,
    /// Client headers with hop-by-hop and proxy-owned headers removed.
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

/// Performs upstream fetches.
#[derive(Clone)]
pub struct Dispatcher {
    client: reqwest::Client,
    redirect_mode: RedirectMode,
    timeout: Duration,
    connect_timeout: Duration,
    user_agent: HeaderValue,
    accept: HeaderValue,
    accept_language: HeaderValue,
}

impl Dispatcher {
    pub fn new(config: &UpstreamConfig, allowlist: Arc<Allowlist>) -> Result<Self, reqwest::Error> {
        let policy = match config.redirect_mode {
            RedirectMode::Surface => Policy::none(),
            RedirectMode::Follow => follow_policy(config.max_redirects, allowlist),
        };

        let connect_timeout = Duration::from_secs(config.connect_timeout_secs);
        let client = reqwest::Client::builder()
            .redirect(policy)
            .connect_timeout(connect_timeout)
            .no_proxy()
            .build()?;

        Ok(Self {
            client,
            redirect_mode: config.redirect_mode,
            timeout: Duration::from_secs(config.timeout_secs),
            connect_timeout,
            user_agent: header_or_default(&config.user_agent, UpstreamConfig::default().user_agent),
            accept: header_or_default(&config.accept, UpstreamConfig::default().accept),
            accept_language: header_or_default(
                &config.accept_language,
                UpstreamConfig::default().accept_language,
            ),
        })
    }

    pub fn redirect_mode(&self) -> RedirectMode {
        self.redirect_mode
    }

    /// Send `request` and wait for the response head.
    ///
    /// On timeout the in-flight request future is dropped, which closes the
    /// upstream connection.
    pub async fn dispatch(&self, request: UpstreamRequest) -> Result<UpstreamResponse, UpstreamError> {
        let host = request.target.host_str().unwrap_or_default().to_string();
        let headers = self.outbound_headers(request.headers, &request.target);

        let mut builder = self
            .client
            .request(request.method, request.target)
            .headers(headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        match tokio::time::timeout(self.timeout, builder.send()).await {
            Ok(Ok(response)) => Ok(UpstreamResponse {
                inner: response,
                read_timeout: self.timeout,
            }),
            Ok(Err(e)) => {
                let err = UpstreamError::classify(&e, &host, self.connect_timeout);
                tracing::debug!(host = %host, error = %e, kind = err.kind(), "Upstream request failed");
                Err(err)
            }
            Err(_) => Err(UpstreamError::Timeout(self.timeout)),
        }
    }

    fn outbound_headers(&self, mut headers: HeaderMap, target: &Url) -> HeaderMap {
        if !headers.contains_key(header::USER_AGENT) {
            headers.insert(header::USER_AGENT, self.user_agent.clone());
        }
        if !headers.contains_key(header::ACCEPT) {
            headers.insert(header::ACCEPT, self.accept.clone());
        }
        if !headers.contains_key(header::ACCEPT_LANGUAGE) {
            headers.insert(header::ACCEPT_LANGUAGE, self.accept_language.clone());
        }
        if let Ok(referer) = HeaderValue::from_str(target.as_str()) {
            headers.insert(header::REFERER, referer);
        }
        headers
    }
}

/// Follow at most `max` redirects, and only to http(s) URLs whose host the
/// allowlist accepts. Anything else stops the chain and the 3xx itself is
/// returned, so its Location is rewritten like in surface mode.
fn follow_policy(max: usize, allowlist: Arc<Allowlist>) -> Policy {
    Policy::custom(move |attempt| {
        let next = attempt.url();
        if attempt.previous().len() > max {
            tracing::debug!(next = %next, max, "Redirect limit reached, surfacing redirect");
            attempt.stop()
        } else if !is_followable(next, &allowlist) {
            tracing::warn!(next = %next, "Redirect leaves the allowlist, surfacing redirect");
            attempt.stop()
        } else {
            attempt.follow()
        }
    })
}

fn is_followable(next: &Url, allowlist: &Allowlist) -> bool {
    matches!(next.scheme(), "http" | "https") && allowlist.is_url_allowed(next.as_str())
}

fn header_or_default(value: &str, fallback: String) -> HeaderValue {
    HeaderValue::from_str(value)
        .or_else(|_| HeaderValue::from_str(&fallback))
        .unwrap_or_else(|_| HeaderValue::from_static("*/*"))
}

/// Response head plus an unread body.
#[derive(Debug)]
pub struct UpstreamResponse {
    inner: reqwest::Response,
    read_timeout: Duration,
}

impl UpstreamResponse {
    pub fn status(&self) -> StatusCode {
        self.inner.status()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    /// URL that produced this response (differs from the target after
    /// followed redirects).
    pub fn final_url(&self) -> &Url {
        self.inner.url()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }

    /// Read the whole body within the deadline.
    pub async fn buffered(self) -> Result<Bytes, UpstreamError> {
        let host = self.final_url().host_str().unwrap_or_default().to_string();
        match tokio::time::timeout(self.read_timeout, self.inner.bytes()).await {
            Ok(Ok(bytes)) => Ok(bytes),
            Ok(Err(e)) => Err(UpstreamError::classify(&e, &host, self.read_timeout)),
            Err(_) => Err(UpstreamError::Timeout(self.read_timeout)),
        }
    }

    /// Stream the body with an idle deadline per chunk.
    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static {
        idle_timeout_stream(self.inner.bytes_stream(), self.read_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(&UpstreamConfig::default(), Arc::new(Allowlist::new(["example.com"]))).unwrap()
    }

    #[test]
    fn test_followable_redirect_targets() {
        let allowlist = Allowlist::new(["example.com"]);
        let followable = |raw: &str| is_followable(&Url::parse(raw).unwrap(), &allowlist);

        assert!(followable("https://example.com/next"));
        assert!(followable("http://127.0.0.1:8080/"));
        assert!(!followable("http://169.254.169.254/latest/meta-data"));
        assert!(!followable("https://www.example.com/"));
        assert!(!followable("ftp://example.com/file"));
    }

    #[test]
    fn test_follow_mode_client_builds() {
        let config = UpstreamConfig {
            redirect_mode: RedirectMode::Follow,
            ..UpstreamConfig::default()
        };
        let dispatcher = Dispatcher::new(&config, Arc::new(Allowlist::default())).unwrap();
        assert_eq!(dispatcher.redirect_mode(), RedirectMode::Follow);
    }

    #[test]
    fn test_default_headers_filled_in() {
        let target = Url::parse("https://example.com/page").unwrap();
        let headers = dispatcher().outbound_headers(HeaderMap::new(), &target);

        assert!(headers[header::USER_AGENT].to_str().unwrap().starts_with("Mozilla/5.0"));
        assert!(headers.contains_key(header::ACCEPT));
        assert_eq!(headers[header::ACCEPT_LANGUAGE], "en-US,en;q=0.9");
        assert_eq!(headers[header::REFERER], "https://example.com/page");
    }

    #[test]
    fn test_client_values_win() {
        let target = Url::parse("https://example.com/").unwrap();
        let mut client = HeaderMap::new();
        client.insert(header::USER_AGENT, HeaderValue::from_static("curl/8"));
        client.insert(header::ACCEPT_LANGUAGE, HeaderValue::from_static("fr-FR"));

        let headers = dispatcher().outbound_headers(client, &target);
        assert_eq!(headers[header::USER_AGENT], "curl/8");
        assert_eq!(headers[header::ACCEPT_LANGUAGE], "fr-FR");
    }

    #[test]
    fn test_invalid_configured_header_falls_back() {
        let value = header_or_default("bad\nvalue", "fallback/1".to_string());
        assert_eq!(value, "fallback/1");
    }
}
