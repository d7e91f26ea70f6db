//! Upstream failure taxonomy.

use std::error::Error as StdError;
use std::time::Duration;

use thiserror::Error;

/// Why an upstream fetch failed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UpstreamError {
    /// The host actively refused or could not be reached.
    #[error("connection to {host} failed: {detail}")]
    ConnectionRefused { host: String, detail: String },

    /// No answer within the deadline.
    #[error("upstream timed out after {} seconds", .0.as_secs())]
    Timeout(Duration),

    /// DNS resolution failed.
    #[error("host {0} could not be resolved")]
    HostNotFound(String),

    /// Anything else on the wire (bad response, TLS, redirect loop).
    #[error("upstream protocol error: {0}")]
    Protocol(String),
}

impl UpstreamError {
    /// Classify a transport error for `host`. Transport-level timeouts
    /// (connect) are reported against `deadline`.
    pub fn classify(err: &reqwest::Error, host: &str, deadline: Duration) -> Self {
        if err.is_timeout() {
            return Self::Timeout(deadline);
        }

        if is_dns_failure(err) {
            return Self::HostNotFound(host.to_string());
        }

        if err.is_connect() {
            return Self::ConnectionRefused {
                host: host.to_string(),
                detail: root_cause(err),
            };
        }

        Self::Protocol(root_cause(err))
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConnectionRefused { .. } => "connection_refused",
            Self::Timeout(_) => "timeout",
            Self::HostNotFound(_) => "host_not_found",
            Self::Protocol(_) => "protocol",
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

fn sources<'a>(err: &'a (dyn StdError + 'static)) -> impl Iterator<Item = &'a (dyn StdError + 'static)> {
    std::iter::successors(Some(err), |e| (*e).source())
}

fn is_dns_failure(err: &reqwest::Error) -> bool {
    sources(err).any(|e| {
        let message = e.to_string().to_ascii_lowercase();
        message.contains("dns error")
            || message.contains("failed to lookup address")
            || message.contains("name or service not known")
            || message.contains("no such host")
    })
}

fn root_cause(err: &reqwest::Error) -> String {
    sources(err)
        .last()
        .map(ToString::to_string)
        .unwrap_or_else(|| err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(
            UpstreamError::Timeout(Duration::from_secs(60)).to_string(),
            "upstream timed out after 60 seconds"
        );
        assert_eq!(
            UpstreamError::HostNotFound("nowhere.invalid".into()).to_string(),
            "host nowhere.invalid could not be resolved"
        );
    }

    #[tokio::test]
    async fn test_classify_refused_connection() {
        // Bind then drop to get a port nobody listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = reqwest::Client::builder()
            .no_proxy()
            .build()
            .unwrap()
            .get(format!("http://{}/", addr))
            .send()
            .await
            .unwrap_err();

        let classified = UpstreamError::classify(&err, "127.0.0.1", Duration::from_secs(5));
        assert_eq!(classified.kind(), "connection_refused");
    }
}
