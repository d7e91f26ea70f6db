//! Per-request rewrite context.

use url::{Origin, Url};

/// What a rewrite needs to know about the current request: the upstream URL
/// (base for relative references), its origin, and where the proxy lives.
#[derive(Debug, Clone)]
pub struct RewriteContext {
    target: Url,
    origin: Origin,
    proxy_base: String,
}

impl RewriteContext {
    pub fn new(target: Url, proxy_base: impl Into<String>) -> Self {
        let origin = target.origin();
        Self {
            target,
            origin,
            proxy_base: proxy_base.into(),
        }
    }

    /// Same scheme, host and (effective) port as the target.
    pub fn is_same_origin(&self, url: &Url) -> bool {
        url.origin() == self.origin
    }

    /// `<proxy-base>?url=<percent-encoded absolute>`.
    pub fn proxy_url(&self, absolute: &str) -> String {
        format!("{}?url={}", self.proxy_base, urlencoding::encode(absolute))
    }

    /// True when `reference` already routes through this proxy.
    pub fn is_proxied(&self, reference: &str) -> bool {
        reference
            .strip_prefix(self.proxy_base.as_str())
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('?'))
    }

    /// Resolve a (possibly relative or protocol-relative) reference against
    /// the target. Only http(s) results are returned.
    pub fn resolve(&self, reference: &str) -> Option<Url> {
        self.target
            .join(reference)
            .ok()
            .filter(|u| matches!(u.scheme(), "http" | "https"))
    }
}
