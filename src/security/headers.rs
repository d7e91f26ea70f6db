//! Header manipulation for re-embedding upstream responses.
//!
//! # Responsibilities
//! - Strip hop-by-hop headers in both directions
//! - Remove framing restrictions (X-Frame-Options, CSP frame-ancestors)
//! - Replace upstream CORS headers with the portal's permissive set
//! - Route Location back through the proxy
//! - Scope Set-Cookie to the proxy's own origin (drop Domain=)
//!
//! # Design Decisions
//! - `HeaderMap` names are lowercase already; values are appended once per
//!   upstream value so no case-variant duplicates can be produced

use std::sync::LazyLock;

use axum::http::{header, HeaderMap, HeaderName, HeaderValue};
use regex::Regex;
use url::Url;

use crate::rewrite::RewriteContext;

/// Connection-scoped headers never forwarded by a proxy.
pub const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

pub const CORS_ALLOW_ORIGIN: &str = "*";
pub const CORS_ALLOW_METHODS: &str = "GET, POST, PUT, DELETE, OPTIONS";
pub const CORS_ALLOW_HEADERS: &str = "Content-Type, Authorization";

const CONTENT_SECURITY_POLICY_REPORT_ONLY: &str = "content-security-policy-report-only";

static FRAME_ANCESTORS_DIRECTIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*frame-ancestors(?:\s|$)").expect("frame-ancestors pattern")
});

static COOKIE_DOMAIN_ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i);\s*domain\s*=[^;]*").expect("cookie domain pattern")
});

pub fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(&name.as_str())
}

/// Transform upstream response headers for delivery to the embedding client.
pub fn sanitize_response_headers(upstream: &HeaderMap, ctx: &RewriteContext) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(upstream.len() + 3);

    for (name, value) in upstream.iter() {
        if is_hop_by_hop(name)
            || *name == header::X_FRAME_OPTIONS
            || name.as_str().starts_with("access-control-")
        {
            continue;
        }

        if *name == header::CONTENT_SECURITY_POLICY || name.as_str() == CONTENT_SECURITY_POLICY_REPORT_ONLY {
            match value.to_str() {
                Ok(policy) => {
                    if let Some(kept) = strip_frame_ancestors(policy)
                        .and_then(|p| HeaderValue::from_str(&p).ok())
                    {
                        out.append(name.clone(), kept);
                    }
                }
                Err(_) => {
                    out.append(name.clone(), value.clone());
                }
            }
            continue;
        }

        if *name == header::LOCATION {
            let rewritten = value
                .to_str()
                .ok()
                .and_then(|loc| rewrite_location(loc, ctx))
                .and_then(|loc| HeaderValue::from_str(&loc).ok());
            out.append(name.clone(), rewritten.unwrap_or_else(|| value.clone()));
            continue;
        }

        if *name == header::SET_COOKIE {
            let scoped = value
                .to_str()
                .ok()
                .map(strip_cookie_domain)
                .and_then(|c| HeaderValue::from_str(&c).ok());
            out.append(name.clone(), scoped.unwrap_or_else(|| value.clone()));
            continue;
        }

        out.append(name.clone(), value.clone());
    }

    insert_cors_headers(&mut out);
    out
}

/// Add the portal's permissive CORS headers.
pub fn insert_cors_headers(headers: &mut HeaderMap) {
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static(CORS_ALLOW_ORIGIN),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(CORS_ALLOW_METHODS),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(CORS_ALLOW_HEADERS),
    );
}

/// Remove the `frame-ancestors` directive from a CSP value.
///
/// Returns `None` when nothing else remains, in which case the header should
/// be dropped.
pub fn strip_frame_ancestors(policy: &str) -> Option<String> {
    if !policy.to_ascii_lowercase().contains("frame-ancestors") {
        return Some(policy.to_string());
    }

    // A header may carry several policies separated by commas.
    let kept: Vec<String> = policy
        .split(',')
        .filter_map(|single| {
            let directives: Vec<&str> = single
                .split(';')
                .map(str::trim)
                .filter(|directive| !directive.is_empty() && !FRAME_ANCESTORS_DIRECTIVE.is_match(directive))
                .collect();
            (!directives.is_empty()).then(|| directives.join("; "))
        })
        .collect();

    if kept.is_empty() {
        None
    } else {
        Some(kept.join(", "))
    }
}

/// Drop every `Domain=` attribute from a Set-Cookie value.
pub fn strip_cookie_domain(cookie: &str) -> String {
    COOKIE_DOMAIN_ATTRIBUTE.replace_all(cookie, "").into_owned()
}

/// Point a redirect target back at the proxy. Relative targets are resolved
/// against the upstream URL first.
pub fn rewrite_location(location: &str, ctx: &RewriteContext) -> Option<String> {
    let location = location.trim();
    if location.is_empty() || ctx.is_proxied(location) {
        return None;
    }

    match Url::parse(location) {
        Ok(absolute) if matches!(absolute.scheme(), "http" | "https") => Some(ctx.proxy_url(location)),
        Ok(_) => None,
        Err(_) => ctx.resolve(location).map(|u| ctx.proxy_url(u.as_str())),
    }
}

/// Copy client request headers for the upstream hop.
///
/// Hop-by-hop headers and headers the dispatcher owns (Host, Content-Length,
/// Accept-Encoding, Referer) are dropped.
pub fn forwardable_request_headers(client: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(client.len());
    for (name, value) in client.iter() {
        if is_hop_by_hop(name)
            || *name == header::HOST
            || *name == header::CONTENT_LENGTH
            || *name == header::ACCEPT_ENCODING
            || *name == header::REFERER
            || name.as_str().starts_with("x-forwarded-")
            || name.as_str() == "x-request-id"
        {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}
