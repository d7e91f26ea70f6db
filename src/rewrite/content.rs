//! Textual body rewriting.
//!
//! # Algorithm
//! 1. Bare absolute `http(s)://` URLs anywhere in the text are routed through
//!    the proxy when they share the target's origin.
//! 2. `src=`, `href=`, `action=` attribute values (quoted or not) and CSS
//!    `url(...)` references are resolved against the target URL and routed
//!    through the proxy when the result is same-origin.
//!
//! This is a text transform, not a parser. URLs assembled at runtime by
//! scripts are never seen. References that already point at the proxy are
//! left alone, which makes the rewrite idempotent.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use thiserror::Error;

use crate::rewrite::context::RewriteContext;

/// Content types eligible for rewriting (prefix match on the MIME type).
const REWRITABLE_MIME_PREFIXES: &[&str] = &[
    "text/html",
    "application/xhtml+xml",
    "text/css",
    "text/javascript",
    "application/javascript",
    "application/x-javascript",
    "application/ecmascript",
];

/// Sentence punctuation that ends prose rather than the URL before it.
const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?'];

static ABSOLUTE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)https?://[^\s"'<>()\\`]+"#).expect("absolute url pattern")
});

static ATTRIBUTE_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(?:src|href|action)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
        .expect("attribute pattern")
});

static CSS_URL_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\burl\(\s*(?:"([^"]*)"|'([^']*)'|([^\s"')]+))\s*\)"#)
        .expect("css url pattern")
});

/// Errors that keep a body from being rewritten. The caller forwards the
/// original bytes instead.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RewriteError {
    #[error("body is not valid UTF-8 at byte {0}")]
    Encoding(usize),

    #[error("body still carries content-encoding '{0}'")]
    CompressedBody(String),
}

/// Whether a Content-Type value selects the rewrite path.
pub fn is_rewritable(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    REWRITABLE_MIME_PREFIXES
        .iter()
        .any(|prefix| mime.starts_with(prefix))
}

/// Decode and rewrite a body.
pub fn rewrite_body(body: &[u8], ctx: &RewriteContext) -> Result<String, RewriteError> {
    let text = std::str::from_utf8(body).map_err(|e| RewriteError::Encoding(e.valid_up_to()))?;
    Ok(rewrite_text(text, ctx))
}

/// Rewrite same-origin URLs in `text` so they route through the proxy.
pub fn rewrite_text(text: &str, ctx: &RewriteContext) -> String {
    let pass_one = ABSOLUTE_URL.replace_all(text, |caps: &Captures| {
        let found = &caps[0];
        let url = found.trim_end_matches(TRAILING_PUNCTUATION);
        match rewrite_absolute(url, ctx) {
            Some(rewritten) => format!("{rewritten}{}", &found[url.len()..]),
            None => found.to_string(),
        }
    });

    let pass_two = replace_reference_groups(&ATTRIBUTE_REF, &pass_one, ctx);
    let pass_three = replace_reference_groups(&CSS_URL_REF, &pass_two, ctx);
    pass_three.into_owned()
}

fn rewrite_absolute(found: &str, ctx: &RewriteContext) -> Option<String> {
    if ctx.is_proxied(found) {
        return None;
    }
    let unescaped = unescape_amp(found);
    let url = url::Url::parse(&unescaped).ok()?;
    ctx.is_same_origin(&url).then(|| ctx.proxy_url(&unescaped))
}

/// Replace the first matching capture group of every match, keeping the rest
/// of the match byte-for-byte.
fn replace_reference_groups<'a>(re: &Regex, text: &'a str, ctx: &RewriteContext) -> Cow<'a, str> {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    let mut changed = false;

    for caps in re.captures_iter(text) {
        let Some(value) = caps.iter().skip(1).flatten().next() else {
            continue;
        };
        if let Some(replacement) = rewrite_reference(value.as_str(), ctx) {
            out.push_str(&text[last..value.start()]);
            out.push_str(&replacement);
            last = value.end();
            changed = true;
        }
    }

    if !changed {
        return Cow::Borrowed(text);
    }
    out.push_str(&text[last..]);
    Cow::Owned(out)
}

fn rewrite_reference(raw: &str, ctx: &RewriteContext) -> Option<String> {
    let reference = raw.trim();
    if reference.is_empty() || reference.starts_with('#') || ctx.is_proxied(reference) {
        return None;
    }

    let lower = reference.to_ascii_lowercase();
    if lower.starts_with("data:") || lower.starts_with("javascript:") {
        return None;
    }

    let unescaped = unescape_amp(reference);
    let resolved = ctx.resolve(&unescaped)?;
    if !ctx.is_same_origin(&resolved) {
        return None;
    }

    // Absolute references keep their exact spelling inside the proxy URL.
    if lower.starts_with("http://") || lower.starts_with("https://") {
        Some(ctx.proxy_url(&unescaped))
    } else {
        Some(ctx.proxy_url(resolved.as_str()))
    }
}

fn unescape_amp(value: &str) -> Cow<'_, str> {
    if value.contains("&amp;") {
        Cow::Owned(value.replace("&amp;", "&"))
    } else {
        Cow::Borrowed(value)
    }
}
