//! Host allowlist.
//!
//! The allowlist is the proxy's only access control: a target is fetched only
//! when its hostname is an exact member of the set. No wildcard or subdomain
//! matching. Built once at startup and read-only afterwards.

use std::collections::HashSet;

use url::Url;

use crate::config::ProxyConfig;

/// Loopback hostnames that are always allowed.
pub const LOCAL_HOSTS: [&str; 2] = ["localhost", "127.0.0.1"];

/// Set of hostnames the proxy may fetch.
#[derive(Debug, Clone, Default)]
pub struct Allowlist {
    hosts: HashSet<String>,
    bypass: bool,
}

impl Allowlist {
    /// Create an allowlist from explicit hostnames plus the local hosts.
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let hosts = hosts
            .into_iter()
            .map(|h| normalize(h.as_ref()))
            .filter(|h| !h.is_empty())
            .chain(LOCAL_HOSTS.iter().map(|h| h.to_string()))
            .collect();
        Self {
            hosts,
            bypass: false,
        }
    }

    /// An allowlist that admits every host.
    pub fn bypass() -> Self {
        Self {
            hosts: HashSet::new(),
            bypass: true,
        }
    }

    /// Build from configured hosts and the hostnames of every site shortcut.
    pub fn from_config(config: &ProxyConfig) -> Self {
        if config.allowlist.allow_all {
            tracing::warn!(
                "Host allowlist DISABLED: the proxy will fetch any http(s) URL for any client"
            );
            return Self::bypass();
        }

        let site_hosts = config.portal.sites.iter().filter_map(|site| {
            let host = Url::parse(&site.url)
                .ok()
                .and_then(|u| u.host_str().map(str::to_string));
            if host.is_none() {
                tracing::warn!(site = %site.name, url = %site.url, "Site URL has no host, not allowlisted");
            }
            host
        });

        let allowlist = Self::new(config.allowlist.hosts.iter().cloned().chain(site_hosts));
        tracing::info!(hosts = allowlist.hosts.len(), "Allowlist built");
        allowlist
    }

    /// Exact hostname membership test.
    pub fn is_allowed(&self, host: &str) -> bool {
        self.bypass || self.hosts.contains(&normalize(host))
    }

    /// Parse `raw` and test its host. Unparseable URLs are never allowed.
    pub fn is_url_allowed(&self, raw: &str) -> bool {
        match Url::parse(raw) {
            Ok(url) => url.host_str().is_some_and(|h| self.is_allowed(h)),
            Err(_) => false,
        }
    }

    /// Whether the allowlist is bypassed.
    pub fn is_bypassed(&self) -> bool {
        self.bypass
    }
}

fn normalize(host: &str) -> String {
    host.trim().trim_end_matches('.').to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SiteConfig;

    #[test]
    fn test_exact_match_only() {
        let allowlist = Allowlist::new(["example.com"]);
        assert!(allowlist.is_allowed("example.com"));
        assert!(allowlist.is_allowed("EXAMPLE.com"));
        assert!(!allowlist.is_allowed("www.example.com"));
        assert!(!allowlist.is_allowed("example.com.evil.net"));
        assert!(!allowlist.is_allowed("ample.com"));
    }

    #[test]
    fn test_local_hosts_always_present() {
        let allowlist = Allowlist::new(Vec::<String>::new());
        assert!(allowlist.is_allowed("localhost"));
        assert!(allowlist.is_allowed("127.0.0.1"));
        assert!(!allowlist.is_allowed("0.0.0.0"));
    }

    #[test]
    fn test_from_config_includes_sites() {
        let mut config = ProxyConfig::default();
        config.allowlist.hosts.push("extra.example.org".into());
        config.portal.sites.push(SiteConfig {
            name: "News".into(),
            url: "https://News.Example.net:8443/front".into(),
            icon: None,
        });

        let allowlist = Allowlist::from_config(&config);
        assert!(allowlist.is_allowed("extra.example.org"));
        assert!(allowlist.is_allowed("news.example.net"));
        assert!(!allowlist.is_bypassed());
    }

    #[test]
    fn test_bypass_allows_everything() {
        let mut config = ProxyConfig::default();
        config.allowlist.allow_all = true;
        let allowlist = Allowlist::from_config(&config);
        assert!(allowlist.is_bypassed());
        assert!(allowlist.is_allowed("anything.invalid"));
    }

    #[test]
    fn test_unparseable_urls_fail_closed() {
        let allowlist = Allowlist::new(["example.com"]);
        assert!(allowlist.is_url_allowed("https://example.com/a"));
        assert!(!allowlist.is_url_allowed("not a url"));
        assert!(!allowlist.is_url_allowed("https://"));
        assert!(!allowlist.is_url_allowed("data:text/html,hi"));
    }
}
