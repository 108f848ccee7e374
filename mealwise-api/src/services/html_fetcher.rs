//! Outbound HTML fetch with an SSRF guard
//!
//! Every hop (initial URL and each redirect target) is checked before a
//! connection is made:
//! - scheme must be `http`/`https`, no userinfo, default port unless allowed
//! - the host is resolved and every address must be publicly routable
//! - the connection is pinned to the checked address so a second DNS
//!   answer cannot swap in a private one
//!
//! Redirects are followed manually, up to `max_redirects`.

use async_trait::async_trait;
use mealwise_common::config::FetchConfig;
use reqwest::header::{CONTENT_TYPE, LOCATION};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use url::{Host, Url};

use crate::error::ExtractionError;

/// Downloaded page
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedPage {
    /// URL after redirects
    pub final_url: String,
    pub html: String,
}

/// Source of page HTML
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, ExtractionError>;
}

/// True for addresses that must never be fetched
pub fn is_blocked_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_blocked_v4(v4),
        IpAddr::V6(v6) => is_blocked_v6(v6),
    }
}

fn is_blocked_v4(ip: Ipv4Addr) -> bool {
    let [a, b, c, _] = ip.octets();
    ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_multicast()
        || ip.is_broadcast()
        || ip.is_documentation()
        || a == 0
        // CGNAT 100.64.0.0/10
        || (a == 100 && (64..=127).contains(&b))
        // IETF protocol assignments 192.0.0.0/24
        || (a == 192 && b == 0 && c == 0)
        // benchmarking 198.18.0.0/15
        || (a == 198 && (b == 18 || b == 19))
        // reserved 240.0.0.0/4
        || a >= 240
}

/// IPv4 address carried inside a v6 one: mapped, compatible, NAT64, 6to4
fn embedded_v4(ip: Ipv6Addr) -> Option<Ipv4Addr> {
    if let Some(v4) = ip.to_ipv4_mapped() {
        return Some(v4);
    }
    let s = ip.segments();
    let low = |hi: u16, lo: u16| Ipv4Addr::new((hi >> 8) as u8, hi as u8, (lo >> 8) as u8, lo as u8);
    if s[..6] == [0, 0, 0, 0, 0, 0] && !ip.is_loopback() && !ip.is_unspecified() {
        return Some(low(s[6], s[7]));
    }
    if s[0] == 0x0064 && s[1] == 0xff9b && s[2..6] == [0, 0, 0, 0] {
        return Some(low(s[6], s[7]));
    }
    if s[0] == 0x2002 {
        return Some(low(s[1], s[2]));
    }
    None
}

fn is_blocked_v6(ip: Ipv6Addr) -> bool {
    if let Some(v4) = embedded_v4(ip) {
        return is_blocked_v4(v4);
    }
    let first = ip.segments()[0];
    ip.is_loopback()
        || ip.is_unspecified()
        || ip.is_multicast()
        // unique local fc00::/7
        || (first & 0xfe00) == 0xfc00
        // link-local fe80::/10
        || (first & 0xffc0) == 0xfe80
        // documentation 2001:db8::/32
        || (first == 0x2001 && ip.segments()[1] == 0x0db8)
}

/// Static checks on a URL before resolution
pub fn check_url(url: &Url, settings: &FetchConfig) -> Result<(), ExtractionError> {
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ExtractionError::Blocked(format!(
            "Only http and https URLs can be imported (got {})",
            url.scheme()
        )));
    }
    if !url.username().is_empty() || url.password().is_some() {
        return Err(ExtractionError::Blocked(
            "URLs with embedded credentials are not allowed".to_string(),
        ));
    }
    if url.host().is_none() {
        return Err(ExtractionError::Blocked("URL has no host".to_string()));
    }
    if let Some(port) = url.port() {
        let default_port = if url.scheme() == "https" { 443 } else { 80 };
        if port != default_port && !settings.allow_nonstandard_ports {
            return Err(ExtractionError::Blocked(format!(
                "Port {} is not allowed",
                port
            )));
        }
    }
    Ok(())
}

/// Resolve the URL host and reject non-public addresses
async fn resolve_checked(url: &Url, settings: &FetchConfig) -> Result<SocketAddr, ExtractionError> {
    let port = url
        .port_or_known_default()
        .ok_or_else(|| ExtractionError::Blocked("URL has no port".to_string()))?;

    let addrs: Vec<SocketAddr> = match url.host() {
        Some(Host::Ipv4(ip)) => vec![SocketAddr::new(IpAddr::V4(ip), port)],
        Some(Host::Ipv6(ip)) => vec![SocketAddr::new(IpAddr::V6(ip), port)],
        Some(Host::Domain(domain)) => tokio::net::lookup_host((domain, port))
            .await
            .map_err(|e| ExtractionError::FetchFailed(format!("Could not resolve {}: {}", domain, e)))?
            .collect(),
        None => return Err(ExtractionError::Blocked("URL has no host".to_string())),
    };

    if addrs.is_empty() {
        return Err(ExtractionError::FetchFailed(format!(
            "No addresses found for {}",
            url.host_str().unwrap_or_default()
        )));
    }

    if !settings.allow_private_hosts {
        if let Some(bad) = addrs.iter().find(|a| is_blocked_ip(a.ip())) {
            tracing::warn!(url = %url, addr = %bad.ip(), "Refusing to fetch non-public address");
            return Err(ExtractionError::Blocked(
                "URL resolves to a private or reserved address".to_string(),
            ));
        }
    }

    Ok(addrs[0])
}

fn is_html_content_type(value: Option<&str>) -> bool {
    match value {
        None => true,
        Some(ct) => {
            let mime = ct.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
            mime == "text/html" || mime == "application/xhtml+xml"
        }
    }
}

/// reqwest-backed fetcher used in production
pub struct HttpPageFetcher {
    settings: FetchConfig,
}

impl HttpPageFetcher {
    pub fn new(settings: FetchConfig) -> Self {
        Self { settings }
    }

    fn client_for(&self, url: &Url, addr: SocketAddr) -> Result<reqwest::Client, ExtractionError> {
        let mut builder = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(Duration::from_secs(self.settings.timeout_secs))
            .user_agent(self.settings.user_agent.clone());
        if let Some(Host::Domain(domain)) = url.host() {
            builder = builder.resolve(domain, addr);
        }
        builder
            .build()
            .map_err(|e| ExtractionError::FetchFailed(format!("HTTP client error: {}", e)))
    }

    async fn fetch_inner(&self, start: &str) -> Result<FetchedPage, ExtractionError> {
        let mut url = Url::parse(start.trim())
            .map_err(|e| ExtractionError::Blocked(format!("Invalid URL: {}", e)))?;

        let mut redirects = 0usize;
        loop {
            check_url(&url, &self.settings)?;
            let addr = resolve_checked(&url, &self.settings).await?;
            let client = self.client_for(&url, addr)?;

            tracing::debug!(url = %url, addr = %addr, "Fetching page");
            let response = client
                .get(url.clone())
                .header(reqwest::header::ACCEPT, "text/html,application/xhtml+xml")
                .send()
                .await
                .map_err(|e| ExtractionError::FetchFailed(format!("Request failed: {}", e)))?;

            let status = response.status();
            if status.is_redirection() {
                redirects += 1;
                if redirects > self.settings.max_redirects {
                    return Err(ExtractionError::FetchFailed(format!(
                        "Too many redirects (limit {})",
                        self.settings.max_redirects
                    )));
                }
                let location = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| {
                        ExtractionError::FetchFailed("Redirect without Location header".to_string())
                    })?;
                url = url
                    .join(location)
                    .map_err(|e| ExtractionError::FetchFailed(format!("Bad redirect target: {}", e)))?;
                continue;
            }

            if !status.is_success() {
                return Err(ExtractionError::FetchFailed(format!(
                    "HTTP {} from {}",
                    status.as_u16(),
                    url.host_str().unwrap_or_default()
                )));
            }

            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            if !is_html_content_type(content_type.as_deref()) {
                return Err(ExtractionError::FetchFailed(format!(
                    "Unsupported content type: {}",
                    content_type.unwrap_or_default()
                )));
            }

            let limit = self.settings.max_html_bytes;
            if response.content_length().map(|len| len as usize > limit).unwrap_or(false) {
                return Err(ExtractionError::FetchFailed(format!(
                    "Page is larger than {} bytes",
                    limit
                )));
            }

            let mut response = response;
            let mut body: Vec<u8> = Vec::new();
            while let Some(chunk) = response
                .chunk()
                .await
                .map_err(|e| ExtractionError::FetchFailed(format!("Read failed: {}", e)))?
            {
                if body.len() + chunk.len() > limit {
                    return Err(ExtractionError::FetchFailed(format!(
                        "Page is larger than {} bytes",
                        limit
                    )));
                }
                body.extend_from_slice(&chunk);
            }

            tracing::info!(url = %url, bytes = body.len(), redirects, "Fetched page");
            return Ok(FetchedPage {
                final_url: url.to_string(),
                html: String::from_utf8_lossy(&body).into_owned(),
            });
        }
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, ExtractionError> {
        let timeout = Duration::from_secs(self.settings.timeout_secs);
        match tokio::time::timeout(timeout, self.fetch_inner(url)).await {
            Ok(result) => result,
            Err(_) => Err(ExtractionError::FetchFailed(format!(
                "Timed out after {} seconds",
                self.settings.timeout_secs
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> FetchConfig {
        FetchConfig::default()
    }

    #[test]
    fn test_blocked_ipv4() {
        for ip in [
            "127.0.0.1",
            "10.1.2.3",
            "172.16.0.1",
            "192.168.1.1",
            "169.254.169.254",
            "0.0.0.0",
            "100.64.0.1",
            "224.0.0.1",
            "255.255.255.255",
            "192.0.2.1",
        ] {
            assert!(is_blocked_ip(ip.parse().unwrap()), "{} should be blocked", ip);
        }
        assert!(!is_blocked_ip("93.184.216.34".parse().unwrap()));
        assert!(!is_blocked_ip("100.128.0.1".parse().unwrap()));
    }

    #[test]
    fn test_blocked_ipv6() {
        for ip in ["::1", "::", "fd00::1", "fe80::1", "::ffff:127.0.0.1", "::ffff:10.0.0.1", "2001:db8::1"] {
            assert!(is_blocked_ip(ip.parse().unwrap()), "{} should be blocked", ip);
        }
        assert!(!is_blocked_ip("2606:2800:220:1:248:1893:25c8:1946".parse().unwrap()));
    }

    #[test]
    fn test_ipv6_with_embedded_ipv4() {
        for ip in ["::127.0.0.1", "::10.1.2.3", "64:ff9b::192.168.1.1", "64:ff9b::a9fe:a9fe", "2002:c0a8:0101::1", "2002:7f00:1::"] {
            assert!(is_blocked_ip(ip.parse().unwrap()), "{} should be blocked", ip);
        }
        for ip in ["::8.8.8.8", "64:ff9b::8.8.8.8", "2002:0808:0808::1"] {
            assert!(!is_blocked_ip(ip.parse().unwrap()), "{} should be allowed", ip);
        }
    }

    #[test]
    fn test_check_url_rules() {
        let s = settings();
        assert!(check_url(&Url::parse("https://example.com/r").unwrap(), &s).is_ok());
        assert!(check_url(&Url::parse("http://example.com:80/r").unwrap(), &s).is_ok());

        let err = check_url(&Url::parse("ftp://example.com/r").unwrap(), &s).unwrap_err();
        assert_eq!(err.code(), "blocked_url");
        assert!(check_url(&Url::parse("file:///etc/passwd").unwrap(), &s).is_err());
        assert!(check_url(&Url::parse("https://user:pw@example.com/").unwrap(), &s).is_err());
        assert!(check_url(&Url::parse("https://example.com:8443/").unwrap(), &s).is_err());

        let permissive = FetchConfig {
            allow_nonstandard_ports: true,
            ..settings()
        };
        assert!(check_url(&Url::parse("https://example.com:8443/").unwrap(), &permissive).is_ok());
    }

    #[test]
    fn test_content_type() {
        assert!(is_html_content_type(None));
        assert!(is_html_content_type(Some("text/html; charset=utf-8")));
        assert!(is_html_content_type(Some("application/xhtml+xml")));
        assert!(!is_html_content_type(Some("application/json")));
        assert!(!is_html_content_type(Some("image/png")));
    }

    #[tokio::test]
    async fn test_fetch_refuses_loopback_literal() {
        let fetcher = HttpPageFetcher::new(settings());
        let err = fetcher.fetch("http://127.0.0.1/recipe").await.unwrap_err();
        assert_eq!(err.code(), "blocked_url");

        let err = fetcher.fetch("http://[::1]/recipe").await.unwrap_err();
        assert_eq!(err.code(), "blocked_url");
    }

    #[tokio::test]
    async fn test_fetch_refuses_localhost_name() {
        let fetcher = HttpPageFetcher::new(settings());
        let err = fetcher.fetch("http://localhost/recipe").await.unwrap_err();
        assert!(matches!(err.code(), "blocked_url" | "fetch_failed"));
    }

    #[tokio::test]
    async fn test_fetch_rejects_unparseable_url() {
        let fetcher = HttpPageFetcher::new(settings());
        let err = fetcher.fetch("not a url").await.unwrap_err();
        assert_eq!(err.code(), "blocked_url");
    }
}
