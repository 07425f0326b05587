//! SSRF guard for client-supplied URLs.
//!
//! Every URL the service fetches on behalf of a client passes through two
//! gates: a syntactic check (`validate_url`) and a resolution check
//! (`ensure_public`). Redirect hops re-enter both gates.

use std::net::IpAddr;

use tokio::net::lookup_host;
use url::Url;

use crate::error::{MediaError, MediaResult};

/// Maximum URL length accepted from clients.
pub const MAX_URL_LENGTH: usize = 2048;

/// Host suffixes that never leave the building.
const BLOCKED_SUFFIXES: &[&str] = &[".local", ".internal"];

/// Parse and check shape: scheme, host presence, length.
pub fn parse_url(raw: &str) -> MediaResult<Url> {
    if raw.len() > MAX_URL_LENGTH {
        return Err(MediaError::UrlTooLong);
    }

    let url = Url::parse(raw).map_err(|e| MediaError::InvalidUrl(e.to_string()))?;

    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(MediaError::InvalidUrl(format!(
                "unsupported scheme {other:?}"
            )))
        }
    }

    let host = url
        .host_str()
        .ok_or_else(|| MediaError::InvalidUrl("missing host".into()))?;
    if host.is_empty() {
        return Err(MediaError::InvalidUrl("empty host".into()));
    }

    Ok(url)
}

/// Textual address checks: literal private addresses and internal suffixes.
pub fn check_host(url: &Url) -> MediaResult<()> {
    let host = url
        .host_str()
        .ok_or_else(|| MediaError::InvalidUrl("missing host".into()))?;

    let lower = host.to_ascii_lowercase();
    let bare = lower.trim_matches(|c| c == '[' || c == ']');
    if let Ok(ip) = bare.parse::<IpAddr>() {
        if is_blocked_ip(ip) {
            return Err(MediaError::ssrf_blocked(format!("address {ip} is private")));
        }
    }
    if BLOCKED_SUFFIXES.iter().any(|s| lower.ends_with(s)) {
        return Err(MediaError::ssrf_blocked(format!("host {host} is internal")));
    }
    Ok(())
}

/// Full syntactic validation: shape plus textual address checks.
pub fn validate_url(raw: &str) -> MediaResult<Url> {
    let url = parse_url(raw)?;
    check_host(&url)?;
    Ok(url)
}

/// Resolve the host and reject URLs pointing at private address space.
///
/// Resolution happens before any connection is made; a blocked host never
/// sees a TCP SYN from this process.
pub async fn ensure_public(url: &Url) -> MediaResult<()> {
    let host = url
        .host_str()
        .ok_or_else(|| MediaError::InvalidUrl("missing host".into()))?;

    // Literal addresses were already vetted by validate_url.
    if host.trim_matches(|c| c == '[' || c == ']').parse::<IpAddr>().is_ok() {
        return Ok(());
    }

    let port = url.port_or_known_default().unwrap_or(443);
    let addrs = lookup_host((host, port))
        .await
        .map_err(|e| MediaError::download_failed(format!("DNS lookup for {host} failed: {e}")))?;

    for addr in addrs {
        if is_blocked_ip(addr.ip()) {
            return Err(MediaError::ssrf_blocked(format!(
                "host {host} resolves to private address {}",
                addr.ip()
            )));
        }
    }
    Ok(())
}

/// Address ranges the fetcher refuses to touch.
fn is_blocked_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast()
        }
        IpAddr::V6(v6) => {
            if let Some(mapped) = v6.to_ipv4_mapped() {
                return is_blocked_ip(IpAddr::V4(mapped));
            }
            let seg = v6.segments();
            v6.is_loopback()
                || v6.is_unspecified()
                // Unique local fc00::/7
                || (seg[0] & 0xfe00) == 0xfc00
                // Link local fe80::/10
                || (seg[0] & 0xffc0) == 0xfe80
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_public_urls() {
        assert!(validate_url("https://cdn.example.com/ep.mp3").is_ok());
        assert!(validate_url("http://93.184.216.34/audio.mp3").is_ok());
    }

    #[test]
    fn test_rejects_bad_schemes() {
        assert!(matches!(
            validate_url("ftp://example.com/a.mp3"),
            Err(MediaError::InvalidUrl(_))
        ));
        assert!(matches!(
            validate_url("file:///etc/passwd"),
            Err(MediaError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_rejects_oversized_urls() {
        let long = format!("https://example.com/{}", "a".repeat(MAX_URL_LENGTH));
        assert!(matches!(validate_url(&long), Err(MediaError::UrlTooLong)));
    }

    #[test]
    fn test_rejects_private_literals() {
        for url in [
            "http://127.0.0.1/x.mp3",
            "http://10.1.2.3/x.mp3",
            "http://172.16.0.9/x.mp3",
            "http://192.168.1.1/x.mp3",
            "http://169.254.169.254/latest/meta-data",
            "http://[::1]/x.mp3",
            "http://[fc00::1]/x.mp3",
            "http://[fe80::1]/x.mp3",
        ] {
            assert!(
                matches!(validate_url(url), Err(MediaError::SsrfBlocked { .. })),
                "{url} should be blocked"
            );
        }
    }

    #[test]
    fn test_rejects_internal_suffixes() {
        assert!(matches!(
            validate_url("http://fileserver.local/x.mp3"),
            Err(MediaError::SsrfBlocked { .. })
        ));
        assert!(matches!(
            validate_url("http://db.prod.internal/x.mp3"),
            Err(MediaError::SsrfBlocked { .. })
        ));
    }

    #[tokio::test]
    async fn test_resolution_blocks_loopback_names() {
        let url = validate_url("http://localhost:9/x.mp3").unwrap();
        assert!(matches!(
            ensure_public(&url).await,
            Err(MediaError::SsrfBlocked { .. })
        ));
    }

    #[test]
    fn test_blocked_ip_ranges() {
        assert!(is_blocked_ip("127.0.0.1".parse().unwrap()));
        assert!(is_blocked_ip("::1".parse().unwrap()));
        assert!(is_blocked_ip("::ffff:192.168.0.1".parse().unwrap()));
        assert!(!is_blocked_ip("93.184.216.34".parse().unwrap()));
        assert!(!is_blocked_ip("2606:2800:220:1::1".parse().unwrap()));
    }
}
