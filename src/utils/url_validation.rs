//! Public URL handling
//!
//! The bridge hands Twilio two kinds of URLs: the WebSocket URL of the media
//! stream (inside call-setup markup) and the HTTP callback for outbound calls.
//! Both are derived from one externally reachable base URL, which must:
//! - Use an http(s) or ws(s) scheme
//! - Have a host
//! - Carry no query string or fragment

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use thiserror::Error;
use tracing::warn;
use url::Url;

/// Errors that can occur during URL validation
#[derive(Debug, Error)]
pub enum UrlValidationError {
    #[error("Invalid URL format: {0}")]
    InvalidFormat(#[from] url::ParseError),

    #[error("URL scheme must be http, https, ws or wss, got: {0}")]
    UnsupportedScheme(String),

    #[error("URL must have a host")]
    MissingHost,

    #[error("URL must not contain a query string or fragment")]
    UnexpectedQuery,
}

/// Checks if an IPv4 address is private/internal
///
/// Private addresses include loopback, RFC 1918 ranges, link-local,
/// unspecified and the CGNAT shared range (100.64.0.0/10).
pub fn is_private_ipv4(ip: &Ipv4Addr) -> bool {
    if ip.is_loopback() || ip.is_private() || ip.is_link_local() || ip.is_unspecified() {
        return true;
    }
    let octets = ip.octets();
    octets[0] == 100 && (octets[1] & 0xC0) == 64
}

/// Checks if an IPv6 address is private/internal
pub fn is_private_ipv6(ip: &Ipv6Addr) -> bool {
    if ip.is_loopback() || ip.is_unspecified() {
        return true;
    }
    let segments = ip.segments();

    // Link-local (fe80::/10)
    if segments[0] & 0xFFC0 == 0xFE80 {
        return true;
    }

    // Unique local address (fc00::/7)
    if segments[0] & 0xFE00 == 0xFC00 {
        return true;
    }

    if let Some(ipv4) = ip.to_ipv4_mapped() {
        return is_private_ipv4(&ipv4);
    }

    false
}

/// Checks if an IP address is private/internal
pub fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => is_private_ipv4(ipv4),
        IpAddr::V6(ipv6) => is_private_ipv6(ipv6),
    }
}

/// Validate the externally reachable base URL.
///
/// A raw private IP is accepted (useful behind a local tunnel) but logged,
/// since Twilio cannot reach it directly.
pub fn validate_public_url(url: &str) -> Result<Url, UrlValidationError> {
    let parsed = Url::parse(url)?;

    match parsed.scheme() {
        "http" | "https" | "ws" | "wss" => {}
        other => return Err(UrlValidationError::UnsupportedScheme(other.to_string())),
    }

    let private = match parsed.host() {
        Some(url::Host::Ipv4(ip)) => is_private_ipv4(&ip),
        Some(url::Host::Ipv6(ip)) => is_private_ipv6(&ip),
        Some(url::Host::Domain(domain)) => domain == "localhost",
        None => return Err(UrlValidationError::MissingHost),
    };
    if private {
        warn!(url = %url, "Public URL points at a private address; Twilio will not reach it");
    }

    if parsed.query().is_some() || parsed.fragment().is_some() {
        return Err(UrlValidationError::UnexpectedQuery);
    }

    Ok(parsed)
}

/// Join a path onto a base URL, keeping any base path prefix.
fn join_path(mut base: Url, path: &str) -> Url {
    let prefix = base.path().trim_end_matches('/').to_string();
    base.set_path(&format!("{prefix}{path}"));
    base
}

/// WebSocket URL of `path` under the public base URL.
///
/// `https` becomes `wss` and `http` becomes `ws`.
pub fn websocket_url(public_url: &str, path: &str) -> Result<String, UrlValidationError> {
    let parsed = validate_public_url(public_url)?;
    let scheme = match parsed.scheme() {
        "http" | "ws" => "ws",
        _ => "wss",
    };
    let joined = join_path(parsed, path);
    let rest = joined
        .as_str()
        .split_once("://")
        .map(|(_, rest)| rest.to_string())
        .ok_or(UrlValidationError::MissingHost)?;
    Ok(format!("{scheme}://{rest}"))
}

/// HTTP URL of `path` under the public base URL.
///
/// `wss` becomes `https` and `ws` becomes `http`.
pub fn http_url(public_url: &str, path: &str) -> Result<String, UrlValidationError> {
    let parsed = validate_public_url(public_url)?;
    let scheme = match parsed.scheme() {
        "http" | "ws" => "http",
        _ => "https",
    };
    let joined = join_path(parsed, path);
    let rest = joined
        .as_str()
        .split_once("://")
        .map(|(_, rest)| rest.to_string())
        .ok_or(UrlValidationError::MissingHost)?;
    Ok(format!("{scheme}://{rest}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_private_ipv4() {
        assert!(is_private_ipv4(&"127.0.0.1".parse().unwrap()));
        assert!(is_private_ipv4(&"10.1.2.3".parse().unwrap()));
        assert!(is_private_ipv4(&"192.168.0.10".parse().unwrap()));
        assert!(is_private_ipv4(&"100.64.0.1".parse().unwrap()));
        assert!(!is_private_ipv4(&"8.8.8.8".parse().unwrap()));
    }

    #[test]
    fn test_private_ipv6() {
        assert!(is_private_ipv6(&"::1".parse().unwrap()));
        assert!(is_private_ipv6(&"fe80::1".parse().unwrap()));
        assert!(is_private_ipv6(&"fd00::1".parse().unwrap()));
        assert!(is_private_ipv6(&"::ffff:192.168.1.1".parse().unwrap()));
        assert!(!is_private_ipv6(&"2606:4700::1111".parse().unwrap()));
    }

    #[test]
    fn test_validate_public_url() {
        assert!(validate_public_url("https://bridge.example.com").is_ok());
        assert!(validate_public_url("http://localhost:5050").is_ok());
        assert!(matches!(
            validate_public_url("ftp://bridge.example.com"),
            Err(UrlValidationError::UnsupportedScheme(_))
        ));
        assert!(matches!(
            validate_public_url("https://bridge.example.com/?x=1"),
            Err(UrlValidationError::UnexpectedQuery)
        ));
        assert!(matches!(
            validate_public_url("not a url"),
            Err(UrlValidationError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_websocket_url() {
        assert_eq!(
            websocket_url("https://bridge.example.com", "/media-stream").unwrap(),
            "wss://bridge.example.com/media-stream"
        );
        assert_eq!(
            websocket_url("http://localhost:5050", "/media-stream").unwrap(),
            "ws://localhost:5050/media-stream"
        );
        assert_eq!(
            websocket_url("https://example.com/voice/", "/media-stream").unwrap(),
            "wss://example.com/voice/media-stream"
        );
    }

    #[test]
    fn test_http_url() {
        assert_eq!(
            http_url("wss://bridge.example.com", "/incoming-call").unwrap(),
            "https://bridge.example.com/incoming-call"
        );
        assert_eq!(
            http_url("http://127.0.0.1:5050", "/incoming-call").unwrap(),
            "http://127.0.0.1:5050/incoming-call"
        );
    }
}
