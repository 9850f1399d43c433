//! Endpoint URL validation.
//!
//! Endpoint overrides from configuration (live WebSocket, REST base URL) are
//! checked before any API key is sent to them:
//! - Secure schemes only (`wss` for streams, `https` for REST)
//! - Plain `ws`/`http` only to a loopback host, and only when insecure
//!   endpoints are explicitly allowed (local mock servers)
//! - No raw private/internal IP addresses

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use thiserror::Error;
use tracing::warn;
use url::Url;

/// Errors that can occur during URL validation
#[derive(Debug, Error)]
pub enum UrlValidationError {
    #[error("Invalid URL format: {0}")]
    InvalidFormat(#[from] url::ParseError),

    #[error("URL scheme must be {expected}, got: {actual}")]
    SchemeNotAllowed {
        expected: &'static str,
        actual: String,
    },

    #[error("URL must have a host")]
    MissingHost,

    #[error("URL points at private/internal IP address: {0}")]
    PrivateIpDetected(IpAddr),

    #[error("Insecure endpoints are only allowed for loopback hosts, got: {0}")]
    InsecureRemoteHost(String),
}

/// Which protocol an endpoint speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    /// Streaming endpoint (`wss`, or `ws` when insecure is allowed)
    WebSocket,
    /// REST endpoint (`https`, or `http` when insecure is allowed)
    Http,
}

impl EndpointKind {
    fn secure_scheme(&self) -> &'static str {
        match self {
            Self::WebSocket => "wss",
            Self::Http => "https",
        }
    }

    fn insecure_scheme(&self) -> &'static str {
        match self {
            Self::WebSocket => "ws",
            Self::Http => "http",
        }
    }
}

/// Checks if an IPv4 address is private/internal
///
/// Covers loopback, RFC 1918, link-local, broadcast, unspecified,
/// documentation, CGNAT (100.64.0.0/10) and benchmarking (198.18.0.0/15).
pub fn is_private_ipv4(ip: &Ipv4Addr) -> bool {
    if ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_broadcast()
        || ip.is_unspecified()
        || ip.is_documentation()
    {
        return true;
    }
    let octets = ip.octets();
    // CGNAT
    if octets[0] == 100 && (octets[1] & 0xC0) == 64 {
        return true;
    }
    octets[0] == 198 && (octets[1] == 18 || octets[1] == 19)
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
    // Unique local (fc00::/7)
    if segments[0] & 0xFE00 == 0xFC00 {
        return true;
    }
    // Documentation (2001:db8::/32)
    if segments[0] == 0x2001 && segments[1] == 0x0DB8 {
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

fn is_loopback_host(url: &Url) -> bool {
    match url.host() {
        Some(url::Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(url::Host::Ipv4(ip)) => ip.is_loopback(),
        Some(url::Host::Ipv6(ip)) => ip.is_loopback(),
        None => false,
    }
}

/// Validate an endpoint URL and return it parsed.
///
/// # Example
/// ```rust,ignore
/// use waav_call::utils::url_validation::{EndpointKind, validate_endpoint_url};
///
/// assert!(validate_endpoint_url("wss://example.com/ws", EndpointKind::WebSocket, false).is_ok());
/// assert!(validate_endpoint_url("ws://example.com/ws", EndpointKind::WebSocket, false).is_err());
/// assert!(validate_endpoint_url("ws://127.0.0.1:9000", EndpointKind::WebSocket, true).is_ok());
/// ```
pub fn validate_endpoint_url(
    url: &str,
    kind: EndpointKind,
    allow_insecure: bool,
) -> Result<Url, UrlValidationError> {
    let parsed = Url::parse(url)?;
    let host = parsed
        .host_str()
        .ok_or(UrlValidationError::MissingHost)?
        .to_string();

    let scheme = parsed.scheme();
    if scheme == kind.insecure_scheme() {
        if !allow_insecure {
            return Err(UrlValidationError::SchemeNotAllowed {
                expected: kind.secure_scheme(),
                actual: scheme.to_string(),
            });
        }
        if !is_loopback_host(&parsed) {
            warn!(host = %host, "Insecure endpoint rejected for non-loopback host");
            return Err(UrlValidationError::InsecureRemoteHost(host));
        }
        return Ok(parsed);
    }

    if scheme != kind.secure_scheme() {
        return Err(UrlValidationError::SchemeNotAllowed {
            expected: kind.secure_scheme(),
            actual: scheme.to_string(),
        });
    }

    let ip = match parsed.host() {
        Some(url::Host::Ipv4(ip)) => Some(IpAddr::V4(ip)),
        Some(url::Host::Ipv6(ip)) => Some(IpAddr::V6(ip)),
        Some(url::Host::Domain(_)) => None,
        None => return Err(UrlValidationError::MissingHost),
    };
    if let Some(ip) = ip
        && is_private_ip(&ip)
        && !(allow_insecure && ip.is_loopback())
    {
        warn!(host = %host, "Endpoint points at private IP address");
        return Err(UrlValidationError::PrivateIpDetected(ip));
    }

    Ok(parsed)
}
