//! Trusted origin resolution
//!
//! Derives the effective client address, scheme and hostname of a request
//! from the physical peer, the transport and the forwarded headers, believing
//! forwarded headers only when the peer is trusted.

use std::borrow::Cow;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

use hyper::HeaderMap;
use tracing::warn;

use super::hostname::is_valid_hostname;
use super::policy::TrustPolicy;
use crate::error::HttpError;

/// Request scheme as seen by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the transport knows about the connection
#[derive(Debug, Clone, Copy)]
pub struct Transport {
    pub peer: IpAddr,
    pub encrypted: bool,
}

/// Client origin derived once per request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOrigin {
    /// Effective client address
    pub ip: IpAddr,
    /// Forwarded-for chain as sent by trusted proxies, client first
    pub ips: Vec<IpAddr>,
    pub scheme: Scheme,
    pub hostname: Option<String>,
}

impl ResolvedOrigin {
    pub fn is_secure(&self) -> bool {
        self.scheme == Scheme::Https
    }
}

/// Resolve ip, scheme and hostname for one request
pub fn resolve_origin(
    transport: Transport,
    headers: &HeaderMap,
    policy: &TrustPolicy,
) -> Result<ResolvedOrigin, HttpError> {
    let hostname = get_hostname(transport.peer, headers, policy)?;
    let (ip, ips) = get_client_ips(transport.peer, headers, policy);

    Ok(ResolvedOrigin {
        ip,
        ips,
        scheme: get_protocol(transport.peer, headers, transport.encrypted, policy),
        hostname,
    })
}

/// Determine the request scheme
///
/// An encrypted transport is authoritative. Otherwise only a trusted peer may
/// upgrade the scheme through `X-Forwarded-Proto`.
pub fn get_protocol(
    peer: IpAddr,
    headers: &HeaderMap,
    encrypted: bool,
    policy: &TrustPolicy,
) -> Scheme {
    if encrypted {
        return Scheme::Https;
    }
    if !policy.is_ip_trusted(peer) {
        return Scheme::Http;
    }

    match header_text(headers, "x-forwarded-proto")
        .as_deref()
        .and_then(first_list_item)
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("https") => Scheme::Https,
        _ => Scheme::Http,
    }
}

/// Determine the request hostname
///
/// Returns `Ok(None)` when no host header is present at all.
pub fn get_hostname(
    peer: IpAddr,
    headers: &HeaderMap,
    policy: &TrustPolicy,
) -> Result<Option<String>, HttpError> {
    let forwarded = if policy.is_ip_trusted(peer) {
        header_text(headers, "x-forwarded-host")
            .and_then(|v| first_list_item(&v).map(ToString::to_string))
    } else {
        None
    };

    let Some(raw) = forwarded.or_else(|| header_text(headers, "host").map(Cow::into_owned)) else {
        return Ok(None);
    };
    let raw = raw.trim();
    let hostname = strip_port(raw);

    if !is_valid_hostname(hostname) {
        warn!(peer = %peer, value = %raw, "Rejected invalid host header");
        return Err(HttpError::SuspiciousOperation {
            value: raw.to_string(),
            ip: peer,
        });
    }

    if !policy.is_host_trusted(hostname) {
        warn!(peer = %peer, value = %raw, "Rejected untrusted host");
        return Err(HttpError::UntrustedHost {
            value: raw.to_string(),
            ip: peer,
        });
    }

    Ok(Some(hostname.to_string()))
}

/// Determine the client address and the forwarded chain
///
/// Walks `X-Forwarded-For` from the closest hop outwards and stops at the
/// first address that is not a trusted proxy.
pub fn get_client_ips(
    peer: IpAddr,
    headers: &HeaderMap,
    policy: &TrustPolicy,
) -> (IpAddr, Vec<IpAddr>) {
    if !policy.is_ip_trusted(peer) {
        return (peer, Vec::new());
    }

    let chain: Vec<IpAddr> = header_list(headers, "x-forwarded-for")
        .split(',')
        .map_while(|entry| parse_forwarded_ip(entry.trim()))
        .collect();

    let mut client = peer;
    for hop in chain.iter().rev() {
        client = *hop;
        if !policy.is_ip_trusted(*hop) {
            break;
        }
    }

    (client, chain)
}

fn parse_forwarded_ip(entry: &str) -> Option<IpAddr> {
    entry
        .parse::<IpAddr>()
        .or_else(|_| entry.parse::<SocketAddr>().map(|addr| addr.ip()))
        .ok()
        .map(|ip| ip.to_canonical())
}

fn header_text<'a>(headers: &'a HeaderMap, name: &str) -> Option<Cow<'a, str>> {
    headers
        .get(name)
        .map(|v| String::from_utf8_lossy(v.as_bytes()))
}

/// Every line of a list header, joined as one comma-separated value
fn header_list(headers: &HeaderMap, name: &str) -> String {
    headers
        .get_all(name)
        .iter()
        .map(|v| String::from_utf8_lossy(v.as_bytes()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn first_list_item(value: &str) -> Option<&str> {
    value
        .split(',')
        .next()
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Strip a trailing `:port` from a host header value
fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        return match host.find(']') {
            Some(end) if is_port_suffix(&host[end + 1..]) => &host[..=end],
            _ => host,
        };
    }

    match host.split_once(':') {
        Some((name, port)) if is_port_suffix(&format!(":{port}")) => name,
        _ => host,
    }
}

fn is_port_suffix(rest: &str) -> bool {
    rest.is_empty()
        || rest
            .strip_prefix(':')
            .is_some_and(|port| !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()))
}
