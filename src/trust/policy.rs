//! Proxy trust policy
//!
//! Decides which peers may assert forwarded headers and which hostnames the
//! server answers for. Built once from configuration and shared read-only.

use std::net::IpAddr;
use std::str::FromStr;

use crate::config::TrustConfig;

/// A peer address matcher: `*`, a literal address, or a CIDR block
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IpPattern {
    Any,
    Exact(IpAddr),
    Cidr { network: IpAddr, prefix: u8 },
}

impl IpPattern {
    pub fn matches(&self, ip: IpAddr) -> bool {
        let ip = ip.to_canonical();
        match self {
            Self::Any => true,
            Self::Exact(expected) => *expected == ip,
            Self::Cidr { network, prefix } => cidr_contains(*network, *prefix, ip),
        }
    }
}

impl FromStr for IpPattern {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == "*" {
            return Ok(Self::Any);
        }

        if let Some((addr, prefix)) = s.split_once('/') {
            let network = addr
                .parse::<IpAddr>()
                .map_err(|e| format!("Invalid network address '{addr}': {e}"))?
                .to_canonical();
            let prefix = prefix
                .parse::<u8>()
                .map_err(|e| format!("Invalid prefix length '{prefix}': {e}"))?;
            let max = if network.is_ipv4() { 32 } else { 128 };
            if prefix > max {
                return Err(format!("Prefix length {prefix} exceeds {max} in '{s}'"));
            }
            return Ok(Self::Cidr { network, prefix });
        }

        s.parse::<IpAddr>()
            .map(|ip| Self::Exact(ip.to_canonical()))
            .map_err(|e| format!("Invalid IP pattern '{s}': {e}"))
    }
}

fn cidr_contains(network: IpAddr, prefix: u8, ip: IpAddr) -> bool {
    match (network, ip) {
        (IpAddr::V4(net), IpAddr::V4(addr)) => {
            let mask = u32::MAX.checked_shl(32 - u32::from(prefix)).unwrap_or(0);
            u32::from(net) & mask == u32::from(addr) & mask
        }
        (IpAddr::V6(net), IpAddr::V6(addr)) => {
            let mask = u128::MAX.checked_shl(128 - u32::from(prefix)).unwrap_or(0);
            u128::from(net) & mask == u128::from(addr) & mask
        }
        _ => false,
    }
}

/// A trusted hostname matcher
///
/// Supports:
/// - Exact match: "api.example.com"
/// - Wildcard prefix: "*.example.com" matches subdomains and the bare domain
/// - Catch-all: "*"
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostPattern {
    Any,
    Exact(String),
    Suffix(String),
}

impl HostPattern {
    pub fn parse(pattern: &str) -> Self {
        let pattern = pattern.trim().to_ascii_lowercase();
        if pattern == "*" {
            Self::Any
        } else if let Some(bare) = pattern.strip_prefix("*.") {
            Self::Suffix(bare.to_string())
        } else {
            Self::Exact(pattern)
        }
    }

    pub fn matches(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        match self {
            Self::Any => true,
            Self::Exact(expected) => *expected == host,
            Self::Suffix(bare) => {
                host == *bare
                    || host
                        .strip_suffix(bare.as_str())
                        .is_some_and(|prefix| prefix.ends_with('.'))
            }
        }
    }
}

/// Immutable trust policy for forwarded headers
#[derive(Debug, Clone, Default)]
pub struct TrustPolicy {
    pub trusted_ip: Vec<IpPattern>,
    pub untrusted_ip: Vec<IpPattern>,
    pub trusted_hosts: Vec<HostPattern>,
}

impl TrustPolicy {
    /// Build the policy from configuration, rejecting unparseable IP patterns
    pub fn from_config(config: &TrustConfig) -> Result<Self, String> {
        let parse_all = |list: &[String]| {
            list.iter()
                .map(|p| p.parse::<IpPattern>())
                .collect::<Result<Vec<_>, _>>()
        };

        Ok(Self {
            trusted_ip: parse_all(&config.trusted_ip)?,
            untrusted_ip: parse_all(&config.untrusted_ip)?,
            trusted_hosts: config
                .trusted_hosts
                .iter()
                .map(|p| HostPattern::parse(p))
                .collect(),
        })
    }

    /// Whether the peer may assert forwarded headers
    ///
    /// The untrusted list is consulted first: a match there is final even
    /// when the address also appears in the trusted list.
    pub fn is_ip_trusted(&self, ip: IpAddr) -> bool {
        if self.untrusted_ip.iter().any(|p| p.matches(ip)) {
            return false;
        }
        self.trusted_ip.iter().any(|p| p.matches(ip))
    }

    /// Whether a resolved hostname is allowed
    ///
    /// An empty pattern list allows every syntactically valid host.
    pub fn is_host_trusted(&self, host: &str) -> bool {
        self.trusted_hosts.is_empty() || self.trusted_hosts.iter().any(|p| p.matches(host))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(trusted: &[&str], untrusted: &[&str]) -> TrustPolicy {
        TrustPolicy {
            trusted_ip: trusted.iter().map(|p| p.parse().unwrap()).collect(),
            untrusted_ip: untrusted.iter().map(|p| p.parse().unwrap()).collect(),
            trusted_hosts: Vec::new(),
        }
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_trusted_ip() {
        let p = policy(&["192.168.1.1"], &[]);
        assert!(p.is_ip_trusted(ip("192.168.1.1")));
        assert!(!p.is_ip_trusted(ip("192.168.1.2")));
    }

    #[test]
    fn test_untrusted_wins() {
        let p = policy(&["192.168.1.1"], &["*"]);
        assert!(!p.is_ip_trusted(ip("192.168.1.1")));

        for addr in ["10.0.0.1", "::1", "203.0.113.9"] {
            let p = policy(&["*", addr], &[addr]);
            assert!(!p.is_ip_trusted(ip(addr)));
        }
    }

    #[test]
    fn test_cidr_patterns() {
        let p = policy(&["10.0.0.0/8", "fd00::/8"], &["10.9.0.0/16"]);
        assert!(p.is_ip_trusted(ip("10.1.2.3")));
        assert!(!p.is_ip_trusted(ip("10.9.1.1")));
        assert!(!p.is_ip_trusted(ip("11.0.0.1")));
        assert!(p.is_ip_trusted(ip("fd12::1")));
        assert!(!p.is_ip_trusted(ip("fe80::1")));
    }

    #[test]
    fn test_ipv4_mapped_addresses_are_normalised() {
        let p = policy(&["127.0.0.1"], &[]);
        assert!(p.is_ip_trusted(ip("::ffff:127.0.0.1")));
    }

    #[test]
    fn test_invalid_patterns() {
        assert!("10.0.0.0/33".parse::<IpPattern>().is_err());
        assert!("not-an-ip".parse::<IpPattern>().is_err());
        assert!("0.0.0.0/0".parse::<IpPattern>().unwrap().matches(ip("8.8.8.8")));
    }

    #[test]
    fn test_host_patterns() {
        assert!(HostPattern::parse("trusted.com").matches("Trusted.COM"));
        assert!(!HostPattern::parse("trusted.com").matches("untrusted.com"));
        assert!(HostPattern::parse("*.example.com").matches("api.example.com"));
        assert!(HostPattern::parse("*.example.com").matches("example.com"));
        assert!(!HostPattern::parse("*.example.com").matches("badexample.com"));
        assert!(HostPattern::parse("*").matches("anything.org"));
    }

    #[test]
    fn test_empty_host_list_allows_all() {
        let p = TrustPolicy::default();
        assert!(p.is_host_trusted("example.com"));
        assert!(!p.is_ip_trusted(ip("127.0.0.1")));
    }
}
