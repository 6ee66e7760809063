//! Hostname syntax validation
//!
//! Accepts bracketed IPv6 literals and dot-separated DNS labels. Anything else
//! coming from a `Host` / `X-Forwarded-Host` header is treated as suspicious.

use std::net::Ipv6Addr;

/// Maximum total hostname length
const MAX_HOSTNAME_LEN: usize = 255;

/// Maximum length of a single label
const MAX_LABEL_LEN: usize = 63;

/// Check whether `value` is a syntactically valid hostname
///
/// # Examples
/// ```
/// use quay::trust::is_valid_hostname;
/// assert!(is_valid_hostname("example.com"));
/// assert!(is_valid_hostname("[2001:db8::1]"));
/// assert!(!is_valid_hostname("00123"));
/// ```
pub fn is_valid_hostname(value: &str) -> bool {
    if value.is_empty() || value.len() > MAX_HOSTNAME_LEN {
        return false;
    }

    if let Some(inner) = value.strip_prefix('[') {
        return inner
            .strip_suffix(']')
            .is_some_and(is_valid_ipv6_literal);
    }

    if value.contains(['[', ']']) {
        return false;
    }

    // Pure numerals are IPv4-like fragments, not hostnames
    if value.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }

    value.split('.').all(is_valid_label)
}

fn is_valid_ipv6_literal(inner: &str) -> bool {
    if !inner.contains(':') {
        return false;
    }
    // Every hextet must be 1-4 hex digits; empty groups only come from `::`
    let hextets_ok = inner
        .split(':')
        .filter(|group| !group.is_empty() && !group.contains('.'))
        .all(|group| group.len() <= 4 && group.bytes().all(|b| b.is_ascii_hexdigit()));

    hextets_ok && inner.parse::<Ipv6Addr>().is_ok()
}

fn is_valid_label(label: &str) -> bool {
    if label.is_empty() || label.len() > MAX_LABEL_LEN {
        return false;
    }
    if label.starts_with('-') || label.ends_with('-') {
        return false;
    }
    label
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'-')
}
