//! Proxy trust module
//!
//! Hostname validation, trust policy and origin resolution for requests that
//! may have passed through reverse proxies.

pub mod hostname;
pub mod policy;
pub mod resolver;

pub use hostname::is_valid_hostname;
pub use policy::{HostPattern, IpPattern, TrustPolicy};
pub use resolver::{resolve_origin, ResolvedOrigin, Scheme, Transport};
