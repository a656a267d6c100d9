//! Protected networks that must never be blocked.
//!
//! Any candidate that touches a protected network is dropped as a whole, so
//! a feed publishing `1.1.1.0/24` loses the entire block when `1.1.1.1` is
//! whitelisted. No hole punching is attempted.

use ipnet::{Ipv4Net, Ipv6Net};
use tracing::debug;

use crate::config::Config;
use crate::error::BlocksmithError;
use crate::validation::{parse_network, validate_ipv4, validate_ipv6};

/// Loopback and unspecified addresses, always protected.
const BUILTIN_V4: &[&str] = &["127.0.0.0/8", "0.0.0.0/32"];
const BUILTIN_V6: &[&str] = &["::1/128", "::/128", "::ffff:127.0.0.0/104"];

/// Special-purpose ranges added with `protect_reserved`.
const RESERVED_V4: &[&str] = &[
    "10.0.0.0/8",
    "172.16.0.0/12",
    "192.168.0.0/16",
    "169.254.0.0/16",
    "100.64.0.0/10",
    "224.0.0.0/4",
    "240.0.0.0/4",
];
const RESERVED_V6: &[&str] = &["fc00::/7", "fe80::/10", "ff00::/8"];

/// Whitelist split by family.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Whitelist {
    pub v4: Vec<Ipv4Net>,
    pub v6: Vec<Ipv6Net>,
}

impl Whitelist {
    /// The always-present loopback protection.
    pub fn builtin() -> Self {
        let mut whitelist = Self::default();
        whitelist.extend_static(BUILTIN_V4, BUILTIN_V6);
        whitelist
    }

    /// Built-in entries, the operator's entries and, if enabled, the
    /// special-purpose ranges.
    pub fn from_config(config: &Config) -> Result<Self, BlocksmithError> {
        let mut whitelist = Self::builtin();
        if config.protect_reserved {
            whitelist.extend_static(RESERVED_V4, RESERVED_V6);
        }

        for entry in &config.whitelist {
            let net = parse_network(entry).ok_or_else(|| {
                BlocksmithError::Config(format!("Invalid whitelist entry '{}'", entry))
            })?;
            whitelist.push(net);
        }

        debug!(
            "Whitelist: {} IPv4 and {} IPv6 networks",
            whitelist.v4.len(),
            whitelist.v6.len()
        );
        Ok(whitelist)
    }

    pub fn push(&mut self, net: ipnet::IpNet) {
        match net {
            ipnet::IpNet::V4(n) => self.v4.push(n),
            ipnet::IpNet::V6(n) => self.v6.push(n),
        }
    }

    fn extend_static(&mut self, v4: &[&str], v6: &[&str]) {
        self.v4.extend(v4.iter().filter_map(|s| validate_ipv4(s)));
        self.v6.extend(v6.iter().filter_map(|s| validate_ipv6(s)));
    }

    pub fn is_protected_v4(&self, net: &Ipv4Net) -> bool {
        self.v4.iter().any(|w| overlaps_v4(w, net))
    }

    pub fn is_protected_v6(&self, net: &Ipv6Net) -> bool {
        self.v6.iter().any(|w| overlaps_v6(w, net))
    }

    /// Keep the candidates that touch no protected network.
    ///
    /// Returns the kept networks (input order preserved) and how many were
    /// dropped.
    pub fn filter_v4(&self, candidates: Vec<Ipv4Net>) -> (Vec<Ipv4Net>, usize) {
        let before = candidates.len();
        let kept: Vec<Ipv4Net> = candidates
            .into_iter()
            .filter(|net| !self.is_protected_v4(net))
            .collect();
        let dropped = before - kept.len();
        (kept, dropped)
    }

    pub fn filter_v6(&self, candidates: Vec<Ipv6Net>) -> (Vec<Ipv6Net>, usize) {
        let before = candidates.len();
        let kept: Vec<Ipv6Net> = candidates
            .into_iter()
            .filter(|net| !self.is_protected_v6(net))
            .collect();
        let dropped = before - kept.len();
        (kept, dropped)
    }
}

/// Two CIDR blocks intersect iff one contains the other's first address.
pub fn overlaps_v4(a: &Ipv4Net, b: &Ipv4Net) -> bool {
    a.contains(&b.network()) || b.contains(&a.network())
}

pub fn overlaps_v6(a: &Ipv6Net, b: &Ipv6Net) -> bool {
    a.contains(&b.network()) || b.contains(&a.network())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v4(s: &str) -> Ipv4Net {
        s.parse().unwrap()
    }

    fn v6(s: &str) -> Ipv6Net {
        s.parse().unwrap()
    }

    #[test]
    fn test_overlap_cases() {
        assert!(overlaps_v4(&v4("10.0.0.0/8"), &v4("10.1.2.0/24")));
        assert!(overlaps_v4(&v4("10.1.2.0/24"), &v4("10.0.0.0/8")));
        assert!(overlaps_v4(&v4("10.0.0.5/32"), &v4("10.0.0.5/32")));
        assert!(!overlaps_v4(&v4("10.0.0.0/24"), &v4("10.0.1.0/24")));
        assert!(overlaps_v6(&v6("2001:db8::/32"), &v6("2001:db8:1::1/128")));
        assert!(!overlaps_v6(&v6("2001:db8::/32"), &v6("2001:db9::/32")));
    }

    #[test]
    fn test_whole_block_dropped_when_host_whitelisted() {
        let mut whitelist = Whitelist::default();
        whitelist.v4.push(v4("1.1.1.1/32"));
        let (kept, dropped) = whitelist.filter_v4(vec![v4("1.1.1.0/24")]);
        assert!(kept.is_empty());
        assert_eq!(dropped, 1);
    }

    #[test]
    fn test_builtin_protects_loopback() {
        let whitelist = Whitelist::builtin();
        let (kept, dropped) = whitelist.filter_v4(vec![
            v4("127.0.0.1/32"),
            v4("0.0.0.0/32"),
            v4("0.0.0.0/0"),
            v4("192.0.2.1/32"),
        ]);
        assert_eq!(kept, vec![v4("192.0.2.1/32")]);
        assert_eq!(dropped, 3);

        let (kept, dropped) = whitelist.filter_v6(vec![
            v6("::1/128"),
            v6("::/128"),
            v6("::ffff:127.0.0.1/128"),
            v6("2001:db8::/32"),
        ]);
        assert_eq!(kept, vec![v6("2001:db8::/32")]);
        assert_eq!(dropped, 3);
    }

    #[test]
    fn test_from_config_adds_operator_entries() {
        let config = Config::default();
        let whitelist = Whitelist::from_config(&config).unwrap();
        assert!(whitelist.is_protected_v4(&v4("8.8.8.0/24")));
        assert!(whitelist.is_protected_v6(&v6("2606:4700:4700::1111/128")));
        assert!(!whitelist.is_protected_v4(&v4("10.0.0.0/8")));
    }

    #[test]
    fn test_protect_reserved() {
        let config = Config {
            protect_reserved: true,
            whitelist: vec![],
            ..Default::default()
        };
        let whitelist = Whitelist::from_config(&config).unwrap();
        for net in ["10.1.0.0/16", "192.168.1.1/32", "100.64.0.1/32", "239.1.1.1/32"] {
            assert!(whitelist.is_protected_v4(&v4(net)), "{} not protected", net);
        }
        assert!(whitelist.is_protected_v6(&v6("fe80::1/128")));
        assert!(whitelist.is_protected_v6(&v6("fd00::/8")));
        assert!(!whitelist.is_protected_v4(&v4("203.0.113.0/24")));
    }

    #[test]
    fn test_from_config_rejects_bad_entry() {
        let config = Config {
            whitelist: vec!["not-an-ip".to_string()],
            ..Default::default()
        };
        assert!(matches!(
            Whitelist::from_config(&config),
            Err(BlocksmithError::Config(_))
        ));
    }

    #[test]
    fn test_static_tables_all_parse() {
        for s in BUILTIN_V4.iter().chain(RESERVED_V4) {
            assert!(validate_ipv4(s).is_some(), "{}", s);
        }
        for s in BUILTIN_V6.iter().chain(RESERVED_V6) {
            assert!(validate_ipv6(s).is_some(), "{}", s);
        }
    }
}
