//! Strict validation of single feed entries.
//!
//! Feeds are untrusted text. Every entry goes through these functions before
//! it can reach the firewall, and each function only answers accept (with
//! the canonical network) or reject. Nothing here returns an error or panics,
//! so one malformed line can never abort a feed.

use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use std::net::{Ipv4Addr, Ipv6Addr};

use crate::config::FeedFamily;

/// Validate a raw entry for the given feed family.
///
/// `Mixed` feeds are routed by the text itself: anything containing a `:`
/// is treated as IPv6, everything else as IPv4.
///
/// # Examples
/// ```
/// use blocksmith::config::FeedFamily;
/// use blocksmith::validation::validate_entry;
/// assert!(validate_entry("192.0.2.1", FeedFamily::Ipv4).is_some());
/// assert!(validate_entry("2001:db8::1", FeedFamily::Ipv4).is_none());
/// assert!(validate_entry("2001:db8::1", FeedFamily::Mixed).is_some());
/// ```
pub fn validate_entry(raw: &str, family: FeedFamily) -> Option<IpNet> {
    match family {
        FeedFamily::Ipv4 => validate_ipv4(raw).map(IpNet::V4),
        FeedFamily::Ipv6 => validate_ipv6(raw).map(IpNet::V6),
        FeedFamily::Mixed => parse_network(raw),
    }
}

/// Validate an entry of either family, inferring the family from its text.
pub fn parse_network(raw: &str) -> Option<IpNet> {
    if raw.contains(':') {
        validate_ipv6(raw).map(IpNet::V6)
    } else {
        validate_ipv4(raw).map(IpNet::V4)
    }
}

/// Validate a dotted-quad IPv4 address with an optional `/0-32` suffix.
///
/// Octets must be plain decimal without redundant leading zeros, so `"010"`
/// (which some tools read as octal) is rejected while `"0"` is accepted.
/// Without a suffix the entry is a single host (`/32`). Host bits beyond the
/// prefix are cleared.
///
/// # Examples
/// ```
/// use blocksmith::validation::validate_ipv4;
/// assert_eq!(validate_ipv4("192.0.2.77/24").unwrap().to_string(), "192.0.2.0/24");
/// assert_eq!(validate_ipv4("10.0.0.1").unwrap().prefix_len(), 32);
/// assert!(validate_ipv4("10.0.0.01").is_none());
/// assert!(validate_ipv4("10.0.0.256").is_none());
/// ```
pub fn validate_ipv4(raw: &str) -> Option<Ipv4Net> {
    let raw = raw.trim();
    let (addr_part, prefix_part) = split_prefix(raw);

    let mut octets = [0u8; 4];
    let mut count = 0;
    for part in addr_part.split('.') {
        if count == 4 {
            return None;
        }
        octets[count] = parse_decimal(part, 255)? as u8;
        count += 1;
    }
    if count != 4 {
        return None;
    }

    let prefix_len = match prefix_part {
        Some(p) => parse_decimal(p, 32)? as u8,
        None => 32,
    };

    Ipv4Net::new(Ipv4Addr::from(octets), prefix_len)
        .ok()
        .map(|net| net.trunc())
}

/// Validate an IPv6 address with an optional `/0-128` suffix.
///
/// The address itself goes through the standard library parser. Host bits
/// are allowed and cleared; without a suffix the entry is a single host.
///
/// # Examples
/// ```
/// use blocksmith::validation::validate_ipv6;
/// assert_eq!(validate_ipv6("2001:db8::1/32").unwrap().to_string(), "2001:db8::/32");
/// assert_eq!(validate_ipv6("::1").unwrap().prefix_len(), 128);
/// assert!(validate_ipv6("2001:db8::/129").is_none());
/// ```
pub fn validate_ipv6(raw: &str) -> Option<Ipv6Net> {
    let raw = raw.trim();
    let (addr_part, prefix_part) = split_prefix(raw);

    let addr: Ipv6Addr = addr_part.parse().ok()?;
    let prefix_len = match prefix_part {
        Some(p) => parse_decimal(p, 128)? as u8,
        None => 128,
    };

    Ipv6Net::new(addr, prefix_len).ok().map(|net| net.trunc())
}

/// Split `addr/prefix` into its parts. A second `/` leaves the prefix part
/// containing a slash, which then fails decimal parsing.
fn split_prefix(raw: &str) -> (&str, Option<&str>) {
    match raw.split_once('/') {
        Some((addr, prefix)) => (addr, Some(prefix)),
        None => (raw, None),
    }
}

/// Parse a canonical decimal number no larger than `max`.
///
/// Rejects empty strings, signs, non-ASCII digits and redundant leading
/// zeros. At most three digits are ever needed (`max <= 255`).
fn parse_decimal(s: &str, max: u32) -> Option<u32> {
    if s.is_empty() || s.len() > 3 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if s.len() > 1 && s.starts_with('0') {
        return None;
    }
    let value: u32 = s.parse().ok()?;
    (value <= max).then_some(value)
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Every canonical dotted quad with a valid prefix is accepted.
        #[test]
        fn prop_well_formed_ipv4_accepted(
            a in 0u8..=255, b in 0u8..=255, c in 0u8..=255, d in 0u8..=255,
            prefix in proptest::option::of(0u8..=32),
        ) {
            let text = match prefix {
                Some(p) => format!("{}.{}.{}.{}/{}", a, b, c, d, p),
                None => format!("{}.{}.{}.{}", a, b, c, d),
            };
            let net = validate_ipv4(&text);
            prop_assert!(net.is_some());
            let net = net.unwrap();
            prop_assert_eq!(net.prefix_len(), prefix.unwrap_or(32));
            prop_assert_eq!(net, net.trunc());
        }

        /// A leading zero on any octet is always rejected.
        #[test]
        fn prop_leading_zero_rejected(
            octets in proptest::array::uniform4(0u8..=255),
            idx in 0usize..4,
        ) {
            let parts: Vec<String> = octets
                .iter()
                .enumerate()
                .map(|(i, o)| if i == idx { format!("0{}", o) } else { o.to_string() })
                .collect();
            prop_assert!(validate_ipv4(&parts.join(".")).is_none());
        }

        /// Octets above 255 are rejected.
        #[test]
        fn prop_large_octet_rejected(big in 256u32..1000, idx in 0usize..4) {
            let mut parts = vec!["1".to_string(); 4];
            parts[idx] = big.to_string();
            prop_assert!(validate_ipv4(&parts.join(".")).is_none());
        }

        /// Five octets are never an IPv4 address.
        #[test]
        fn prop_extra_octet_rejected(octets in proptest::array::uniform5(0u8..=255)) {
            let text = octets.iter().map(|o| o.to_string()).collect::<Vec<_>>().join(".");
            prop_assert!(validate_ipv4(&text).is_none());
        }

        /// Arbitrary input never panics.
        #[test]
        fn prop_arbitrary_input_no_panic(s in ".{0,64}") {
            let _ = validate_ipv4(&s);
            let _ = validate_ipv6(&s);
        }
    }
}
