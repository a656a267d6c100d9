//! CIDR aggregation for compacting blocklists.
//!
//! Each family is aggregated on its own integer address space: networks are
//! turned into `[start, end]` intervals, overlapping or adjacent intervals
//! are merged, and every merged interval is split back into the fewest
//! aligned CIDR blocks that cover it exactly.

use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use std::net::{Ipv4Addr, Ipv6Addr};

/// Aggregated blocklist, one ordered set per family.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregatedSets {
    pub v4: Vec<Ipv4Net>,
    pub v6: Vec<Ipv6Net>,
}

impl AggregatedSets {
    /// Total number of CIDR blocks across both families.
    pub fn len(&self) -> usize {
        self.v4.len() + self.v6.len()
    }

    pub fn is_empty(&self) -> bool {
        self.v4.is_empty() && self.v6.is_empty()
    }
}

/// Aggregate a mixed list of networks, splitting it by family.
///
/// For example: [192.168.0.0/25, 192.168.0.128/25] -> [192.168.0.0/24]
pub fn aggregate(nets: &[IpNet]) -> AggregatedSets {
    let mut v4 = Vec::new();
    let mut v6 = Vec::new();
    for net in nets {
        match net {
            IpNet::V4(n) => v4.push(*n),
            IpNet::V6(n) => v6.push(*n),
        }
    }
    AggregatedSets {
        v4: aggregate_v4(&v4),
        v6: aggregate_v6(&v6),
    }
}

/// Aggregate IPv4 networks into the minimal ordered set of CIDR blocks.
pub fn aggregate_v4(nets: &[Ipv4Net]) -> Vec<Ipv4Net> {
    let ranges = nets
        .iter()
        .map(|n| (u32::from(n.network()) as u128, u32::from(n.broadcast()) as u128))
        .collect();

    merge_ranges(ranges)
        .into_iter()
        .flat_map(|(start, end)| range_to_cidrs(start, end, 32))
        .filter_map(|(addr, prefix)| Ipv4Net::new(Ipv4Addr::from(addr as u32), prefix).ok())
        .collect()
}

/// Aggregate IPv6 networks into the minimal ordered set of CIDR blocks.
pub fn aggregate_v6(nets: &[Ipv6Net]) -> Vec<Ipv6Net> {
    let ranges = nets
        .iter()
        .map(|n| (u128::from(n.network()), u128::from(n.broadcast())))
        .collect();

    merge_ranges(ranges)
        .into_iter()
        .flat_map(|(start, end)| range_to_cidrs(start, end, 128))
        .filter_map(|(addr, prefix)| Ipv6Net::new(Ipv6Addr::from(addr), prefix).ok())
        .collect()
}

/// Sort intervals by start and merge the ones that overlap or touch.
fn merge_ranges(mut ranges: Vec<(u128, u128)>) -> Vec<(u128, u128)> {
    ranges.sort_unstable();

    let mut merged: Vec<(u128, u128)> = Vec::with_capacity(ranges.len());
    for (start, end) in ranges {
        match merged.last_mut() {
            // saturating_add: a range ending at the top of the space absorbs everything after it
            Some(last) if start <= last.1.saturating_add(1) => {
                last.1 = last.1.max(end);
            }
            _ => merged.push((start, end)),
        }
    }
    merged
}

/// Split the inclusive interval `[start, end]` of a `width`-bit address space
/// into the minimal list of aligned blocks, as `(network, prefix_len)` pairs.
fn range_to_cidrs(mut start: u128, end: u128, width: u8) -> Vec<(u128, u8)> {
    let mut blocks = Vec::new();

    while start <= end {
        // Largest block aligned on `start`, then shrink until it fits.
        let mut host_bits = (start.trailing_zeros() as u8).min(width);
        let mut last = block_end(start, host_bits);
        while last > end {
            host_bits -= 1;
            last = block_end(start, host_bits);
        }

        blocks.push((start, width - host_bits));

        if last == end {
            break;
        }
        start = last + 1;
    }

    blocks
}

/// Last address of the block starting at `start` with `host_bits` free bits.
/// `start` must be aligned, so OR-ing the host mask cannot overflow.
fn block_end(start: u128, host_bits: u8) -> u128 {
    let mask = if host_bits >= 128 {
        u128::MAX
    } else {
        (1u128 << host_bits) - 1
    };
    start | mask
}

/// Number of addresses covered by a list of IPv4 networks.
pub fn count_addresses_v4(nets: &[Ipv4Net]) -> u128 {
    nets.iter()
        .map(|net| 1u128 << (32 - net.prefix_len()))
        .fold(0u128, |acc, count| acc.saturating_add(count))
}

/// Number of addresses covered by a list of IPv6 networks.
///
/// Uses saturating arithmetic: `::/0` alone already overflows `u128`.
pub fn count_addresses_v6(nets: &[Ipv6Net]) -> u128 {
    nets.iter()
        .map(|net| {
            let shift = 128 - net.prefix_len() as u32;
            if shift >= 128 {
                u128::MAX
            } else {
                1u128 << shift
            }
        })
        .fold(0u128, |acc, count| acc.saturating_add(count))
}

/// Percentage of the public IPv4 space (about 3.7 billion addresses) covered.
pub fn coverage_percent(ip_count: u128) -> f64 {
    const PUBLIC_IPV4_APPROX: f64 = 3_700_000_000.0;
    (ip_count as f64 / PUBLIC_IPV4_APPROX) * 100.0
}
