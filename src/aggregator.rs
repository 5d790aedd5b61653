//! Reporting views over stored and live bans.
//!
//! - [`subnet_aggregation`] - /8, /16, /24 clusters among stored IPv4 bans
//! - [`country_stats`] - ban counts per country code
//! - [`active_bans`] - live set elements ordered by time left

use ipnet::Ipv4Net;
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::time::Duration;

use crate::firewall::SetElement;
use crate::store::BanEntry;

/// Prefix lengths tallied, most specific first.
const MASKS: [u8; 3] = [24, 16, 8];

/// Countries listed by [`country_stats`].
pub const COUNTRY_LIMIT: usize = 9;

/// Elements shown at each end of the active-ban list.
pub const ACTIVE_EDGE: usize = 2;

/// One surviving aggregate, in display order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubnetAggregate {
    pub prefix: Ipv4Net,
    pub count: usize,
    /// Number of surviving aggregates that contain this one
    pub depth: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SubnetReport {
    /// Roots in rank order, each followed by its nested aggregates
    pub rows: Vec<SubnetAggregate>,
    pub total_ipv4: usize,
    pub ipv6_count: usize,
    /// IPv4 entries not covered by any top-level aggregate
    pub scattered: usize,
}

fn ipv4_of(entry: &BanEntry) -> Option<Ipv4Addr> {
    let addr = entry.address.split('/').next()?;
    addr.parse().ok()
}

fn rank_key(net: &Ipv4Net, count: usize) -> (Reverse<usize>, u8, u8, u32) {
    (
        Reverse(count),
        net.network().octets()[0],
        net.prefix_len(),
        u32::from(net.network()),
    )
}

/// Cluster stored IPv4 bans by /24, /16 and /8.
///
/// Aggregates with fewer than two members are dropped, as is any aggregate
/// that contains a more specific surviving aggregate with the same count.
/// Rows are ranked by count (descending), then leading octet, and nested
/// aggregates are placed directly under the aggregate that contains them.
pub fn subnet_aggregation(entries: &[BanEntry]) -> SubnetReport {
    let mut report = SubnetReport::default();
    let mut tally: HashMap<Ipv4Net, usize> = HashMap::new();

    for entry in entries {
        if entry.is_ipv6() {
            report.ipv6_count += 1;
            continue;
        }
        let Some(addr) = ipv4_of(entry) else {
            continue;
        };
        report.total_ipv4 += 1;
        for mask in MASKS {
            if let Ok(net) = Ipv4Net::new(addr, mask) {
                *tally.entry(net.trunc()).or_insert(0) += 1;
            }
        }
    }

    let candidates: Vec<(Ipv4Net, usize)> = tally.into_iter().filter(|(_, c)| *c >= 2).collect();

    let mut survivors: Vec<(Ipv4Net, usize)> = candidates
        .iter()
        .filter(|(net, count)| {
            !candidates.iter().any(|(other, other_count)| {
                other.prefix_len() > net.prefix_len() && net.contains(other) && other_count == count
            })
        })
        .copied()
        .collect();
    survivors.sort_by_key(|(net, count)| rank_key(net, *count));

    // Nearest surviving ancestor of each survivor
    let parent_of = |net: &Ipv4Net| -> Option<Ipv4Net> {
        survivors
            .iter()
            .filter(|(other, _)| other.prefix_len() < net.prefix_len() && other.contains(net))
            .max_by_key(|(other, _)| other.prefix_len())
            .map(|(other, _)| *other)
    };
    let parents: HashMap<Ipv4Net, Option<Ipv4Net>> =
        survivors.iter().map(|(net, _)| (*net, parent_of(net))).collect();

    fn emit(
        node: Option<Ipv4Net>,
        depth: usize,
        survivors: &[(Ipv4Net, usize)],
        parents: &HashMap<Ipv4Net, Option<Ipv4Net>>,
        rows: &mut Vec<SubnetAggregate>,
    ) {
        for (net, count) in survivors {
            if parents.get(net).copied().flatten() == node {
                rows.push(SubnetAggregate {
                    prefix: *net,
                    count: *count,
                    depth,
                });
                emit(Some(*net), depth + 1, survivors, parents, rows);
            }
        }
    }
    emit(None, 0, &survivors, &parents, &mut report.rows);

    let covered: usize = report
        .rows
        .iter()
        .filter(|row| row.depth == 0)
        .map(|row| row.count)
        .sum();
    report.scattered = report.total_ipv4.saturating_sub(covered);
    report
}

/// Count bans per known country code, most frequent first, at most
/// [`COUNTRY_LIMIT`] rows. Ties are ordered by code.
pub fn country_stats(entries: &[BanEntry]) -> Vec<(String, usize)> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for entry in entries {
        if let Some(code) = entry.country.as_deref().filter(|c| !c.is_empty()) {
            *counts.entry(code).or_insert(0) += 1;
        }
    }

    let mut stats: Vec<(String, usize)> = counts
        .into_iter()
        .map(|(code, count)| (code.to_string(), count))
        .collect();
    stats.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    stats.truncate(COUNTRY_LIMIT);
    stats
}

/// Live bans ordered by time left, condensed for display.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActiveBans {
    /// Soonest to expire
    pub head: Vec<ActiveBan>,
    /// Most recently banned (longest time left)
    pub tail: Vec<ActiveBan>,
    pub omitted: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveBan {
    pub element: String,
    /// Seconds until expiry; `None` for permanent bans
    pub remaining_secs: Option<u64>,
}

/// Sort by remaining time (permanent last) and keep [`ACTIVE_EDGE`]
/// elements at each end.
pub fn active_bans(elements: &[SetElement]) -> ActiveBans {
    let mut sorted: Vec<ActiveBan> = elements
        .iter()
        .map(|e| ActiveBan {
            element: e.element.clone(),
            remaining_secs: e.remaining.as_ref().map(Duration::as_secs),
        })
        .collect();
    sorted.sort_by_key(|b| (b.remaining_secs.is_none(), b.remaining_secs));

    let total = sorted.len();
    let head_len = total.min(ACTIVE_EDGE);
    let tail_start = total.saturating_sub(ACTIVE_EDGE).max(head_len);

    ActiveBans {
        head: sorted[..head_len].to_vec(),
        tail: sorted[tail_start..].to_vec(),
        omitted: tail_start - head_len,
        total,
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    /// IPv4 hosts drawn from a small space so clusters actually form.
    fn clustered_entries() -> impl Strategy<Value = Vec<BanEntry>> {
        prop::collection::vec((0u8..4, 0u8..4, 0u8..4, 0u8..=255), 0..60).prop_map(|v| {
            v.into_iter()
                .map(|(a, b, c, d)| BanEntry {
                    address: format!("{}.{}.{}.{}", a, b, c, d),
                    country: None,
                })
                .collect()
        })
    }

    proptest! {
        /// Top-level aggregates are disjoint, so they never cover more than exist
        #[test]
        fn prop_scattered_accounts_for_all(entries in clustered_entries()) {
            let report = subnet_aggregation(&entries);
            let covered: usize = report.rows.iter().filter(|r| r.depth == 0).map(|r| r.count).sum();
            prop_assert_eq!(covered + report.scattered, report.total_ipv4);
        }

        #[test]
        fn prop_rows_have_at_least_two(entries in clustered_entries()) {
            let report = subnet_aggregation(&entries);
            prop_assert!(report.rows.iter().all(|r| r.count >= 2));
        }

        /// A child row follows an ancestor that contains it with a larger count
        #[test]
        fn prop_children_nest_under_parents(entries in clustered_entries()) {
            let report = subnet_aggregation(&entries);
            for (i, row) in report.rows.iter().enumerate() {
                if row.depth == 0 {
                    continue;
                }
                let parent = report.rows[..i]
                    .iter()
                    .rev()
                    .find(|p| p.depth == row.depth - 1);
                prop_assert!(parent.is_some());
                let parent = parent.unwrap();
                prop_assert!(parent.prefix.contains(&row.prefix));
                prop_assert!(parent.count > row.count);
            }
        }

        #[test]
        fn prop_no_equal_count_nesting(entries in clustered_entries()) {
            let report = subnet_aggregation(&entries);
            for a in &report.rows {
                for b in &report.rows {
                    if a.prefix != b.prefix && a.prefix.contains(&b.prefix) {
                        prop_assert!(a.count != b.count);
                    }
                }
            }
        }
    }
}
