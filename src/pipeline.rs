//! The update pipeline.
//!
//! Fetch → validate → whitelist → aggregate → safety gate → render →
//! syntax check → atomic swap. Every stage hands an immutable value to the
//! next one and records its counters in the [`RunReport`]. The firewall is
//! touched at most once, at the very end.

use anyhow::Result;
use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use std::collections::BTreeSet;
use tracing::{error, info, warn};

use crate::aggregator::{aggregate_v4, aggregate_v6, count_addresses_v4, AggregatedSets};
use crate::config::Config;
use crate::enforcer::{render_ruleset, FirewallBackend};
use crate::error::BlocksmithError;
use crate::fetcher::{FetchResult, Fetcher};
use crate::report::{FeedOutcome, RunOutcome, RunReport};
use crate::safety::SafetyGate;
use crate::utils::{format_bytes, format_count, write_atomic};
use crate::validation::validate_entry;
use crate::whitelist::Whitelist;

/// Distinct valid entries of all successful feeds
#[derive(Debug, Default)]
pub struct ValidatedEntries {
    pub v4: BTreeSet<Ipv4Net>,
    pub v6: BTreeSet<Ipv6Net>,
    pub rejected: usize,
}

impl ValidatedEntries {
    pub fn len(&self) -> usize {
        self.v4.len() + self.v6.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Validate one feed's candidates and merge the survivors.
    ///
    /// Returns `(accepted, rejected)` for this feed; `accepted` counts
    /// duplicates within the feed.
    pub fn absorb(&mut self, fetched: &FetchResult) -> (usize, usize) {
        let mut accepted = 0;
        let mut rejected = 0;
        for candidate in &fetched.candidates {
            match validate_entry(candidate, fetched.family) {
                Some(IpNet::V4(net)) => {
                    accepted += 1;
                    self.v4.insert(net);
                }
                Some(IpNet::V6(net)) => {
                    accepted += 1;
                    self.v6.insert(net);
                }
                None => rejected += 1,
            }
        }
        self.rejected += rejected;
        (accepted, rejected)
    }
}

/// Entries that survived whitelist filtering
#[derive(Debug, Default)]
pub struct FilteredEntries {
    pub v4: Vec<Ipv4Net>,
    pub v6: Vec<Ipv6Net>,
    pub whitelisted: usize,
}

impl FilteredEntries {
    pub fn apply(whitelist: &Whitelist, validated: ValidatedEntries) -> Self {
        let (v4, dropped_v4) = whitelist.filter_v4(validated.v4.into_iter().collect());
        let (v6, dropped_v6) = whitelist.filter_v6(validated.v6.into_iter().collect());
        Self {
            v4,
            v6,
            whitelisted: dropped_v4 + dropped_v6,
        }
    }

    pub fn len(&self) -> usize {
        self.v4.len() + self.v6.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn aggregate(&self) -> AggregatedSets {
        AggregatedSets {
            v4: aggregate_v4(&self.v4),
            v6: aggregate_v6(&self.v6),
        }
    }
}

/// Run the pipeline once, filling in `report` as stages complete.
///
/// With `dry_run` the ruleset is printed to stdout and the backend is
/// never called.
pub async fn execute(
    config: &Config,
    fetcher: &Fetcher,
    backend: &dyn FirewallBackend,
    dry_run: bool,
    report: &mut RunReport,
) -> Result<()> {
    let feeds = config.enabled_feeds();
    if feeds.is_empty() {
        error!("No feeds enabled. Check your configuration.");
        return Err(BlocksmithError::NoFeeds { attempted: 0 }.into());
    }

    info!("Fetching {} feeds...", feeds.len());
    let results = fetcher.fetch_feeds(&feeds).await;

    let mut validated = ValidatedEntries::default();
    for (feed, result) in feeds.iter().zip(results) {
        let outcome = match result {
            Ok(fetched) => {
                let (accepted, rejected) = validated.absorb(&fetched);
                if accepted == 0 {
                    warn!(
                        "{}: empty or invalid list ({} entries rejected)",
                        feed.name, rejected
                    );
                    FeedOutcome::failed(&feed.name, rejected, "empty or invalid list".to_string())
                } else {
                    info!(
                        "{}: {} valid entries, {} rejected",
                        feed.name,
                        format_count(accepted),
                        format_count(rejected)
                    );
                    FeedOutcome::ok(&feed.name, accepted, rejected)
                }
            }
            Err(e) => {
                warn!("{}: {:#}", feed.name, e);
                FeedOutcome::failed(&feed.name, 0, format!("{:#}", e))
            }
        };
        report.record_feed(outcome);
    }
    info!(
        "Fetched {}/{} feeds ({})",
        report.feeds_succeeded,
        report.feeds_attempted,
        format_bytes(fetcher.total_downloaded() as u64)
    );

    if report.feeds_succeeded == 0 {
        error!(
            "No feed could be fetched ({} attempted). Check internet connection.",
            report.feeds_attempted
        );
        return Err(BlocksmithError::NoFeeds {
            attempted: report.feeds_attempted,
        }
        .into());
    }

    report.entries_accepted = validated.len();
    report.entries_rejected = validated.rejected;

    let whitelist = Whitelist::from_config(config)?;
    let filtered = FilteredEntries::apply(&whitelist, validated);
    report.entries_whitelisted = filtered.whitelisted;
    info!(
        "After whitelist filtering: {} entries ({} dropped)",
        format_count(filtered.len()),
        format_count(filtered.whitelisted)
    );

    let sets = filtered.aggregate();
    report.v4_count = sets.v4.len();
    report.v6_count = sets.v6.len();
    report.v4_addresses = count_addresses_v4(&sets.v4);
    info!(
        "Aggregated {} entries -> {} IPv4 and {} IPv6 blocks",
        format_count(filtered.len()),
        format_count(sets.v4.len()),
        format_count(sets.v6.len())
    );

    SafetyGate::new(config.min_entries).check(filtered.len())?;
    report.safety_passed = true;

    let ruleset = render_ruleset(&config.table_name, &sets, &config.ruleset);

    if dry_run {
        println!("{}", ruleset);
        info!("Dry run: firewall left untouched");
        report.outcome = RunOutcome::DryRun;
        return Ok(());
    }

    if let Err(e) = backend.check_syntax(&config.table_name, &ruleset).await {
        error!("nftables syntax check failed: {:#}", e);
        match write_atomic(&config.rejected_ruleset_path, ruleset.as_bytes()) {
            Ok(()) => error!(
                "Rejected ruleset saved to {:?}; current rules kept",
                config.rejected_ruleset_path
            ),
            Err(save_err) => warn!("Could not save rejected ruleset: {:#}", save_err),
        }
        return Err(BlocksmithError::SyntaxCheck(format!("{:#}", e)).into());
    }

    if let Err(e) = backend.atomic_replace(&config.table_name, &ruleset).await {
        error!("Failed to apply nftables rules: {:#}", e);
        return Err(BlocksmithError::Apply(format!("{:#}", e)).into());
    }

    report.applied = true;
    report.outcome = RunOutcome::Applied;
    info!(
        "Blocked {} IPv4 and {} IPv6 networks",
        format_count(sets.v4.len()),
        format_count(sets.v6.len())
    );
    Ok(())
}
