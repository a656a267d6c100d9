//! Fail-closed plausibility check before the firewall is touched.

use tracing::{error, info};

use crate::error::BlocksmithError;
use crate::utils::format_count;

/// Refuses to replace the ruleset with an implausibly small blocklist.
///
/// Upstream outages tend to produce near-empty lists rather than errors,
/// and applying one would silently unblock everything.
#[derive(Debug, Clone, Copy)]
pub struct SafetyGate {
    min_entries: usize,
}

impl SafetyGate {
    pub fn new(min_entries: usize) -> Self {
        Self { min_entries }
    }

    /// `total` is the number of distinct entries left after whitelist
    /// filtering, counted before aggregation.
    pub fn check(&self, total: usize) -> Result<(), BlocksmithError> {
        if total < self.min_entries {
            error!(
                "Safety brake: {} entries is below the threshold of {}",
                format_count(total),
                format_count(self.min_entries)
            );
            return Err(BlocksmithError::SafetyBrake {
                found: total,
                threshold: self.min_entries,
            });
        }
        info!(
            "Safety check passed: {} entries (threshold {})",
            format_count(total),
            self.min_entries
        );
        Ok(())
    }
}
