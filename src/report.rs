//! Run report: what one update run fetched, kept and applied.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::aggregator::coverage_percent;
use crate::error::BlocksmithError;
use crate::utils::{format_count, format_count_with_separator, write_atomic};

/// How a run ended
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Still running, or aborted before reaching a verdict
    #[default]
    Incomplete,
    Applied,
    DryRun,
    NoFeeds,
    SafetyBrake,
    SyntaxCheckFailed,
    ApplyFailed,
}

impl RunOutcome {
    pub fn from_error(err: &anyhow::Error) -> Self {
        match err.downcast_ref::<BlocksmithError>() {
            Some(BlocksmithError::NoFeeds { .. }) => RunOutcome::NoFeeds,
            Some(BlocksmithError::SafetyBrake { .. }) => RunOutcome::SafetyBrake,
            Some(BlocksmithError::SyntaxCheck(_)) => RunOutcome::SyntaxCheckFailed,
            Some(BlocksmithError::Apply(_)) => RunOutcome::ApplyFailed,
            _ => RunOutcome::Incomplete,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::Incomplete => "incomplete",
            RunOutcome::Applied => "applied",
            RunOutcome::DryRun => "dry-run",
            RunOutcome::NoFeeds => "no feeds",
            RunOutcome::SafetyBrake => "safety brake",
            RunOutcome::SyntaxCheckFailed => "syntax check failed",
            RunOutcome::ApplyFailed => "apply failed",
        }
    }
}

/// Result for a single feed
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedOutcome {
    pub name: String,
    pub success: bool,
    /// Entries that passed validation
    pub accepted: usize,
    /// Candidates that failed validation
    pub rejected: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FeedOutcome {
    pub fn ok(name: &str, accepted: usize, rejected: usize) -> Self {
        Self {
            name: name.to_string(),
            success: true,
            accepted,
            rejected,
            error: None,
        }
    }

    pub fn failed(name: &str, rejected: usize, error: String) -> Self {
        Self {
            name: name.to_string(),
            success: false,
            accepted: 0,
            rejected,
            error: Some(error),
        }
    }
}

/// Report of one run, logged as a summary line and kept as JSON
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub feeds_attempted: usize,
    pub feeds_succeeded: usize,
    pub feeds: Vec<FeedOutcome>,
    /// Distinct valid entries before whitelisting
    pub entries_accepted: usize,
    pub entries_rejected: usize,
    pub entries_whitelisted: usize,
    /// CIDR blocks per family after aggregation
    pub v4_count: usize,
    pub v6_count: usize,
    /// IPv4 addresses covered by the aggregated set
    pub v4_addresses: u128,
    pub safety_passed: bool,
    pub applied: bool,
    pub outcome: RunOutcome,
}

impl RunReport {
    pub fn start() -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            feeds_attempted: 0,
            feeds_succeeded: 0,
            feeds: Vec::new(),
            entries_accepted: 0,
            entries_rejected: 0,
            entries_whitelisted: 0,
            v4_count: 0,
            v6_count: 0,
            v4_addresses: 0,
            safety_passed: false,
            applied: false,
            outcome: RunOutcome::Incomplete,
        }
    }

    pub fn record_feed(&mut self, outcome: FeedOutcome) {
        self.feeds_attempted += 1;
        if outcome.success {
            self.feeds_succeeded += 1;
        }
        self.feeds.push(outcome);
    }

    /// Stamp the end time and derive the outcome from the run's result.
    pub fn finish(&mut self, result: &Result<()>) {
        self.finished_at = Some(Utc::now());
        if let Err(err) = result {
            self.outcome = RunOutcome::from_error(err);
        }
    }

    pub fn duration_secs(&self) -> Option<f64> {
        self.finished_at
            .map(|end| (end - self.started_at).num_milliseconds() as f64 / 1000.0)
    }

    /// One-line summary for the run log.
    pub fn summary_line(&self) -> String {
        let duration = self
            .duration_secs()
            .map(|s| format!(", {:.1}s", s))
            .unwrap_or_default();
        format!(
            "Run {}: feeds {}/{}, entries {} accepted / {} rejected / {} whitelisted, \
             sets {} IPv4 + {} IPv6 blocks ({} IPv4 addresses, {:.4}% of public space){}",
            self.outcome.as_str(),
            self.feeds_succeeded,
            self.feeds_attempted,
            format_count(self.entries_accepted),
            format_count(self.entries_rejected),
            format_count(self.entries_whitelisted),
            format_count(self.v4_count),
            format_count(self.v6_count),
            format_count_with_separator(self.v4_addresses),
            coverage_percent(self.v4_addresses),
            duration
        )
    }

    /// Persist as pretty JSON, replacing the previous report atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self).context("Failed to serialize run report")?;
        write_atomic(path, content.as_bytes())
            .with_context(|| format!("Failed to write state file {:?}", path))
    }
}
