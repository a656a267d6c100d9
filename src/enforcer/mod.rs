//! Firewall enforcement through nftables.

pub mod nftables;

use anyhow::Result;
use async_trait::async_trait;

pub use nftables::{render_ruleset, NftablesBackend};

use crate::error::BlocksmithError;

/// Trait for firewall backends
///
/// The pipeline only ever asks two things of the firewall: whether a
/// ruleset would load, and to swap the owned table for a new one.
#[async_trait]
pub trait FirewallBackend: Send + Sync {
    /// Dry-run the same transaction [`atomic_replace`](Self::atomic_replace)
    /// would load, against the current system state.
    ///
    /// The error carries the firewall tool's diagnostics.
    async fn check_syntax(&self, table: &str, config_text: &str) -> Result<()>;

    /// Replace table `inet <table>` with `config_text` in one transaction.
    ///
    /// A missing table is not an error.
    async fn atomic_replace(&self, table: &str, config_text: &str) -> Result<()>;
}

/// Check if running as root (effective UID == 0)
///
/// Loading nftables rulesets needs CAP_NET_ADMIN; UID 0 covers the
/// common case of running from cron or a systemd timer.
pub fn check_root() -> Result<(), BlocksmithError> {
    // SAFETY: geteuid() is a simple syscall that reads the effective user ID.
    // It has no preconditions and never fails.
    let euid = unsafe { libc::geteuid() };

    if euid != 0 {
        return Err(BlocksmithError::Permission(
            "updating the firewall requires root privileges. Run with sudo, \
             or use --dry-run to preview the ruleset"
                .to_string(),
        ));
    }
    Ok(())
}
