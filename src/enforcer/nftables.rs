//! nftables backend implementation.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::FirewallBackend;
use crate::aggregator::AggregatedSets;
use crate::cmd_abstraction::{owned_args, CommandRunner, SystemRunner};
use crate::config::RulesetSettings;

const SET_NAME_V4: &str = "v4_list";
const SET_NAME_V6: &str = "v6_list";
const CHAIN_NAME: &str = "inbound";

/// File names inside the run workspace
const CHECK_FILE: &str = "check.nft";
const SWAP_FILE: &str = "swap.nft";

/// Validate that an IP/CIDR string is safe for nftables script inclusion.
/// `Ipv4Net`/`Ipv6Net` display output already satisfies this; elements that
/// do not are dropped with a warning.
fn is_safe_nft_element(s: &str) -> bool {
    // Only allow: digits, dots (IPv4), colons (IPv6), slashes (CIDR), a-f (IPv6 hex)
    !s.is_empty()
        && s.chars().all(|c| {
            c.is_ascii_digit() || c == '.' || c == ':' || c == '/' || ('a'..='f').contains(&c)
        })
}

/// Render the complete `table inet <table>` definition.
///
/// Sets whose family has no entries are declared without an `elements`
/// line, so the drop rules stay valid.
pub fn render_ruleset(table: &str, sets: &AggregatedSets, settings: &RulesetSettings) -> String {
    let v4: Vec<String> = sets.v4.iter().map(|n| n.to_string()).collect();
    let v6: Vec<String> = sets.v6.iter().map(|n| n.to_string()).collect();

    let mut script = String::new();
    let _ = writeln!(script, "table inet {} {{", table);
    push_set(&mut script, SET_NAME_V4, "ipv4_addr", &v4);
    script.push('\n');
    push_set(&mut script, SET_NAME_V6, "ipv6_addr", &v6);
    script.push('\n');

    let _ = writeln!(script, "    chain {} {{", CHAIN_NAME);
    let _ = writeln!(
        script,
        "        type filter hook input priority {}; policy accept;",
        settings.priority
    );
    let verdict = rule_verdict(settings);
    let _ = writeln!(script, "        ip saddr @{} {}", SET_NAME_V4, verdict);
    let _ = writeln!(script, "        ip6 saddr @{} {}", SET_NAME_V6, verdict);
    script.push_str("    }\n");
    script.push_str("}\n");
    script
}

fn push_set(script: &mut String, name: &str, addr_type: &str, elements: &[String]) {
    let _ = writeln!(script, "    set {} {{", name);
    let _ = writeln!(script, "        type {}", addr_type);
    script.push_str("        flags interval\n");
    script.push_str("        auto-merge\n");

    let safe: Vec<&str> = elements
        .iter()
        .map(String::as_str)
        .filter(|s| {
            let safe = is_safe_nft_element(s);
            if !safe {
                warn!("Filtered unsafe nftables element: {}", s);
            }
            safe
        })
        .collect();
    if !safe.is_empty() {
        let _ = writeln!(script, "        elements = {{ {} }}", safe.join(", "));
    }
    script.push_str("    }\n");
}

/// `[counter] [log prefix "..."] drop`
fn rule_verdict(settings: &RulesetSettings) -> String {
    let mut verdict = String::new();
    if settings.counters {
        verdict.push_str("counter ");
    }
    if let Some(prefix) = &settings.log_prefix {
        let _ = write!(verdict, "log prefix \"{}\" ", prefix);
    }
    verdict.push_str("drop");
    verdict
}

/// The swap transaction: declaring the table first makes the delete succeed
/// whether or not it already exists, and nft applies the whole file or
/// nothing.
fn swap_script(table: &str, config_text: &str) -> String {
    format!(
        "table inet {table} {{}}\ndelete table inet {table}\n{config}",
        table = table,
        config = config_text
    )
}

/// nftables backend
///
/// Rulesets are written to files in `workspace_dir` and handed to
/// `nft -f`, so a failed run leaves the exact input behind for the error
/// message.
pub struct NftablesBackend<R: CommandRunner = SystemRunner> {
    runner: R,
    nft: String,
    workspace_dir: PathBuf,
}

impl NftablesBackend<SystemRunner> {
    pub fn new(nft: &str, workspace_dir: &Path) -> Self {
        Self::with_runner(SystemRunner, nft, workspace_dir)
    }
}

impl<R: CommandRunner> NftablesBackend<R> {
    pub fn with_runner(runner: R, nft: &str, workspace_dir: &Path) -> Self {
        Self {
            runner,
            nft: nft.to_string(),
            workspace_dir: workspace_dir.to_path_buf(),
        }
    }

    fn write_script(&self, name: &str, script: &str) -> Result<PathBuf> {
        let path = self.workspace_dir.join(name);
        std::fs::write(&path, script)
            .with_context(|| format!("Failed to write nft script {:?}", path))?;
        Ok(path)
    }

    fn run_nft(&self, args: &[&str]) -> Result<()> {
        debug!("Running {} {}", self.nft, args.join(" "));
        let output = self.runner.run(&self.nft, &owned_args(args))?;
        if !output.success() {
            anyhow::bail!("nft failed: {}", output.failure_reason());
        }
        Ok(())
    }
}

#[async_trait]
impl<R: CommandRunner> FirewallBackend for NftablesBackend<R> {
    async fn check_syntax(&self, table: &str, config_text: &str) -> Result<()> {
        // The whole swap is checked: a bare table definition would be merged
        // into the live table and trip over a changed chain priority.
        let path = self.write_script(CHECK_FILE, &swap_script(table, config_text))?;
        let path = path.to_string_lossy();
        self.run_nft(&["-c", "-f", &path])?;
        debug!("nft syntax check passed");
        Ok(())
    }

    async fn atomic_replace(&self, table: &str, config_text: &str) -> Result<()> {
        let path = self.write_script(SWAP_FILE, &swap_script(table, config_text))?;
        let path = path.to_string_lossy();
        self.run_nft(&["-f", &path])?;
        info!("Replaced nftables table inet {}", table);
        Ok(())
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Rendered output of arbitrary IPv4 networks keeps every element.
        #[test]
        fn prop_render_keeps_all_v4(raw in prop::collection::vec((any::<u32>(), 8u8..=32), 1..50)) {
            let nets: Vec<ipnet::Ipv4Net> = raw
                .into_iter()
                .map(|(a, p)| ipnet::Ipv4Net::new(a.into(), p).unwrap().trunc())
                .collect();
            let sets = AggregatedSets { v4: crate::aggregator::aggregate_v4(&nets), v6: vec![] };
            let script = render_ruleset("t", &sets, &RulesetSettings::default());
            for net in &sets.v4 {
                prop_assert!(script.contains(&net.to_string()));
            }
        }
    }
}
