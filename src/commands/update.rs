//! Update command implementation.

use anyhow::Result;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::enforcer::{check_root, FirewallBackend, NftablesBackend};
use crate::fetcher::Fetcher;
use crate::lock::RunLock;
use crate::pipeline;
use crate::report::RunReport;
use crate::workspace::RunWorkspace;

/// Run the update command
///
/// A dry run needs neither root nor the run lock: it only reads feeds and
/// prints the ruleset it would apply.
pub async fn run(config: &Config, dry_run: bool) -> Result<()> {
    if !dry_run {
        check_root()?;
    }

    let workspace = RunWorkspace::create()?;
    let fetcher = Fetcher::new(&config.fetch)?;
    let backend = NftablesBackend::new(&config.nft_binary, workspace.path());

    if dry_run {
        run_reported(config, &fetcher, &backend, true).await
    } else {
        run_locked(config, &fetcher, &backend).await
    }
}

/// Hold the run lock for the whole pipeline.
///
/// When another run holds it, nothing is fetched and no report is written.
pub async fn run_locked(
    config: &Config,
    fetcher: &Fetcher,
    backend: &dyn FirewallBackend,
) -> Result<()> {
    let _lock = RunLock::acquire(&config.lock_file)?;
    run_reported(config, fetcher, backend, false).await
}

/// Execute the pipeline, then log and persist its report whatever the
/// outcome.
pub async fn run_reported(
    config: &Config,
    fetcher: &Fetcher,
    backend: &dyn FirewallBackend,
    dry_run: bool,
) -> Result<()> {
    info!("Updating blocklists...");
    let mut report = RunReport::start();
    let result = pipeline::execute(config, fetcher, backend, dry_run, &mut report).await;
    report.finish(&result);

    match &result {
        Ok(()) => info!("{}", report.summary_line()),
        Err(_) => error!("{}", report.summary_line()),
    }

    // A dry run must not overwrite the record of the last real run
    if !dry_run {
        if let Err(e) = report.save(&config.state_file) {
            warn!("Failed to save run report: {:#}", e);
        }
    }

    result
}
