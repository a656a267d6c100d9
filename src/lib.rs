//! # blocksmith - IP reputation feeds compiled into an nftables blocklist
//!
//! Pulls address and network entries from many public reputation feeds,
//! validates them strictly, drops anything touching a protected network,
//! collapses the rest into the fewest CIDR blocks, and swaps a dedicated
//! nftables table for the new blocklist in one transaction.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        blocksmith                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  CLI (clap)                                                 │
//! │    └── update [--dry-run], version                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Config (serde_yaml)                                        │
//! │    └── feeds, whitelist, thresholds, ruleset options        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Fetcher (reqwest + rustls) + extraction rules              │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Validation → Whitelist → Aggregator (ipnet)                │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Safety gate                                                │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Enforcer (FirewallBackend trait)                           │
//! │    └── NftablesBackend: nft -c, then one nft -f transaction │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```no_run
//! use blocksmith::config::Config;
//! use blocksmith::enforcer::NftablesBackend;
//! use blocksmith::fetcher::Fetcher;
//! use blocksmith::pipeline;
//! use blocksmith::report::RunReport;
//! use blocksmith::workspace::RunWorkspace;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("/etc/blocksmith/config.yaml")?;
//!     let workspace = RunWorkspace::create()?;
//!     let fetcher = Fetcher::new(&config.fetch)?;
//!     let backend = NftablesBackend::new(&config.nft_binary, workspace.path());
//!
//!     let mut report = RunReport::start();
//!     let result = pipeline::execute(&config, &fetcher, &backend, true, &mut report).await;
//!     report.finish(&result);
//!     println!("{}", report.summary_line());
//!     result
//! }
//! ```
//!
//! ## Modules
//!
//! - [`aggregator`] - CIDR aggregation
//! - [`cli`] - Command-line interface definitions
//! - [`cmd_abstraction`] - Mockable command execution
//! - [`commands`] - CLI command implementations
//! - [`config`] - Configuration parsing and validation
//! - [`enforcer`] - Firewall backend abstraction and nftables rendering
//! - [`error`] - Fatal conditions and exit codes
//! - [`extract`] - Per-feed extraction rules
//! - [`fetcher`] - HTTP client for downloading feeds
//! - [`lock`] - File locking for concurrent execution prevention
//! - [`pipeline`] - The update pipeline
//! - [`report`] - Run report and state file
//! - [`safety`] - Minimum-size safety gate
//! - [`utils`] - Formatting and atomic file writes
//! - [`validation`] - Strict entry validation
//! - [`whitelist`] - Protected networks
//! - [`workspace`] - Per-run temporary directory

pub mod aggregator;
pub mod cli;
pub mod cmd_abstraction;
pub mod commands;
pub mod config;
pub mod enforcer;
pub mod error;
pub mod extract;
pub mod fetcher;
pub mod lock;
pub mod pipeline;
pub mod report;
pub mod safety;
pub mod utils;
pub mod validation;
pub mod whitelist;
pub mod workspace;

pub use cli::{Cli, Commands};
pub use config::Config;
pub use error::BlocksmithError;
