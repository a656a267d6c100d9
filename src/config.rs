//! Configuration management for blocksmith.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::BlocksmithError;
use crate::extract::ExtractRule;
use crate::validation::parse_network;

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/blocksmith/config.yaml";

/// Longest table name accepted by nftables.
const MAX_TABLE_NAME_LEN: usize = 64;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// nftables table (family inet) owned by blocksmith
    pub table_name: String,

    /// Minimum number of filtered entries required before applying
    pub min_entries: usize,

    /// Lock file recording the PID of the running instance
    pub lock_file: PathBuf,

    /// Append-only run log
    pub log_file: PathBuf,

    /// JSON report of the last run
    pub state_file: PathBuf,

    /// Where a ruleset that failed the syntax check is kept for diagnosis
    pub rejected_ruleset_path: PathBuf,

    /// nft binary (name looked up in PATH, or absolute path)
    pub nft_binary: String,

    /// Also protect private, link-local, multicast and reserved ranges
    pub protect_reserved: bool,

    /// Operator whitelist (IPs/CIDRs never to block); loopback is always added
    pub whitelist: Vec<String>,

    /// HTTP fetch settings
    pub fetch: FetchSettings,

    /// Generated ruleset settings
    pub ruleset: RulesetSettings,

    /// Reputation feeds
    pub feeds: Vec<SourceFeed>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            table_name: "crowdsec_blocklists".to_string(),
            min_entries: 200,
            lock_file: PathBuf::from("/run/blocksmith.lock"),
            log_file: PathBuf::from("/var/log/blocksmith.log"),
            state_file: PathBuf::from("/var/lib/blocksmith/state.json"),
            rejected_ruleset_path: PathBuf::from("/var/lib/blocksmith/rejected.nft"),
            nft_binary: "nft".to_string(),
            protect_reserved: false,
            whitelist: default_whitelist(),
            fetch: FetchSettings::default(),
            ruleset: RulesetSettings::default(),
            feeds: default_feeds(),
        }
    }
}

impl Config {
    /// Load configuration from YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| BlocksmithError::Config(format!("{:?}: {}", path.as_ref(), e)))?;

        config.validate()?;

        Ok(config)
    }

    /// Load the file if it exists, otherwise fall back to built-in defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            warn!(
                "Config file {:?} not found, using built-in defaults",
                path.as_ref()
            );
            Ok(Self::default())
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), BlocksmithError> {
        if self.table_name.is_empty()
            || self.table_name.len() > MAX_TABLE_NAME_LEN
            || !self
                .table_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(BlocksmithError::Config(format!(
                "Invalid table_name '{}'. Use 1-{} characters from [A-Za-z0-9_]",
                self.table_name, MAX_TABLE_NAME_LEN
            )));
        }

        if self.fetch.attempts == 0 {
            return Err(BlocksmithError::Config(
                "fetch.attempts must be at least 1".to_string(),
            ));
        }
        if self.fetch.max_workers == 0 {
            return Err(BlocksmithError::Config(
                "fetch.max_workers must be at least 1".to_string(),
            ));
        }
        if self.fetch.timeout_secs == 0 {
            return Err(BlocksmithError::Config(
                "fetch.timeout_secs must be at least 1".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for feed in &self.feeds {
            if feed.name.trim().is_empty() {
                return Err(BlocksmithError::Config(format!(
                    "Feed with URL {} has an empty name",
                    feed.url
                )));
            }
            if !names.insert(feed.name.as_str()) {
                return Err(BlocksmithError::Config(format!(
                    "Duplicate feed name '{}'",
                    feed.name
                )));
            }
            if feed.enabled && !feed.url.starts_with("https://") {
                return Err(BlocksmithError::Config(format!(
                    "Feed '{}' URL must use HTTPS: {}",
                    feed.name, feed.url
                )));
            }
        }

        for entry in &self.whitelist {
            if parse_network(entry).is_none() {
                return Err(BlocksmithError::Config(format!(
                    "Invalid whitelist entry '{}'",
                    entry
                )));
            }
        }

        if let Some(prefix) = &self.ruleset.log_prefix {
            if prefix.len() > 127 || prefix.contains('"') || prefix.contains('\n') {
                return Err(BlocksmithError::Config(format!(
                    "Invalid ruleset.log_prefix {:?}",
                    prefix
                )));
            }
        }

        Ok(())
    }

    /// Feeds that take part in a run
    pub fn enabled_feeds(&self) -> Vec<&SourceFeed> {
        self.feeds.iter().filter(|f| f.enabled).collect()
    }
}

/// Address family published by a feed.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FeedFamily {
    #[default]
    Ipv4,
    Ipv6,
    /// Both families; each entry is routed by its own text
    Mixed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceFeed {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub family: FeedFamily,
    #[serde(default)]
    pub extract: ExtractRule,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl SourceFeed {
    pub fn new(name: &str, url: &str, family: FeedFamily, extract: ExtractRule) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            family,
            extract,
            enabled: true,
        }
    }

    /// Same feed, listed but not fetched.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FetchSettings {
    /// Per-request timeout
    pub timeout_secs: u64,
    /// Total attempts per feed (first try included)
    pub attempts: u32,
    /// Fixed pause between attempts
    pub retry_delay_ms: u64,
    /// Feeds downloaded at the same time
    pub max_workers: usize,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            attempts: 3,
            retry_delay_ms: 1000,
            max_workers: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RulesetSettings {
    /// Priority of the input hook
    pub priority: i32,
    /// Attach counters to the drop rules
    pub counters: bool,
    /// Log dropped packets with this prefix
    pub log_prefix: Option<String>,
}

impl Default for RulesetSettings {
    fn default() -> Self {
        Self {
            priority: -100,
            counters: true,
            log_prefix: None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_whitelist() -> Vec<String> {
    vec![
        "1.1.1.1".to_string(),              // Cloudflare DNS
        "8.8.8.8".to_string(),              // Google DNS
        "2001:4860:4860::8888".to_string(), // Google DNS
        "2606:4700:4700::1111".to_string(), // Cloudflare DNS
    ]
}

fn default_feeds() -> Vec<SourceFeed> {
    use ExtractRule::{Dshield, Ipv4Substrings, Plain};
    use FeedFamily::{Ipv4, Ipv6, Mixed};

    let mut feeds = vec![
        SourceFeed::new(
            "AbuseIPDB",
            "https://raw.githubusercontent.com/borestad/blocklist-abuseipdb/main/abuseipdb-s100-30d.ipv4",
            Ipv4,
            Plain,
        ),
        SourceFeed::new(
            "IPsum",
            "https://raw.githubusercontent.com/stamparm/ipsum/master/levels/3.txt",
            Ipv4,
            Plain,
        ),
        SourceFeed::new("Spamhaus DROP", "https://www.spamhaus.org/drop/drop.txt", Ipv4, Plain),
        SourceFeed::new(
            "Emerging Threats",
            "https://rules.emergingthreats.net/blockrules/compromised-ips.txt",
            Ipv4,
            Plain,
        ),
        SourceFeed::new(
            "Feodo Tracker",
            "https://feodotracker.abuse.ch/downloads/ipblocklist.txt",
            Ipv4,
            Plain,
        ),
        SourceFeed::new(
            "URLhaus",
            "https://urlhaus.abuse.ch/downloads/text_online/",
            Ipv4,
            Ipv4Substrings,
        ),
        SourceFeed::new("CI Army", "https://cinsscore.com/list/ci-badguys.txt", Ipv4, Plain),
        SourceFeed::new(
            "Binary Defense",
            "https://www.binarydefense.com/banlist.txt",
            Ipv4,
            Plain,
        ),
        SourceFeed::new(
            "Tor Exit Nodes",
            "https://check.torproject.org/torbulkexitlist",
            Ipv4,
            Plain,
        ),
        SourceFeed::new("Blocklist.de", "https://lists.blocklist.de/lists/all.txt", Mixed, Plain),
        SourceFeed::new("GreenSnow", "https://blocklist.greensnow.co/greensnow.txt", Ipv4, Plain),
        SourceFeed::new("DShield", "https://feeds.dshield.org/block.txt", Ipv4, Dshield),
        SourceFeed::new(
            "Spamhaus DROPv6",
            "https://www.spamhaus.org/drop/dropv6.txt",
            Ipv6,
            Plain,
        ),
    ];
    feeds.extend(optional_feeds());
    feeds
}

/// Broader or noisier lists shipped disabled; enable them per host.
fn optional_feeds() -> Vec<SourceFeed> {
    use ExtractRule::{Ipv4Substrings, Plain};
    use FeedFamily::{Ipv4, Mixed};

    const FIREHOL: &str = "https://raw.githubusercontent.com/firehol/blocklist-ipsets/refs/heads/master";
    let firehol = |name: &str, file: &str| {
        SourceFeed::new(name, &format!("{}/{}", FIREHOL, file), Ipv4, Plain).disabled()
    };

    vec![
        firehol("Spamhaus EDROP", "spamhaus_edrop.netset"),
        firehol("Clean talk", "cleantalk_1d.ipset"),
        SourceFeed::new(
            "Bruteforce Blocker",
            "https://danger.rulez.sk/projects/bruteforceblocker/blist.php",
            Ipv4,
            Plain,
        )
        .disabled(),
        SourceFeed::new("Blocklist.de SSH", "https://lists.blocklist.de/lists/ssh.txt", Mixed, Plain)
            .disabled(),
        SourceFeed::new(
            "Blocklist.de Apache",
            "https://lists.blocklist.de/lists/apache.txt",
            Mixed,
            Plain,
        )
        .disabled(),
        SourceFeed::new("Blocklist.de Mail", "https://lists.blocklist.de/lists/mail.txt", Mixed, Plain)
            .disabled(),
        firehol("Botscout", "botscout_7d.ipset"),
        firehol("Firehol L1", "firehol_level1.netset"),
        firehol("Firehol L2", "firehol_level2.netset"),
        firehol("Firehol L3", "firehol_level3.netset"),
        firehol("Firehol Webclient", "firehol_webclient.netset"),
        firehol("MyIP.ms", "myip.ipset"),
        firehol("SOCKS Proxies", "socks_proxy_7d.ipset"),
        SourceFeed::new("Botvrij", "https://www.botvrij.eu/data/ioclist.ip-dst.raw", Ipv4, Plain)
            .disabled(),
        SourceFeed::new(
            "StopForumSpam",
            "https://www.stopforumspam.com/downloads/toxic_ip_cidr.txt",
            Ipv4,
            Plain,
        )
        .disabled(),
        SourceFeed::new(
            "Shodan Scanners",
            "https://gist.githubusercontent.com/jfqd/4ff7fa70950626a11832a4bc39451c1c/raw",
            Ipv4,
            Ipv4Substrings,
        )
        .disabled(),
        firehol("PHP Spammers", "php_spammers_7d.ipset"),
    ]
}
