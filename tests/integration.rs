//! Integration tests for blocksmith.
//!
//! The binary tests never reach the firewall: they stop at configuration,
//! privilege or feed errors. The library tests drive the whole update path
//! against local HTTP feeds and a recording firewall backend.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Mutex;

use async_trait::async_trait;
use blocksmith::commands::update::{run_locked, run_reported};
use blocksmith::config::{Config, FeedFamily, FetchSettings, SourceFeed};
use blocksmith::enforcer::FirewallBackend;
use blocksmith::error::BlocksmithError;
use blocksmith::extract::ExtractRule;
use blocksmith::fetcher::Fetcher;
use blocksmith::lock::RunLock;
use blocksmith::report::{RunOutcome, RunReport};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Check if running as root
fn is_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

/// Run blocksmith command and return output
fn run_blocksmith(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_blocksmith"))
        .args(args)
        .output()
        .expect("Failed to execute blocksmith")
}

/// Write a config whose files all live in `dir`.
fn write_config(dir: &Path, extra: &str) -> PathBuf {
    let path = dir.join("config.yaml");
    let content = format!(
        "lock_file: {dir}/blocksmith.lock\n\
         log_file: {dir}/blocksmith.log\n\
         state_file: {dir}/state.json\n\
         rejected_ruleset_path: {dir}/rejected.nft\n\
         {extra}",
        dir = dir.display(),
        extra = extra
    );
    std::fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_version_command() {
    let output = run_blocksmith(&["version"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(&format!("blocksmith {}", env!("CARGO_PKG_VERSION"))));
}

#[test]
fn test_help_command() {
    let output = run_blocksmith(&["--help"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("update"));
    assert!(stdout.contains("--config"));
}

#[test]
fn test_unknown_subcommand_fails() {
    let output = run_blocksmith(&["frobnicate"]);
    assert!(!output.status.success());
}

#[test]
fn test_malformed_config_exits_2() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.yaml");
    std::fs::write(&config, "feeds: {{{{ not yaml").unwrap();

    let output = run_blocksmith(&["-c", config.to_str().unwrap(), "update", "--dry-run"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Configuration error"));
}

#[test]
fn test_invalid_table_name_exits_2() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "table_name: \"bad name; flush ruleset\"\n");

    let output = run_blocksmith(&["-c", config.to_str().unwrap(), "update", "--dry-run"]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_plain_http_feed_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(
        dir.path(),
        "feeds:\n  - name: insecure\n    url: http://example.com/list.txt\n",
    );

    let output = run_blocksmith(&["-c", config.to_str().unwrap(), "update", "--dry-run"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("HTTPS"));
}

#[test]
fn test_no_feeds_exits_1_and_logs_to_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "feeds: []\n");

    let output = run_blocksmith(&["-c", config.to_str().unwrap(), "update", "--dry-run"]);
    assert_eq!(output.status.code(), Some(1));

    let log = std::fs::read_to_string(dir.path().join("blocksmith.log")).unwrap();
    assert!(log.contains("No feeds enabled"));
    assert!(log.contains("ERROR"));
    // ANSI escapes never reach the log file
    assert!(!log.contains('\u{1b}'));
}

#[test]
fn test_quiet_keeps_info_in_log_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "feeds: []\n");

    let output = run_blocksmith(&["-c", config.to_str().unwrap(), "-q", "update", "--dry-run"]);
    assert_eq!(output.status.code(), Some(1));

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(!stdout.contains("Updating blocklists"));
    assert!(stdout.contains("No feeds enabled"));

    let log = std::fs::read_to_string(dir.path().join("blocksmith.log")).unwrap();
    assert!(log.contains("INFO"));
    assert!(log.contains("Updating blocklists"));
    assert!(log.contains("Run no feeds"));
}

#[test]
fn test_update_requires_root() {
    if is_root() {
        eprintln!("Skipping test_update_requires_root: running as root");
        return;
    }

    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "feeds: []\n");

    let output = run_blocksmith(&["-c", config.to_str().unwrap(), "update"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(!dir.path().join("state.json").exists());
}

/// Records what the pipeline asks of the firewall.
#[derive(Default)]
struct RecordingBackend {
    applied: Mutex<Vec<String>>,
}

#[async_trait]
impl FirewallBackend for RecordingBackend {
    async fn check_syntax(&self, _table: &str, _config_text: &str) -> anyhow::Result<()> {
        Ok(())
    }

    async fn atomic_replace(&self, _table: &str, config_text: &str) -> anyhow::Result<()> {
        self.applied.lock().unwrap().push(config_text.to_string());
        Ok(())
    }
}

fn local_config(dir: &Path, server: &MockServer, routes: &[&str]) -> Config {
    Config {
        lock_file: dir.join("blocksmith.lock"),
        state_file: dir.join("state.json"),
        rejected_ruleset_path: dir.join("rejected.nft"),
        whitelist: vec![],
        fetch: FetchSettings {
            timeout_secs: 5,
            attempts: 2,
            retry_delay_ms: 10,
            max_workers: 3,
        },
        feeds: routes
            .iter()
            .map(|route| {
                SourceFeed::new(
                    route.trim_start_matches('/'),
                    &format!("{}{}", server.uri(), route),
                    FeedFamily::Ipv4,
                    ExtractRule::Plain,
                )
            })
            .collect(),
        ..Default::default()
    }
}

fn hosts(base: &str, count: usize) -> String {
    (1..=count).map(|i| format!("{}.{}\n", base, i)).collect()
}

#[tokio::test]
async fn test_three_feeds_one_failing_applies() {
    let server = MockServer::start().await;
    for (route, body) in [("/one", hosts("198.51.100", 120)), ("/two", hosts("203.0.113", 120))] {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/three"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = local_config(dir.path(), &server, &["/one", "/two", "/three"]);
    let fetcher = Fetcher::new(&config.fetch).unwrap();
    let backend = RecordingBackend::default();

    run_locked(&config, &fetcher, &backend).await.unwrap();

    let applied = backend.applied.lock().unwrap();
    assert_eq!(applied.len(), 1);
    assert!(applied[0].contains("set v4_list"));

    let report: RunReport =
        serde_json::from_str(&std::fs::read_to_string(&config.state_file).unwrap()).unwrap();
    assert_eq!(report.feeds_attempted, 3);
    assert_eq!(report.feeds_succeeded, 2);
    assert_eq!(report.entries_accepted, 240);
    assert_eq!(report.outcome, RunOutcome::Applied);
}

#[tokio::test]
async fn test_lock_held_means_no_fetch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(hosts("198.51.100", 250)))
        .expect(0)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = local_config(dir.path(), &server, &["/one"]);
    let fetcher = Fetcher::new(&config.fetch).unwrap();
    let backend = RecordingBackend::default();

    let _held = RunLock::acquire(&config.lock_file).unwrap();
    let err = run_locked(&config, &fetcher, &backend).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<BlocksmithError>(),
        Some(BlocksmithError::AlreadyRunning { .. })
    ));
    assert_eq!(blocksmith::error::exit_code_for(&err), 3);
    assert!(backend.applied.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_dry_run_applies_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(hosts("198.51.100", 250)))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = local_config(dir.path(), &server, &["/one"]);
    let fetcher = Fetcher::new(&config.fetch).unwrap();
    let backend = RecordingBackend::default();

    run_reported(&config, &fetcher, &backend, true).await.unwrap();
    assert!(backend.applied.lock().unwrap().is_empty());
}
