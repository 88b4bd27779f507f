//! Integration tests for the `graphwarden` commands.
//!
//! Each test writes a real config and rule files to a temp dir and drives
//! `graphwarden_cli::run` with parsed arguments.

use std::fs;
use std::path::Path;

use clap::Parser;
use graphwarden_cli::cli::Cli;
use graphwarden_cli::error::CliError;
use serial_test::serial;
use tempfile::TempDir;

const RULES: &str = r#"[
  {
    "rule_id": "RULE-BRUTE",
    "name": "Brute force",
    "severity": 8,
    "query": "match:\n  start: { alias: ip, label: IP }\n  rel: GENERATED\n  end: { alias: e, label: Event, where: { class_uid: \"3002\" } }\ncount_gt: 5\ncount_as: attempts\n",
    "mitre_techniques": ["T1110"]
  }
]"#;

fn write_config(dir: &Path, extra: &str) -> std::path::PathBuf {
    let rules_path = dir.join("rules.json");
    fs::write(&rules_path, RULES).expect("should write rules");
    let config_path = dir.join("graphwarden.toml");
    let config = format!(
        r#"
[general]
log_level = "warn"
log_format = "json"

[detection]
rules_path = "{}"
max_concurrent_rules = 2
{extra}
"#,
        rules_path.display()
    );
    fs::write(&config_path, config).expect("should write config");
    config_path
}

fn failed_logins(dir: &Path, count: usize) -> std::path::PathBuf {
    let lines: Vec<String> = (0..count)
        .map(|i| {
            format!(
                r#"{{"class_uid":3002,"time":"2024-01-15T12:00:{i:02}Z","metadata":{{"version":"1.0.0","product":{{"name":"sshd"}}}},"src_endpoint":{{"ip":"203.0.113.9"}},"actor":{{"user":{{"name":"root"}}}}}}"#
            )
        })
        .collect();
    let path = dir.join("events.log");
    fs::write(&path, lines.join("\n")).expect("should write events");
    path
}

async fn run(args: &[&str]) -> Result<(), CliError> {
    let mut argv = vec!["graphwarden"];
    argv.extend_from_slice(args);
    graphwarden_cli::run(Cli::try_parse_from(argv).expect("arguments should parse")).await
}

#[tokio::test]
#[serial]
async fn test_config_validate_reports_invalid_value() {
    // Given: a config with an out-of-range value
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config_path = temp_dir.path().join("bad.toml");
    fs::write(&config_path, "[queue]\npartitions = 0\n").expect("should write config");

    // When: validating it
    let result = run(&["--config", config_path.to_str().unwrap(), "config", "validate"]).await;

    // Then: exit code 2
    let err = result.expect_err("invalid config should fail");
    assert_eq!(err.exit_code(), 2);
}

#[tokio::test]
#[serial]
async fn test_missing_config_falls_back_to_defaults() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let missing = temp_dir.path().join("absent.toml");
    let result = run(&["--config", missing.to_str().unwrap(), "config", "show"]).await;
    assert!(result.is_ok(), "defaults should be shown: {result:?}");
}

#[tokio::test]
#[serial]
async fn test_env_override_is_applied() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config_path = write_config(temp_dir.path(), "");

    // SAFETY: tests touching the environment run serially
    unsafe { std::env::set_var("GRAPHWARDEN_DETECTION_MAX_CONCURRENT_RULES", "7") };
    let config = graphwarden_cli::app::load_config(&config_path).await;
    unsafe { std::env::remove_var("GRAPHWARDEN_DETECTION_MAX_CONCURRENT_RULES") };

    assert_eq!(config.expect("config should load").detection.max_concurrent_rules, 7);
}

#[tokio::test]
#[serial]
async fn test_ingest_direct_with_detection() {
    // Given: six failed logins from one address
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config_path = write_config(temp_dir.path(), "");
    let events = failed_logins(temp_dir.path(), 6);

    // When: ingesting directly and detecting in the same process
    let result = run(&[
        "--config",
        config_path.to_str().unwrap(),
        "--output",
        "json",
        "ingest",
        events.to_str().unwrap(),
        "--format",
        "ocsf",
        "--mode",
        "direct",
        "--detect",
    ])
    .await;

    // Then: every line is accepted and no rule fails
    assert!(result.is_ok(), "ingest should succeed: {result:?}");
}

#[tokio::test]
#[serial]
async fn test_ingest_queued_drains_memory_queue() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config_path = write_config(temp_dir.path(), "");
    let events = failed_logins(temp_dir.path(), 3);

    let result = run(&[
        "--config",
        config_path.to_str().unwrap(),
        "ingest",
        events.to_str().unwrap(),
        "--mode",
        "queued",
    ])
    .await;
    assert!(result.is_ok(), "queued ingest should succeed: {result:?}");
}

#[tokio::test]
#[serial]
async fn test_ingest_reports_bad_lines() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config_path = write_config(temp_dir.path(), "");
    let events = temp_dir.path().join("mixed.log");
    fs::write(
        &events,
        "CEF:0|Acme|FW|1.0|100|Blocked|5|rt=1705320000000 src=10.0.0.1\nnot an event at all\n",
    )
    .expect("should write events");

    let err = run(&[
        "--config",
        config_path.to_str().unwrap(),
        "ingest",
        events.to_str().unwrap(),
    ])
    .await
    .expect_err("unrecognized line should fail the command");
    assert_eq!(err.exit_code(), 1);
}

#[tokio::test]
#[serial]
async fn test_detect_with_broken_rule_exits_with_rule_errors() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config_path = write_config(temp_dir.path(), "");
    fs::write(
        temp_dir.path().join("rules.json"),
        r#"[{"rule_id": "RULE-BAD", "name": "bad", "severity": 2, "query": "match: [oops"}]"#,
    )
    .expect("should overwrite rules");

    let err = run(&["--config", config_path.to_str().unwrap(), "detect"])
        .await
        .expect_err("broken rule should be reported");
    assert_eq!(err.exit_code(), 4);
}

#[tokio::test]
#[serial]
async fn test_detect_unknown_rule_is_error() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config_path = write_config(temp_dir.path(), "");
    let err = run(&[
        "--config",
        config_path.to_str().unwrap(),
        "detect",
        "--rule",
        "RULE-NOPE",
    ])
    .await
    .expect_err("unknown rule should fail");
    assert_eq!(err.exit_code(), 1);
}

#[tokio::test]
#[serial]
async fn test_consume_requires_kafka_backend() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config_path = write_config(temp_dir.path(), "");
    let err = run(&["--config", config_path.to_str().unwrap(), "consume"])
        .await
        .expect_err("memory backend has no shared broker");
    assert_eq!(err.exit_code(), 1);
}

#[tokio::test]
#[serial]
async fn test_rules_list_and_validate() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config_path = write_config(temp_dir.path(), "");
    let config = config_path.to_str().unwrap();

    assert!(run(&["--config", config, "rules", "list", "--enabled", "true"]).await.is_ok());

    let rules_path = temp_dir.path().join("rules.json");
    assert!(
        run(&["--config", config, "rules", "validate", rules_path.to_str().unwrap()])
            .await
            .is_ok()
    );
}
