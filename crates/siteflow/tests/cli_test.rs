#![allow(deprecated)] // TODO: move from Command::cargo_bin to the cargo_bin_cmd! macro

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;

/// Command running in an isolated directory with no settings file in reach
fn siteflow(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("siteflow").unwrap();
    cmd.current_dir(dir)
        .env_remove("SITEFLOW_STATUS_FILE")
        .env_remove("AWS_PROFILE")
        .env_remove("AWS_REGION")
        .env("SITEFLOW_CONFIG_PATH", dir.join("siteflow.yaml"))
        .env("NO_COLOR", "1");
    std::fs::write(dir.join("siteflow.yaml"), "").unwrap();
    cmd
}

fn site_record() -> serde_json::Value {
    serde_json::json!({
        "kind": "site",
        "domain": "example.com",
        "region": "us-east-1",
        "created_at": "2026-01-01T00:00:00Z",
        "hosted_zone_id": "Z100",
        "hosted_zone_completed": true,
        "hosted_zone_completed_at": "2026-01-01T00:00:01Z",
        "bucket_name": "example-com-site-1234abcd",
        "bucket_create_completed": true,
        "bucket_create_completed_at": "2026-01-01T00:00:02Z",
        "certificate_arn": "arn:aws:acm:us-east-1:123:certificate/abc",
        "certificate_issue_pending": true,
        "certificate_issue_pending_at": "2026-01-01T00:30:00Z"
    })
}

/// Help exits non-zero so scripts cannot mistake it for a successful run
#[test]
fn test_cli_help_exits_non_zero() {
    let dir = tempfile::tempdir().unwrap();
    siteflow(dir.path())
        .arg("--help")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("site"))
        .stdout(predicate::str::contains("redirect"))
        .stdout(predicate::str::contains("sync"))
        .stdout(predicate::str::contains("teardown"));
}

#[test]
fn test_cli_version() {
    let dir = tempfile::tempdir().unwrap();
    siteflow(dir.path())
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("siteflow"));
}

#[test]
fn test_site_help_lists_flags() {
    let dir = tempfile::tempdir().unwrap();
    siteflow(dir.path())
        .args(["site", "--help"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("--domain"))
        .stdout(predicate::str::contains("--alt-name"))
        .stdout(predicate::str::contains("--no-ipv6"));
}

#[test]
fn test_site_requires_domain() {
    let dir = tempfile::tempdir().unwrap();
    siteflow(dir.path())
        .arg("site")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("--domain"));
}

#[test]
fn test_redirect_requires_source() {
    let dir = tempfile::tempdir().unwrap();
    siteflow(dir.path())
        .args(["redirect", "--target", "c.com"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("--source"));
}

#[test]
fn test_redirect_rejects_unknown_type() {
    let dir = tempfile::tempdir().unwrap();
    siteflow(dir.path())
        .args([
            "redirect",
            "--source",
            "a.com",
            "--target",
            "c.com",
            "--redirect-type",
            "forever",
        ])
        .assert()
        .code(1);
}

#[test]
fn test_sync_needs_domain_or_status_file() {
    let dir = tempfile::tempdir().unwrap();
    siteflow(dir.path())
        .args(["sync", "--source", "."])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("--status-file"));
}

#[test]
fn test_teardown_without_status_file_fails_before_aws() {
    let dir = tempfile::tempdir().unwrap();
    siteflow(dir.path())
        .args(["teardown", "--domain", "example.com", "--yes"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Status file not found"));
}

#[test]
fn test_status_prints_steps_and_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let status_dir = dir.path().join(".siteflow");
    std::fs::create_dir(&status_dir).unwrap();
    std::fs::write(
        status_dir.join("example.com.json"),
        serde_json::to_string_pretty(&site_record()).unwrap(),
    )
    .unwrap();

    siteflow(dir.path())
        .args(["status", "--domain", "example.com"])
        .assert()
        .success()
        .stdout(predicate::str::contains("example.com"))
        .stdout(predicate::str::contains("bucket_create"))
        .stdout(predicate::str::contains("completed"))
        .stdout(predicate::str::contains("pending"))
        .stdout(predicate::str::contains("example-com-site-1234abcd"))
        .stdout(predicate::str::contains("not started"));
}

#[test]
fn test_status_with_explicit_status_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("custom.json");
    std::fs::write(&path, serde_json::to_string(&site_record()).unwrap()).unwrap();

    siteflow(dir.path())
        .args(["status", "--status-file"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("arn:aws:acm:us-east-1:123:certificate/abc"));
}

#[test]
fn test_invalid_settings_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let mut cmd = siteflow(dir.path());
    std::fs::write(dir.path().join("siteflow.yaml"), "regoin: eu-west-1\n").unwrap();
    cmd.args(["status", "--domain", "example.com"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("siteflow.yaml"));
}
