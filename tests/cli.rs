use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const VALID_CONFIG: &str = r#"
[testrail]
host = "fake.testrail.io"
username = "foo@bar.baz"
password = "fake1234"
project_id = 3
suite_id = 1
"#;

fn cli(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("testrail-reporter").unwrap();
    cmd.current_dir(dir)
        .env_remove("TESTRAIL_USERNAME")
        .env_remove("TESTRAIL_PASSWORD");
    cmd
}

fn workspace(config: &str) -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("testrail-reporter.toml"), config).unwrap();
    dir
}

#[test]
fn test_init_writes_config_once() {
    let dir = TempDir::new().unwrap();

    cli(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Created testrail-reporter.toml"));

    let written = fs::read_to_string(dir.path().join("testrail-reporter.toml")).unwrap();
    assert!(written.contains("[testrail]"));

    cli(dir.path())
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn test_init_output_validates() {
    let dir = TempDir::new().unwrap();
    cli(dir.path()).arg("init").assert().success();

    cli(dir.path())
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid!"));
}

#[test]
fn test_validate_prints_settings() {
    let dir = workspace(VALID_CONFIG);

    cli(dir.path())
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("Host: https://fake.testrail.io"))
        .stdout(predicate::str::contains("Mode: run (suite 1)"))
        .stdout(predicate::str::contains("Failed status: failed"));
}

#[test]
fn test_validate_missing_password() {
    let dir = workspace(
        r#"
[testrail]
host = "fake.testrail.io"
username = "foo@bar.baz"
project_id = 3
suite_id = 1
"#,
    );

    cli(dir.path())
        .arg("validate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Missing password value"));
}

#[test]
fn test_password_from_environment() {
    let dir = workspace(
        r#"
[testrail]
host = "fake.testrail.io"
username = "foo@bar.baz"
project_id = 3
suite_id = 1
"#,
    );

    cli(dir.path())
        .env("TESTRAIL_PASSWORD", "from-env")
        .arg("validate")
        .assert()
        .success();
}

#[test]
fn test_purge_cache() {
    let dir = workspace(VALID_CONFIG);
    let cache_dir = dir.path().join(".testrail-reporter");
    fs::create_dir_all(&cache_dir).unwrap();
    fs::write(cache_dir.join("cache.json"), r#"{"runId": 42}"#).unwrap();

    cli(dir.path())
        .arg("purge-cache")
        .assert()
        .success()
        .stdout(predicate::str::contains("Purged"));

    let contents = fs::read_to_string(cache_dir.join("cache.json")).unwrap();
    assert!(!contents.contains("runId"));
}

#[test]
fn test_delete_without_cached_run() {
    let dir = workspace(VALID_CONFIG);

    cli(dir.path())
        .arg("delete")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No cached TestRail run to delete"));
}

#[test]
fn test_report_without_case_ids_sends_nothing() {
    let dir = workspace(VALID_CONFIG);
    let events = dir.path().join("events.jsonl");
    fs::write(
        &events,
        concat!(
            "{\"event\": \"run_begin\"}\n",
            "{\"event\": \"pass\", \"title\": \"renders the dashboard\"}\n",
            "{\"event\": \"run_end\"}\n",
        ),
    )
    .unwrap();

    cli(dir.path())
        .args(["report", "--events"])
        .arg(&events)
        .assert()
        .success()
        .stderr(predicate::str::contains("No test cases were matched"));

    assert!(!dir.path().join(".testrail-reporter").exists());
}

#[test]
fn test_report_skips_malformed_events() {
    let dir = workspace(VALID_CONFIG);
    let events = dir.path().join("events.jsonl");
    fs::write(
        &events,
        "{\"event\": \"run_begin\"}\nnot json\n{\"event\": \"run_end\"}\n",
    )
    .unwrap();

    cli(dir.path())
        .args(["report", "--events"])
        .arg(&events)
        .assert()
        .success()
        .stderr(predicate::str::contains("Invalid event on line 2"))
        .stderr(predicate::str::contains("No test cases were matched"));
}
