//! Smoke tests -- verify the binary runs and the CLI surface is intact.

use assert_cmd::Command;

#[test]
fn test_cli_help() {
    Command::cargo_bin("podtriage")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicates::str::contains("pod failure triage"));
}

#[test]
fn test_cli_version() {
    Command::cargo_bin("podtriage")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicates::str::contains("podtriage"));
}

#[test]
fn test_watch_subcommand_exists() {
    Command::cargo_bin("podtriage")
        .unwrap()
        .args(["watch", "--help"])
        .assert()
        .success()
        .stdout(predicates::str::contains("--namespace"));
}

#[test]
fn test_watch_fails_without_config() {
    Command::cargo_bin("podtriage")
        .unwrap()
        .args(["watch", "--config", "/nonexistent/config.toml"])
        .assert()
        .failure()
        .stderr(predicates::str::contains("failed to load config"));
}

#[test]
fn test_analyze_fails_without_env() {
    Command::cargo_bin("podtriage")
        .unwrap()
        .arg("analyze")
        .env_remove("POD_NAME")
        .env_remove("POD_NAMESPACE")
        .env_remove("EVENT_TYPE")
        .assert()
        .failure()
        .stderr(predicates::str::contains("analyzer environment"));
}

#[test]
fn test_classify_reports_incident_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pod.json");
    std::fs::write(
        &path,
        r#"{
            "metadata": {"name": "web-1", "namespace": "prod"},
            "status": {
                "phase": "Running",
                "containerStatuses": [
                    {"name": "app", "state": {"waiting": {"reason": "ImagePullBackOff", "message": "no such image"}}}
                ]
            }
        }"#,
    )
    .unwrap();

    Command::cargo_bin("podtriage")
        .unwrap()
        .args(["classify", "--file", path.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicates::str::contains("prod/web-1/ImagePullFailure"));
}

#[test]
fn test_classify_healthy_pod() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pod.json");
    std::fs::write(
        &path,
        r#"{"metadata": {"name": "ok", "namespace": "prod"}, "status": {"phase": "Running"}}"#,
    )
    .unwrap();

    Command::cargo_bin("podtriage")
        .unwrap()
        .args(["classify", "--file", path.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicates::str::contains("no incident detected"));
}
