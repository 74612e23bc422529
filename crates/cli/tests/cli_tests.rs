//! CLI integration tests

use adaptor_lib::event::{Event, EventType, Operator};
use adaptor_lib::response::{ActionType, Response};
use std::io::Write;
use std::path::Path;
use std::process::{Command, Output};
use std::sync::Arc;
use tempfile::{NamedTempFile, TempDir};

const CATALOG: &str = "\
agreement_term,comparator,response_type,event_type,min_magnitude,max_magnitude,parameters
power_usage,GT,REMOVE_TASK,SLA_BREACH,10,,TASK_TYPE=worker
power_usage,GT,PAUSE_APP
energy,LT,ADD_TASK
";

/// Run adaptctl isolated from any per-user configuration
fn adaptctl(args: &[&str], home: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_adaptctl"))
        .args(args)
        .env("ADAPTCTL_CONFIG", home.join("missing.json"))
        .env_remove("ADAPTOR_API_URL")
        .env("NO_COLOR", "1")
        .output()
        .expect("Failed to execute adaptctl")
}

fn catalog(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let home = TempDir::new().unwrap();
    let output = adaptctl(&["--help"], home.path());
    let out = stdout(&output);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(out.contains("QoS Adaptor"), "Should show app name");
    assert!(out.contains("rules"), "Should show rules command");
    assert!(out.contains("status"), "Should show status command");
    assert!(out.contains("adaptations"), "Should show adaptations command");
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let home = TempDir::new().unwrap();
    let output = adaptctl(&["--version"], home.path());

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout(&output).contains("adaptctl"), "Should show binary name");
}

#[test]
fn test_rules_match_help() {
    let home = TempDir::new().unwrap();
    let output = adaptctl(&["rules", "match", "--help"], home.path());
    let out = stdout(&output);

    assert!(output.status.success());
    assert!(out.contains("--term"));
    assert!(out.contains("--operator"));
    assert!(out.contains("--all"));
}

#[test]
fn test_rules_list_json_keeps_order() {
    let home = TempDir::new().unwrap();
    let file = catalog(CATALOG);
    let output = adaptctl(
        &["--format", "json", "rules", "list", file.path().to_str().unwrap()],
        home.path(),
    );

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let rules: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    let rules = rules.as_array().unwrap();
    assert_eq!(rules.len(), 3);
    assert_eq!(rules[0]["index"], 1);
    assert_eq!(rules[0]["action_type"], "REMOVE_TASK");
    assert_eq!(rules[2]["agreement_term"], "energy");
}

#[test]
fn test_rules_list_table() {
    let home = TempDir::new().unwrap();
    let file = catalog(CATALOG);
    let output = adaptctl(&["rules", "list", file.path().to_str().unwrap()], home.path());
    let out = stdout(&output);

    assert!(output.status.success());
    assert!(out.contains("PAUSE_APP"));
    assert!(out.contains("Total: 3 rules"));
}

#[test]
fn test_rules_check_valid() {
    let home = TempDir::new().unwrap();
    let file = catalog(CATALOG);
    let output = adaptctl(&["rules", "check", file.path().to_str().unwrap()], home.path());

    assert!(output.status.success());
    assert!(stdout(&output).contains("3 rules"));
}

#[test]
fn test_rules_check_reports_line() {
    let home = TempDir::new().unwrap();
    let file = catalog("power_usage,GT,PAUSE_APP\nenergy,ABOUT,ADD_TASK\n");
    let output = adaptctl(&["rules", "check", file.path().to_str().unwrap()], home.path());

    assert!(!output.status.success(), "Invalid catalog must fail");
    assert!(stderr(&output).contains("line 2"), "stderr: {}", stderr(&output));
}

#[test]
fn test_rules_match_first_and_all() {
    let home = TempDir::new().unwrap();
    let file = catalog(CATALOG);
    let path = file.path().to_str().unwrap();
    let query = [
        "--term", "power_usage", "--operator", "GT", "--raw", "130", "--guaranteed", "100",
    ];

    let mut first = vec!["--format", "json", "rules", "match", path];
    first.extend_from_slice(&query);
    let output = adaptctl(&first, home.path());
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let matched: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(matched.as_array().unwrap().len(), 1);
    assert_eq!(matched[0]["action_type"], "REMOVE_TASK");

    let mut all = first.clone();
    all.push("--all");
    let output = adaptctl(&all, home.path());
    let matched: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(matched.as_array().unwrap().len(), 2);
}

#[test]
fn test_rules_match_below_magnitude_skips_rule() {
    let home = TempDir::new().unwrap();
    let file = catalog(CATALOG);
    let output = adaptctl(
        &[
            "--format", "json", "rules", "match", file.path().to_str().unwrap(),
            "--term", "power_usage", "--operator", "GT", "--raw", "105", "--guaranteed", "100",
        ],
        home.path(),
    );

    let matched: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(matched[0]["action_type"], "PAUSE_APP");
}

#[test]
fn test_status_queries_daemon() {
    let home = TempDir::new().unwrap();
    let mut server = mockito::Server::new();
    let _health = server
        .mock("GET", "/healthz")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"status":"degraded","components":{"dispatcher":{"status":"degraded","message":"slow","last_check_timestamp":1700000000}}}"#,
        )
        .create();
    let _ready = server
        .mock("GET", "/readyz")
        .with_status(503)
        .with_header("content-type", "application/json")
        .with_body(r#"{"ready":false,"reason":"Adaptor not yet initialized"}"#)
        .create();

    let url = server.url();
    let output = adaptctl(&["--api-url", &url, "status"], home.path());
    let out = stdout(&output);

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(out.contains("degraded"));
    assert!(out.contains("dispatcher"));
    assert!(out.contains("not ready"));
}

#[test]
fn test_adaptations_queries_daemon() {
    let home = TempDir::new().unwrap();
    let cause = Arc::new(
        Event::new("g-1", "power_usage", 1_700_000_000, 9.0, 5.0, EventType::Breach, Operator::Gt)
            .for_application("lammps", "7"),
    );
    let mut response = Response::new(cause, ActionType::RemoveTask, "TASK_TYPE=worker", 1_700_000_000);
    response.task_id = Some("t-4".to_string());
    response.mark_performed();
    let body = serde_json::to_string(&vec![response]).unwrap();

    let mut server = mockito::Server::new();
    let _history = server
        .mock("GET", "/api/v1/adaptations")
        .match_query(mockito::Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(body)
        .create();

    let url = server.url();
    let output = adaptctl(&["--api-url", &url, "adaptations"], home.path());
    let out = stdout(&output);

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(out.contains("REMOVE_TASK"));
    assert!(out.contains("lammps/7 t-4"));
    assert!(out.contains("performed"));
}

#[test]
fn test_unreachable_daemon_fails() {
    let home = TempDir::new().unwrap();
    let output = adaptctl(&["--api-url", "http://127.0.0.1:9", "status"], home.path());

    assert!(!output.status.success());
}
