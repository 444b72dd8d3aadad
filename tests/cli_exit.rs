//! Exit status contract of the acl-probe binary


use mock_broker::{MockCluster, MockPolicy};
use std::io::Write;
use std::process::Command;
use tempfile::NamedTempFile;

const BIN: &str = env!("CARGO_BIN_EXE_acl-probe");

fn write_config(name_server_addrs: &str, scenarios: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    write!(
        file,
        r#"
[broker]
name_server_addrs = "{}"
attempt_timeout_ms = 5000

[credentials.admin]
access_key = "rocketmq2"
secret_key = "12345678"

[credentials.reader]
access_key = "RocketMQ"
secret_key = "12345678"

{}
"#,
        name_server_addrs, scenarios
    )
    .unwrap();
    file
}

const SCENARIOS: &str = r#"
[[scenarios]]
name = "admin-status"
credential = "admin"
topic = "topic_plan_status_update"
payload = "hello"
expect = "allow"

[[scenarios]]
name = "reader-topic-a"
credential = "reader"
topic = "topicA"
payload = "hello"
expect = "allow"
"#;

fn probe(config: &NamedTempFile) -> Command {
    let mut command = Command::new(BIN);
    command
        .arg("--config")
        .arg(config.path())
        .env_remove("NAMESRV_ADDR")
        .env_remove("ACL_PROBE__BROKER__NAME_SERVER_ADDRS");
    command
}

#[test]
fn test_empty_address_list_exits_before_any_scenario() {
    let config = write_config("  ;  ", SCENARIOS);

    let output = probe(&config).output().unwrap();

    assert_eq!(output.status.code(), Some(2));
    assert!(output.stdout.is_empty());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("No name server address configured"));
    assert!(!stderr.contains("Running scenario"));
}

#[test]
fn test_invalid_scenario_is_setup_failure() {
    let config = write_config(
        "127.0.0.1:9876",
        r#"
[[scenarios]]
name = "nobody"
topic = "topicA"
expect = "deny"
"#,
    );

    let output = probe(&config).output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(output.stdout.is_empty());
}

#[test]
fn test_list_does_not_need_a_broker() {
    let config = write_config("", SCENARIOS);

    let output = probe(&config).arg("--list").output().unwrap();

    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("admin-status [admin -> topic_plan_status_update] expect ALLOW"));
    assert!(stdout.contains("reader-topic-a [reader -> topicA] expect ALLOW"));
}

#[test]
fn test_unknown_only_name_is_rejected() {
    let config = write_config("", SCENARIOS);

    let output = probe(&config)
        .args(["--list", "--only", "admin-status", "--only", "admin-stauts"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(2));
    assert!(output.stdout.is_empty());
    assert!(String::from_utf8_lossy(&output.stderr).contains("no scenario named admin-stauts"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_incomplete_credential_fails_only_its_scenario() {
    let cluster = MockCluster::start(
        MockPolicy::new()
            .user("rocketmq2", "12345678", &["topic_plan_status_update"])
            .route("topic_plan_status_update"),
    )
    .await;
    let config = write_config(
        &cluster.name_server_addr,
        r#"
[credentials.Auditor]
access_key = "auditor"

[[scenarios]]
name = "admin-status"
credential = "Admin"
topic = "topic_plan_status_update"
expect = "allow"

[[scenarios]]
name = "auditor-status"
credential = "auditor"
topic = "topic_plan_status_update"
expect = "deny"
"#,
    );

    let output = tokio::process::Command::from(probe(&config))
        .args(["--format", "json"])
        .output()
        .await
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["summary"]["total"], 2);
    assert_eq!(report["summary"]["passed"], 1);
    assert_eq!(report["results"][0]["observed"]["kind"], "delivered");
    assert_eq!(report["results"][1]["class"], "misconfigured");
    assert_eq!(
        report["results"][1]["detail"],
        "configuration error: credential 'auditor' is missing secret_key"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_failed_scenario_exits_non_zero_with_json_report() {
    let cluster = MockCluster::start(
        MockPolicy::new()
            .user("rocketmq2", "12345678", &["topic_plan_status_update"])
            .user("RocketMQ", "12345678", &["topicB"])
            .route("topic_plan_status_update")
            .route("topicA"),
    )
    .await;
    let config = write_config(&cluster.name_server_addr, SCENARIOS);

    let output = tokio::process::Command::from(probe(&config))
        .arg("--format")
        .arg("json")
        .output()
        .await
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["summary"]["total"], 2);
    assert_eq!(report["summary"]["passed"], 1);
    assert_eq!(report["summary"]["failures"][0]["name"], "reader-topic-a");
    assert_eq!(report["results"][0]["observed"]["kind"], "delivered");
    assert_eq!(report["results"][1]["observed"]["kind"], "auth_denied");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_all_passed_exits_zero() {
    let cluster = MockCluster::start(
        MockPolicy::new()
            .user("rocketmq2", "12345678", &["topic_plan_status_update"])
            .route("topic_plan_status_update"),
    )
    .await;
    let config = write_config(
        &cluster.name_server_addr,
        r#"
[[scenarios]]
name = "admin-status"
credential = "admin"
topic = "topic_plan_status_update"
expect = "allow"
"#,
    );

    let output = tokio::process::Command::from(probe(&config))
        .output()
        .await
        .unwrap();

    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("[PASS] admin-status"));
    assert!(stdout.contains("1 scenarios: 1 passed, 0 failed"));
}
