// End-to-end engine lifecycle against a stub agent binary.
//
// The stub stands in for the external coding agent: Discovery runs it in the
// workspace root (where it creates the `repo/` clone target), Execution runs
// it inside `repo/`. Scenarios drive the full state machine without any
// network or real agent.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::time::Duration;

use drover_core::{EngineConfig, OrchestrationEngine};
use drover_types::{TaskErrorKind, TaskRecord, TaskStatus};

fn write_stub_agent(dir: &Path, body: &str) -> String {
    let path = dir.join("stub-agent.sh");
    let script = format!("#!/bin/sh\n{}\n", body);
    std::fs::write(&path, script).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path.display().to_string()
}

fn engine_with_stub(dir: &Path, stub_body: &str) -> OrchestrationEngine {
    let agent = write_stub_agent(dir, stub_body);
    let config = EngineConfig::default()
        .with_state_dir(dir.join("state"))
        .with_agent_bin(agent);
    OrchestrationEngine::new(config)
}

async fn wait_for_terminal(engine: &OrchestrationEngine, id: &str) -> TaskRecord {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(30);
    loop {
        let record = engine.registry().get(id).await.expect("record exists");
        if record.status.is_terminal() {
            return record;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "task {} never reached a terminal state",
            id
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[tokio::test]
async fn submitted_task_is_immediately_visible_as_running() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_with_stub(dir.path(), "mkdir -p repo\nsleep 5");

    let record = engine.submit("fix bug in acme-api".to_string()).await;
    assert_eq!(record.status, TaskStatus::Running);

    let fetched = engine.registry().get(&record.id).await.unwrap();
    assert_eq!(fetched.status, TaskStatus::Running);
    assert_eq!(fetched.prompt, "fix bug in acme-api");

    let other = engine.submit("another request".to_string()).await;
    assert_ne!(record.id, other.id);
}

#[tokio::test]
async fn successful_run_completes_with_pr_url_and_cleans_repo() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_with_stub(
        dir.path(),
        "mkdir -p repo\n\
         echo 'working on it'\n\
         echo 'https://github.com/acme/acme-api/pull/42'\n\
         exit 0",
    );

    let record = engine.submit("fix bug in acme-api".to_string()).await;
    let finished = wait_for_terminal(&engine, &record.id).await;

    assert_eq!(finished.status, TaskStatus::Completed);
    assert_eq!(
        finished.pr_url.as_deref(),
        Some("https://github.com/acme/acme-api/pull/42")
    );
    assert!(finished.finished.is_some());
    assert!(finished.error_type.is_none());

    let workspace = dir.path().join("state/tasks").join(&record.id);
    assert!(!workspace.join("repo").exists());
    assert!(workspace.join("task.log").exists());
}

#[tokio::test]
async fn success_without_pr_url_leaves_field_unset() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_with_stub(dir.path(), "mkdir -p repo\necho done\nexit 0");

    let record = engine.submit("tidy docs".to_string()).await;
    let finished = wait_for_terminal(&engine, &record.id).await;

    assert_eq!(finished.status, TaskStatus::Completed);
    assert!(finished.pr_url.is_none());
}

#[tokio::test]
async fn nonzero_exit_fails_with_exit_code_and_keeps_repo() {
    let dir = tempfile::tempdir().unwrap();
    // Discovery succeeds; Execution (running inside repo/) fails.
    let engine = engine_with_stub(
        dir.path(),
        "if [ \"$(basename \"$PWD\")\" = repo ]; then echo 'in execution'; exit 7; fi\n\
         mkdir -p repo\nexit 0",
    );

    let record = engine.submit("break things".to_string()).await;
    let finished = wait_for_terminal(&engine, &record.id).await;

    assert_eq!(finished.status, TaskStatus::Failed);
    assert_eq!(finished.error_type, Some(TaskErrorKind::ExitCode));
    assert!(finished.error.as_deref().unwrap().contains("status 7"));

    let workspace = dir.path().join("state/tasks").join(&record.id);
    assert!(workspace.join("repo").exists());
}

#[tokio::test]
async fn auth_phrase_in_discovery_fails_task_despite_exit_zero() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_with_stub(
        dir.path(),
        "echo 'gh: authentication failed, session expired'\nexit 0",
    );

    let record = engine.submit("fix bug".to_string()).await;
    let finished = wait_for_terminal(&engine, &record.id).await;

    assert_eq!(finished.status, TaskStatus::Failed);
    assert_eq!(finished.error_type, Some(TaskErrorKind::AuthExpired));
    assert!(finished.pr_url.is_none());
}

#[tokio::test]
async fn capacity_phrase_mid_execution_fails_task() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_with_stub(
        dir.path(),
        "if [ \"$(basename \"$PWD\")\" = repo ]; then\n\
         echo '429 too many requests'\n\
         exit 0\n\
         fi\n\
         mkdir -p repo\nexit 0",
    );

    let record = engine.submit("fix bug".to_string()).await;
    let finished = wait_for_terminal(&engine, &record.id).await;

    assert_eq!(finished.status, TaskStatus::Failed);
    assert_eq!(finished.error_type, Some(TaskErrorKind::CapacityReached));
    assert!(finished.pr_url.is_none());
    // Repo is retained for inspection on failure.
    let workspace = dir.path().join("state/tasks").join(&record.id);
    assert!(workspace.join("repo").exists());
}

#[tokio::test]
async fn discovery_deadline_times_out_task() {
    let dir = tempfile::tempdir().unwrap();
    let agent = write_stub_agent(dir.path(), "sleep 30");
    let mut config = EngineConfig::default()
        .with_state_dir(dir.path().join("state"))
        .with_agent_bin(agent);
    config.discovery_timeout = Duration::from_secs(1);
    let engine = OrchestrationEngine::new(config);

    let record = engine.submit("fix bug".to_string()).await;
    let finished = wait_for_terminal(&engine, &record.id).await;

    assert_eq!(finished.status, TaskStatus::Failed);
    assert_eq!(finished.error_type, Some(TaskErrorKind::Timeout));
}

#[tokio::test]
async fn missing_agent_binary_fails_as_unknown() {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig::default()
        .with_state_dir(dir.path().join("state"))
        .with_agent_bin(dir.path().join("no-such-agent").display().to_string());
    let engine = OrchestrationEngine::new(config);

    let record = engine.submit("fix bug".to_string()).await;
    let finished = wait_for_terminal(&engine, &record.id).await;

    assert_eq!(finished.status, TaskStatus::Failed);
    assert_eq!(finished.error_type, Some(TaskErrorKind::Unknown));
    assert!(finished.error.is_some());
}

#[tokio::test]
async fn log_read_mid_run_is_prefix_of_final_log() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_with_stub(
        dir.path(),
        "mkdir -p repo\necho 'first line'\nsleep 2\necho 'second line'\nexit 0",
    );

    let record = engine.submit("fix bug".to_string()).await;
    let log_path = dir
        .path()
        .join("state/tasks")
        .join(&record.id)
        .join("task.log");

    // Wait for the first output to land, then snapshot mid-run.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    let mid = loop {
        if let Ok(content) = std::fs::read_to_string(&log_path) {
            if content.contains("first line") {
                break content;
            }
        }
        assert!(tokio::time::Instant::now() < deadline, "no early output");
        tokio::time::sleep(Duration::from_millis(25)).await;
    };

    let finished = wait_for_terminal(&engine, &record.id).await;
    assert_eq!(finished.status, TaskStatus::Completed);

    let full = std::fs::read_to_string(&log_path).unwrap();
    assert!(full.starts_with(&mid));
    assert!(full.contains("second line"));
}
