//! End-to-end sessions with the process adapters and real child processes.
//!
//! Unix-only: the commands are `sh`, `sleep` and the devhost binary itself.
#![cfg(unix)]

use std::time::Duration;

use devhost::adapters::{AdapterSet, HealthCheck, ResourceConfig};
use devhost::error::FailureReason;
use devhost::orchestrator::{ProbePolicy, Session, SessionOptions};
use devhost::resource::{ExitInfo, ResourceKind, ResourceRegistry, ResourceSpec, ResourceState};

fn options(logs_dir: &std::path::Path) -> SessionOptions {
    SessionOptions {
        probe: ProbePolicy::fixed(Duration::from_millis(20), Duration::from_secs(10)),
        logs_dir: Some(logs_dir.to_path_buf()),
        stop_timeout: Duration::from_secs(2),
    }
}

fn sh(script: &str) -> ResourceConfig {
    ResourceConfig::command("sh").arg("-c").arg(script)
}

#[tokio::test]
async fn test_service_exports_reach_dependent_job() {
    let dir = tempfile::tempdir().unwrap();
    let registry = ResourceRegistry::from_specs([
        ResourceSpec::new("db", ResourceKind::LongRunningService).with_config(
            ResourceConfig::command("sleep")
                .arg("30")
                .export("url", "postgres://localhost:5432/dev"),
        ),
        ResourceSpec::new("migrate", ResourceKind::OneShotJob)
            .depends_on(["db"])
            .with_config(sh(r#"test "$DB_URL" = "postgres://localhost:5432/dev""#)),
    ])
    .unwrap();
    let mut session =
        Session::new(registry, AdapterSet::processes(), options(dir.path())).unwrap();

    let result = session.run().await;
    assert!(result.is_success(), "{}", result.summary());
    assert_eq!(result.get("db").unwrap().state, ResourceState::Ready);
    assert_eq!(result.get("migrate").unwrap().state, ResourceState::Completed);

    assert_eq!(session.shutdown().await.len(), 1);
    assert_eq!(
        session.result().get("db").unwrap().state,
        ResourceState::Stopped
    );
}

#[tokio::test]
async fn test_failing_job_blocks_dependents() {
    let dir = tempfile::tempdir().unwrap();
    let registry = ResourceRegistry::from_specs([
        ResourceSpec::new("build", ResourceKind::OneShotJob).with_config(sh("echo building; exit 4")),
        ResourceSpec::new("deploy", ResourceKind::OneShotJob)
            .depends_on(["build"])
            .with_config(sh("exit 0")),
    ])
    .unwrap();
    let mut session =
        Session::new(registry, AdapterSet::processes(), options(dir.path())).unwrap();

    let result = session.run().await;
    let build = result.get("build").unwrap();
    assert_eq!(
        build.reason,
        Some(FailureReason::Exited(ExitInfo::failure(Some(4))))
    );
    assert!(result.get("deploy").unwrap().is_blocked());

    let log = std::fs::read_to_string(dir.path().join("build.log")).unwrap();
    assert!(log.contains("building"));
}

#[tokio::test]
async fn test_service_that_exits_is_unexpected() {
    let dir = tempfile::tempdir().unwrap();
    let registry = ResourceRegistry::from_specs([ResourceSpec::new(
        "api",
        ResourceKind::LongRunningService,
    )
    .with_config(sh("exit 1").health(HealthCheck::TcpPort {
        host: "127.0.0.1".into(),
        port: 1,
    }))])
    .unwrap();
    let mut session =
        Session::new(registry, AdapterSet::processes(), options(dir.path())).unwrap();

    let result = session.run().await;
    let api = result.get("api").unwrap();
    assert_eq!(api.state, ResourceState::Failed);
    assert_eq!(api.reason, Some(FailureReason::UnexpectedExit));
}

#[tokio::test]
async fn test_missing_program_is_launch_error() {
    let dir = tempfile::tempdir().unwrap();
    let registry = ResourceRegistry::from_specs([ResourceSpec::new(
        "tool",
        ResourceKind::OneShotJob,
    )
    .with_config(ResourceConfig::command("devhost-test-no-such-program"))])
    .unwrap();
    let mut session =
        Session::new(registry, AdapterSet::processes(), options(dir.path())).unwrap();

    let result = session.run().await;
    assert!(matches!(
        result.get("tool").unwrap().reason,
        Some(FailureReason::LaunchError(_))
    ));
}

/// A seed job with one bad record still exits 0, so the job completes.
#[tokio::test]
async fn test_seed_job_with_bad_record_completes() {
    let dir = tempfile::tempdir().unwrap();
    let records = dir.path().join("stores.json");
    std::fs::write(
        &records,
        r#"[
            {"id": "store-001", "name": "Downtown"},
            {"id": "store-002", "name": "Harbor"},
            {"name": "No id"},
            {"id": "store-004", "name": "Airport"},
            {"id": "store-005", "name": "Mall"}
        ]"#,
    )
    .unwrap();

    let seed = ResourceConfig::command(env!("CARGO_BIN_EXE_devhost"))
        .arg("seed")
        .arg("--dry-run")
        .arg("--records")
        .arg(records.to_string_lossy())
        .env("RUST_LOG", "error");
    let registry = ResourceRegistry::from_specs([
        ResourceSpec::new("store", ResourceKind::LongRunningService)
            .with_config(ResourceConfig::command("sleep").arg("30")),
        ResourceSpec::new("seed-database", ResourceKind::OneShotJob)
            .depends_on(["store"])
            .with_config(seed),
    ])
    .unwrap();
    let mut session =
        Session::new(registry, AdapterSet::processes(), options(dir.path())).unwrap();

    let result = session.run().await;
    assert!(result.is_success(), "{}", result.summary());
    assert_eq!(
        result.get("seed-database").unwrap().state,
        ResourceState::Completed
    );
    session.shutdown().await;

    let log = std::fs::read_to_string(dir.path().join("seed-database.log")).unwrap();
    assert!(log.contains("4 of 5 records seeded, 1 failed"), "{}", log);
}
