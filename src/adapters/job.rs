//! One-shot job adapter: run a command to completion.

use async_trait::async_trait;
use tracing::warn;

use crate::error::Result;
use crate::orchestrator::probe::ProbeResult;
use crate::resource::ResourceSpec;

use super::process::{self, ManagedProcess};
use super::{Adapter, Handle, LaunchContext};

/// Runs `config.command` and reports Completed when it exits 0.
#[derive(Debug, Default)]
pub struct JobAdapter;

impl JobAdapter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Adapter for JobAdapter {
    fn name(&self) -> &str {
        "job"
    }

    async fn launch(&self, spec: &ResourceSpec, ctx: &LaunchContext) -> Result<Handle> {
        let process = process::spawn(spec, ctx)?;
        Ok(Handle::new(spec.id.clone())
            .with_pid(process.pid)
            .with_exports(spec.config.exports.clone())
            .with_state(process))
    }

    async fn probe(&self, handle: &mut Handle) -> ProbeResult {
        let Some(process) = handle.state_mut::<ManagedProcess>() else {
            return ProbeResult::failed("job handle has no process");
        };
        match process.try_exit() {
            Ok(Some(exit)) => ProbeResult::Completed(exit),
            Ok(None) => ProbeResult::Pending,
            Err(e) => ProbeResult::failed(format!("failed to poll process: {}", e)),
        }
    }

    async fn stop(&self, handle: &mut Handle) -> Result<()> {
        match handle.state_mut::<ManagedProcess>() {
            Some(process) => process.kill().await,
            None => {
                warn!(resource = %handle.resource, "Stop requested for job without process");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ResourceConfig;
    use crate::resource::{ExitInfo, ResourceKind};
    use std::time::Duration;

    async fn probe_until_done(adapter: &JobAdapter, handle: &mut Handle) -> ProbeResult {
        for _ in 0..200 {
            match adapter.probe(handle).await {
                ProbeResult::Pending => tokio::time::sleep(Duration::from_millis(10)).await,
                other => return other,
            }
        }
        panic!("job did not finish");
    }

    fn job(cmd: &str) -> ResourceSpec {
        ResourceSpec::new("build", ResourceKind::OneShotJob)
            .with_config(ResourceConfig::command("sh").arg("-c").arg(cmd))
    }

    #[tokio::test]
    async fn test_job_completes_successfully() {
        let adapter = JobAdapter::new();
        let mut handle = adapter
            .launch(&job("true"), &LaunchContext::default())
            .await
            .unwrap();
        assert!(handle.pid.is_some());
        assert_eq!(
            probe_until_done(&adapter, &mut handle).await,
            ProbeResult::Completed(ExitInfo::success(Some(0)))
        );
    }

    #[tokio::test]
    async fn test_job_nonzero_exit() {
        let adapter = JobAdapter::new();
        let mut handle = adapter
            .launch(&job("exit 1"), &LaunchContext::default())
            .await
            .unwrap();
        assert_eq!(
            probe_until_done(&adapter, &mut handle).await,
            ProbeResult::Completed(ExitInfo::failure(Some(1)))
        );
    }

    #[tokio::test]
    async fn test_job_stop_after_exit_is_ok() {
        let adapter = JobAdapter::new();
        let mut handle = adapter
            .launch(&job("true"), &LaunchContext::default())
            .await
            .unwrap();
        probe_until_done(&adapter, &mut handle).await;
        adapter.stop(&mut handle).await.unwrap();
    }

    #[tokio::test]
    async fn test_probe_without_process_fails() {
        let adapter = JobAdapter::new();
        let mut handle = Handle::new("orphan".into());
        assert!(matches!(
            adapter.probe(&mut handle).await,
            ProbeResult::Failed { .. }
        ));
    }
}
