//! Long-running service adapter: run a command and health-check it.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{DevhostError, Result};
use crate::orchestrator::probe::ProbeResult;
use crate::resource::ResourceSpec;

use super::process::{self, ManagedProcess};
use super::{Adapter, Handle, HealthCheck, LaunchContext};

const CHECK_TIMEOUT: Duration = Duration::from_secs(2);

/// Per-handle state. `process` is `None` for services started elsewhere.
#[derive(Debug)]
struct ServiceState {
    process: Option<ManagedProcess>,
    health: HealthCheck,
}

/// Runs `config.command` in the background and polls `config.health`.
#[derive(Debug, Clone)]
pub struct ServiceAdapter {
    client: reqwest::Client,
}

impl ServiceAdapter {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(CHECK_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client }
    }

    /// One health observation; `Ok(false)` means not yet.
    async fn check(&self, health: &HealthCheck) -> Result<bool> {
        match health {
            HealthCheck::None => Ok(true),
            HealthCheck::TcpPort { host, port } => {
                let addr = format!("{}:{}", host, port);
                let connect = tokio::net::TcpStream::connect(&addr);
                Ok(matches!(
                    tokio::time::timeout(CHECK_TIMEOUT, connect).await,
                    Ok(Ok(_))
                ))
            }
            HealthCheck::Http { url } => match self.client.get(url).send().await {
                Ok(resp) => Ok(resp.status().is_success()),
                Err(e) => {
                    debug!("Health check GET {} failed: {}", url, e);
                    Ok(false)
                }
            },
            HealthCheck::Command { command } => {
                let parts: Vec<&str> = command.split_whitespace().collect();
                let Some((program, args)) = parts.split_first() else {
                    return Err(DevhostError::Launch(
                        "Empty health check command".to_string(),
                    ));
                };
                let output = tokio::process::Command::new(program)
                    .args(args)
                    .output()
                    .await;
                Ok(matches!(output, Ok(out) if out.status.success()))
            }
        }
    }
}

impl Default for ServiceAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Adapter for ServiceAdapter {
    fn name(&self) -> &str {
        "service"
    }

    async fn launch(&self, spec: &ResourceSpec, ctx: &LaunchContext) -> Result<Handle> {
        let process = if spec.config.command.trim().is_empty() {
            info!(resource = %spec.id, "No command configured; health-checking external service");
            None
        } else {
            Some(process::spawn(spec, ctx)?)
        };

        let pid = process.as_ref().and_then(|p| p.pid);
        Ok(Handle::new(spec.id.clone())
            .with_pid(pid)
            .with_exports(spec.config.exports.clone())
            .with_state(ServiceState {
                process,
                health: spec.config.health.clone(),
            }))
    }

    async fn probe(&self, handle: &mut Handle) -> ProbeResult {
        let Some(state) = handle.state_mut::<ServiceState>() else {
            return ProbeResult::failed("service handle has no state");
        };

        if let Some(process) = state.process.as_mut() {
            match process.try_exit() {
                Ok(Some(exit)) => return ProbeResult::Completed(exit),
                Ok(None) => {}
                Err(e) => return ProbeResult::failed(format!("failed to poll process: {}", e)),
            }
        }

        let health = state.health.clone();
        match self.check(&health).await {
            Ok(true) => ProbeResult::Ready,
            Ok(false) => ProbeResult::Pending,
            Err(e) => ProbeResult::failed(e.to_string()),
        }
    }

    async fn stop(&self, handle: &mut Handle) -> Result<()> {
        match handle
            .state_mut::<ServiceState>()
            .and_then(|s| s.process.as_mut())
        {
            Some(process) => process.kill().await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ResourceConfig;
    use crate::resource::ResourceKind;

    fn service(config: ResourceConfig) -> ResourceSpec {
        ResourceSpec::new("svc", ResourceKind::LongRunningService).with_config(config)
    }

    #[tokio::test]
    async fn test_running_process_without_health_is_ready() {
        let adapter = ServiceAdapter::new();
        let mut handle = adapter
            .launch(
                &service(ResourceConfig::command("sleep").arg("30")),
                &LaunchContext::default(),
            )
            .await
            .unwrap();
        assert_eq!(adapter.probe(&mut handle).await, ProbeResult::Ready);
        adapter.stop(&mut handle).await.unwrap();
    }

    #[tokio::test]
    async fn test_tcp_health_check() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let adapter = ServiceAdapter::new();
        let cfg = ResourceConfig::default().health(HealthCheck::TcpPort {
            host: "127.0.0.1".into(),
            port,
        });
        let mut handle = adapter
            .launch(&service(cfg), &LaunchContext::default())
            .await
            .unwrap();
        assert!(handle.pid.is_none());
        assert_eq!(adapter.probe(&mut handle).await, ProbeResult::Ready);

        drop(listener);
        assert_eq!(adapter.probe(&mut handle).await, ProbeResult::Pending);
    }

    #[tokio::test]
    async fn test_http_health_check_unreachable_is_pending() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let adapter = ServiceAdapter::new();
        let cfg = ResourceConfig::default().health(HealthCheck::Http {
            url: format!("http://127.0.0.1:{}/ready", port),
        });
        let mut handle = adapter
            .launch(&service(cfg), &LaunchContext::default())
            .await
            .unwrap();
        assert_eq!(adapter.probe(&mut handle).await, ProbeResult::Pending);
    }

    #[tokio::test]
    async fn test_command_health_check() {
        let adapter = ServiceAdapter::new();
        let ok = ResourceConfig::default().health(HealthCheck::Command {
            command: "true".into(),
        });
        let mut handle = adapter
            .launch(&service(ok), &LaunchContext::default())
            .await
            .unwrap();
        assert_eq!(adapter.probe(&mut handle).await, ProbeResult::Ready);

        let not_yet = ResourceConfig::default().health(HealthCheck::Command {
            command: "false".into(),
        });
        let mut handle = adapter
            .launch(&service(not_yet), &LaunchContext::default())
            .await
            .unwrap();
        assert_eq!(adapter.probe(&mut handle).await, ProbeResult::Pending);
    }

    #[tokio::test]
    async fn test_exited_process_reports_completion() {
        let adapter = ServiceAdapter::new();
        let cfg = ResourceConfig::command("sh").arg("-c").arg("exit 4");
        let mut handle = adapter
            .launch(&service(cfg), &LaunchContext::default())
            .await
            .unwrap();
        let mut result = ProbeResult::Pending;
        for _ in 0..200 {
            result = adapter.probe(&mut handle).await;
            if matches!(result, ProbeResult::Completed(_)) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(matches!(result, ProbeResult::Completed(exit) if exit.code == Some(4)));
    }

    #[tokio::test]
    async fn test_empty_health_command_fails() {
        let adapter = ServiceAdapter::new();
        let cfg = ResourceConfig::default().health(HealthCheck::Command {
            command: "  ".into(),
        });
        let mut handle = adapter
            .launch(&service(cfg), &LaunchContext::default())
            .await
            .unwrap();
        assert!(matches!(
            adapter.probe(&mut handle).await,
            ProbeResult::Failed { .. }
        ));
    }
}
