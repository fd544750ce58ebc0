//! Child process management shared by the process-backed adapters.

use std::fs;
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::{debug, info};

use crate::error::{DevhostError, Result};
use crate::resource::{ExitInfo, ResourceSpec};

use super::LaunchContext;

/// A spawned child process.
#[derive(Debug)]
pub struct ManagedProcess {
    pub name: String,
    pub pid: Option<u32>,
    child: Child,
}

impl ManagedProcess {
    /// Exit info if the process has finished, `None` while it runs.
    pub fn try_exit(&mut self) -> Result<Option<ExitInfo>> {
        Ok(self.child.try_wait()?.map(ExitInfo::from_status))
    }

    /// Kill the process if it is still running.
    pub async fn kill(&mut self) -> Result<()> {
        if self.try_exit()?.is_some() {
            debug!("Process for '{}' already exited", self.name);
            return Ok(());
        }
        self.child
            .kill()
            .await
            .map_err(|e| DevhostError::Launch(format!("Failed to kill '{}': {}", self.name, e)))
    }
}

/// Build the command for a resource. Dependency values go in first so the
/// resource's own `env` can override them.
pub fn build_command(spec: &ResourceSpec, ctx: &LaunchContext) -> Result<Command> {
    let config = &spec.config;
    if config.command.trim().is_empty() {
        return Err(DevhostError::Launch(format!(
            "Resource '{}' has no command",
            spec.id
        )));
    }

    let mut cmd = Command::new(&config.command);
    cmd.args(&config.args);
    if let Some(dir) = &config.working_dir {
        cmd.current_dir(dir);
    }
    cmd.envs(&ctx.env);
    cmd.envs(&config.env);
    cmd.stdin(Stdio::null());
    cmd.kill_on_drop(true);
    Ok(cmd)
}

/// Spawn the resource's command, capturing output to `<logs_dir>/<id>.log`.
pub fn spawn(spec: &ResourceSpec, ctx: &LaunchContext) -> Result<ManagedProcess> {
    let mut cmd = build_command(spec, ctx)?;

    match &ctx.logs_dir {
        Some(logs_dir) => {
            fs::create_dir_all(logs_dir)?;
            let log_path = logs_dir.join(format!("{}.log", spec.id));
            let log_file = fs::File::create(&log_path)?;
            let log_file_err = log_file.try_clone()?;
            cmd.stdout(Stdio::from(log_file));
            cmd.stderr(Stdio::from(log_file_err));
        }
        None => {
            cmd.stdout(Stdio::null());
            cmd.stderr(Stdio::null());
        }
    }

    let child = cmd.spawn().map_err(|e| {
        DevhostError::Launch(format!(
            "Failed to start '{}' ({}): {}",
            spec.id,
            spec.config.display_command(),
            e
        ))
    })?;

    let pid = child.id();
    info!(resource = %spec.id, pid = ?pid, command = %spec.config.display_command(), "Spawned process");

    Ok(ManagedProcess {
        name: spec.id.to_string(),
        pid,
        child,
    })
}
