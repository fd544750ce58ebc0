//! Adapter-owned resource configuration.
//!
//! The orchestrator carries a [`ResourceConfig`] around without reading it;
//! only adapters interpret these fields.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// How to verify a long-running service is usable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HealthCheck {
    /// HTTP GET to a URL, expect 2xx.
    Http { url: String },
    /// Check that a TCP port is accepting connections.
    TcpPort {
        #[serde(default = "default_host")]
        host: String,
        port: u16,
    },
    /// Run a command and check exit code 0.
    Command { command: String },
    /// Ready as soon as the process is up.
    #[default]
    None,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

/// Launch configuration for one resource.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ResourceConfig {
    /// Program to run. Empty for a service that is started elsewhere and only
    /// health-checked.
    pub command: String,
    /// Command-line arguments.
    pub args: Vec<String>,
    /// Working directory; the current directory when unset.
    pub working_dir: Option<PathBuf>,
    /// Extra environment variables. These win over values from dependencies.
    pub env: BTreeMap<String, String>,
    /// Readiness check for long-running services.
    pub health: HealthCheck,
    /// Values published to dependents once the resource is Ready
    /// (e.g. a connection string).
    pub exports: BTreeMap<String, String>,
}

impl ResourceConfig {
    pub fn command(program: impl Into<String>) -> Self {
        Self {
            command: program.into(),
            ..Self::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn health(mut self, health: HealthCheck) -> Self {
        self.health = health;
        self
    }

    pub fn export(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.exports.insert(key.into(), value.into());
        self
    }

    /// Command line for log messages.
    pub fn display_command(&self) -> String {
        std::iter::once(self.command.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}
