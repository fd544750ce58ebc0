//! Configuration types for devhost.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::adapters::HealthCheck;
use crate::orchestrator::{Backoff, ProbePolicy};
use crate::resource::ResourceKind;

// ============================================================================
// Main Configuration
// ============================================================================

/// Main configuration structure, usually read from `devhost.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging output
    pub logging: LoggingConfig,
    /// Orchestrator defaults
    pub orchestrator: OrchestratorConfig,
    /// Declared resources, in declaration order
    pub resources: Vec<ResourceDecl>,
    /// Directory of the file this was loaded from; relative paths resolve
    /// against it.
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

// ============================================================================
// Logging Configuration
// ============================================================================

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line, human-readable.
    Pretty,
    /// Compact single-line with a `component` field.
    #[default]
    Component,
    /// JSON lines.
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "component" => Ok(LogFormat::Component),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
    /// Append logs to this file instead of stderr.
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Component,
            level: "info".to_string(),
            file: None,
        }
    }
}

// ============================================================================
// Orchestrator Configuration
// ============================================================================

/// Session-wide orchestrator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Default readiness probe policy.
    pub probe: ProbeConfig,
    /// Where process output is captured, one `<id>.log` per resource.
    /// An empty path disables capture.
    pub logs_dir: PathBuf,
    /// Upper bound for stopping one service during shutdown.
    pub stop_timeout_secs: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            probe: ProbeConfig::default(),
            logs_dir: PathBuf::from(".devhost/logs"),
            stop_timeout_secs: 10,
        }
    }
}

/// Backoff strategy name as written in config.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    Fixed,
    #[default]
    Exponential,
}

/// Readiness probe settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// First delay between polls.
    pub interval_ms: u64,
    /// Delay cap for exponential backoff.
    pub max_interval_ms: u64,
    pub backoff: BackoffKind,
    /// Growth factor for exponential backoff.
    pub factor: f64,
    /// Give up and mark the resource Failed after this long.
    pub timeout_secs: u64,
}

/// Upper bound for `timeout_secs` (one year).
pub const MAX_PROBE_TIMEOUT_SECS: u64 = 365 * 24 * 60 * 60;

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            interval_ms: 250,
            max_interval_ms: 2000,
            backoff: BackoffKind::Exponential,
            factor: 2.0,
            timeout_secs: 120,
        }
    }
}

impl ProbeConfig {
    pub fn to_policy(&self) -> ProbePolicy {
        let interval = Duration::from_millis(self.interval_ms.max(1));
        ProbePolicy {
            interval,
            max_interval: Duration::from_millis(self.max_interval_ms).max(interval),
            backoff: match self.backoff {
                BackoffKind::Fixed => Backoff::Fixed,
                BackoffKind::Exponential => Backoff::Exponential {
                    factor: self.factor.max(1.0),
                },
            },
            timeout: Duration::from_secs(self.timeout_secs.min(MAX_PROBE_TIMEOUT_SECS)),
        }
    }
}

/// Per-resource probe override. Unset fields fall back to
/// `orchestrator.probe`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeOverride {
    pub interval_ms: Option<u64>,
    pub max_interval_ms: Option<u64>,
    pub backoff: Option<BackoffKind>,
    pub factor: Option<f64>,
    pub timeout_secs: Option<u64>,
}

impl ProbeOverride {
    pub fn apply(&self, base: &ProbeConfig) -> ProbeConfig {
        ProbeConfig {
            interval_ms: self.interval_ms.unwrap_or(base.interval_ms),
            max_interval_ms: self.max_interval_ms.unwrap_or(base.max_interval_ms),
            backoff: self.backoff.unwrap_or(base.backoff),
            factor: self.factor.unwrap_or(base.factor),
            timeout_secs: self.timeout_secs.unwrap_or(base.timeout_secs),
        }
    }
}

// ============================================================================
// Resource Declarations
// ============================================================================

/// One `[[resources]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDecl {
    pub id: String,
    pub kind: ResourceKind,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub health: HealthCheck,
    #[serde(default)]
    pub exports: BTreeMap<String, String>,
    #[serde(default)]
    pub probe: Option<ProbeOverride>,
    /// The session still succeeds if this resource fails.
    #[serde(default)]
    pub allow_failure: bool,
}

impl ResourceDecl {
    pub fn new(id: impl Into<String>, kind: ResourceKind) -> Self {
        Self {
            id: id.into(),
            kind,
            depends_on: Vec::new(),
            command: String::new(),
            args: Vec::new(),
            working_dir: None,
            env: BTreeMap::new(),
            health: HealthCheck::None,
            exports: BTreeMap::new(),
            probe: None,
            allow_failure: false,
        }
    }
}
