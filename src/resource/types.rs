//! Resource core types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::adapters::ResourceConfig;
use crate::orchestrator::probe::ProbePolicy;

/// Stable, unique identifier of a resource within a session.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Environment variable prefix for values exported by this resource
    /// (`cosmos-db` becomes `COSMOS_DB`).
    pub fn env_prefix(&self) -> String {
        self.0
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect()
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ResourceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// What kind of resource this is. Selects the adapter that launches it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    /// Persists after startup and is expected to stay Ready (e.g. a database emulator).
    LongRunningService,
    /// Runs to completion exactly once and never restarts (e.g. a build step).
    OneShotJob,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::LongRunningService => "long-running-service",
            ResourceKind::OneShotJob => "one-shot-job",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceState {
    Pending,
    Starting,
    Running,
    Ready,
    Completed,
    Failed,
    Stopped,
}

impl ResourceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceState::Pending => "pending",
            ResourceState::Starting => "starting",
            ResourceState::Running => "running",
            ResourceState::Ready => "ready",
            ResourceState::Completed => "completed",
            ResourceState::Failed => "failed",
            ResourceState::Stopped => "stopped",
        }
    }

    /// No transition leaves a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ResourceState::Completed | ResourceState::Failed | ResourceState::Stopped
        )
    }

    /// Whether dependents may start. A service satisfies them once Ready, a
    /// one-shot job once Completed.
    pub fn satisfies_dependents(&self) -> bool {
        matches!(self, ResourceState::Ready | ResourceState::Completed)
    }

    /// Whether dependents can never start because of this state.
    pub fn blocks_dependents(&self) -> bool {
        matches!(self, ResourceState::Failed | ResourceState::Stopped)
    }
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exit information recorded for a one-shot job once it finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitInfo {
    pub success: bool,
    pub code: Option<i32>,
}

impl ExitInfo {
    pub fn success(code: Option<i32>) -> Self {
        Self {
            success: true,
            code,
        }
    }

    pub fn failure(code: Option<i32>) -> Self {
        Self {
            success: false,
            code,
        }
    }

    pub fn from_status(status: std::process::ExitStatus) -> Self {
        Self {
            success: status.success(),
            code: status.code(),
        }
    }
}

/// Static declaration of a resource.
#[derive(Debug, Clone)]
pub struct ResourceSpec {
    /// Unique id within the registry.
    pub id: ResourceId,
    /// Selects the adapter.
    pub kind: ResourceKind,
    /// Ids this resource waits on before starting.
    pub dependencies: BTreeSet<ResourceId>,
    /// Adapter-owned launch configuration. The orchestrator never reads it.
    pub config: ResourceConfig,
    /// Readiness probe override; the session default applies when `None`.
    pub probe: Option<ProbePolicy>,
    /// A failure of this resource does not make the session unsuccessful.
    pub allow_failure: bool,
}

impl ResourceSpec {
    pub fn new(id: impl Into<ResourceId>, kind: ResourceKind) -> Self {
        Self {
            id: id.into(),
            kind,
            dependencies: BTreeSet::new(),
            config: ResourceConfig::default(),
            probe: None,
            allow_failure: false,
        }
    }

    pub fn depends_on<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ResourceId>,
    {
        self.dependencies.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn with_config(mut self, config: ResourceConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_probe(mut self, probe: ProbePolicy) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn allow_failure(mut self, allow: bool) -> Self {
        self.allow_failure = allow;
        self
    }
}
