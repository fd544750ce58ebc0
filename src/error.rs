//! Error types for devhost
//!
//! Two layers live here:
//! - [`DevhostError`] for failures returned through `Result` (structural
//!   declaration errors, config problems, I/O).
//! - [`FailureReason`] for resource-local failures. These never propagate as
//!   errors; they are recorded on the state board and surfaced in the
//!   session result.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::resource::{ExitInfo, ResourceId, ResourceKind, ResourceState};

// ============================================================================
// Resource Failure Classification
// ============================================================================

/// Why a resource did not reach a successful state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The adapter could not start the resource.
    LaunchError(String),
    /// The readiness probe never reached Ready or a terminal result in time.
    ReadinessTimeout { after: Duration },
    /// The resource itself signalled failure through its probe.
    ProbeFailed(String),
    /// A one-shot job exited unsuccessfully.
    Exited(ExitInfo),
    /// A long-running service exited on its own.
    UnexpectedExit,
    /// The resource cannot start because these dependencies failed.
    BlockedDependency { failed: Vec<ResourceId> },
    /// The session was cancelled before the resource settled.
    Cancelled,
    /// No adapter is registered for the resource kind.
    NoAdapter(ResourceKind),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::LaunchError(msg) => write!(f, "launch error: {}", msg),
            FailureReason::ReadinessTimeout { after } => {
                write!(f, "readiness timeout after {:?}", after)
            }
            FailureReason::ProbeFailed(msg) => write!(f, "probe failed: {}", msg),
            FailureReason::Exited(exit) => match exit.code {
                Some(code) => write!(f, "exited with code {}", code),
                None => write!(f, "exited without a code"),
            },
            FailureReason::UnexpectedExit => write!(f, "service exited unexpectedly"),
            FailureReason::BlockedDependency { failed } => {
                let names: Vec<&str> = failed.iter().map(|id| id.as_str()).collect();
                write!(f, "blocked by failed dependency: {}", names.join(", "))
            }
            FailureReason::Cancelled => write!(f, "cancelled"),
            FailureReason::NoAdapter(kind) => write!(f, "no adapter registered for {}", kind),
        }
    }
}

impl FailureReason {
    /// Returns `true` when the failure originates in the resource itself rather
    /// than in its dependencies or the session.
    pub fn is_resource_local(&self) -> bool {
        !matches!(
            self,
            FailureReason::BlockedDependency { .. } | FailureReason::Cancelled
        )
    }
}

// ============================================================================
// Primary Error Type
// ============================================================================

/// The primary error type for devhost operations.
#[derive(Error, Debug)]
pub enum DevhostError {
    /// The dependency relation contains a cycle (self-loops included).
    #[error("Dependency cycle: {}", format_path(.path))]
    Cycle { path: Vec<ResourceId> },

    /// A resource id was registered twice.
    #[error("Duplicate resource id: {0}")]
    DuplicateId(ResourceId),

    /// A resource depends on an id that was never declared.
    #[error("Resource '{resource}' depends on unknown resource '{dependency}'")]
    UnknownDependency {
        resource: ResourceId,
        dependency: ResourceId,
    },

    /// A lifecycle transition that the state machine does not allow.
    #[error("Invalid transition for '{resource}': {from} -> {to}")]
    InvalidTransition {
        resource: ResourceId,
        from: ResourceState,
        to: ResourceState,
    },

    /// An adapter failed to start a resource.
    #[error("Launch error: {0}")]
    Launch(String),

    /// Configuration-related errors (invalid config, missing required fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Seed loader errors that abort the whole load (unreadable input, etc.)
    #[error("Seed error: {0}")]
    Seed(String),

    /// Resource not found on the board or in the registry
    #[error("Not found: {0}")]
    NotFound(String),

    /// Standard I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML deserialization errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl DevhostError {
    /// Structural errors abort a session before any resource is started.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            DevhostError::Cycle { .. }
                | DevhostError::DuplicateId(_)
                | DevhostError::UnknownDependency { .. }
        )
    }
}

fn format_path(path: &[ResourceId]) -> String {
    path.iter()
        .map(|id| id.as_str())
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// A specialized `Result` type for devhost operations.
pub type Result<T> = std::result::Result<T, DevhostError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_display() {
        let err = DevhostError::Cycle {
            path: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "Dependency cycle: a -> b -> a");
        assert!(err.is_structural());
    }

    #[test]
    fn test_unknown_dependency_display() {
        let err = DevhostError::UnknownDependency {
            resource: "seed".into(),
            dependency: "cosmos".into(),
        };
        assert_eq!(
            err.to_string(),
            "Resource 'seed' depends on unknown resource 'cosmos'"
        );
    }

    #[test]
    fn test_invalid_transition_display() {
        let err = DevhostError::InvalidTransition {
            resource: "build".into(),
            from: ResourceState::Completed,
            to: ResourceState::Starting,
        };
        assert_eq!(
            err.to_string(),
            "Invalid transition for 'build': completed -> starting"
        );
        assert!(!err.is_structural());
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: DevhostError = io_err.into();
        assert!(matches!(err, DevhostError::Io(_)));
    }

    #[test]
    fn test_failure_reason_display() {
        assert_eq!(
            FailureReason::ReadinessTimeout {
                after: Duration::from_secs(5)
            }
            .to_string(),
            "readiness timeout after 5s"
        );
        assert_eq!(
            FailureReason::BlockedDependency {
                failed: vec!["cosmos".into()]
            }
            .to_string(),
            "blocked by failed dependency: cosmos"
        );
        assert_eq!(
            FailureReason::Exited(ExitInfo::failure(Some(3))).to_string(),
            "exited with code 3"
        );
        assert_eq!(
            FailureReason::NoAdapter(ResourceKind::OneShotJob).to_string(),
            "no adapter registered for one-shot-job"
        );
    }

    #[test]
    fn test_failure_reason_locality() {
        assert!(FailureReason::LaunchError("boom".into()).is_resource_local());
        assert!(FailureReason::ReadinessTimeout {
            after: Duration::from_secs(1)
        }
        .is_resource_local());
        assert!(!FailureReason::Cancelled.is_resource_local());
        assert!(!FailureReason::BlockedDependency { failed: vec![] }.is_resource_local());
    }
}
