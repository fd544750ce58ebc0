//! Readiness probing.
//!
//! [`drive_probe`] polls an adapter's `probe` until the resource is Ready,
//! finished, failed, out of time, or cancelled. Polls are spaced by the
//! policy's backoff and never busy-wait.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::adapters::{Adapter, Handle};
use crate::error::FailureReason;
use crate::resource::{ExitInfo, ResourceKind};

use super::cancel::Cancellation;

/// One observation from an adapter probe.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeResult {
    /// Not usable yet; poll again.
    Pending,
    /// Usable by dependents.
    Ready,
    /// The process ran to completion.
    Completed(ExitInfo),
    /// The resource signalled failure.
    Failed {
        reason: String,
        exit: Option<ExitInfo>,
    },
}

impl ProbeResult {
    pub fn failed(reason: impl Into<String>) -> Self {
        ProbeResult::Failed {
            reason: reason.into(),
            exit: None,
        }
    }
}

/// Spacing between polls.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Backoff {
    Fixed,
    Exponential { factor: f64 },
}

/// Poll spacing and the overall readiness bound.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbePolicy {
    pub interval: Duration,
    pub max_interval: Duration,
    pub backoff: Backoff,
    pub timeout: Duration,
}

impl Default for ProbePolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(250),
            max_interval: Duration::from_secs(2),
            backoff: Backoff::Exponential { factor: 2.0 },
            timeout: Duration::from_secs(120),
        }
    }
}

impl ProbePolicy {
    pub fn fixed(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            max_interval: interval,
            backoff: Backoff::Fixed,
            timeout,
        }
    }

    /// Delay after the `attempt`-th poll (zero-based), capped at `max_interval`.
    pub fn delay(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.interval,
            Backoff::Exponential { factor } => {
                let exp = i32::try_from(attempt).unwrap_or(i32::MAX);
                let secs = self.interval.as_secs_f64() * factor.powi(exp);
                let cap = self.max_interval.max(self.interval).as_secs_f64();
                Duration::from_secs_f64(secs.clamp(0.0, cap))
            }
        }
    }
}

/// Final result of driving a probe.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome {
    Ready,
    Completed(ExitInfo),
    Failed {
        reason: FailureReason,
        exit: Option<ExitInfo>,
    },
}

impl ProbeOutcome {
    pub(crate) fn failed(reason: FailureReason) -> Self {
        ProbeOutcome::Failed { reason, exit: None }
    }
}

/// Map one observation to a final outcome, or `None` to keep polling.
pub(crate) fn interpret(kind: ResourceKind, result: ProbeResult) -> Option<ProbeOutcome> {
    match (kind, result) {
        (_, ProbeResult::Pending) => None,
        // A job is done when it exits, not when it answers.
        (ResourceKind::OneShotJob, ProbeResult::Ready) => None,
        (ResourceKind::LongRunningService, ProbeResult::Ready) => Some(ProbeOutcome::Ready),
        (ResourceKind::OneShotJob, ProbeResult::Completed(exit)) if exit.success => {
            Some(ProbeOutcome::Completed(exit))
        }
        (ResourceKind::OneShotJob, ProbeResult::Completed(exit)) => Some(ProbeOutcome::Failed {
            reason: FailureReason::Exited(exit),
            exit: Some(exit),
        }),
        (ResourceKind::LongRunningService, ProbeResult::Completed(exit)) => {
            Some(ProbeOutcome::Failed {
                reason: FailureReason::UnexpectedExit,
                exit: Some(exit),
            })
        }
        (ResourceKind::OneShotJob, ProbeResult::Failed { exit: Some(exit), .. }) => {
            Some(ProbeOutcome::Failed {
                reason: FailureReason::Exited(exit),
                exit: Some(exit),
            })
        }
        (ResourceKind::LongRunningService, ProbeResult::Failed { exit: Some(exit), .. }) => {
            Some(ProbeOutcome::Failed {
                reason: FailureReason::UnexpectedExit,
                exit: Some(exit),
            })
        }
        (_, ProbeResult::Failed { reason, exit: None }) => {
            Some(ProbeOutcome::failed(FailureReason::ProbeFailed(reason)))
        }
    }
}

/// Poll `adapter` for `handle` until a final outcome.
///
/// Exhausting `policy.timeout` yields `ReadinessTimeout`; cancellation yields
/// `Cancelled`. Both are distinct from a failure the resource reports itself.
pub async fn drive_probe(
    adapter: &dyn Adapter,
    kind: ResourceKind,
    handle: &mut Handle,
    policy: &ProbePolicy,
    cancel: &Cancellation,
) -> ProbeOutcome {
    // A timeout too large for the clock means no deadline at all.
    let deadline = Instant::now().checked_add(policy.timeout);
    let timed_out = || {
        ProbeOutcome::failed(FailureReason::ReadinessTimeout {
            after: policy.timeout,
        })
    };

    let mut attempt: u32 = 0;
    loop {
        if cancel.is_cancelled() {
            return ProbeOutcome::failed(FailureReason::Cancelled);
        }
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return timed_out();
        }

        let result = tokio::select! {
            result = adapter.probe(handle) => result,
            _ = cancel.cancelled() => return ProbeOutcome::failed(FailureReason::Cancelled),
            _ = sleep_until_deadline(deadline) => return timed_out(),
        };
        debug!(resource = %handle.resource, attempt, ?result, "Probe polled");

        if let Some(outcome) = interpret(kind, result) {
            return outcome;
        }

        let wake = match (Instant::now().checked_add(policy.delay(attempt)), deadline) {
            (Some(wake), Some(deadline)) => Some(wake.min(deadline)),
            (wake, deadline) => wake.or(deadline),
        };
        attempt = attempt.saturating_add(1);
        tokio::select! {
            _ = sleep_until_deadline(wake) => {}
            _ = cancel.cancelled() => return ProbeOutcome::failed(FailureReason::Cancelled),
        }
    }
}

/// Sleep until `deadline`, or forever when there is none.
pub(crate) async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
