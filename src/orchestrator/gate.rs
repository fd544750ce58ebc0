//! Wait gate: block until a set of resources is usable.
//!
//! Waiters subscribe to the board's per-resource watch channels and wake only
//! when one of the watched records changes. Nothing here writes the board.

use futures::future::select_all;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{DevhostError, FailureReason, Result};
use crate::resource::ResourceId;

use super::cancel::Cancellation;
use super::graph::DependencyGraph;
use super::lifecycle::StateBoard;
use super::probe::sleep_until_deadline;

/// How a wait ended.
#[derive(Debug, Clone, PartialEq)]
pub enum WaitOutcome {
    /// Every requested resource is Ready (or Completed, for jobs).
    Ready,
    /// The deadline passed; these were still not usable.
    Timeout { pending: Vec<ResourceId> },
    /// A requested resource failed, was stopped, or is blocked by a failed
    /// dependency.
    Failed {
        resource: ResourceId,
        reason: Option<FailureReason>,
    },
    Cancelled,
}

impl WaitOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, WaitOutcome::Ready)
    }
}

/// Read-only handle for synchronizing on resource readiness. Cheap to clone.
#[derive(Clone)]
pub struct WaitGate {
    board: Arc<StateBoard>,
    graph: Arc<DependencyGraph>,
    session_cancel: Cancellation,
}

impl WaitGate {
    pub(crate) fn new(
        board: Arc<StateBoard>,
        graph: Arc<DependencyGraph>,
        session_cancel: Cancellation,
    ) -> Self {
        Self {
            board,
            graph,
            session_cancel,
        }
    }

    /// Wait until every id in `ids` satisfies its dependents.
    ///
    /// Returns immediately when they already do, or when one of them has
    /// already failed. `cancel` and the session's own cancellation both end
    /// the wait with [`WaitOutcome::Cancelled`].
    pub async fn wait_until_ready(
        &self,
        ids: &[ResourceId],
        timeout: Duration,
        cancel: Option<&Cancellation>,
    ) -> Result<WaitOutcome> {
        // Dependencies are watched too, so a blocked resource is reported as
        // soon as something upstream fails.
        let mut watched = BTreeSet::new();
        for id in ids {
            if !self.board.contains(id) {
                return Err(DevhostError::NotFound(format!("resource '{}'", id)));
            }
            watched.insert(id.clone());
            watched.extend(self.graph.transitive_dependencies(id));
        }
        let mut receivers: Vec<_> = watched
            .iter()
            .filter_map(|id| self.board.subscribe(id))
            .collect();

        // `Duration::MAX` and other timeouts past the clock's range never expire.
        let deadline = Instant::now().checked_add(timeout);
        loop {
            for rx in receivers.iter_mut() {
                rx.borrow_and_update();
            }
            if let Some(outcome) = self.evaluate(ids) {
                return Ok(outcome);
            }
            if self.session_cancel.is_cancelled() || cancel.is_some_and(|c| c.is_cancelled()) {
                return Ok(WaitOutcome::Cancelled);
            }

            let changed = select_all(receivers.iter_mut().map(|rx| Box::pin(rx.changed())));
            tokio::select! {
                _ = changed => {}
                _ = sleep_until_deadline(deadline) => {
                    let pending = self.unsatisfied(ids);
                    debug!(?pending, "Wait timed out");
                    return Ok(WaitOutcome::Timeout { pending });
                }
                _ = self.session_cancel.cancelled() => return Ok(WaitOutcome::Cancelled),
                _ = caller_cancelled(cancel) => return Ok(WaitOutcome::Cancelled),
            }
        }
    }

    /// Final outcome from the current board, or `None` to keep waiting.
    fn evaluate(&self, ids: &[ResourceId]) -> Option<WaitOutcome> {
        let state_of = |id: &ResourceId| self.board.state_or_pending(id);
        for id in ids {
            let snapshot = self.board.snapshot(id)?;
            if snapshot.state.blocks_dependents() {
                return Some(WaitOutcome::Failed {
                    resource: id.clone(),
                    reason: snapshot.reason,
                });
            }
            let failed = self.graph.blocking_failures(id, state_of);
            if !failed.is_empty() {
                return Some(WaitOutcome::Failed {
                    resource: id.clone(),
                    reason: Some(FailureReason::BlockedDependency { failed }),
                });
            }
        }
        if self.unsatisfied(ids).is_empty() {
            Some(WaitOutcome::Ready)
        } else {
            None
        }
    }

    fn unsatisfied(&self, ids: &[ResourceId]) -> Vec<ResourceId> {
        ids.iter()
            .filter(|id| !self.board.state_or_pending(id).satisfies_dependents())
            .cloned()
            .collect()
    }
}

async fn caller_cancelled(cancel: Option<&Cancellation>) {
    match cancel {
        Some(cancel) => cancel.cancelled().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{ResourceKind, ResourceRegistry, ResourceSpec, ResourceState};
    use std::collections::BTreeMap;

    fn fixture() -> (Arc<StateBoard>, WaitGate) {
        let registry = ResourceRegistry::from_specs([
            ResourceSpec::new("cosmos", ResourceKind::LongRunningService),
            ResourceSpec::new("seed", ResourceKind::OneShotJob).depends_on(["cosmos"]),
        ])
        .unwrap();
        let graph = Arc::new(DependencyGraph::build(&registry).unwrap());
        let board = Arc::new(StateBoard::new(&registry));
        let gate = WaitGate::new(Arc::clone(&board), graph, Cancellation::new());
        (board, gate)
    }

    fn make_ready(board: &StateBoard, id: &ResourceId) {
        board.transition(id, ResourceState::Starting).unwrap();
        board.transition(id, ResourceState::Running).unwrap();
        board.mark_ready(id, BTreeMap::new()).unwrap();
    }

    #[tokio::test]
    async fn test_already_ready_returns_immediately() {
        let (board, gate) = fixture();
        let cosmos = ResourceId::from("cosmos");
        make_ready(&board, &cosmos);
        let outcome = gate
            .wait_until_ready(&[cosmos], Duration::from_secs(30), None)
            .await
            .unwrap();
        assert_eq!(outcome, WaitOutcome::Ready);
    }

    #[tokio::test]
    async fn test_already_failed_returns_immediately() {
        let (board, gate) = fixture();
        let cosmos = ResourceId::from("cosmos");
        board.transition(&cosmos, ResourceState::Starting).unwrap();
        board
            .mark_failed(&cosmos, FailureReason::LaunchError("boom".into()), None)
            .unwrap();
        let outcome = gate
            .wait_until_ready(&[cosmos.clone()], Duration::from_secs(30), None)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            WaitOutcome::Failed {
                resource: cosmos,
                reason: Some(FailureReason::LaunchError("boom".into()))
            }
        );
    }

    #[tokio::test]
    async fn test_blocked_dependent_reports_failure() {
        let (board, gate) = fixture();
        let cosmos = ResourceId::from("cosmos");
        board.transition(&cosmos, ResourceState::Starting).unwrap();
        board
            .mark_failed(&cosmos, FailureReason::UnexpectedExit, None)
            .unwrap();
        let outcome = gate
            .wait_until_ready(&["seed".into()], Duration::from_secs(30), None)
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            WaitOutcome::Failed {
                reason: Some(FailureReason::BlockedDependency { .. }),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_waiters_released_on_ready() {
        let (board, gate) = fixture();
        let cosmos = ResourceId::from("cosmos");
        let mut waiters = Vec::new();
        for _ in 0..3 {
            let gate = gate.clone();
            let id = cosmos.clone();
            waiters.push(tokio::spawn(async move {
                gate.wait_until_ready(&[id], Duration::from_secs(5), None)
                    .await
                    .unwrap()
            }));
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        make_ready(&board, &cosmos);
        for waiter in waiters {
            assert_eq!(waiter.await.unwrap(), WaitOutcome::Ready);
        }
    }

    #[tokio::test]
    async fn test_unbounded_timeout_waits_for_ready() {
        let (board, gate) = fixture();
        let cosmos = ResourceId::from("cosmos");

        let cancel = Cancellation::new();
        cancel.cancel();
        let outcome = gate
            .wait_until_ready(&[cosmos.clone()], Duration::MAX, Some(&cancel))
            .await
            .unwrap();
        assert_eq!(outcome, WaitOutcome::Cancelled);

        let waiter = {
            let gate = gate.clone();
            let id = cosmos.clone();
            tokio::spawn(async move {
                gate.wait_until_ready(&[id], Duration::MAX, None)
                    .await
                    .unwrap()
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        make_ready(&board, &cosmos);
        let outcome = tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome, WaitOutcome::Ready);
    }

    #[tokio::test]
    async fn test_timeout_lists_pending() {
        let (_board, gate) = fixture();
        let outcome = gate
            .wait_until_ready(&["cosmos".into()], Duration::from_millis(30), None)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            WaitOutcome::Timeout {
                pending: vec!["cosmos".into()]
            }
        );
    }

    #[tokio::test]
    async fn test_caller_cancel_is_prompt() {
        let (_board, gate) = fixture();
        let cancel = Cancellation::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });
        let started = std::time::Instant::now();
        let outcome = gate
            .wait_until_ready(&["cosmos".into()], Duration::from_secs(60), Some(&cancel))
            .await
            .unwrap();
        assert_eq!(outcome, WaitOutcome::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_unknown_id_is_not_found() {
        let (_board, gate) = fixture();
        let err = gate
            .wait_until_ready(&["nope".into()], Duration::from_secs(1), None)
            .await
            .unwrap_err();
        assert!(matches!(err, DevhostError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_empty_set_is_ready() {
        let (_board, gate) = fixture();
        let outcome = gate
            .wait_until_ready(&[], Duration::from_secs(1), None)
            .await
            .unwrap();
        assert!(outcome.is_ready());
    }
}
