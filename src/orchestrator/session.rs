//! One orchestration session: registry, graph, board and scheduler state.
//!
//! A [`Session`] owns everything for a single local run. Nothing is global;
//! two sessions in one process are fully independent.

use chrono::{DateTime, Utc};
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use crate::adapters::AdapterSet;
use crate::error::{FailureReason, Result};
use crate::resource::{ExitInfo, ResourceId, ResourceKind, ResourceRegistry, ResourceState};

use super::cancel::Cancellation;
use super::gate::WaitGate;
use super::graph::DependencyGraph;
use super::lifecycle::{StateBoard, TransitionRecord};
use super::probe::{interpret, ProbeOutcome, ProbePolicy, ProbeResult};
use super::scheduler::{LiveResource, Scheduler};

/// Session-wide settings.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Probe policy for resources without their own.
    pub probe: ProbePolicy,
    /// Where process output is captured.
    pub logs_dir: Option<PathBuf>,
    /// Upper bound for one adapter `stop` call during shutdown.
    pub stop_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            probe: ProbePolicy::default(),
            logs_dir: None,
            stop_timeout: Duration::from_secs(10),
        }
    }
}

/// Final record of one resource.
#[derive(Debug, Clone)]
pub struct ResourceOutcome {
    pub id: ResourceId,
    pub kind: ResourceKind,
    pub state: ResourceState,
    /// Why the resource is not Ready/Completed, when it is not.
    pub reason: Option<FailureReason>,
    pub exit: Option<ExitInfo>,
    pub allow_failure: bool,
    pub history: Vec<TransitionRecord>,
}

impl ResourceOutcome {
    /// Ready, Completed or explicitly Stopped.
    pub fn succeeded(&self) -> bool {
        matches!(
            self.state,
            ResourceState::Ready | ResourceState::Completed | ResourceState::Stopped
        )
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self.reason, Some(FailureReason::BlockedDependency { .. }))
    }
}

/// What a session run produced, one entry per declared resource.
#[derive(Debug, Clone)]
pub struct SessionResult {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub cancelled: bool,
    /// In declaration order.
    pub resources: Vec<ResourceOutcome>,
}

impl SessionResult {
    /// No cancellation, and every resource succeeded or allows failure.
    pub fn is_success(&self) -> bool {
        !self.cancelled
            && self
                .resources
                .iter()
                .all(|r| r.succeeded() || r.allow_failure)
    }

    pub fn get(&self, id: &str) -> Option<&ResourceOutcome> {
        self.resources.iter().find(|r| r.id.as_str() == id)
    }

    pub fn failed(&self) -> Vec<&ResourceOutcome> {
        self.resources
            .iter()
            .filter(|r| r.state == ResourceState::Failed)
            .collect()
    }

    pub fn blocked(&self) -> Vec<&ResourceOutcome> {
        self.resources.iter().filter(|r| r.is_blocked()).collect()
    }

    /// Human-readable table of every resource and, where relevant, why it
    /// did not succeed.
    pub fn summary(&self) -> String {
        let status = if self.is_success() {
            "succeeded"
        } else if self.cancelled {
            "cancelled"
        } else {
            "failed"
        };
        let elapsed = (self.finished_at - self.started_at).num_milliseconds();
        let mut out = format!(
            "Session {} {} in {}ms ({} resources)\n",
            self.session_id,
            status,
            elapsed,
            self.resources.len()
        );

        let width = self
            .resources
            .iter()
            .map(|r| r.id.as_str().len())
            .max()
            .unwrap_or(0);
        for r in &self.resources {
            let _ = write!(
                out,
                "  {:<width$}  {:<20}  {:<9}",
                r.id.as_str(),
                r.kind.as_str(),
                r.state.as_str()
            );
            if let Some(reason) = &r.reason {
                let _ = write!(out, "  {}", reason);
            }
            if r.allow_failure && !r.succeeded() {
                out.push_str("  (allowed)");
            }
            out.push('\n');
        }
        out
    }
}

/// An explicit orchestration session.
///
/// ```
/// use std::sync::Arc;
/// use devhost::adapters::{AdapterSet, ScriptedAdapter};
/// use devhost::orchestrator::{Session, SessionOptions};
/// use devhost::resource::{ResourceKind, ResourceRegistry, ResourceSpec};
///
/// # tokio_test::block_on(async {
/// let registry = ResourceRegistry::from_specs([
///     ResourceSpec::new("cosmos", ResourceKind::LongRunningService),
///     ResourceSpec::new("seed-database", ResourceKind::OneShotJob).depends_on(["cosmos"]),
/// ])
/// .unwrap();
/// let adapters = AdapterSet::uniform(Arc::new(ScriptedAdapter::new()));
/// let mut session = Session::new(registry, adapters, SessionOptions::default()).unwrap();
///
/// let result = session.run().await;
/// assert!(result.is_success());
/// assert_eq!(session.shutdown().await.len(), 1);
/// # });
/// ```
pub struct Session {
    id: Uuid,
    registry: ResourceRegistry,
    graph: Arc<DependencyGraph>,
    board: Arc<StateBoard>,
    adapters: AdapterSet,
    options: SessionOptions,
    cancel: Cancellation,
    started_at: DateTime<Utc>,
    live: Vec<LiveResource>,
}

impl Session {
    /// Validate the declarations and build the graph. Structural errors
    /// (`UnknownDependency`, `Cycle`) are returned here; nothing is started.
    pub fn new(
        registry: ResourceRegistry,
        adapters: AdapterSet,
        options: SessionOptions,
    ) -> Result<Self> {
        let graph = DependencyGraph::build(&registry)?;
        let board = StateBoard::new(&registry);
        Ok(Self {
            id: Uuid::new_v4(),
            registry,
            graph: Arc::new(graph),
            board: Arc::new(board),
            adapters,
            options,
            cancel: Cancellation::new(),
            started_at: Utc::now(),
            live: Vec::new(),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Read-only view of live state.
    pub fn board(&self) -> &StateBoard {
        &self.board
    }

    pub fn gate(&self) -> WaitGate {
        WaitGate::new(
            Arc::clone(&self.board),
            Arc::clone(&self.graph),
            self.cancel.clone(),
        )
    }

    /// Cancelling this aborts the session: probes stop, waits return
    /// `Cancelled`, nothing new starts.
    pub fn cancellation(&self) -> Cancellation {
        self.cancel.clone()
    }

    /// Ids of long-running resources currently held Ready by this session.
    pub fn live_services(&self) -> Vec<ResourceId> {
        self.live.iter().map(|r| r.id.clone()).collect()
    }

    /// Start every resource in dependency order and wait until the session
    /// settles. A cancelled session stops whatever it had started.
    pub async fn run(&mut self) -> SessionResult {
        self.started_at = Utc::now();
        info!(session = %self.id, resources = self.registry.len(), "Session starting");

        let scheduler = Scheduler {
            registry: &self.registry,
            graph: &self.graph,
            board: &self.board,
            adapters: &self.adapters,
            default_probe: self.options.probe,
            logs_dir: self.options.logs_dir.clone(),
            cancel: &self.cancel,
        };
        let live = scheduler.run().await;
        self.live.extend(live);

        if self.cancel.is_cancelled() {
            warn!(session = %self.id, "Session cancelled; stopping started services");
            self.shutdown().await;
        }

        let result = self.result();
        if result.is_success() {
            info!(session = %self.id, "Session settled successfully");
        } else {
            warn!(
                session = %self.id,
                failed = result.failed().len(),
                blocked = result.blocked().len(),
                "Session settled unsuccessfully"
            );
        }
        result
    }

    /// Re-probe Ready services until `stop` or the session is cancelled, or
    /// no service is left. There is no restart: a service that exits, or
    /// that stops answering for longer than its probe timeout, is marked
    /// Failed and stopped. Returns the ids that failed.
    pub async fn supervise(&mut self, stop: &Cancellation) -> Vec<ResourceId> {
        let interval = self.options.probe.max_interval.max(self.options.probe.interval);
        let mut crashed = Vec::new();

        while !self.live.is_empty() {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = stop.cancelled() => break,
                _ = self.cancel.cancelled() => break,
            }

            let mut still_live = Vec::with_capacity(self.live.len());
            for mut resource in std::mem::take(&mut self.live) {
                let result = resource.adapter.probe(&mut resource.handle).await;
                let outcome = match result {
                    ProbeResult::Pending => unanswered(&mut resource),
                    other => interpret(ResourceKind::LongRunningService, other),
                };
                match outcome {
                    None => still_live.push(resource),
                    Some(ProbeOutcome::Ready) => {
                        resource.unhealthy_since = None;
                        still_live.push(resource);
                    }
                    Some(ProbeOutcome::Failed { reason, exit }) => {
                        warn!(resource = %resource.id, %reason, "Service stopped answering");
                        if let Err(e) = self.board.mark_failed(&resource.id, reason, exit) {
                            warn!(resource = %resource.id, "{}", e);
                        }
                        if let Err(e) = resource.adapter.stop(&mut resource.handle).await {
                            warn!(resource = %resource.id, "Failed to stop: {}", e);
                        }
                        crashed.push(resource.id);
                    }
                    Some(ProbeOutcome::Completed(_)) => still_live.push(resource),
                }
            }
            self.live = still_live;
        }
        crashed
    }

    /// Stop live services, dependents before their dependencies, and mark
    /// them Stopped. Returns the ids in the order they were stopped.
    pub async fn shutdown(&mut self) -> Vec<ResourceId> {
        let order: Vec<ResourceId> = self
            .graph
            .topological_order()
            .into_iter()
            .rev()
            .cloned()
            .collect();

        let mut stopped = Vec::new();
        for id in order {
            let Some(pos) = self.live.iter().position(|r| r.id == id) else {
                continue;
            };
            let mut resource = self.live.remove(pos);
            let stop = resource.adapter.stop(&mut resource.handle);
            match tokio::time::timeout(self.options.stop_timeout, stop).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(resource = %id, "Stop failed: {}", e),
                Err(_) => warn!(
                    resource = %id,
                    timeout = ?self.options.stop_timeout,
                    "Stop timed out"
                ),
            }
            if let Err(e) = self.board.transition(&id, ResourceState::Stopped) {
                warn!(resource = %id, "{}", e);
            }
            info!(resource = %id, "Stopped");
            stopped.push(id);
        }
        stopped
    }

    /// Result built from the current board.
    pub fn result(&self) -> SessionResult {
        let cancelled = self.cancel.is_cancelled();
        let state_of = |id: &ResourceId| self.board.state_or_pending(id);

        let resources = self
            .board
            .snapshots()
            .into_iter()
            .map(|snap| {
                let allow_failure = self
                    .registry
                    .get(&snap.id)
                    .is_some_and(|spec| spec.allow_failure);
                let reason = match snap.state {
                    ResourceState::Pending => {
                        let failed = self.graph.blocking_failures(&snap.id, state_of);
                        if !failed.is_empty() {
                            Some(FailureReason::BlockedDependency { failed })
                        } else if cancelled {
                            Some(FailureReason::Cancelled)
                        } else {
                            None
                        }
                    }
                    _ => snap.reason,
                };
                ResourceOutcome {
                    id: snap.id,
                    kind: snap.kind,
                    state: snap.state,
                    reason,
                    exit: snap.exit,
                    allow_failure,
                    history: snap.history,
                }
            })
            .collect();

        SessionResult {
            session_id: self.id,
            started_at: self.started_at,
            finished_at: Utc::now(),
            cancelled,
            resources,
        }
    }
}

/// Track a Pending supervision probe. Fails the service once it has gone
/// unanswered for longer than its probe timeout.
fn unanswered(resource: &mut LiveResource) -> Option<ProbeOutcome> {
    let now = Instant::now();
    let since = *resource.unhealthy_since.get_or_insert(now);
    let limit = resource.policy.timeout;
    if now.saturating_duration_since(since) > limit {
        Some(ProbeOutcome::failed(FailureReason::ReadinessTimeout { after: limit }))
    } else {
        None
    }
}
