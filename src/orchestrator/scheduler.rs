//! Concurrent startup in dependency order.
//!
//! The scheduler loop is the only writer of the state board. Each launched
//! resource runs in its own task (adapter `launch`, then [`drive_probe`]) and
//! reports back over an mpsc channel; the loop applies the transition and
//! recomputes which Pending resources can start.

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::adapters::{Adapter, AdapterSet, Handle, LaunchContext};
use crate::error::{FailureReason, Result};
use crate::resource::{
    ExitInfo, ResourceId, ResourceKind, ResourceRegistry, ResourceSpec, ResourceState,
};

use super::cancel::Cancellation;
use super::graph::DependencyGraph;
use super::lifecycle::StateBoard;
use super::probe::{drive_probe, ProbeOutcome, ProbePolicy};

/// A long-running resource that reached Ready, kept for supervision and
/// shutdown.
pub(crate) struct LiveResource {
    pub id: ResourceId,
    pub adapter: Arc<dyn Adapter>,
    pub handle: Handle,
    /// Policy the resource was probed with; its timeout bounds how long a
    /// supervised service may stop answering.
    pub policy: ProbePolicy,
    /// First unanswered supervision probe since the last Ready one.
    pub unhealthy_since: Option<Instant>,
}

enum Event {
    Launched {
        id: ResourceId,
    },
    LaunchFailed {
        id: ResourceId,
        message: String,
    },
    Probed {
        id: ResourceId,
        outcome: ProbeOutcome,
        handle: Handle,
    },
    /// The task ended without reporting, e.g. the adapter panicked.
    Lost {
        id: ResourceId,
    },
}

/// Sends `Lost` on drop unless the task reported a final event.
struct Reporter {
    id: ResourceId,
    tx: mpsc::UnboundedSender<Event>,
    done: bool,
}

impl Reporter {
    fn send(&self, event: Event) {
        // The loop outlives every task; a send failure means it is gone.
        let _ = self.tx.send(event);
    }

    fn finish(mut self, event: Event) {
        self.done = true;
        self.send(event);
    }
}

impl Drop for Reporter {
    fn drop(&mut self) {
        if !self.done {
            let _ = self.tx.send(Event::Lost {
                id: self.id.clone(),
            });
        }
    }
}

pub(crate) struct Scheduler<'a> {
    pub registry: &'a ResourceRegistry,
    pub graph: &'a DependencyGraph,
    pub board: &'a StateBoard,
    pub adapters: &'a AdapterSet,
    pub default_probe: ProbePolicy,
    pub logs_dir: Option<PathBuf>,
    pub cancel: &'a Cancellation,
}

impl Scheduler<'_> {
    /// Start everything that can start and wait until nothing is in flight.
    /// Returns the long-running resources that reached Ready.
    pub async fn run(self) -> Vec<LiveResource> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut tasks = JoinSet::new();
        let mut in_flight: HashSet<ResourceId> = HashSet::new();
        let mut live = Vec::new();

        self.launch_eligible(&tx, &mut tasks, &mut in_flight);

        while !in_flight.is_empty() {
            let Some(event) = rx.recv().await else {
                break;
            };
            match event {
                Event::Launched { id } => self.on_launched(&id),
                Event::LaunchFailed { id, message } => {
                    in_flight.remove(&id);
                    warn!(resource = %id, error = %message, "Launch failed");
                    self.fail(&id, FailureReason::LaunchError(message), None);
                }
                Event::Probed {
                    id,
                    outcome,
                    handle,
                } => {
                    in_flight.remove(&id);
                    if let Some(resource) = self.on_probed(&id, outcome, handle).await {
                        live.push(resource);
                    }
                }
                Event::Lost { id } => {
                    in_flight.remove(&id);
                    warn!(resource = %id, "Launch task ended without a result");
                    self.fail(
                        &id,
                        FailureReason::LaunchError("launch task aborted".to_string()),
                        None,
                    );
                }
            }

            self.launch_eligible(&tx, &mut tasks, &mut in_flight);
        }

        // Every task has reported by now; joining only surfaces panics.
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                warn!("Launch task failed: {}", e);
            }
        }

        live
    }

    fn launch_eligible(
        &self,
        tx: &mpsc::UnboundedSender<Event>,
        tasks: &mut JoinSet<()>,
        in_flight: &mut HashSet<ResourceId>,
    ) {
        if self.cancel.is_cancelled() {
            return;
        }
        for id in self.graph.ready_to_start(|id| self.board.state_or_pending(id)) {
            let Some(spec) = self.registry.get(&id) else {
                continue;
            };
            if let Err(e) = self.board.transition(&id, ResourceState::Starting) {
                warn!(resource = %id, "Could not start resource: {}", e);
                continue;
            }

            let Some(adapter) = self.adapters.get(spec.kind) else {
                warn!(resource = %id, kind = %spec.kind, "No adapter registered");
                self.fail(&id, FailureReason::NoAdapter(spec.kind), None);
                continue;
            };

            let ctx = LaunchContext {
                env: self.dependency_env(&id),
                logs_dir: self.logs_dir.clone(),
            };
            let policy = spec.probe.unwrap_or(self.default_probe);
            info!(resource = %id, kind = %spec.kind, adapter = adapter.name(), "Launching resource");

            in_flight.insert(id.clone());
            let reporter = Reporter {
                id: id.clone(),
                tx: tx.clone(),
                done: false,
            };
            tasks.spawn(launch_and_probe(
                spec.clone(),
                adapter,
                ctx,
                policy,
                self.cancel.clone(),
                reporter,
            ));
        }
    }

    /// Exports of the direct dependencies, as `<DEPENDENCY>_<KEY>`.
    fn dependency_env(&self, id: &ResourceId) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        for dep in self.graph.dependencies(id) {
            let Some(snapshot) = self.board.snapshot(dep) else {
                continue;
            };
            for (key, value) in snapshot.exports {
                let key = key.to_uppercase().replace('-', "_");
                env.insert(format!("{}_{}", dep.env_prefix(), key), value);
            }
        }
        env
    }

    fn on_launched(&self, id: &ResourceId) {
        let kind = self.registry.get(id).map(|s| s.kind);
        if kind == Some(ResourceKind::LongRunningService) {
            if let Err(e) = self.board.transition(id, ResourceState::Running) {
                warn!(resource = %id, "{}", e);
            }
        } else {
            debug!(resource = %id, "Job launched");
        }
    }

    async fn on_probed(
        &self,
        id: &ResourceId,
        outcome: ProbeOutcome,
        mut handle: Handle,
    ) -> Option<LiveResource> {
        let spec = self.registry.get(id)?;
        let adapter = self.adapters.get(spec.kind)?;
        match outcome {
            ProbeOutcome::Ready => {
                if let Err(e) = self.board.mark_ready(id, handle.exports.clone()) {
                    warn!(resource = %id, "{}", e);
                    return None;
                }
                Some(LiveResource {
                    id: id.clone(),
                    adapter,
                    handle,
                    policy: spec.probe.unwrap_or(self.default_probe),
                    unhealthy_since: None,
                })
            }
            ProbeOutcome::Completed(exit) => {
                if let Err(e) = self.board.mark_completed(id, exit) {
                    warn!(resource = %id, "{}", e);
                }
                None
            }
            ProbeOutcome::Failed { reason, exit } => {
                warn!(resource = %id, %reason, "Resource failed");
                if let Err(e) = adapter.stop(&mut handle).await {
                    warn!(resource = %id, "Failed to stop after failure: {}", e);
                }
                self.fail(id, reason, exit);
                None
            }
        }
    }

    fn fail(&self, id: &ResourceId, reason: FailureReason, exit: Option<ExitInfo>) {
        if let Err(e) = self.board.mark_failed(id, reason, exit) {
            warn!(resource = %id, "{}", e);
        }
    }
}

async fn launch_and_probe(
    spec: ResourceSpec,
    adapter: Arc<dyn Adapter>,
    ctx: LaunchContext,
    policy: ProbePolicy,
    cancel: Cancellation,
    reporter: Reporter,
) {
    let id = spec.id.clone();
    let launched: Result<Handle> = adapter.launch(&spec, &ctx).await;
    let mut handle = match launched {
        Ok(handle) => handle,
        Err(e) => {
            reporter.finish(Event::LaunchFailed {
                id,
                message: e.to_string(),
            });
            return;
        }
    };
    reporter.send(Event::Launched { id: id.clone() });

    let outcome = drive_probe(adapter.as_ref(), spec.kind, &mut handle, &policy, &cancel).await;
    reporter.finish(Event::Probed {
        id,
        outcome,
        handle,
    });
}
