//! Lifecycle state machine and the state board.
//!
//! Transition rules are a fixed table keyed by resource kind. The board keeps
//! one record per resource and publishes every change through a per-resource
//! `watch` channel, so a reader always sees a whole snapshot and is woken on
//! each change without polling.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::error::{DevhostError, FailureReason, Result};
use crate::resource::{ExitInfo, ResourceId, ResourceKind, ResourceRegistry, ResourceState};

/// Whether the state machine allows `from -> to` for a resource of `kind`.
pub fn can_transition(kind: ResourceKind, from: ResourceState, to: ResourceState) -> bool {
    use crate::resource::ResourceKind::*;
    use crate::resource::ResourceState::*;

    match (from, to) {
        (Pending, Starting) => true,
        (Starting, Failed) => true,
        (Starting, Running) => kind == LongRunningService,
        (Starting, Completed) => kind == OneShotJob,
        (Running, Ready) | (Running, Failed) => kind == LongRunningService,
        (Ready, Failed) | (Ready, Stopped) => kind == LongRunningService,
        _ => false,
    }
}

/// One applied transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionRecord {
    /// Board-wide sequence number; orders transitions across resources.
    pub seq: u64,
    pub from: ResourceState,
    pub to: ResourceState,
    pub at: DateTime<Utc>,
}

/// Consistent view of one resource.
#[derive(Debug, Clone)]
pub struct ResourceSnapshot {
    pub id: ResourceId,
    pub kind: ResourceKind,
    pub state: ResourceState,
    /// Set when the resource entered `Failed`.
    pub reason: Option<FailureReason>,
    /// Set when a one-shot job finished.
    pub exit: Option<ExitInfo>,
    /// Values the resource exposes to dependents once Ready.
    pub exports: BTreeMap<String, String>,
    pub history: Vec<TransitionRecord>,
}

impl ResourceSnapshot {
    fn pending(id: ResourceId, kind: ResourceKind) -> Self {
        Self {
            id,
            kind,
            state: ResourceState::Pending,
            reason: None,
            exit: None,
            exports: BTreeMap::new(),
            history: Vec::new(),
        }
    }

    /// Sequence number of the transition into `state`, if it ever happened.
    pub fn entered(&self, state: ResourceState) -> Option<u64> {
        self.history.iter().find(|t| t.to == state).map(|t| t.seq)
    }
}

/// Live state of every resource in a session.
///
/// Mutating methods are crate-private: only the scheduler writes.
pub struct StateBoard {
    entries: HashMap<ResourceId, watch::Sender<ResourceSnapshot>>,
    order: Vec<ResourceId>,
    seq: AtomicU64,
}

impl StateBoard {
    /// Every declared resource starts `Pending`.
    pub fn new(registry: &ResourceRegistry) -> Self {
        let mut entries = HashMap::with_capacity(registry.len());
        let mut order = Vec::with_capacity(registry.len());
        for spec in registry.iter() {
            let (tx, _rx) = watch::channel(ResourceSnapshot::pending(spec.id.clone(), spec.kind));
            entries.insert(spec.id.clone(), tx);
            order.push(spec.id.clone());
        }
        Self {
            entries,
            order,
            seq: AtomicU64::new(0),
        }
    }

    fn entry(&self, id: &ResourceId) -> Result<&watch::Sender<ResourceSnapshot>> {
        self.entries
            .get(id)
            .ok_or_else(|| DevhostError::NotFound(format!("resource '{}'", id)))
    }

    pub fn contains(&self, id: &ResourceId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn state(&self, id: &ResourceId) -> Option<ResourceState> {
        self.entries.get(id).map(|tx| tx.borrow().state)
    }

    /// State lookup for graph queries; unknown ids read as `Pending`.
    pub fn state_or_pending(&self, id: &ResourceId) -> ResourceState {
        self.state(id).unwrap_or(ResourceState::Pending)
    }

    pub fn snapshot(&self, id: &ResourceId) -> Option<ResourceSnapshot> {
        self.entries.get(id).map(|tx| tx.borrow().clone())
    }

    /// Snapshots in declaration order.
    pub fn snapshots(&self) -> Vec<ResourceSnapshot> {
        self.order
            .iter()
            .filter_map(|id| self.snapshot(id))
            .collect()
    }

    /// Receiver notified on every change of `id`.
    pub fn subscribe(&self, id: &ResourceId) -> Option<watch::Receiver<ResourceSnapshot>> {
        self.entries.get(id).map(|tx| tx.subscribe())
    }

    /// Apply `to` after checking the transition table. `update` runs inside
    /// the same publish, so readers never see the new state without its details.
    fn apply<F>(&self, id: &ResourceId, to: ResourceState, update: F) -> Result<()>
    where
        F: FnOnce(&mut ResourceSnapshot),
    {
        let tx = self.entry(id)?;
        let (kind, from) = {
            let current = tx.borrow();
            (current.kind, current.state)
        };
        if !can_transition(kind, from, to) {
            warn!(resource = %id, %from, %to, "Rejected lifecycle transition");
            return Err(DevhostError::InvalidTransition {
                resource: id.clone(),
                from,
                to,
            });
        }

        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        tx.send_modify(|snap| {
            snap.state = to;
            snap.history.push(TransitionRecord {
                seq,
                from,
                to,
                at: Utc::now(),
            });
            update(snap);
        });
        info!(resource = %id, %from, %to, seq, "Resource transition");
        Ok(())
    }

    pub(crate) fn transition(&self, id: &ResourceId, to: ResourceState) -> Result<()> {
        self.apply(id, to, |_| {})
    }

    pub(crate) fn mark_ready(
        &self,
        id: &ResourceId,
        exports: BTreeMap<String, String>,
    ) -> Result<()> {
        self.apply(id, ResourceState::Ready, |snap| snap.exports = exports)
    }

    pub(crate) fn mark_completed(&self, id: &ResourceId, exit: ExitInfo) -> Result<()> {
        self.apply(id, ResourceState::Completed, |snap| snap.exit = Some(exit))
    }

    pub(crate) fn mark_failed(
        &self,
        id: &ResourceId,
        reason: FailureReason,
        exit: Option<ExitInfo>,
    ) -> Result<()> {
        self.apply(id, ResourceState::Failed, |snap| {
            snap.reason = Some(reason);
            if exit.is_some() {
                snap.exit = exit;
            }
        })
    }
}
