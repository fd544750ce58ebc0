//! In-memory adapter whose probe results are scripted per resource.
//!
//! Used by `devhost up --dry-run` and by tests. Every call is recorded in
//! order so callers can assert on launch and stop ordering.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::error::{DevhostError, Result};
use crate::orchestrator::probe::ProbeResult;
use crate::resource::{ExitInfo, ResourceId, ResourceKind, ResourceSpec};

use super::{Adapter, Handle, LaunchContext};

#[derive(Debug, Clone)]
enum Script {
    /// Pending for `n` probes, then Ready.
    ReadyAfter(u32),
    NeverReady,
    /// Pending for `n` probes, then Completed.
    CompletesAfter(u32, ExitInfo),
    /// Pending for `n` probes, then Failed.
    FailsAfter(u32, String),
}

#[derive(Debug, Clone, Default)]
struct Entry {
    script: Option<Script>,
    launch_error: Option<String>,
    launch_delay: Option<Duration>,
    exports: BTreeMap<String, String>,
}

/// One recorded adapter call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterCall {
    Launch {
        resource: ResourceId,
        env: BTreeMap<String, String>,
    },
    Probe(ResourceId),
    Stop(ResourceId),
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<ResourceId, Entry>,
    probes: HashMap<ResourceId, u32>,
    crashed: HashMap<ResourceId, ExitInfo>,
    stalled: HashSet<ResourceId>,
    calls: Vec<AdapterCall>,
    launching: usize,
    max_launching: usize,
}

/// Scripted [`Adapter`]. Unscripted resources are Ready (services) or
/// Completed with exit 0 (jobs) on their first probe.
#[derive(Debug, Default)]
pub struct ScriptedAdapter {
    inner: Mutex<Inner>,
}

impl ScriptedAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn edit(self, id: impl Into<ResourceId>, f: impl FnOnce(&mut Entry)) -> Self {
        f(self.lock().entries.entry(id.into()).or_default());
        self
    }

    /// `pending` Pending probes, then Ready.
    pub fn ready_after(self, id: impl Into<ResourceId>, pending: u32) -> Self {
        self.edit(id, |e| e.script = Some(Script::ReadyAfter(pending)))
    }

    /// Always Pending; only a timeout or cancellation ends the probe.
    pub fn never_ready(self, id: impl Into<ResourceId>) -> Self {
        self.edit(id, |e| e.script = Some(Script::NeverReady))
    }

    /// `pending` Pending probes, then Completed with `exit`.
    pub fn completes_after(self, id: impl Into<ResourceId>, pending: u32, exit: ExitInfo) -> Self {
        self.edit(id, |e| e.script = Some(Script::CompletesAfter(pending, exit)))
    }

    /// `pending` Pending probes, then a probe failure.
    pub fn fails_after(
        self,
        id: impl Into<ResourceId>,
        pending: u32,
        reason: impl Into<String>,
    ) -> Self {
        let reason = reason.into();
        self.edit(id, |e| e.script = Some(Script::FailsAfter(pending, reason)))
    }

    /// Make `launch` return an error.
    pub fn fail_launch(self, id: impl Into<ResourceId>, message: impl Into<String>) -> Self {
        let message = message.into();
        self.edit(id, |e| e.launch_error = Some(message))
    }

    /// Sleep inside `launch` before returning.
    pub fn launch_delay(self, id: impl Into<ResourceId>, delay: Duration) -> Self {
        self.edit(id, |e| e.launch_delay = Some(delay))
    }

    /// Values placed on the handle and published once Ready.
    pub fn exports(self, id: impl Into<ResourceId>, key: &str, value: &str) -> Self {
        self.edit(id, |e| {
            e.exports.insert(key.to_string(), value.to_string());
        })
    }

    /// Every later probe of `id` reports an exit, as if the process died.
    pub fn crash(&self, id: &ResourceId, exit: ExitInfo) {
        self.lock().crashed.insert(id.clone(), exit);
    }

    /// Every later probe of `id` is Pending, as if the process hung.
    pub fn stall(&self, id: &ResourceId) {
        self.lock().stalled.insert(id.clone());
    }

    pub fn probe_count(&self, id: &ResourceId) -> u32 {
        self.lock().probes.get(id).copied().unwrap_or(0)
    }

    pub fn calls(&self) -> Vec<AdapterCall> {
        self.lock().calls.clone()
    }

    /// Resources in the order `launch` was called.
    pub fn launched(&self) -> Vec<ResourceId> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                AdapterCall::Launch { resource, .. } => Some(resource.clone()),
                _ => None,
            })
            .collect()
    }

    /// Resources in the order `stop` was called.
    pub fn stopped(&self) -> Vec<ResourceId> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                AdapterCall::Stop(id) => Some(id.clone()),
                _ => None,
            })
            .collect()
    }

    /// Environment passed to `launch` for `id`.
    pub fn launch_env(&self, id: &ResourceId) -> Option<BTreeMap<String, String>> {
        self.lock().calls.iter().find_map(|c| match c {
            AdapterCall::Launch { resource, env } if resource == id => Some(env.clone()),
            _ => None,
        })
    }

    /// Highest number of `launch` calls in progress at once.
    pub fn max_concurrent_launches(&self) -> usize {
        self.lock().max_launching
    }
}

#[async_trait]
impl Adapter for ScriptedAdapter {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn launch(&self, spec: &ResourceSpec, ctx: &LaunchContext) -> Result<Handle> {
        let entry = {
            let mut inner = self.lock();
            inner.calls.push(AdapterCall::Launch {
                resource: spec.id.clone(),
                env: ctx.env.clone(),
            });
            inner.launching += 1;
            inner.max_launching = inner.max_launching.max(inner.launching);
            inner.entries.get(&spec.id).cloned().unwrap_or_default()
        };

        if let Some(delay) = entry.launch_delay {
            tokio::time::sleep(delay).await;
        }
        self.lock().launching -= 1;

        if let Some(message) = entry.launch_error {
            return Err(DevhostError::Launch(message));
        }

        Ok(Handle::new(spec.id.clone())
            .with_exports(entry.exports)
            .with_state(spec.kind))
    }

    async fn probe(&self, handle: &mut Handle) -> ProbeResult {
        let kind = handle
            .state_mut::<ResourceKind>()
            .copied()
            .unwrap_or(ResourceKind::LongRunningService);

        let mut inner = self.lock();
        inner.calls.push(AdapterCall::Probe(handle.resource.clone()));
        let count = inner.probes.entry(handle.resource.clone()).or_insert(0);
        *count += 1;
        let seen = *count;

        if let Some(exit) = inner.crashed.get(&handle.resource) {
            return ProbeResult::Failed {
                reason: "process exited".to_string(),
                exit: Some(*exit),
            };
        }

        if inner.stalled.contains(&handle.resource) {
            return ProbeResult::Pending;
        }

        let script = inner
            .entries
            .get(&handle.resource)
            .and_then(|e| e.script.clone());
        match script {
            None => match kind {
                ResourceKind::OneShotJob => ProbeResult::Completed(ExitInfo::success(Some(0))),
                ResourceKind::LongRunningService => ProbeResult::Ready,
            },
            Some(Script::NeverReady) => ProbeResult::Pending,
            Some(Script::ReadyAfter(n)) if seen > n => ProbeResult::Ready,
            Some(Script::CompletesAfter(n, exit)) if seen > n => ProbeResult::Completed(exit),
            Some(Script::FailsAfter(n, reason)) if seen > n => ProbeResult::failed(reason),
            Some(_) => ProbeResult::Pending,
        }
    }

    async fn stop(&self, handle: &mut Handle) -> Result<()> {
        self.lock()
            .calls
            .push(AdapterCall::Stop(handle.resource.clone()));
        Ok(())
    }
}
