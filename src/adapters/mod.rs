//! Adapters: the per-kind capability that actually launches resources.
//!
//! The orchestrator calls [`Adapter::launch`], [`Adapter::probe`] and
//! [`Adapter::stop`] and never looks inside a resource's configuration.
//! [`AdapterSet`] maps each [`ResourceKind`] to the adapter that handles it.
//!
//! Built-in adapters:
//! - [`JobAdapter`]: runs a one-shot command to completion
//! - [`ServiceAdapter`]: runs a long-running command and health-checks it
//! - [`ScriptedAdapter`]: in-memory, probe results scripted per resource

pub mod job;
pub mod process;
pub mod scripted;
pub mod service;
pub mod types;

pub use job::JobAdapter;
pub use scripted::{AdapterCall, ScriptedAdapter};
pub use service::ServiceAdapter;
pub use types::{HealthCheck, ResourceConfig};

use async_trait::async_trait;
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::Result;
use crate::orchestrator::probe::ProbeResult;
use crate::resource::{ResourceId, ResourceKind, ResourceSpec};

/// Inputs the scheduler hands to an adapter at launch time.
#[derive(Debug, Clone, Default)]
pub struct LaunchContext {
    /// Values exported by the resource's dependencies, keyed
    /// `<DEPENDENCY>_<KEY>`.
    pub env: BTreeMap<String, String>,
    /// Where to capture process output; discarded when unset.
    pub logs_dir: Option<PathBuf>,
}

/// A launched resource as seen by its adapter.
pub struct Handle {
    pub resource: ResourceId,
    pub pid: Option<u32>,
    /// Published to dependents once the resource is Ready.
    pub exports: BTreeMap<String, String>,
    state: Option<Box<dyn Any + Send>>,
}

impl Handle {
    pub fn new(resource: ResourceId) -> Self {
        Self {
            resource,
            pid: None,
            exports: BTreeMap::new(),
            state: None,
        }
    }

    pub fn with_pid(mut self, pid: Option<u32>) -> Self {
        self.pid = pid;
        self
    }

    pub fn with_exports(mut self, exports: BTreeMap<String, String>) -> Self {
        self.exports = exports;
        self
    }

    /// Attach adapter-private state (a child process, a connection, ...).
    pub fn with_state<T: Any + Send>(mut self, state: T) -> Self {
        self.state = Some(Box::new(state));
        self
    }

    pub fn state_mut<T: Any + Send>(&mut self) -> Option<&mut T> {
        self.state.as_mut().and_then(|s| s.downcast_mut::<T>())
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("resource", &self.resource)
            .field("pid", &self.pid)
            .field("exports", &self.exports)
            .finish_non_exhaustive()
    }
}

/// Launch, probe and stop resources of one kind.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Adapter name for logs.
    fn name(&self) -> &str;

    /// Start the underlying process or service. Errors become `LaunchError`.
    async fn launch(&self, spec: &ResourceSpec, ctx: &LaunchContext) -> Result<Handle>;

    /// One readiness observation. Called repeatedly with backoff.
    async fn probe(&self, handle: &mut Handle) -> ProbeResult;

    /// Stop a launched resource. Stopping something already gone is not an error.
    async fn stop(&self, handle: &mut Handle) -> Result<()>;
}

/// Adapters keyed by resource kind.
#[derive(Clone, Default)]
pub struct AdapterSet {
    adapters: HashMap<ResourceKind, Arc<dyn Adapter>>,
}

impl AdapterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-backed adapters for both kinds.
    pub fn processes() -> Self {
        Self::new()
            .with(ResourceKind::OneShotJob, Arc::new(JobAdapter::new()))
            .with(ResourceKind::LongRunningService, Arc::new(ServiceAdapter::new()))
    }

    /// One adapter serving both kinds.
    pub fn uniform(adapter: Arc<dyn Adapter>) -> Self {
        Self::new()
            .with(ResourceKind::OneShotJob, Arc::clone(&adapter))
            .with(ResourceKind::LongRunningService, adapter)
    }

    pub fn with(mut self, kind: ResourceKind, adapter: Arc<dyn Adapter>) -> Self {
        self.register(kind, adapter);
        self
    }

    /// Replaces any adapter already registered for `kind`.
    pub fn register(&mut self, kind: ResourceKind, adapter: Arc<dyn Adapter>) {
        self.adapters.insert(kind, adapter);
    }

    pub fn get(&self, kind: ResourceKind) -> Option<Arc<dyn Adapter>> {
        self.adapters.get(&kind).cloned()
    }
}

impl fmt::Debug for AdapterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (kind, adapter) in &self.adapters {
            map.entry(kind, &adapter.name());
        }
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_state_downcast() {
        let mut handle = Handle::new("db".into()).with_state(41u32);
        *handle.state_mut::<u32>().unwrap() += 1;
        assert_eq!(handle.state_mut::<u32>(), Some(&mut 42));
        assert!(handle.state_mut::<String>().is_none());
    }

    #[test]
    fn test_handle_without_state() {
        let mut handle = Handle::new("db".into()).with_pid(Some(7));
        assert_eq!(handle.pid, Some(7));
        assert!(handle.state_mut::<u32>().is_none());
    }

    #[test]
    fn test_adapter_set_lookup() {
        let set = AdapterSet::processes();
        assert_eq!(set.get(ResourceKind::OneShotJob).unwrap().name(), "job");
        assert_eq!(
            set.get(ResourceKind::LongRunningService).unwrap().name(),
            "service"
        );
        assert!(AdapterSet::new().get(ResourceKind::OneShotJob).is_none());
    }

    #[test]
    fn test_adapter_set_register_replaces() {
        let mut set = AdapterSet::processes();
        set.register(ResourceKind::OneShotJob, Arc::new(ScriptedAdapter::new()));
        assert_eq!(set.get(ResourceKind::OneShotJob).unwrap().name(), "scripted");
    }
}
