//! devhost - dependency-ordered local development environment orchestrator
//!
//! Declare resources (one-shot jobs and long-running services) and the
//! dependencies between them; a [`Session`] starts them concurrently in
//! dependency order, polls each for readiness and reports a per-resource
//! outcome.

pub mod adapters;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod resource;
pub mod seed;
pub mod utils;

pub use adapters::{Adapter, AdapterSet, Handle, LaunchContext, ScriptedAdapter};
pub use config::Config;
pub use error::{DevhostError, FailureReason, Result};
pub use orchestrator::{
    Cancellation, DependencyGraph, ProbePolicy, Session, SessionOptions, SessionResult, WaitGate,
    WaitOutcome,
};
pub use resource::{ResourceId, ResourceKind, ResourceRegistry, ResourceSpec, ResourceState};
