//! Resource declarations, the unit of orchestration.
//!
//! A [`ResourceSpec`] is the static half of a resource (id, kind,
//! dependencies, adapter configuration). The live half (state, exit info,
//! exports) lives on the orchestrator's state board.

pub mod registry;
pub mod types;

pub use registry::ResourceRegistry;
pub use types::{ExitInfo, ResourceId, ResourceKind, ResourceSpec, ResourceState};
