//! The resource dependency orchestrator.
//!
//! - [`graph`]: validated DAG of "depends on" edges
//! - [`lifecycle`]: per-resource state machine and the state board
//! - [`probe`]: readiness polling with backoff
//! - [`scheduler`]: concurrent startup in dependency order
//! - [`gate`]: blocking, cancellable "wait until ready"
//! - [`session`]: the object tying the pieces together for one run

pub mod cancel;
pub mod gate;
pub mod graph;
pub mod lifecycle;
pub mod probe;
mod scheduler;
pub mod session;

pub use cancel::Cancellation;
pub use gate::{WaitGate, WaitOutcome};
pub use graph::DependencyGraph;
pub use lifecycle::{can_transition, ResourceSnapshot, StateBoard, TransitionRecord};
pub use probe::{drive_probe, Backoff, ProbeOutcome, ProbePolicy, ProbeResult};
pub use session::{ResourceOutcome, Session, SessionOptions, SessionResult};
