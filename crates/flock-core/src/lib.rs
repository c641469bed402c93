//! Core types and error taxonomy for Flock.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the value types shared by every other Flock crate: agent and model
//! identifiers, the behavior spec (observation shapes plus action space),
//! per-agent observations, decided actions, and the error types for
//! every subsystem.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod action;
pub mod error;
pub mod id;
pub mod observation;
pub mod spec;

pub use action::ActionResult;
pub use error::{
    BackendError, BatchInferenceError, ModelLoadError, ShapeMismatchError, SpecError,
};
pub use id::{AgentId, ModelId};
pub use observation::{ActionMask, AgentObservation};
pub use spec::{ActionSpec, BehaviorSpec, ObservationSpec, Shape};
