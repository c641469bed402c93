//! Flock: shared batched inference for many simultaneously-acting agents.
//!
//! This is the top-level facade crate that re-exports the public API from
//! all Flock sub-crates. For most users, adding `flock` as a single
//! dependency is sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use flock::prelude::*;
//!
//! let spec = BehaviorSpec::new(
//!     "forager",
//!     ObservationSpec::vector(2),
//!     ActionSpec::hybrid(1, &[3]),
//! );
//! let asset = DenseModel::zeros(ModelMetadata::for_spec(&spec)).to_asset("forager");
//! let registry = SchedulerRegistry::new(DenseProvider, RegistryConfig::default()).unwrap();
//!
//! // Two requesters with the same model, device and mode share one batch.
//! let a = registry.requester(&asset, &spec, Device::CpuVectorized, true).unwrap();
//! let b = registry.requester(&asset, &spec, Device::CpuVectorized, true).unwrap();
//! a.submit_observation(AgentId(1), AgentObservation::new(vec![vec![0.5, 0.5]])).unwrap();
//! b.submit_observation(AgentId(2), AgentObservation::new(vec![vec![0.1, 0.9]])).unwrap();
//!
//! let action = b.decide_action(AgentId(1)).unwrap();
//! assert_eq!(action.continuous().len(), 1);
//! assert_eq!(action.discrete().len(), 1);
//! assert_eq!(registry.len(), 1);
//! registry.dispose_all();
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `flock-core` | IDs, behavior specs, observations, actions, errors |
//! | [`backend`] | `flock-backend` | Backend trait, devices, tensors, reference dense backend |
//! | [`engine`] | `flock-engine` | Scheduler, registry, decision requesters |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core value types and errors (`flock-core`).
///
/// Agent and model ids, [`types::BehaviorSpec`], [`types::AgentObservation`],
/// [`types::ActionResult`], and the error taxonomy.
pub use flock_core as types;

/// Backend adapter seam (`flock-backend`).
///
/// Implement [`backend::Backend`] and [`backend::BackendProvider`] to plug
/// in an inference engine; [`backend::DenseBackend`] is the reference one.
pub use flock_backend as backend;

/// Scheduling (`flock-engine`).
///
/// [`engine::InferenceScheduler`] batches observations,
/// [`engine::SchedulerRegistry`] shares schedulers by key, and
/// [`engine::DecisionRequester`] is the per-behavior facade.
pub use flock_engine as engine;

/// Common imports for typical Flock usage.
///
/// ```rust
/// use flock::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use flock_core::{
        ActionMask, ActionResult, ActionSpec, AgentId, AgentObservation, BehaviorSpec, ModelId,
        ObservationSpec,
    };

    // Errors
    pub use flock_core::{BatchInferenceError, ModelLoadError, ShapeMismatchError};

    // Backend
    pub use flock_backend::{
        Backend, BackendProvider, DenseModel, DenseProvider, Device, ModelAsset, ModelMetadata,
    };

    // Engine
    pub use flock_engine::{
        DecisionObserver, DecisionRequester, InferenceScheduler, PolicyError, RegistryConfig,
        SchedulerConfig, SchedulerError, SchedulerHandle, SchedulerRegistry,
    };
}
