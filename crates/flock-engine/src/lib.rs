//! Shared batched inference for many agents.
//!
//! Requesters submit per-agent observations at arbitrary times within a
//! step; the [`InferenceScheduler`] bound to their model runs one batched
//! forward pass over everything buffered and routes each agent's action
//! back by identity. A [`SchedulerRegistry`] ensures every requester using
//! the same model, device and determinism flag shares one scheduler.
//!
//! # Example
//!
//! ```
//! use flock_backend::{DenseModel, DenseProvider, Device, ModelMetadata};
//! use flock_core::{ActionSpec, AgentId, AgentObservation, BehaviorSpec, ObservationSpec};
//! use flock_engine::{RegistryConfig, SchedulerRegistry};
//!
//! let spec = BehaviorSpec::new("walker", ObservationSpec::vector(3), ActionSpec::continuous(2));
//! let asset = DenseModel::zeros(ModelMetadata::for_spec(&spec)).to_asset("walker");
//! let registry = SchedulerRegistry::new(DenseProvider, RegistryConfig::default()).unwrap();
//!
//! let policy = registry.requester(&asset, &spec, Device::Default, true).unwrap();
//! policy
//!     .submit_observation(AgentId(7), AgentObservation::new(vec![vec![0.1, 0.2, 0.3]]))
//!     .unwrap();
//! let action = policy.decide_action(AgentId(7)).unwrap();
//! assert_eq!(action.continuous().len(), 2);
//! assert!(policy.decide_action(AgentId(8)).unwrap().is_empty());
//! ```

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod batch;
mod carry;
pub mod config;
mod decode;
pub mod metrics;
pub mod observer;
pub mod policy;
pub mod registry;
pub mod scheduler;

pub use batch::{DecidedBatch, PendingBatch};
pub use config::{ConfigError, RegistryConfig, SchedulerConfig};
pub use metrics::{BatchMetrics, SchedulerStats};
pub use observer::DecisionObserver;
pub use policy::{DecisionRequester, PolicyError};
pub use registry::{SchedulerKey, SchedulerRegistry};
pub use scheduler::{
    BatchOutcome, InferenceScheduler, SchedulerError, SchedulerHandle, SchedulerPhase,
};
