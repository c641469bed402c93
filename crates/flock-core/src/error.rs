//! Error types for Flock, organized by subsystem.
//!
//! Submission (`ShapeMismatchError`), behavior configuration
//! (`SpecError`), the backend seam (`BackendError`), scheduler
//! construction (`ModelLoadError`), and batch execution
//! (`BatchInferenceError`).
//!
//! "No decision yet" is deliberately absent: an agent with no decision
//! receives an empty [`ActionResult`](crate::ActionResult), never an error.

use thiserror::Error;

use crate::id::ModelId;

/// A submitted observation does not fit the behavior spec.
///
/// Local to one submission: the observation is rejected and the agent
/// receives no action this step. The scheduler keeps running.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ShapeMismatchError {
    /// Wrong number of sensor tensors.
    #[error("expected {expected} sensor tensors, got {actual}")]
    SensorCount {
        /// Sensor count declared by the spec.
        expected: usize,
        /// Sensor count in the observation.
        actual: usize,
    },
    /// A sensor tensor has the wrong flat length.
    #[error("sensor {sensor}: expected {expected} values, got {actual}")]
    SensorLength {
        /// Index of the offending sensor.
        sensor: usize,
        /// Product of the sensor's declared shape.
        expected: usize,
        /// Length of the submitted data.
        actual: usize,
    },
    /// A sensor value is NaN or infinite.
    #[error("sensor {sensor}: non-finite value at index {index}")]
    NonFinite {
        /// Index of the offending sensor.
        sensor: usize,
        /// Index of the first non-finite value.
        index: usize,
    },
    /// The action mask length differs from the total discrete action count.
    #[error("action mask has {actual} entries, spec has {expected} discrete actions")]
    MaskLength {
        /// Sum of the discrete branch sizes.
        expected: usize,
        /// Length of the submitted mask.
        actual: usize,
    },
    /// Every action of a discrete branch is masked.
    #[error("action mask disallows every action of branch {branch}")]
    FullyMaskedBranch {
        /// Index of the fully masked branch.
        branch: usize,
    },
}

/// A [`BehaviorSpec`](crate::BehaviorSpec) is malformed.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SpecError {
    /// The observation spec declares no sensors.
    #[error("observation spec has no sensors")]
    NoSensors,
    /// A sensor shape is empty or contains a zero dimension.
    #[error("sensor {sensor} has a degenerate shape {shape:?}")]
    DegenerateSensor {
        /// Index of the offending sensor.
        sensor: usize,
        /// The declared shape.
        shape: Vec<usize>,
    },
    /// A discrete branch has zero actions.
    #[error("discrete branch {branch} has zero actions")]
    EmptyBranch {
        /// Index of the empty branch.
        branch: usize,
    },
    /// Neither continuous nor discrete actions are declared.
    #[error("action spec declares no actions")]
    NoActions,
}

/// Errors reported by a backend adapter.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The model bytes could not be decoded or initialized.
    #[error("invalid model: {reason}")]
    InvalidModel {
        /// Description of the decode failure.
        reason: String,
    },
    /// The model handle was never issued by this backend.
    #[error("unknown model handle")]
    UnknownModel,
    /// The model handle was already released.
    #[error("model handle already released")]
    Released,
    /// Batched inputs do not match what the model expects.
    #[error("input mismatch: {reason}")]
    InputMismatch {
        /// Description of the mismatch.
        reason: String,
    },
    /// Batched outputs do not match what the model declared.
    #[error("malformed output: {reason}")]
    MalformedOutput {
        /// Description of the malformed tensor.
        reason: String,
    },
    /// The forward pass itself failed.
    #[error("execution failed: {reason}")]
    Execution {
        /// Description of the failure.
        reason: String,
    },
}

/// Constructing a scheduler failed. Nothing was registered.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ModelLoadError {
    /// The behavior spec itself is malformed.
    #[error("invalid behavior spec: {0}")]
    InvalidSpec(#[from] SpecError),
    /// The backend rejected the model.
    #[error("model {model}: backend load failed: {source}")]
    Backend {
        /// The model being loaded.
        model: ModelId,
        /// The backend's error.
        #[source]
        source: BackendError,
    },
    /// The model loaded but does not fit the behavior spec.
    #[error("model {model} is incompatible with the behavior spec: {}", .failures.join("; "))]
    Incompatible {
        /// The model being loaded.
        model: ModelId,
        /// Every mismatch found, in check order.
        failures: Vec<String>,
    },
    /// A scheduler for the same key exists with a different behavior spec.
    #[error("model {model} is already bound to behavior '{existing}', cannot rebind to '{requested}'")]
    SpecConflict {
        /// The shared model.
        model: ModelId,
        /// Behavior name of the existing scheduler.
        existing: String,
        /// Behavior name of the rejected request.
        requested: String,
    },
    /// The scheduler configuration is invalid.
    #[error("invalid scheduler config: {reason}")]
    InvalidConfig {
        /// Description of the invalid setting.
        reason: String,
    },
    /// The registry was disposed; no new schedulers are created.
    #[error("scheduler registry has been disposed")]
    RegistryDisposed,
}

/// The batched forward pass failed.
///
/// Fatal to the scheduler instance that raised it. Carries enough context
/// for the host to decide whether to disable learned behavior for the
/// affected agents.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("batch inference on model {model} failed for {agent_count} agents: {source}")]
pub struct BatchInferenceError {
    /// The model that failed.
    pub model: ModelId,
    /// Number of agents in the failed batch.
    pub agent_count: usize,
    /// The backend's error.
    #[source]
    pub source: BackendError,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn batch_inference_error_exposes_backend_source() {
        let err = BatchInferenceError {
            model: ModelId(1),
            agent_count: 3,
            source: BackendError::Execution {
                reason: "device lost".into(),
            },
        };
        let msg = err.to_string();
        assert!(msg.contains("3 agents"), "got: {msg}");
        assert!(msg.contains("0000000000000001"), "got: {msg}");
        assert!(err.source().is_some());
    }

    #[test]
    fn incompatible_lists_every_failure() {
        let err = ModelLoadError::Incompatible {
            model: ModelId(2),
            failures: vec!["a".into(), "b".into()],
        };
        assert!(err.to_string().ends_with("a; b"));
    }

    #[test]
    fn spec_error_converts_into_load_error() {
        let err: ModelLoadError = SpecError::NoSensors.into();
        assert_eq!(err, ModelLoadError::InvalidSpec(SpecError::NoSensors));
    }
}
