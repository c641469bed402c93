//! Model assets and the metadata a backend reports after loading.

use std::sync::Arc;

use flock_core::{BehaviorSpec, ModelId, Shape};
use smallvec::SmallVec;

use crate::hash::fingerprint;

/// Opaque model bytes plus their identity.
///
/// Cheap to clone. The core never interprets `bytes`; only the backend
/// that loads the asset does.
#[derive(Clone, Debug)]
pub struct ModelAsset {
    id: ModelId,
    name: String,
    bytes: Arc<[u8]>,
}

impl ModelAsset {
    /// Wrap model bytes, fingerprinting them into a [`ModelId`].
    pub fn new(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        let bytes = bytes.into();
        Self {
            id: fingerprint(&bytes),
            name: name.into(),
            bytes,
        }
    }

    /// Fingerprint of the bytes.
    pub fn id(&self) -> ModelId {
        self.id
    }

    /// Human-readable name, used in logs only.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw model bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// What a loaded model consumes and produces, per agent row.
///
/// Inputs: one tensor per sensor, then `memory_size` memory values when
/// the model is recurrent, then one previous discrete action per branch
/// when `uses_previous_action` is set.
///
/// Outputs: `continuous_size` means, `continuous_size` log standard
/// deviations when `has_log_std` is set, one logit per discrete action
/// across all branches, then `memory_size` new memory values.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct ModelMetadata {
    /// Expected sensor shapes, excluding the batch axis.
    pub sensor_shapes: Vec<Shape>,
    /// Length of the continuous action vector.
    pub continuous_size: usize,
    /// Number of choices per discrete branch.
    pub discrete_branches: SmallVec<[usize; 4]>,
    /// Per-agent recurrent memory size; zero for feed-forward models.
    pub memory_size: usize,
    /// Whether the model takes the previous discrete action as input.
    pub uses_previous_action: bool,
    /// Whether the model outputs continuous log standard deviations.
    pub has_log_std: bool,
}

impl ModelMetadata {
    /// Feed-forward metadata matching `spec` exactly.
    pub fn for_spec(spec: &BehaviorSpec) -> Self {
        Self {
            sensor_shapes: spec.observations.sensors.clone(),
            continuous_size: spec.actions.continuous_size,
            discrete_branches: spec.actions.discrete_branches.clone(),
            memory_size: 0,
            uses_previous_action: false,
            has_log_std: false,
        }
    }

    /// Total number of discrete logits per row.
    pub fn total_discrete_actions(&self) -> usize {
        self.discrete_branches.iter().sum()
    }

    /// Flat input length per row across every input tensor.
    pub fn input_len(&self) -> usize {
        let sensors: usize = self
            .sensor_shapes
            .iter()
            .map(|s| s.iter().product::<usize>())
            .sum();
        let prev = if self.uses_previous_action {
            self.discrete_branches.len()
        } else {
            0
        };
        sensors + self.memory_size + prev
    }

    /// Flat output length per row across every output tensor.
    pub fn output_len(&self) -> usize {
        let log_std = if self.has_log_std {
            self.continuous_size
        } else {
            0
        };
        self.continuous_size + log_std + self.total_discrete_actions() + self.memory_size
    }

    /// Compare against a behavior spec.
    ///
    /// Returns every mismatch found; empty means compatible.
    pub fn check_compatibility(&self, spec: &BehaviorSpec) -> Vec<String> {
        let mut failures = Vec::new();
        let sensors = &spec.observations.sensors;
        if self.sensor_shapes.len() != sensors.len() {
            failures.push(format!(
                "model expects {} sensors, behavior provides {}",
                self.sensor_shapes.len(),
                sensors.len()
            ));
        }
        for (i, (model, behavior)) in self.sensor_shapes.iter().zip(sensors).enumerate() {
            if model != behavior {
                failures.push(format!(
                    "sensor {i}: model expects shape {:?}, behavior provides {:?}",
                    model.as_slice(),
                    behavior.as_slice()
                ));
            }
        }
        if self.continuous_size != spec.actions.continuous_size {
            failures.push(format!(
                "model outputs {} continuous actions, behavior declares {}",
                self.continuous_size, spec.actions.continuous_size
            ));
        }
        if self.discrete_branches != spec.actions.discrete_branches {
            failures.push(format!(
                "model discrete branches {:?} differ from behavior branches {:?}",
                self.discrete_branches.as_slice(),
                spec.actions.discrete_branches.as_slice()
            ));
        }
        failures
    }
}
