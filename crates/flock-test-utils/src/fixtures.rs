//! Spec, model and observation fixtures.

use flock_backend::{DenseModel, ModelAsset, ModelMetadata};
use flock_core::{ActionSpec, AgentObservation, BehaviorSpec, ObservationSpec};

/// One vector sensor of `obs_len` values, `continuous` continuous actions.
pub fn continuous_spec(obs_len: usize, continuous: usize) -> BehaviorSpec {
    BehaviorSpec::new(
        "continuous",
        ObservationSpec::vector(obs_len),
        ActionSpec::continuous(continuous),
    )
}

/// One vector sensor of `obs_len` values, discrete branches only.
pub fn discrete_spec(obs_len: usize, branches: &[usize]) -> BehaviorSpec {
    BehaviorSpec::new(
        "discrete",
        ObservationSpec::vector(obs_len),
        ActionSpec::discrete(branches),
    )
}

/// One vector sensor, continuous and discrete actions.
pub fn hybrid_spec(obs_len: usize, continuous: usize, branches: &[usize]) -> BehaviorSpec {
    BehaviorSpec::new(
        "hybrid",
        ObservationSpec::vector(obs_len),
        ActionSpec::hybrid(continuous, branches),
    )
}

/// An all-zero dense model exactly matching `spec`.
pub fn model_asset(spec: &BehaviorSpec) -> ModelAsset {
    DenseModel::zeros(ModelMetadata::for_spec(spec)).to_asset(spec.name.clone())
}

/// A dense model for `spec` whose continuous outputs copy the leading
/// observation values and whose logits favor action index 0 of every
/// branch by `bias`.
pub fn echo_model(spec: &BehaviorSpec, bias: f32) -> DenseModel {
    let meta = ModelMetadata::for_spec(spec);
    let c = meta.continuous_size;
    let logits = meta.total_discrete_actions();
    let offsets = spec.actions.branch_offsets();
    let mut model = DenseModel::zeros(meta);
    for k in 0..c {
        if let Some(w) = model.weight_mut(k, k) {
            *w = 1.0;
        }
    }
    for &offset in &offsets {
        if offset < logits {
            if let Some(b) = model.bias_mut(c + offset) {
                *b = bias;
            }
        }
    }
    model
}

/// Single-sensor observation.
pub fn vector_obs(values: &[f32]) -> AgentObservation {
    AgentObservation::new(vec![values.to_vec()])
}
