//! Benchmark profiles for the Flock scheduler.
//!
//! - [`reference_profile`]: 16-value observations, 2 continuous actions,
//!   two discrete branches, random dense weights
//! - [`recurrent_profile`]: the reference profile plus 32 memory values
//!   and previous-action input
//! - [`agent_observations`]: deterministic per-agent observations via seed

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use flock_backend::{DenseModel, ModelMetadata};
use flock_core::{ActionSpec, AgentId, AgentObservation, BehaviorSpec, ObservationSpec};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Observation length of every profile.
pub const OBS_LEN: usize = 16;

/// A behavior with a matching model.
pub struct BenchProfile {
    /// Behavior the model decides for.
    pub spec: BehaviorSpec,
    /// Dense model with weights drawn from `[-0.5, 0.5)`.
    pub model: DenseModel,
}

fn random_model(metadata: ModelMetadata, seed: u64) -> DenseModel {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let n_in = metadata.input_len();
    let n_out = metadata.output_len();
    let mut model = DenseModel::zeros(metadata);
    for o in 0..n_out {
        for i in 0..n_in {
            if let Some(w) = model.weight_mut(o, i) {
                *w = rng.random::<f32>() - 0.5;
            }
        }
    }
    model
}

/// Feed-forward reference profile.
pub fn reference_profile(seed: u64) -> BenchProfile {
    let spec = BehaviorSpec::new(
        "reference",
        ObservationSpec::vector(OBS_LEN),
        ActionSpec::hybrid(2, &[3, 5]),
    );
    let mut meta = ModelMetadata::for_spec(&spec);
    meta.has_log_std = true;
    BenchProfile {
        model: random_model(meta, seed),
        spec,
    }
}

/// Recurrent profile: reference shapes plus memory and previous action.
pub fn recurrent_profile(seed: u64) -> BenchProfile {
    let mut profile = reference_profile(seed);
    let mut meta = profile.model.metadata().clone();
    meta.memory_size = 32;
    meta.uses_previous_action = true;
    profile.model = random_model(meta, seed);
    profile
}

/// `n` agents with observations in `[-1, 1)`, identical for identical seeds.
pub fn agent_observations(n: u64, seed: u64) -> Vec<(AgentId, AgentObservation)> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..n)
        .map(|i| {
            let values = (0..OBS_LEN).map(|_| rng.random::<f32>() * 2.0 - 1.0).collect();
            (AgentId(i), AgentObservation::new(vec![values]))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profiles_are_self_consistent() {
        let p = reference_profile(1);
        assert!(p.model.metadata().check_compatibility(&p.spec).is_empty());
        let r = recurrent_profile(1);
        assert!(r.model.metadata().check_compatibility(&r.spec).is_empty());
        assert_eq!(r.model.metadata().memory_size, 32);
    }

    #[test]
    fn observations_are_deterministic() {
        assert_eq!(agent_observations(8, 3), agent_observations(8, 3));
        let spec = reference_profile(0).spec;
        for (_, obs) in agent_observations(8, 3) {
            assert_eq!(spec.check_observation(&obs), Ok(()));
        }
    }
}
