//! Behavior specification: observation shapes and action space.
//!
//! A [`BehaviorSpec`] is the fixed contract shared by every agent of one
//! behavior. Submissions are validated against it before they reach the
//! scheduler, and the model loaded for the behavior must agree with it.

use smallvec::SmallVec;

use crate::error::{ShapeMismatchError, SpecError};
use crate::observation::AgentObservation;

/// Dimensions of one sensor tensor, excluding the batch axis.
pub type Shape = SmallVec<[usize; 4]>;

/// Ordered sensor shapes for one behavior.
///
/// `AgentObservation::sensors[i]` must hold exactly
/// `sensor_len(i)` values, flattened in row-major order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObservationSpec {
    /// One shape per sensor, in submission order.
    pub sensors: Vec<Shape>,
}

impl ObservationSpec {
    /// Spec with a single flat vector sensor of `len` values.
    pub fn vector(len: usize) -> Self {
        Self {
            sensors: vec![smallvec::smallvec![len]],
        }
    }

    /// Spec from explicit sensor shapes.
    pub fn new(sensors: Vec<Shape>) -> Self {
        Self { sensors }
    }

    /// Number of sensors.
    pub fn sensor_count(&self) -> usize {
        self.sensors.len()
    }

    /// Flat length of sensor `index`, or `None` if out of range.
    pub fn sensor_len(&self, index: usize) -> Option<usize> {
        self.sensors.get(index).map(|s| s.iter().product())
    }

    /// Sum of all sensors' flat lengths.
    pub fn total_len(&self) -> usize {
        self.sensors.iter().map(|s| s.iter().product::<usize>()).sum()
    }
}

/// Shape of an agent's action output.
///
/// Continuous actions are a fixed-length `f32` vector. Discrete actions are
/// one choice per branch; `discrete_branches[b]` is the number of choices
/// in branch `b`.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct ActionSpec {
    /// Length of the continuous action vector.
    pub continuous_size: usize,
    /// Number of choices in each discrete branch.
    pub discrete_branches: SmallVec<[usize; 4]>,
}

impl ActionSpec {
    /// Continuous-only action space.
    pub fn continuous(size: usize) -> Self {
        Self {
            continuous_size: size,
            discrete_branches: SmallVec::new(),
        }
    }

    /// Discrete-only action space.
    pub fn discrete(branches: &[usize]) -> Self {
        Self {
            continuous_size: 0,
            discrete_branches: SmallVec::from_slice(branches),
        }
    }

    /// Hybrid action space.
    pub fn hybrid(continuous_size: usize, branches: &[usize]) -> Self {
        Self {
            continuous_size,
            discrete_branches: SmallVec::from_slice(branches),
        }
    }

    /// Number of discrete branches (length of the discrete action vector).
    pub fn branch_count(&self) -> usize {
        self.discrete_branches.len()
    }

    /// Total number of discrete choices across all branches.
    pub fn total_discrete_actions(&self) -> usize {
        self.discrete_branches.iter().sum()
    }

    /// Start offset of each branch within a flat logits or mask row.
    pub fn branch_offsets(&self) -> SmallVec<[usize; 4]> {
        let mut offsets = SmallVec::with_capacity(self.discrete_branches.len());
        let mut acc = 0;
        for &size in &self.discrete_branches {
            offsets.push(acc);
            acc += size;
        }
        offsets
    }

    /// Whether the spec declares no actions at all.
    pub fn is_empty(&self) -> bool {
        self.continuous_size == 0 && self.discrete_branches.is_empty()
    }
}

/// Named configuration shared by a group of agents acting identically.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BehaviorSpec {
    /// Behavior name, used in logs and conflict reports.
    pub name: String,
    /// Sensor shapes.
    pub observations: ObservationSpec,
    /// Action space.
    pub actions: ActionSpec,
}

impl BehaviorSpec {
    /// Build a behavior spec.
    pub fn new(name: impl Into<String>, observations: ObservationSpec, actions: ActionSpec) -> Self {
        Self {
            name: name.into(),
            observations,
            actions,
        }
    }

    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), SpecError> {
        if self.observations.sensors.is_empty() {
            return Err(SpecError::NoSensors);
        }
        for (i, shape) in self.observations.sensors.iter().enumerate() {
            if shape.is_empty() || shape.contains(&0) {
                return Err(SpecError::DegenerateSensor {
                    sensor: i,
                    shape: shape.to_vec(),
                });
            }
        }
        if self.actions.is_empty() {
            return Err(SpecError::NoActions);
        }
        if let Some(branch) = self.actions.discrete_branches.iter().position(|&b| b == 0) {
            return Err(SpecError::EmptyBranch { branch });
        }
        Ok(())
    }

    /// Check that `obs` fits this behavior.
    ///
    /// Rejects wrong sensor counts or lengths, non-finite sensor values,
    /// wrong mask lengths, and masks that disallow a whole branch.
    pub fn check_observation(&self, obs: &AgentObservation) -> Result<(), ShapeMismatchError> {
        let expected = self.observations.sensor_count();
        if obs.sensors.len() != expected {
            return Err(ShapeMismatchError::SensorCount {
                expected,
                actual: obs.sensors.len(),
            });
        }
        for (i, (shape, data)) in self.observations.sensors.iter().zip(&obs.sensors).enumerate() {
            let len: usize = shape.iter().product();
            if data.len() != len {
                return Err(ShapeMismatchError::SensorLength {
                    sensor: i,
                    expected: len,
                    actual: data.len(),
                });
            }
            if let Some(index) = data.iter().position(|v| !v.is_finite()) {
                return Err(ShapeMismatchError::NonFinite { sensor: i, index });
            }
        }
        if let Some(mask) = &obs.action_mask {
            let total = self.actions.total_discrete_actions();
            if mask.len() != total {
                return Err(ShapeMismatchError::MaskLength {
                    expected: total,
                    actual: mask.len(),
                });
            }
            for (branch, (&offset, &size)) in self
                .actions
                .branch_offsets()
                .iter()
                .zip(&self.actions.discrete_branches)
                .enumerate()
            {
                if (offset..offset + size).all(|i| mask.is_masked(i)) {
                    return Err(ShapeMismatchError::FullyMaskedBranch { branch });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::ActionMask;
    use proptest::prelude::*;
    use smallvec::smallvec;

    fn spec() -> BehaviorSpec {
        BehaviorSpec::new(
            "walker",
            ObservationSpec::new(vec![smallvec![4], smallvec![2, 3]]),
            ActionSpec::hybrid(2, &[3, 2]),
        )
    }

    fn obs() -> AgentObservation {
        AgentObservation::new(vec![vec![0.0; 4], vec![1.0; 6]])
    }

    #[test]
    fn valid_spec_passes() {
        assert_eq!(spec().validate(), Ok(()));
    }

    #[test]
    fn spec_without_sensors_rejected() {
        let mut s = spec();
        s.observations.sensors.clear();
        assert_eq!(s.validate(), Err(SpecError::NoSensors));
    }

    #[test]
    fn zero_dimension_rejected() {
        let mut s = spec();
        s.observations.sensors[1] = smallvec![2, 0];
        assert!(matches!(
            s.validate(),
            Err(SpecError::DegenerateSensor { sensor: 1, .. })
        ));
    }

    #[test]
    fn empty_branch_rejected() {
        let mut s = spec();
        s.actions.discrete_branches[1] = 0;
        assert_eq!(s.validate(), Err(SpecError::EmptyBranch { branch: 1 }));
    }

    #[test]
    fn empty_action_space_rejected() {
        let mut s = spec();
        s.actions = ActionSpec::default();
        assert_eq!(s.validate(), Err(SpecError::NoActions));
    }

    #[test]
    fn branch_offsets_are_prefix_sums() {
        let a = ActionSpec::discrete(&[3, 2, 4]);
        assert_eq!(a.branch_offsets().as_slice(), &[0, 3, 5]);
        assert_eq!(a.total_discrete_actions(), 9);
        assert_eq!(a.branch_count(), 3);
    }

    #[test]
    fn observation_matching_spec_accepted() {
        assert_eq!(spec().check_observation(&obs()), Ok(()));
    }

    #[test]
    fn wrong_sensor_count_rejected() {
        let o = AgentObservation::new(vec![vec![0.0; 4]]);
        assert_eq!(
            spec().check_observation(&o),
            Err(ShapeMismatchError::SensorCount {
                expected: 2,
                actual: 1
            })
        );
    }

    #[test]
    fn wrong_sensor_length_rejected() {
        let o = AgentObservation::new(vec![vec![0.0; 4], vec![1.0; 5]]);
        assert_eq!(
            spec().check_observation(&o),
            Err(ShapeMismatchError::SensorLength {
                sensor: 1,
                expected: 6,
                actual: 5
            })
        );
    }

    #[test]
    fn nan_rejected() {
        let o = AgentObservation::new(vec![vec![0.0, f32::NAN, 0.0, 0.0], vec![1.0; 6]]);
        assert_eq!(
            spec().check_observation(&o),
            Err(ShapeMismatchError::NonFinite {
                sensor: 0,
                index: 1
            })
        );
    }

    #[test]
    fn mask_length_checked() {
        let o = obs().with_mask(ActionMask::new(vec![false; 4]));
        assert_eq!(
            spec().check_observation(&o),
            Err(ShapeMismatchError::MaskLength {
                expected: 5,
                actual: 4
            })
        );
    }

    #[test]
    fn fully_masked_branch_rejected() {
        let o = obs().with_mask(ActionMask::new(vec![false, false, false, true, true]));
        assert_eq!(
            spec().check_observation(&o),
            Err(ShapeMismatchError::FullyMaskedBranch { branch: 1 })
        );
    }

    #[test]
    fn partially_masked_branch_accepted() {
        let o = obs().with_mask(ActionMask::new(vec![true, true, false, true, false]));
        assert_eq!(spec().check_observation(&o), Ok(()));
    }

    proptest! {
        #[test]
        fn total_len_matches_sensor_lengths(
            dims in prop::collection::vec(prop::collection::vec(1usize..6, 1..4), 1..5)
        ) {
            let spec = ObservationSpec::new(
                dims.iter().map(|d| Shape::from_slice(d)).collect(),
            );
            let sum: usize = (0..spec.sensor_count())
                .map(|i| spec.sensor_len(i).unwrap())
                .sum();
            prop_assert_eq!(spec.total_len(), sum);
            prop_assert_eq!(spec.sensor_len(spec.sensor_count()), None);
        }
    }
}
