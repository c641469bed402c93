//! Batched forward-pass inputs and outputs.

use flock_core::BackendError;

use crate::model::ModelMetadata;
use crate::tensor::BatchTensor;

/// Inputs for one forward pass. Every tensor has the same batch size.
#[derive(Clone, Debug, PartialEq)]
pub struct BatchInputs {
    /// One tensor per sensor, shaped `[batch, dims...]`.
    pub sensors: Vec<BatchTensor>,
    /// Recurrent memory, `[batch, memory_size]`.
    pub memory: Option<BatchTensor>,
    /// Previous discrete actions as floats, `[batch, branches]`.
    pub previous_action: Option<BatchTensor>,
}

impl BatchInputs {
    /// Number of agent rows.
    pub fn batch_size(&self) -> usize {
        self.sensors.first().map_or(0, BatchTensor::batch_size)
    }

    /// Check the inputs against the model's declared layout.
    pub fn check(&self, metadata: &ModelMetadata) -> Result<(), BackendError> {
        if self.sensors.len() != metadata.sensor_shapes.len() {
            return Err(BackendError::InputMismatch {
                reason: format!(
                    "{} sensor tensors for a model with {} sensors",
                    self.sensors.len(),
                    metadata.sensor_shapes.len()
                ),
            });
        }
        let batch = self.batch_size();
        for (i, (tensor, shape)) in self.sensors.iter().zip(&metadata.sensor_shapes).enumerate() {
            if tensor.batch_size() != batch || tensor.shape()[1..] != shape[..] {
                return Err(BackendError::InputMismatch {
                    reason: format!(
                        "sensor {i}: got shape {:?}, expected [{batch}, {:?}]",
                        tensor.shape(),
                        shape.as_slice()
                    ),
                });
            }
        }
        check_optional(
            "memory",
            self.memory.as_ref(),
            batch,
            metadata.memory_size,
            metadata.memory_size > 0,
            input_mismatch,
        )?;
        check_optional(
            "previous_action",
            self.previous_action.as_ref(),
            batch,
            metadata.discrete_branches.len(),
            metadata.uses_previous_action,
            input_mismatch,
        )
    }
}

/// Outputs of one forward pass, aligned row-for-row with the inputs.
#[derive(Clone, Debug, PartialEq)]
pub struct BatchOutputs {
    /// Continuous action means, `[batch, continuous_size]`.
    pub continuous_mean: BatchTensor,
    /// Continuous log standard deviations, `[batch, continuous_size]`.
    pub continuous_log_std: Option<BatchTensor>,
    /// Discrete logits for all branches, `[batch, total_discrete_actions]`.
    pub discrete_logits: BatchTensor,
    /// Next recurrent memory, `[batch, memory_size]`.
    pub memory: Option<BatchTensor>,
}

impl BatchOutputs {
    /// Check the outputs against the model's declared layout for a batch
    /// of `batch` rows.
    ///
    /// # Errors
    ///
    /// [`BackendError::MalformedOutput`] naming the first bad tensor.
    pub fn check(&self, batch: usize, metadata: &ModelMetadata) -> Result<(), BackendError> {
        check_required(
            "continuous_mean",
            &self.continuous_mean,
            batch,
            metadata.continuous_size,
            malformed,
        )?;
        check_optional(
            "continuous_log_std",
            self.continuous_log_std.as_ref(),
            batch,
            metadata.continuous_size,
            metadata.has_log_std,
            malformed,
        )?;
        check_required(
            "discrete_logits",
            &self.discrete_logits,
            batch,
            metadata.total_discrete_actions(),
            malformed,
        )?;
        check_optional(
            "memory",
            self.memory.as_ref(),
            batch,
            metadata.memory_size,
            metadata.memory_size > 0,
            malformed,
        )
    }
}

fn input_mismatch(reason: String) -> BackendError {
    BackendError::InputMismatch { reason }
}

fn malformed(reason: String) -> BackendError {
    BackendError::MalformedOutput { reason }
}

fn check_required(
    name: &str,
    tensor: &BatchTensor,
    batch: usize,
    row_len: usize,
    err: fn(String) -> BackendError,
) -> Result<(), BackendError> {
    if tensor.batch_size() != batch || tensor.row_len() != row_len {
        return Err(err(format!(
            "{name}: got shape {:?}, expected [{batch}, {row_len}]",
            tensor.shape()
        )));
    }
    Ok(())
}

fn check_optional(
    name: &str,
    tensor: Option<&BatchTensor>,
    batch: usize,
    row_len: usize,
    expected: bool,
    err: fn(String) -> BackendError,
) -> Result<(), BackendError> {
    match (tensor, expected) {
        (Some(t), true) => check_required(name, t, batch, row_len, err),
        (None, false) => Ok(()),
        (Some(_), false) => Err(err(format!("{name}: unexpected tensor"))),
        (None, true) => Err(err(format!("{name}: missing tensor"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flock_core::{ActionSpec, BehaviorSpec, ObservationSpec};

    fn metadata() -> ModelMetadata {
        ModelMetadata::for_spec(&BehaviorSpec::new(
            "b",
            ObservationSpec::vector(3),
            ActionSpec::hybrid(2, &[2, 3]),
        ))
    }

    fn outputs(batch: usize) -> BatchOutputs {
        BatchOutputs {
            continuous_mean: BatchTensor::zeros(batch, &[2]),
            continuous_log_std: None,
            discrete_logits: BatchTensor::zeros(batch, &[5]),
            memory: None,
        }
    }

    #[test]
    fn well_formed_outputs_pass() {
        assert_eq!(outputs(4).check(4, &metadata()), Ok(()));
    }

    #[test]
    fn wrong_batch_is_malformed() {
        let err = outputs(3).check(4, &metadata()).unwrap_err();
        match err {
            BackendError::MalformedOutput { reason } => {
                assert!(reason.starts_with("continuous_mean"), "{reason}")
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn missing_memory_is_malformed() {
        let mut m = metadata();
        m.memory_size = 4;
        let err = outputs(2).check(2, &m).unwrap_err();
        assert_eq!(
            err,
            BackendError::MalformedOutput {
                reason: "memory: missing tensor".into()
            }
        );
    }

    #[test]
    fn inputs_check_sensor_shapes() {
        let inputs = BatchInputs {
            sensors: vec![BatchTensor::zeros(2, &[4])],
            memory: None,
            previous_action: None,
        };
        assert!(matches!(
            inputs.check(&metadata()),
            Err(BackendError::InputMismatch { .. })
        ));
        let ok = BatchInputs {
            sensors: vec![BatchTensor::zeros(2, &[3])],
            memory: None,
            previous_action: None,
        };
        assert_eq!(ok.check(&metadata()), Ok(()));
        assert_eq!(ok.batch_size(), 2);
    }
}
