//! Test utilities and mock types for Flock development.
//!
//! Provides [`MockBackend`], a scripted [`Backend`] whose outputs depend
//! only on each agent's own input row, plus spec and observation
//! [`fixtures`].

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use flock_backend::{
    Backend, BackendProvider, BatchInputs, BatchOutputs, BatchTensor, DenseModel, Device,
    LoadedModel, ModelAsset, ModelHandle, ModelMetadata,
};
use flock_core::BackendError;

#[derive(Default)]
struct MockState {
    metadata_override: Option<ModelMetadata>,
    memory_size: usize,
    fail_next: Option<String>,
    fail_always: bool,
    truncate_outputs: bool,
    loads: usize,
    released: usize,
    batch_sizes: Vec<usize>,
    last_memory_input: Vec<f32>,
    next_handle: u64,
    live: HashSet<u64>,
    metadata: Vec<(u64, ModelMetadata)>,
}

/// Scripted backend for scheduler tests.
///
/// Clones share state, so a test keeps one clone as a probe after
/// handing the other to a scheduler.
///
/// Output rules, per row with `x` = the row's first sensor value:
/// - every continuous mean is `x`, log-std (if declared) is zero;
/// - logit `j` of each branch is `-|j - x|`, so deterministic selection
///   picks the action index nearest `x`;
/// - every new memory value is the old memory value plus `x`.
///
/// Metadata is decoded from the asset's dense-model header unless
/// overridden with [`with_metadata`](Self::with_metadata).
#[derive(Clone, Default)]
pub struct MockBackend {
    device: Device,
    state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `metadata` for every load instead of decoding the asset.
    pub fn with_metadata(metadata: ModelMetadata) -> Self {
        let b = Self::new();
        b.lock().metadata_override = Some(metadata);
        b
    }

    /// Report a recurrent model with `memory_size` memory values per agent.
    pub fn recurrent(memory_size: usize) -> Self {
        let b = Self::new();
        b.lock().memory_size = memory_size;
        b
    }

    pub fn on_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the next `forward` call fail with `reason`.
    pub fn fail_next_forward(&self, reason: &str) {
        self.lock().fail_next = Some(reason.to_owned());
    }

    /// Make every `forward` call fail.
    pub fn fail_always(&self, on: bool) {
        self.lock().fail_always = on;
    }

    /// Drop the last row of every continuous output, producing outputs
    /// whose batch size disagrees with the inputs.
    pub fn truncate_outputs(&self, on: bool) {
        self.lock().truncate_outputs = on;
    }

    pub fn loads(&self) -> usize {
        self.lock().loads
    }

    pub fn released(&self) -> usize {
        self.lock().released
    }

    pub fn forward_calls(&self) -> usize {
        self.lock().batch_sizes.len()
    }

    /// Row count of every `forward` call so far, in call order.
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.lock().batch_sizes.clone()
    }

    /// Flat memory input of the most recent `forward` call.
    pub fn last_memory_input(&self) -> Vec<f32> {
        self.lock().last_memory_input.clone()
    }
}

fn first_value(inputs: &BatchInputs, row: usize) -> f32 {
    inputs
        .sensors
        .first()
        .and_then(|t| t.row(row))
        .and_then(|r| r.first())
        .copied()
        .unwrap_or(0.0)
}

impl Backend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    fn device(&self) -> Device {
        self.device
    }

    fn load_model(&mut self, asset: &ModelAsset) -> Result<LoadedModel, BackendError> {
        let mut state = self.lock();
        let mut metadata = match &state.metadata_override {
            Some(m) => m.clone(),
            None => DenseModel::from_bytes(asset.bytes())?.metadata().clone(),
        };
        if state.memory_size > 0 {
            metadata.memory_size = state.memory_size;
        }
        state.loads += 1;
        state.next_handle += 1;
        let raw = state.next_handle;
        state.live.insert(raw);
        state.metadata.push((raw, metadata.clone()));
        Ok(LoadedModel {
            handle: ModelHandle::from_raw(raw),
            metadata,
        })
    }

    fn forward(
        &mut self,
        model: ModelHandle,
        inputs: &BatchInputs,
    ) -> Result<BatchOutputs, BackendError> {
        let mut state = self.lock();
        if !state.live.contains(&model.raw()) {
            return Err(BackendError::Released);
        }
        let Some(meta) = state
            .metadata
            .iter()
            .find(|(raw, _)| *raw == model.raw())
            .map(|(_, m)| m.clone())
        else {
            return Err(BackendError::UnknownModel);
        };
        inputs.check(&meta)?;

        let batch = inputs.batch_size();
        state.batch_sizes.push(batch);
        state.last_memory_input = inputs
            .memory
            .as_ref()
            .map(|t| t.data().to_vec())
            .unwrap_or_default();
        if let Some(reason) = state.fail_next.take() {
            return Err(BackendError::Execution { reason });
        }
        if state.fail_always {
            return Err(BackendError::Execution {
                reason: "mock backend configured to fail".into(),
            });
        }

        let c = meta.continuous_size;
        let mut mean = BatchTensor::zeros(batch, &[c]);
        let mut logits = BatchTensor::zeros(batch, &[meta.total_discrete_actions()]);
        let mut memory = (meta.memory_size > 0).then(|| BatchTensor::zeros(batch, &[meta.memory_size]));
        for r in 0..batch {
            let x = first_value(inputs, r);
            if let Some(row) = mean.row_mut(r) {
                row.fill(x);
            }
            if let Some(row) = logits.row_mut(r) {
                let mut j = 0usize;
                for &size in &meta.discrete_branches {
                    for k in 0..size {
                        row[j] = -((k as f32) - x).abs();
                        j += 1;
                    }
                }
            }
            if let (Some(out), Some(prev)) = (
                memory.as_mut().and_then(|t| t.row_mut(r)),
                inputs.memory.as_ref().and_then(|t| t.row(r)),
            ) {
                for (o, p) in out.iter_mut().zip(prev) {
                    *o = p + x;
                }
            }
        }
        if state.truncate_outputs && batch > 0 {
            mean = BatchTensor::zeros(batch - 1, &[c]);
        }
        Ok(BatchOutputs {
            continuous_mean: mean,
            continuous_log_std: meta.has_log_std.then(|| BatchTensor::zeros(batch, &[c])),
            discrete_logits: logits,
            memory,
        })
    }

    fn release(&mut self, model: ModelHandle) -> Result<(), BackendError> {
        let mut state = self.lock();
        if !state.live.remove(&model.raw()) {
            return Err(BackendError::Released);
        }
        state.released += 1;
        Ok(())
    }
}

/// Provider handing out clones of one shared [`MockBackend`], so a test
/// can observe every backend context the registry creates.
#[derive(Clone, Default)]
pub struct MockProvider {
    backend: MockBackend,
    created: Arc<Mutex<Vec<Device>>>,
}

impl MockProvider {
    pub fn new(backend: MockBackend) -> Self {
        Self {
            backend,
            created: Arc::default(),
        }
    }

    /// The shared backend probe.
    pub fn backend(&self) -> &MockBackend {
        &self.backend
    }

    /// Devices of every context created so far.
    pub fn created(&self) -> Vec<Device> {
        self.created
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl BackendProvider for MockProvider {
    fn create(&self, device: Device) -> Box<dyn Backend> {
        self.created
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(device);
        Box::new(self.backend.clone().on_device(device))
    }
}
