//! Reference CPU inference engine.
//!
//! [`DenseModel`] is a single dense layer, `y = b + W x`, over the
//! concatenation of every input tensor of one agent row. The output row is
//! split into the tensors described by [`ModelMetadata`].
//!
//! [`DenseBackend`] maps each [`Device`] to an execution strategy over the
//! same math. Every strategy computes each output element with the same
//! left-to-right dot product, so results are bit-identical across devices.

use flock_core::BackendError;
use smallvec::smallvec;

use crate::backend::{Backend, BackendProvider, LoadedModel, ModelHandle};
use crate::codec;
use crate::device::Device;
use crate::handle::{HandleTable, Stale};
use crate::io::{BatchInputs, BatchOutputs};
use crate::model::{ModelAsset, ModelMetadata};
use crate::tensor::BatchTensor;

// ── DenseModel ──────────────────────────────────────────────────

/// A single-layer dense policy.
#[derive(Clone, Debug, PartialEq)]
pub struct DenseModel {
    metadata: ModelMetadata,
    /// `output_len x input_len`, row-major by output.
    weights: Vec<f32>,
    bias: Vec<f32>,
}

impl DenseModel {
    /// Build a model from explicit parameters.
    ///
    /// # Errors
    ///
    /// [`BackendError::InvalidModel`] if `weights` or `bias` have the wrong
    /// length for `metadata`.
    pub fn new(
        metadata: ModelMetadata,
        weights: Vec<f32>,
        bias: Vec<f32>,
    ) -> Result<Self, BackendError> {
        let (n_in, n_out) = (metadata.input_len(), metadata.output_len());
        if weights.len() != n_in * n_out {
            return Err(BackendError::InvalidModel {
                reason: format!(
                    "weights have {} values, expected {n_out}x{n_in}",
                    weights.len()
                ),
            });
        }
        if bias.len() != n_out {
            return Err(BackendError::InvalidModel {
                reason: format!("bias has {} values, expected {n_out}", bias.len()),
            });
        }
        Ok(Self {
            metadata,
            weights,
            bias,
        })
    }

    /// All-zero parameters for `metadata`.
    pub fn zeros(metadata: ModelMetadata) -> Self {
        let (n_in, n_out) = (metadata.input_len(), metadata.output_len());
        Self {
            metadata,
            weights: vec![0.0; n_in * n_out],
            bias: vec![0.0; n_out],
        }
    }

    /// Decode a model from its binary layout (see [`codec`](crate::codec)).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BackendError> {
        let (metadata, weights, bias) = codec::decode(bytes)?;
        Self::new(metadata, weights, bias)
    }

    /// Encode this model into its binary layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        codec::encode(&self.metadata, &self.weights, &self.bias)
    }

    /// Encode and wrap as a [`ModelAsset`].
    pub fn to_asset(&self, name: impl Into<String>) -> ModelAsset {
        ModelAsset::new(name, self.to_bytes())
    }

    /// Declared inputs and outputs.
    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    /// Mutable weight for output `out` and input `inp`.
    pub fn weight_mut(&mut self, out: usize, inp: usize) -> Option<&mut f32> {
        let n_in = self.metadata.input_len();
        if inp >= n_in {
            return None;
        }
        self.weights.get_mut(out * n_in + inp)
    }

    /// Mutable bias for output `out`.
    pub fn bias_mut(&mut self, out: usize) -> Option<&mut f32> {
        self.bias.get_mut(out)
    }

    /// Compute output rows `rows` of `ys` from the matching rows of `xs`.
    fn compute_rows(&self, xs: &[f32], ys: &mut [f32], rows: std::ops::Range<usize>) {
        let n_in = self.metadata.input_len();
        let n_out = self.metadata.output_len();
        for (local, r) in rows.enumerate() {
            let x = &xs[r * n_in..(r + 1) * n_in];
            let y = &mut ys[local * n_out..(local + 1) * n_out];
            for (o, slot) in y.iter_mut().enumerate() {
                *slot = self.output_element(x, o);
            }
        }
    }

    #[inline]
    fn output_element(&self, x: &[f32], o: usize) -> f32 {
        let n_in = x.len();
        let w = &self.weights[o * n_in..(o + 1) * n_in];
        let mut acc = 0.0f32;
        for (wi, xi) in w.iter().zip(x) {
            acc += wi * xi;
        }
        self.bias[o] + acc
    }
}

// ── Execution strategies ────────────────────────────────────────

/// Row chunk size for the vectorized CPU path.
const ROW_CHUNK: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Strategy {
    /// One output element at a time, output-major (legacy pixel path).
    PerElement,
    /// Fixed-size row chunks (vectorized CPU).
    RowChunked,
    /// Rows split across scoped worker threads (GPU compute stand-in).
    Threaded { workers: usize },
}

impl Strategy {
    fn for_device(device: Device) -> Self {
        match device.resolve() {
            Device::GpuPixel => Strategy::PerElement,
            Device::GpuCompute => {
                let cpus = std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(4);
                Strategy::Threaded {
                    workers: cpus.clamp(1, 16),
                }
            }
            _ => Strategy::RowChunked,
        }
    }
}

// ── DenseBackend ────────────────────────────────────────────────

/// Backend context executing [`DenseModel`]s.
pub struct DenseBackend {
    device: Device,
    strategy: Strategy,
    models: HandleTable<DenseModel>,
    forward_calls: u64,
}

impl DenseBackend {
    /// Create a context for `device`.
    pub fn new(device: Device) -> Self {
        Self {
            device,
            strategy: Strategy::for_device(device),
            models: HandleTable::new(),
            forward_calls: 0,
        }
    }

    /// Number of models currently loaded.
    pub fn loaded_models(&self) -> usize {
        self.models.len()
    }

    /// Number of forward passes executed so far.
    pub fn forward_calls(&self) -> u64 {
        self.forward_calls
    }

    fn model(&self, handle: ModelHandle) -> Result<&DenseModel, BackendError> {
        self.models.get(handle).map_err(stale_error)
    }
}

fn stale_error(stale: Stale) -> BackendError {
    match stale {
        Stale::Unknown => BackendError::UnknownModel,
        Stale::Released => BackendError::Released,
    }
}

/// Concatenate every input tensor into one `[batch, input_len]` matrix.
fn concat_inputs(inputs: &BatchInputs, n_in: usize) -> Vec<f32> {
    let batch = inputs.batch_size();
    let mut xs = Vec::with_capacity(batch * n_in);
    for r in 0..batch {
        let tensors = inputs
            .sensors
            .iter()
            .chain(inputs.memory.as_ref())
            .chain(inputs.previous_action.as_ref());
        for t in tensors {
            if let Some(row) = t.row(r) {
                xs.extend_from_slice(row);
            }
        }
    }
    xs
}

/// Copy columns `cols` of a `[batch, n_out]` matrix into a new tensor.
fn slice_columns(ys: &[f32], batch: usize, n_out: usize, cols: std::ops::Range<usize>) -> BatchTensor {
    let width = cols.len();
    let mut t = BatchTensor::zeros(batch, &[width]);
    for r in 0..batch {
        if let Some(dst) = t.row_mut(r) {
            dst.copy_from_slice(&ys[r * n_out + cols.start..r * n_out + cols.end]);
        }
    }
    t
}

impl Backend for DenseBackend {
    fn name(&self) -> &str {
        "dense"
    }

    fn device(&self) -> Device {
        self.device
    }

    fn load_model(&mut self, asset: &ModelAsset) -> Result<LoadedModel, BackendError> {
        let model = DenseModel::from_bytes(asset.bytes())?;
        let metadata = model.metadata().clone();
        let handle = self.models.insert(model);
        tracing::debug!(
            model = %asset.id(),
            name = asset.name(),
            device = %self.device,
            inputs = metadata.input_len(),
            outputs = metadata.output_len(),
            "dense model loaded"
        );
        Ok(LoadedModel { handle, metadata })
    }

    fn forward(
        &mut self,
        handle: ModelHandle,
        inputs: &BatchInputs,
    ) -> Result<BatchOutputs, BackendError> {
        let strategy = self.strategy;
        let model = self.model(handle)?;
        let meta = model.metadata();
        inputs.check(meta)?;

        let batch = inputs.batch_size();
        let n_in = meta.input_len();
        let n_out = meta.output_len();
        let xs = concat_inputs(inputs, n_in);
        let mut ys = vec![0.0f32; batch * n_out];

        if batch > 0 && n_out > 0 {
            match strategy {
                Strategy::PerElement => {
                    for o in 0..n_out {
                        for r in 0..batch {
                            ys[r * n_out + o] =
                                model.output_element(&xs[r * n_in..(r + 1) * n_in], o);
                        }
                    }
                }
                Strategy::RowChunked => {
                    for (c, chunk) in ys.chunks_mut(ROW_CHUNK * n_out).enumerate() {
                        let start = c * ROW_CHUNK;
                        let rows = start..start + chunk.len() / n_out;
                        model.compute_rows(&xs, chunk, rows);
                    }
                }
                Strategy::Threaded { workers } => {
                    let rows_per = batch.div_ceil(workers).max(1);
                    let xs = &xs;
                    std::thread::scope(|s| {
                        for (c, chunk) in ys.chunks_mut(rows_per * n_out).enumerate() {
                            let start = c * rows_per;
                            let rows = start..start + chunk.len() / n_out;
                            s.spawn(move || model.compute_rows(xs, chunk, rows));
                        }
                    });
                }
            }
        }

        let c = meta.continuous_size;
        let mut col = 0;
        let continuous_mean = slice_columns(&ys, batch, n_out, col..col + c);
        col += c;
        let continuous_log_std = if meta.has_log_std {
            let t = slice_columns(&ys, batch, n_out, col..col + c);
            col += c;
            Some(t)
        } else {
            None
        };
        let d = meta.total_discrete_actions();
        let discrete_logits = slice_columns(&ys, batch, n_out, col..col + d);
        col += d;
        let memory = (meta.memory_size > 0)
            .then(|| slice_columns(&ys, batch, n_out, col..col + meta.memory_size));

        self.forward_calls += 1;
        Ok(BatchOutputs {
            continuous_mean,
            continuous_log_std,
            discrete_logits,
            memory,
        })
    }

    fn release(&mut self, handle: ModelHandle) -> Result<(), BackendError> {
        self.models.remove(handle).map(drop).map_err(stale_error)
    }
}

/// Provider creating one [`DenseBackend`] per request.
#[derive(Clone, Copy, Debug, Default)]
pub struct DenseProvider;

impl BackendProvider for DenseProvider {
    fn create(&self, device: Device) -> Box<dyn Backend> {
        Box::new(DenseBackend::new(device))
    }
}

/// Metadata for a feed-forward vector-input model, handy for tests and
/// demos.
pub fn vector_metadata(obs_len: usize, continuous: usize, branches: &[usize]) -> ModelMetadata {
    ModelMetadata {
        sensor_shapes: vec![smallvec![obs_len]],
        continuous_size: continuous,
        discrete_branches: branches.iter().copied().collect(),
        memory_size: 0,
        uses_previous_action: false,
        has_log_std: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Identity-ish model: continuous[k] = x[k], logits = x[0..d].
    fn echo_model(obs_len: usize, continuous: usize, branches: &[usize]) -> DenseModel {
        let meta = vector_metadata(obs_len, continuous, branches);
        let n_out = meta.output_len();
        let mut m = DenseModel::zeros(meta);
        for o in 0..n_out {
            if let Some(w) = m.weight_mut(o, o % obs_len) {
                *w = 1.0;
            }
        }
        m
    }

    fn inputs(rows: &[Vec<f32>]) -> BatchInputs {
        let width = rows[0].len();
        BatchInputs {
            sensors: vec![
                BatchTensor::from_rows(&[width], rows.iter().map(|r| r.as_slice())).unwrap(),
            ],
            memory: None,
            previous_action: None,
        }
    }

    #[test]
    fn new_rejects_wrong_parameter_counts() {
        let meta = vector_metadata(3, 2, &[]);
        assert!(DenseModel::new(meta.clone(), vec![0.0; 5], vec![0.0; 2]).is_err());
        assert!(DenseModel::new(meta, vec![0.0; 6], vec![0.0; 3]).is_err());
    }

    #[test]
    fn bytes_round_trip_through_asset() {
        let m = echo_model(3, 2, &[2]);
        let asset = m.to_asset("echo");
        assert_eq!(DenseModel::from_bytes(asset.bytes()).unwrap(), m);
    }

    #[test]
    fn forward_splits_output_tensors() {
        let mut backend = DenseBackend::new(Device::CpuVectorized);
        let loaded = backend
            .load_model(&echo_model(3, 2, &[3]).to_asset("echo"))
            .unwrap();
        let out = backend
            .forward(loaded.handle, &inputs(&[vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]))
            .unwrap();
        assert_eq!(out.continuous_mean.row(0), Some(&[1.0, 2.0][..]));
        assert_eq!(out.continuous_mean.row(1), Some(&[4.0, 5.0][..]));
        // outputs 2, 3, 4 read x[2], x[0], x[1]
        assert_eq!(out.discrete_logits.row(0), Some(&[3.0, 1.0, 2.0][..]));
        assert!(out.continuous_log_std.is_none());
        assert!(out.memory.is_none());
        assert_eq!(out.check(2, &loaded.metadata), Ok(()));
        assert_eq!(backend.forward_calls(), 1);
    }

    #[test]
    fn released_handle_fails_forward() {
        let mut backend = DenseBackend::new(Device::Default);
        let loaded = backend
            .load_model(&echo_model(2, 1, &[]).to_asset("m"))
            .unwrap();
        assert_eq!(backend.loaded_models(), 1);
        backend.release(loaded.handle).unwrap();
        assert_eq!(backend.loaded_models(), 0);
        assert_eq!(
            backend.forward(loaded.handle, &inputs(&[vec![0.0, 0.0]])),
            Err(BackendError::Released)
        );
        assert_eq!(backend.release(loaded.handle), Err(BackendError::Released));
    }

    #[test]
    fn garbage_bytes_fail_to_load() {
        let mut backend = DenseBackend::new(Device::Default);
        let err = backend
            .load_model(&ModelAsset::new("junk", vec![1u8, 2, 3]))
            .unwrap_err();
        assert!(matches!(err, BackendError::InvalidModel { .. }));
    }

    #[test]
    fn input_shape_mismatch_rejected() {
        let mut backend = DenseBackend::new(Device::Default);
        let loaded = backend
            .load_model(&echo_model(3, 1, &[]).to_asset("m"))
            .unwrap();
        assert!(matches!(
            backend.forward(loaded.handle, &inputs(&[vec![0.0; 4]])),
            Err(BackendError::InputMismatch { .. })
        ));
    }

    proptest! {
        #[test]
        fn every_device_is_bit_identical(
            rows in prop::collection::vec(prop::collection::vec(-10.0f32..10.0, 4), 1..40),
            weights in prop::collection::vec(-1.0f32..1.0, 4 * 5),
            bias in prop::collection::vec(-1.0f32..1.0, 5),
        ) {
            let model = DenseModel::new(vector_metadata(4, 2, &[3]), weights, bias).unwrap();
            let asset = model.to_asset("p");
            let batch = inputs(&rows);
            let mut reference: Option<BatchOutputs> = None;
            for device in Device::ALL {
                let mut backend = DenseBackend::new(device);
                let h = backend.load_model(&asset).unwrap().handle;
                let out = backend.forward(h, &batch).unwrap();
                match &reference {
                    None => reference = Some(out),
                    Some(r) => {
                        let same = r.continuous_mean.data().iter()
                            .zip(out.continuous_mean.data())
                            .chain(r.discrete_logits.data().iter().zip(out.discrete_logits.data()))
                            .all(|(a, b)| a.to_bits() == b.to_bits());
                        prop_assert!(same, "device {} diverged", device);
                    }
                }
            }
        }
    }
}
