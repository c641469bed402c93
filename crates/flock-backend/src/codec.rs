//! Binary encode/decode for [`DenseModel`](crate::DenseModel) assets.
//!
//! All integers are little-endian `u32`, all weights little-endian `f32`.
//! No compression, no alignment padding.
//!
//! ```text
//! magic      b"FLKD"
//! version    u8 (= 1)
//! flags      u8 (bit 0: previous-action input, bit 1: log-std output)
//! reserved   u16
//! sensors    u32 count, then per sensor: u32 rank, rank x u32 dims
//! continuous u32
//! branches   u32 count, count x u32 sizes
//! memory     u32
//! weights    output_len x input_len f32, row-major by output
//! bias       output_len f32
//! ```

use std::io::Read;

use flock_core::{BackendError, Shape};
use smallvec::SmallVec;

use crate::model::ModelMetadata;

/// Magic bytes at the start of every dense model.
pub const MAGIC: [u8; 4] = *b"FLKD";
/// Current format version.
pub const FORMAT_VERSION: u8 = 1;

const FLAG_PREVIOUS_ACTION: u8 = 1 << 0;
const FLAG_LOG_STD: u8 = 1 << 1;

/// Upper bound on any single decoded count or dimension, so a corrupt
/// header cannot request a multi-gigabyte allocation.
const MAX_DIM: u32 = 1 << 24;
/// Upper bound on one sensor's flat length.
const MAX_SENSOR_LEN: usize = 1 << 28;

// ── Primitive writers ───────────────────────────────────────────

fn write_u32_le(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn write_f32_le(buf: &mut Vec<u8>, v: f32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

// ── Primitive readers ───────────────────────────────────────────

fn invalid(reason: impl Into<String>) -> BackendError {
    BackendError::InvalidModel {
        reason: reason.into(),
    }
}

fn read_exact<const N: usize>(r: &mut dyn Read, what: &str) -> Result<[u8; N], BackendError> {
    let mut buf = [0u8; N];
    r.read_exact(&mut buf)
        .map_err(|e| invalid(format!("truncated while reading {what}: {e}")))?;
    Ok(buf)
}

fn read_u8(r: &mut dyn Read, what: &str) -> Result<u8, BackendError> {
    Ok(read_exact::<1>(r, what)?[0])
}

fn read_u32_le(r: &mut dyn Read, what: &str) -> Result<u32, BackendError> {
    Ok(u32::from_le_bytes(read_exact::<4>(r, what)?))
}

fn read_dim(r: &mut dyn Read, what: &str) -> Result<usize, BackendError> {
    let v = read_u32_le(r, what)?;
    if v > MAX_DIM {
        return Err(invalid(format!("{what} {v} exceeds limit {MAX_DIM}")));
    }
    Ok(v as usize)
}

fn read_f32s(r: &mut dyn Read, n: usize, what: &str) -> Result<Vec<f32>, BackendError> {
    let mut out = Vec::with_capacity(n);
    for _ in 0..n {
        out.push(f32::from_le_bytes(read_exact::<4>(r, what)?));
    }
    Ok(out)
}

// ── Model layout ────────────────────────────────────────────────

/// Encode metadata, weights and bias.
///
/// Callers guarantee `weights.len() == output_len * input_len` and
/// `bias.len() == output_len`.
pub(crate) fn encode(metadata: &ModelMetadata, weights: &[f32], bias: &[f32]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(64 + 4 * (weights.len() + bias.len()));
    buf.extend_from_slice(&MAGIC);
    buf.push(FORMAT_VERSION);
    let mut flags = 0u8;
    if metadata.uses_previous_action {
        flags |= FLAG_PREVIOUS_ACTION;
    }
    if metadata.has_log_std {
        flags |= FLAG_LOG_STD;
    }
    buf.push(flags);
    buf.extend_from_slice(&[0, 0]);

    write_u32_le(&mut buf, metadata.sensor_shapes.len() as u32);
    for shape in &metadata.sensor_shapes {
        write_u32_le(&mut buf, shape.len() as u32);
        for &d in shape {
            write_u32_le(&mut buf, d as u32);
        }
    }
    write_u32_le(&mut buf, metadata.continuous_size as u32);
    write_u32_le(&mut buf, metadata.discrete_branches.len() as u32);
    for &b in &metadata.discrete_branches {
        write_u32_le(&mut buf, b as u32);
    }
    write_u32_le(&mut buf, metadata.memory_size as u32);

    for &w in weights {
        write_f32_le(&mut buf, w);
    }
    for &b in bias {
        write_f32_le(&mut buf, b);
    }
    buf
}

/// Decoded model parts: metadata, weights, bias.
pub(crate) type Decoded = (ModelMetadata, Vec<f32>, Vec<f32>);

/// Decode a dense model, rejecting bad magic, unknown versions,
/// truncation, trailing bytes and non-finite parameters.
pub(crate) fn decode(bytes: &[u8]) -> Result<Decoded, BackendError> {
    let mut r: &[u8] = bytes;

    let magic = read_exact::<4>(&mut r, "magic")?;
    if magic != MAGIC {
        return Err(invalid(format!("bad magic {magic:?}, expected b\"FLKD\"")));
    }
    let version = read_u8(&mut r, "version")?;
    if version != FORMAT_VERSION {
        return Err(invalid(format!("unsupported format version {version}")));
    }
    let flags = read_u8(&mut r, "flags")?;
    let _reserved = read_exact::<2>(&mut r, "reserved")?;

    let sensor_count = read_dim(&mut r, "sensor count")?;
    let mut sensor_shapes = Vec::new();
    for i in 0..sensor_count {
        let rank = read_dim(&mut r, "sensor rank")?;
        let mut shape: Shape = SmallVec::new();
        for _ in 0..rank {
            shape.push(read_dim(&mut r, "sensor dimension")?);
        }
        shape
            .iter()
            .try_fold(1usize, |acc, &d| acc.checked_mul(d))
            .filter(|&n| n <= MAX_SENSOR_LEN)
            .ok_or_else(|| invalid(format!("sensor {i} shape {:?} is too large", shape.as_slice())))?;
        sensor_shapes.push(shape);
    }
    let continuous_size = read_dim(&mut r, "continuous size")?;
    let branch_count = read_dim(&mut r, "branch count")?;
    let mut discrete_branches = SmallVec::new();
    for _ in 0..branch_count {
        discrete_branches.push(read_dim(&mut r, "branch size")?);
    }
    let memory_size = read_dim(&mut r, "memory size")?;

    let metadata = ModelMetadata {
        sensor_shapes,
        continuous_size,
        discrete_branches,
        memory_size,
        uses_previous_action: flags & FLAG_PREVIOUS_ACTION != 0,
        has_log_std: flags & FLAG_LOG_STD != 0,
    };

    let n_in = metadata.input_len();
    let n_out = metadata.output_len();
    let n_weights = n_in
        .checked_mul(n_out)
        .filter(|&n| n.checked_add(n_out).is_some_and(|t| t <= r.len() / 4))
        .ok_or_else(|| invalid(format!("weight matrix {n_out}x{n_in} exceeds payload")))?;
    let weights = read_f32s(&mut r, n_weights, "weights")?;
    let bias = read_f32s(&mut r, n_out, "bias")?;
    if !r.is_empty() {
        return Err(invalid(format!("{} trailing bytes", r.len())));
    }
    if weights.iter().chain(&bias).any(|v| !v.is_finite()) {
        return Err(invalid("non-finite parameter"));
    }
    Ok((metadata, weights, bias))
}
