//! Scheduler and registry configuration.
//!
//! [`SchedulerConfig`] is fixed at scheduler construction.
//! [`validate()`](SchedulerConfig::validate) checks it before any backend
//! work happens, so an invalid config never loads a model.

use flock_backend::Device;
use thiserror::Error;

// ── SchedulerConfig ────────────────────────────────────────────────

/// Configuration for one [`InferenceScheduler`](crate::InferenceScheduler).
#[derive(Clone, Debug, PartialEq)]
pub struct SchedulerConfig {
    /// Execution device. Default: [`Device::Default`].
    pub device: Device,
    /// Select arg-max / mean actions instead of sampling. Default: `false`.
    pub deterministic: bool,
    /// Seed for the scheduler's action-sampling RNG. Default: 0.
    pub seed: u64,
    /// Maximum agents per backend `forward` call. `None` runs the whole
    /// pending batch in one call. Default: `None`.
    pub max_batch_size: Option<usize>,
    /// Clamp every continuous action to `[-c, c]`. Default: `None`.
    pub clip_continuous: Option<f32>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            device: Device::Default,
            deterministic: false,
            seed: 0,
            max_batch_size: None,
            clip_continuous: None,
        }
    }
}

impl SchedulerConfig {
    /// Deterministic config on `device`.
    pub fn deterministic(device: Device) -> Self {
        Self {
            device,
            deterministic: true,
            ..Self::default()
        }
    }

    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_batch_size == Some(0) {
            return Err(ConfigError::ZeroBatchSize);
        }
        if let Some(clip) = self.clip_continuous {
            if !clip.is_finite() || clip <= 0.0 {
                return Err(ConfigError::InvalidClip { value: clip });
            }
        }
        Ok(())
    }
}

// ── RegistryConfig ─────────────────────────────────────────────────

/// Configuration for a [`SchedulerRegistry`](crate::SchedulerRegistry).
///
/// Applied to every scheduler the registry creates. Device and
/// determinism come from the lookup key instead.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct RegistryConfig {
    /// Scheduler `i` (in creation order) is seeded with
    /// `base_seed + i`. Default: 0.
    pub base_seed: u64,
    /// Applied as [`SchedulerConfig::max_batch_size`]. Default: `None`.
    pub max_batch_size: Option<usize>,
    /// Applied as [`SchedulerConfig::clip_continuous`]. Default: `None`.
    pub clip_continuous: Option<f32>,
}

impl RegistryConfig {
    /// Scheduler config for the `index`-th scheduler created under this
    /// registry.
    pub(crate) fn scheduler_config(
        &self,
        index: u64,
        device: Device,
        deterministic: bool,
    ) -> SchedulerConfig {
        SchedulerConfig {
            device,
            deterministic,
            seed: self.base_seed.wrapping_add(index),
            max_batch_size: self.max_batch_size,
            clip_continuous: self.clip_continuous,
        }
    }
}

// ── ConfigError ────────────────────────────────────────────────────

/// Errors detected by [`SchedulerConfig::validate()`].
#[derive(Clone, Debug, PartialEq, Error)]
pub enum ConfigError {
    /// `max_batch_size` is `Some(0)`.
    #[error("max_batch_size must be at least 1")]
    ZeroBatchSize,
    /// `clip_continuous` is NaN, infinite, zero, or negative.
    #[error("clip_continuous must be finite and positive, got {value}")]
    InvalidClip {
        /// The invalid value.
        value: f32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(SchedulerConfig::default().validate(), Ok(()));
    }

    #[test]
    fn zero_batch_size_rejected() {
        let cfg = SchedulerConfig {
            max_batch_size: Some(0),
            ..SchedulerConfig::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroBatchSize));
    }

    #[test]
    fn bad_clip_rejected() {
        for value in [0.0, -1.0, f32::NAN, f32::INFINITY] {
            let cfg = SchedulerConfig {
                clip_continuous: Some(value),
                ..SchedulerConfig::default()
            };
            assert!(cfg.validate().is_err(), "clip {value} accepted");
        }
    }

    #[test]
    fn registry_seeds_follow_creation_order() {
        let reg = RegistryConfig {
            base_seed: 100,
            ..RegistryConfig::default()
        };
        let a = reg.scheduler_config(0, Device::GpuCompute, true);
        let b = reg.scheduler_config(1, Device::GpuCompute, true);
        assert_eq!(a.seed, 100);
        assert_eq!(b.seed, 101);
        assert_eq!(a.device, Device::GpuCompute);
        assert!(a.deterministic);
    }
}
