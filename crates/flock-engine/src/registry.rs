//! Lookup of shared schedulers by model configuration.
//!
//! A [`SchedulerRegistry`] guarantees at most one scheduler per
//! [`SchedulerKey`], so every requester bound to the same model, device
//! and determinism flag feeds the same batch. The registry is an explicit
//! object the host owns and passes around; its lifetime ends with
//! [`dispose_all()`](SchedulerRegistry::dispose_all) or drop.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use flock_backend::{BackendProvider, Device, ModelAsset};
use flock_core::{BehaviorSpec, ModelId, ModelLoadError};
use indexmap::IndexMap;

use crate::config::{ConfigError, RegistryConfig};
use crate::policy::DecisionRequester;
use crate::scheduler::{InferenceScheduler, SchedulerHandle};

/// Identifies which scheduler a requester binds to.
///
/// `device` is always resolved, so [`Device::Default`] and the device it
/// resolves to share one scheduler and one batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SchedulerKey {
    /// Fingerprint of the model bytes.
    pub model: ModelId,
    /// Resolved execution device.
    pub device: Device,
    /// Deterministic action selection.
    pub deterministic: bool,
}

impl fmt::Display for SchedulerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = if self.deterministic {
            "deterministic"
        } else {
            "stochastic"
        };
        write!(f, "{}/{}/{}", self.model, self.device, mode)
    }
}

struct RegistryState {
    schedulers: IndexMap<SchedulerKey, SchedulerHandle>,
    created: u64,
    disposed: bool,
}

/// Creates schedulers on first lookup and shares them afterwards.
pub struct SchedulerRegistry {
    provider: Box<dyn BackendProvider>,
    config: RegistryConfig,
    state: Mutex<RegistryState>,
}

impl SchedulerRegistry {
    /// Create an empty registry that builds backends with `provider`.
    ///
    /// # Errors
    ///
    /// [`ConfigError`] if `config` would produce invalid scheduler configs.
    pub fn new(
        provider: impl BackendProvider + 'static,
        config: RegistryConfig,
    ) -> Result<Self, ConfigError> {
        config
            .scheduler_config(0, Device::Default, false)
            .validate()?;
        Ok(Self {
            provider: Box::new(provider),
            config,
            state: Mutex::new(RegistryState {
                schedulers: IndexMap::new(),
                created: 0,
                disposed: false,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The scheduler for `(asset, device, deterministic)`, creating it if
    /// none exists. `device` is resolved before lookup.
    ///
    /// Creation happens under the registry lock, so concurrent lookups of
    /// the same key never build two schedulers.
    ///
    /// # Errors
    ///
    /// [`ModelLoadError`] if construction fails (nothing is registered),
    /// if a scheduler for the key exists with a different behavior spec
    /// ([`ModelLoadError::SpecConflict`]), or if the registry was disposed.
    pub fn get_or_create(
        &self,
        asset: &ModelAsset,
        spec: &BehaviorSpec,
        device: Device,
        deterministic: bool,
    ) -> Result<SchedulerHandle, ModelLoadError> {
        let device = device.resolve();
        let key = SchedulerKey {
            model: asset.id(),
            device,
            deterministic,
        };
        let mut state = self.lock();
        if state.disposed {
            return Err(ModelLoadError::RegistryDisposed);
        }
        if let Some(existing) = state.schedulers.get(&key) {
            if existing.spec() != spec {
                tracing::warn!(
                    key = %key,
                    existing = %existing.spec().name,
                    requested = %spec.name,
                    "scheduler spec conflict"
                );
                return Err(ModelLoadError::SpecConflict {
                    model: key.model,
                    existing: existing.spec().name.clone(),
                    requested: spec.name.clone(),
                });
            }
            return Ok(existing.clone());
        }

        let config = self
            .config
            .scheduler_config(state.created, device, deterministic);
        let backend = self.provider.create(device);
        let scheduler = InferenceScheduler::new(asset, spec.clone(), backend, config)?;
        let handle = SchedulerHandle::new(scheduler);
        state.created += 1;
        state.schedulers.insert(key, handle.clone());
        tracing::debug!(key = %key, registered = state.schedulers.len(), "scheduler registered");
        Ok(handle)
    }

    /// A requester for `spec` bound to the shared scheduler for
    /// `(asset, device, deterministic)`.
    pub fn requester(
        &self,
        asset: &ModelAsset,
        spec: &BehaviorSpec,
        device: Device,
        deterministic: bool,
    ) -> Result<DecisionRequester, ModelLoadError> {
        let handle = self.get_or_create(asset, spec, device, deterministic)?;
        Ok(DecisionRequester::new(spec.clone(), Some(handle)))
    }

    /// The scheduler registered under `key`, if any.
    pub fn get(&self, key: &SchedulerKey) -> Option<SchedulerHandle> {
        self.lock().schedulers.get(key).cloned()
    }

    /// Dispose every registered scheduler and refuse further creation.
    ///
    /// Safe to call repeatedly and with schedulers that never ran a batch.
    /// Returns the number of schedulers disposed by this call.
    pub fn dispose_all(&self) -> usize {
        let mut state = self.lock();
        state.disposed = true;
        let schedulers = std::mem::take(&mut state.schedulers);
        drop(state);
        let count = schedulers.len();
        for handle in schedulers.values() {
            handle.dispose();
        }
        if count > 0 {
            tracing::info!(count, "scheduler registry disposed");
        }
        count
    }

    /// Number of registered schedulers.
    pub fn len(&self) -> usize {
        self.lock().schedulers.len()
    }

    /// Whether no scheduler is registered.
    pub fn is_empty(&self) -> bool {
        self.lock().schedulers.is_empty()
    }

    /// Whether a scheduler is registered under `key`.
    pub fn contains(&self, key: &SchedulerKey) -> bool {
        self.lock().schedulers.contains_key(key)
    }

    /// Registered keys in creation order.
    pub fn keys(&self) -> Vec<SchedulerKey> {
        self.lock().schedulers.keys().copied().collect()
    }

    /// Configuration applied to every created scheduler.
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }
}

impl Drop for SchedulerRegistry {
    fn drop(&mut self) {
        self.dispose_all();
    }
}

impl fmt::Debug for SchedulerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("SchedulerRegistry")
            .field("config", &self.config)
            .field("keys", &state.schedulers.keys().collect::<Vec<_>>())
            .field("disposed", &state.disposed)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flock_test_utils::{fixtures, MockBackend, MockProvider};

    fn registry() -> (SchedulerRegistry, MockProvider) {
        let provider = MockProvider::new(MockBackend::new());
        let reg = SchedulerRegistry::new(provider.clone(), RegistryConfig::default()).unwrap();
        (reg, provider)
    }

    #[test]
    fn same_key_returns_same_instance() {
        let (reg, provider) = registry();
        let spec = fixtures::continuous_spec(2, 1);
        let asset = fixtures::model_asset(&spec);
        let a = reg.get_or_create(&asset, &spec, Device::GpuCompute, true).unwrap();
        let b = reg.get_or_create(&asset, &spec, Device::GpuCompute, true).unwrap();
        assert!(SchedulerHandle::ptr_eq(&a, &b));
        assert_eq!(reg.len(), 1);
        assert_eq!(provider.created(), vec![Device::GpuCompute]);
    }

    #[test]
    fn key_fields_separate_schedulers() {
        let (reg, _) = registry();
        let spec = fixtures::continuous_spec(2, 1);
        let asset = fixtures::model_asset(&spec);
        let a = reg.get_or_create(&asset, &spec, Device::GpuCompute, true).unwrap();
        let b = reg.get_or_create(&asset, &spec, Device::GpuCompute, false).unwrap();
        let c = reg.get_or_create(&asset, &spec, Device::CpuVectorized, true).unwrap();
        assert!(!SchedulerHandle::ptr_eq(&a, &b));
        assert!(!SchedulerHandle::ptr_eq(&a, &c));
        assert_eq!(reg.len(), 3);
        assert_eq!(a.config().seed, 0);
        assert_eq!(b.config().seed, 1);
        assert_eq!(c.config().seed, 2);
    }

    #[test]
    fn failed_construction_registers_nothing() {
        let provider = MockProvider::new(MockBackend::with_metadata(Default::default()));
        let reg = SchedulerRegistry::new(provider, RegistryConfig::default()).unwrap();
        let spec = fixtures::continuous_spec(2, 1);
        let err = reg
            .get_or_create(&fixtures::model_asset(&spec), &spec, Device::Default, true)
            .unwrap_err();
        assert!(matches!(err, ModelLoadError::Incompatible { .. }));
        assert!(reg.is_empty());
    }

    #[test]
    fn default_device_shares_resolved_scheduler() {
        let (reg, provider) = registry();
        let spec = fixtures::continuous_spec(2, 1);
        let asset = fixtures::model_asset(&spec);
        let a = reg.get_or_create(&asset, &spec, Device::Default, true).unwrap();
        let b = reg
            .get_or_create(&asset, &spec, Device::Default.resolve(), true)
            .unwrap();
        assert!(SchedulerHandle::ptr_eq(&a, &b));
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.keys()[0].device, Device::CpuVectorized);
        assert_eq!(a.device(), Device::CpuVectorized);
        assert_eq!(provider.created(), vec![Device::CpuVectorized]);
    }

    #[test]
    fn conflicting_spec_is_rejected() {
        let (reg, _) = registry();
        let spec = fixtures::continuous_spec(2, 1);
        let asset = fixtures::model_asset(&spec);
        reg.get_or_create(&asset, &spec, Device::Default, true).unwrap();
        let mut other = spec.clone();
        other.name = "other".into();
        let err = reg
            .get_or_create(&asset, &other, Device::Default, true)
            .unwrap_err();
        assert!(matches!(err, ModelLoadError::SpecConflict { .. }));
    }

    #[test]
    fn dispose_all_releases_and_closes() {
        let (reg, provider) = registry();
        let spec = fixtures::continuous_spec(2, 1);
        let asset = fixtures::model_asset(&spec);
        let handle = reg.get_or_create(&asset, &spec, Device::Default, true).unwrap();
        reg.get_or_create(&asset, &spec, Device::Default, false).unwrap();
        assert_eq!(reg.dispose_all(), 2);
        assert_eq!(reg.dispose_all(), 0);
        assert_eq!(provider.backend().released(), 2);
        assert!(handle.is_disposed());
        assert!(reg.is_empty());
        assert_eq!(
            reg.get_or_create(&asset, &spec, Device::Default, true).unwrap_err(),
            ModelLoadError::RegistryDisposed
        );
    }

    #[test]
    fn keys_follow_creation_order() {
        let (reg, _) = registry();
        let spec = fixtures::continuous_spec(2, 1);
        let asset = fixtures::model_asset(&spec);
        reg.get_or_create(&asset, &spec, Device::GpuPixel, false).unwrap();
        reg.get_or_create(&asset, &spec, Device::GpuCompute, false).unwrap();
        let keys = reg.keys();
        assert_eq!(keys[0].device, Device::GpuPixel);
        assert_eq!(keys[1].device, Device::GpuCompute);
        assert!(reg.contains(&keys[1]));
        assert!(reg.get(&keys[0]).is_some());
        assert_eq!(keys[0].to_string(), format!("{}/gpu-pixel/stochastic", asset.id()));
    }

    #[test]
    fn invalid_registry_config_rejected() {
        let cfg = RegistryConfig {
            max_batch_size: Some(0),
            ..RegistryConfig::default()
        };
        assert!(SchedulerRegistry::new(MockProvider::default(), cfg).is_err());
    }
}
