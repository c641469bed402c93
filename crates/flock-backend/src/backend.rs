//! The backend capability interface.

use flock_core::BackendError;

use crate::device::Device;
use crate::io::{BatchInputs, BatchOutputs};
use crate::model::{ModelAsset, ModelMetadata};

/// Opaque handle to a model loaded into one backend context.
///
/// Only meaningful to the backend that issued it. Backends encode a slot
/// and a generation so a released handle is detected rather than reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ModelHandle(u64);

impl ModelHandle {
    /// Wrap a backend-specific raw value.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The backend-specific raw value.
    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// A successfully loaded model.
#[derive(Clone, Debug, PartialEq)]
pub struct LoadedModel {
    /// Handle for `forward` and `release`.
    pub handle: ModelHandle,
    /// What the model consumes and produces.
    pub metadata: ModelMetadata,
}

/// One backend context: the concrete inference engine seen by a scheduler.
///
/// Each scheduler owns its backend exclusively and calls it only while
/// holding its own lock, so implementations need `Send` but not `Sync`
/// and never see concurrent calls.
pub trait Backend: Send {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// The device this context executes on.
    fn device(&self) -> Device;

    /// Load a model and report its metadata.
    fn load_model(&mut self, asset: &ModelAsset) -> Result<LoadedModel, BackendError>;

    /// Run one batched forward pass.
    ///
    /// Row `i` of every output corresponds to row `i` of every input.
    fn forward(
        &mut self,
        model: ModelHandle,
        inputs: &BatchInputs,
    ) -> Result<BatchOutputs, BackendError>;

    /// Release a model's resources. Later calls with `model` fail with
    /// [`BackendError::Released`].
    fn release(&mut self, model: ModelHandle) -> Result<(), BackendError>;
}

/// Creates backend contexts for a device.
///
/// The scheduler registry owns one provider and asks it for a fresh
/// context whenever it constructs a scheduler.
pub trait BackendProvider: Send + Sync {
    /// Create a backend context for `device`.
    fn create(&self, device: Device) -> Box<dyn Backend>;
}

impl<F> BackendProvider for F
where
    F: Fn(Device) -> Box<dyn Backend> + Send + Sync,
{
    fn create(&self, device: Device) -> Box<dyn Backend> {
        self(device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_round_trips_raw_value() {
        let h = ModelHandle::from_raw(0x1_0000_0002);
        assert_eq!(h.raw(), 0x1_0000_0002);
    }
}
