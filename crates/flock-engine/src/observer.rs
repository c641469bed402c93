//! Optional one-shot hook fired when a requester first submits.

use flock_backend::Device;
use flock_core::{BehaviorSpec, ModelId};

/// Notified once per [`DecisionRequester`](crate::DecisionRequester), on
/// its first `submit_observation` call.
///
/// Fires whether or not that first submission is accepted. Closures with
/// the matching signature implement this trait.
pub trait DecisionObserver: Send + Sync {
    /// `model` is `None` for heuristic requesters.
    fn on_first_decision(&self, behavior: &BehaviorSpec, model: Option<&ModelId>, device: Device);
}

impl<F> DecisionObserver for F
where
    F: Fn(&BehaviorSpec, Option<&ModelId>, Device) + Send + Sync,
{
    fn on_first_decision(&self, behavior: &BehaviorSpec, model: Option<&ModelId>, device: Device) {
        self(behavior, model, device)
    }
}
