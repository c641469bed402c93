//! Per-behavior facade used by the host simulation loop.
//!
//! A [`DecisionRequester`] validates each submission against its
//! behavior, forwards it to the shared scheduler, and reads the agent's
//! decision back. Without a scheduler (no model bound) it is a heuristic
//! requester: submissions are validated and dropped, and every decision
//! is [`ActionResult::empty()`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use flock_backend::Device;
use flock_core::{ActionResult, AgentId, AgentObservation, BehaviorSpec, ShapeMismatchError};
use thiserror::Error;

use crate::observer::DecisionObserver;
use crate::scheduler::{SchedulerError, SchedulerHandle};

/// Errors surfaced by a [`DecisionRequester`].
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum PolicyError {
    /// The observation does not fit the behavior. The agent receives no
    /// action this step; nothing else is affected.
    #[error(transparent)]
    ShapeMismatch(#[from] ShapeMismatchError),
    /// The shared scheduler failed or was disposed.
    #[error(transparent)]
    Scheduler(SchedulerError),
}

impl From<SchedulerError> for PolicyError {
    fn from(e: SchedulerError) -> Self {
        match e {
            SchedulerError::ShapeMismatch(e) => PolicyError::ShapeMismatch(e),
            other => PolicyError::Scheduler(other),
        }
    }
}

impl PolicyError {
    /// Whether this error disables learned behavior for the whole
    /// scheduler rather than one submission.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PolicyError::Scheduler(_))
    }
}

/// Submits observations and reads decisions for one behavior.
pub struct DecisionRequester {
    behavior: BehaviorSpec,
    scheduler: Option<SchedulerHandle>,
    observer: Option<Arc<dyn DecisionObserver>>,
    reported: AtomicBool,
}

impl DecisionRequester {
    /// A requester for `behavior`. `None` makes it heuristic.
    pub fn new(behavior: BehaviorSpec, scheduler: Option<SchedulerHandle>) -> Self {
        Self {
            behavior,
            scheduler,
            observer: None,
            reported: AtomicBool::new(false),
        }
    }

    /// A requester with no model bound.
    pub fn heuristic(behavior: BehaviorSpec) -> Self {
        Self::new(behavior, None)
    }

    /// Attach an observer notified on the first submission.
    pub fn with_observer(mut self, observer: Arc<dyn DecisionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// The behavior this requester decides for.
    pub fn behavior(&self) -> &BehaviorSpec {
        &self.behavior
    }

    /// The bound scheduler, if any.
    pub fn scheduler(&self) -> Option<&SchedulerHandle> {
        self.scheduler.as_ref()
    }

    /// Whether no model is bound.
    pub fn is_heuristic(&self) -> bool {
        self.scheduler.is_none()
    }

    fn notify_first(&self) {
        let Some(observer) = &self.observer else {
            return;
        };
        if self.reported.swap(true, Ordering::AcqRel) {
            return;
        }
        let (model, device) = match &self.scheduler {
            Some(s) => (Some(s.model_id()), s.device()),
            None => (None, Device::Default),
        };
        observer.on_first_decision(&self.behavior, model.as_ref(), device);
    }

    /// Validate `observation` and buffer it for `agent`.
    ///
    /// On a shape mismatch `agent` is withdrawn from the scheduler: any
    /// observation already buffered this step and its decision from the
    /// previous batch are dropped, so the agent gets no action rather
    /// than one computed from stale input.
    ///
    /// # Errors
    ///
    /// [`PolicyError::ShapeMismatch`] for a malformed observation,
    /// [`PolicyError::Scheduler`] if the scheduler failed or was disposed.
    pub fn submit_observation(
        &self,
        agent: AgentId,
        observation: AgentObservation,
    ) -> Result<(), PolicyError> {
        self.notify_first();
        if let Err(e) = self.behavior.check_observation(&observation) {
            tracing::debug!(behavior = %self.behavior.name, agent = %agent, error = %e, "submission rejected");
            if let Some(s) = &self.scheduler {
                s.withdraw(agent);
            }
            return Err(e.into());
        }
        let Some(scheduler) = &self.scheduler else {
            return Ok(());
        };
        scheduler
            .buffer_observation(agent, observation)
            .map_err(|e| {
                if matches!(e, SchedulerError::ShapeMismatch(_)) {
                    scheduler.withdraw(agent);
                }
                PolicyError::from(e)
            })
    }

    /// `agent`'s decision for this step.
    ///
    /// Triggers the scheduler's batch if anything is pending, so callers
    /// need no explicit synchronization. Heuristic requesters and agents
    /// absent from the latest batch get [`ActionResult::empty()`].
    ///
    /// # Errors
    ///
    /// [`PolicyError::Scheduler`] if the batch fails now or failed
    /// earlier, or the scheduler was disposed.
    pub fn decide_action(&self, agent: AgentId) -> Result<ActionResult, PolicyError> {
        match &self.scheduler {
            None => Ok(ActionResult::empty()),
            Some(s) => Ok(s.decide(agent)?),
        }
    }

    /// No-op. Shared schedulers are disposed by their registry.
    pub fn dispose(&self) {}
}

impl std::fmt::Debug for DecisionRequester {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecisionRequester")
            .field("behavior", &self.behavior.name)
            .field("model", &self.scheduler.as_ref().map(|s| s.model_id()))
            .field("observer", &self.observer.is_some())
            .finish()
    }
}
