//! Per-step accumulation and result buffers.
//!
//! [`PendingBatch`] collects the latest observation per agent until the
//! next trigger. [`DecidedBatch`] holds the actions of the most recent
//! trigger and is replaced wholesale by the next one.

use flock_core::{ActionResult, AgentId, AgentObservation};
use indexmap::IndexMap;

// ── PendingBatch ──────────────────────────────────────────────────

/// Latest observation per agent for the current undecided step.
///
/// An agent appears at most once. Resubmission overwrites in place and
/// keeps the agent's original position, so batch row order is the order
/// in which agents first submitted this step.
#[derive(Clone, Debug, Default)]
pub struct PendingBatch {
    entries: IndexMap<AgentId, AgentObservation>,
}

impl PendingBatch {
    /// Empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite. Returns `true` if an earlier observation for
    /// `agent` was replaced.
    pub fn insert(&mut self, agent: AgentId, observation: AgentObservation) -> bool {
        self.entries.insert(agent, observation).is_some()
    }

    /// Remove `agent`'s observation, preserving the order of the rest.
    pub fn remove(&mut self, agent: AgentId) -> Option<AgentObservation> {
        self.entries.shift_remove(&agent)
    }

    /// The buffered observation for `agent`.
    pub fn get(&self, agent: AgentId) -> Option<&AgentObservation> {
        self.entries.get(&agent)
    }

    /// Whether `agent` has a buffered observation.
    pub fn contains(&self, agent: AgentId) -> bool {
        self.entries.contains_key(&agent)
    }

    /// Number of buffered agents.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Buffered agents in batch row order.
    pub fn agents(&self) -> impl Iterator<Item = AgentId> + '_ {
        self.entries.keys().copied()
    }

    /// Snapshot and clear in one step.
    pub fn take(&mut self) -> Vec<(AgentId, AgentObservation)> {
        std::mem::take(&mut self.entries).into_iter().collect()
    }

    /// Drop every buffered observation.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

// ── DecidedBatch ──────────────────────────────────────────────────

/// Actions decided by the most recent trigger, keyed by agent.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DecidedBatch {
    actions: IndexMap<AgentId, ActionResult>,
}

impl DecidedBatch {
    /// Empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `agent`'s action.
    pub fn insert(&mut self, agent: AgentId, action: ActionResult) {
        self.actions.insert(agent, action);
    }

    /// A copy of `agent`'s action, or [`ActionResult::empty()`] if the
    /// agent was not part of the most recent batch.
    pub fn get(&self, agent: AgentId) -> ActionResult {
        self.actions
            .get(&agent)
            .cloned()
            .unwrap_or_else(ActionResult::empty)
    }

    /// Drop `agent`'s decision, returning it if present.
    pub fn remove(&mut self, agent: AgentId) -> Option<ActionResult> {
        self.actions.shift_remove(&agent)
    }

    /// Whether `agent` has a decision.
    pub fn contains(&self, agent: AgentId) -> bool {
        self.actions.contains_key(&agent)
    }

    /// Number of decided agents.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Whether no agent has a decision.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Decided agents and actions in batch row order.
    pub fn iter(&self) -> impl Iterator<Item = (AgentId, &ActionResult)> + '_ {
        self.actions.iter().map(|(&id, a)| (id, a))
    }

    /// Drop every decision.
    pub fn clear(&mut self) {
        self.actions.clear();
    }
}
