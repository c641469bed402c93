//! Per-agent state carried between steps: recurrent memory and the
//! previous discrete action.
//!
//! Both are dropped when an agent's observation is terminal, so an id
//! reused for a new episode starts from zeros.

use std::collections::HashMap;

use flock_core::AgentId;

#[derive(Debug, Default)]
pub(crate) struct AgentCarry {
    memory: HashMap<AgentId, Vec<f32>>,
    previous_action: HashMap<AgentId, Vec<u32>>,
}

impl AgentCarry {
    /// Append `agent`'s memory (zeros if unseen) to `out`.
    pub(crate) fn write_memory(&self, agent: AgentId, size: usize, out: &mut Vec<f32>) {
        match self.memory.get(&agent) {
            Some(m) if m.len() == size => out.extend_from_slice(m),
            _ => out.resize(out.len() + size, 0.0),
        }
    }

    /// Append `agent`'s previous discrete action as floats (zeros if
    /// unseen) to `out`.
    pub(crate) fn write_previous_action(&self, agent: AgentId, branches: usize, out: &mut Vec<f32>) {
        match self.previous_action.get(&agent) {
            Some(a) if a.len() == branches => out.extend(a.iter().map(|&v| v as f32)),
            _ => out.resize(out.len() + branches, 0.0),
        }
    }

    /// Record the outcome of a batch for one agent. `None` leaves that
    /// half of the carry untouched; callers pass `None` for inputs the
    /// model does not consume, so feed-forward models track nothing.
    pub(crate) fn update(
        &mut self,
        agent: AgentId,
        done: bool,
        memory: Option<&[f32]>,
        previous_action: Option<&[u32]>,
    ) {
        if done {
            self.reset(agent);
            return;
        }
        if let Some(m) = memory {
            self.memory.insert(agent, m.to_vec());
        }
        if let Some(a) = previous_action.filter(|a| !a.is_empty()) {
            self.previous_action.insert(agent, a.to_vec());
        }
    }

    pub(crate) fn reset(&mut self, agent: AgentId) {
        self.memory.remove(&agent);
        self.previous_action.remove(&agent);
    }

    pub(crate) fn clear(&mut self) {
        self.memory.clear();
        self.previous_action.clear();
    }

    #[cfg(test)]
    pub(crate) fn tracked_agents(&self) -> usize {
        self.memory.len().max(self.previous_action.len())
    }
}
