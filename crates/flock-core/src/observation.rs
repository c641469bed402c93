//! Per-agent observation inputs.

/// Per-action mask over all discrete branches, flattened.
///
/// `true` means the action is disallowed this step. Index `i` addresses
/// the same slot as the flat logits row of the discrete output, so branch
/// `b` covers `offset_b..offset_b + size_b`.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct ActionMask {
    masked: Vec<bool>,
}

impl ActionMask {
    /// Wrap a flat mask.
    pub fn new(masked: Vec<bool>) -> Self {
        Self { masked }
    }

    /// A mask of `len` entries with every action allowed.
    pub fn allow_all(len: usize) -> Self {
        Self {
            masked: vec![false; len],
        }
    }

    /// Disallow action `index`. Out-of-range indices are ignored.
    pub fn mask(&mut self, index: usize) {
        if let Some(slot) = self.masked.get_mut(index) {
            *slot = true;
        }
    }

    /// Whether action `index` is disallowed. Out-of-range reads as allowed.
    pub fn is_masked(&self, index: usize) -> bool {
        self.masked.get(index).copied().unwrap_or(false)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.masked.len()
    }

    /// Whether the mask has no entries.
    pub fn is_empty(&self) -> bool {
        self.masked.is_empty()
    }

    /// The raw flags.
    pub fn as_slice(&self) -> &[bool] {
        &self.masked
    }
}

/// One agent's input for the current decision step.
///
/// Paired with its [`AgentId`](crate::AgentId) when submitted; the
/// scheduler keys its pending batch by that id.
#[derive(Clone, Debug, PartialEq)]
pub struct AgentObservation {
    /// One flat tensor per sensor, in the order of the behavior's
    /// observation spec.
    pub sensors: Vec<Vec<f32>>,
    /// Whether this is the agent's terminal step in its episode.
    pub done: bool,
    /// Optional discrete action mask.
    pub action_mask: Option<ActionMask>,
}

impl AgentObservation {
    /// Non-terminal observation without a mask.
    pub fn new(sensors: Vec<Vec<f32>>) -> Self {
        Self {
            sensors,
            done: false,
            action_mask: None,
        }
    }

    /// Mark this observation as the agent's terminal step.
    pub fn terminal(mut self) -> Self {
        self.done = true;
        self
    }

    /// Attach a discrete action mask.
    pub fn with_mask(mut self, mask: ActionMask) -> Self {
        self.action_mask = Some(mask);
        self
    }
}
