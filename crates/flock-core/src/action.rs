//! Decided action outputs.

/// The decided output for one agent.
///
/// Immutable once produced. Callers receive their own copy, so a later
/// batch can never change an `ActionResult` that was already handed out.
///
/// The empty result (no continuous values, no discrete values) means
/// "no decision available": the agent was not part of the most recent
/// batch, the behavior has no model, or the scheduler failed.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct ActionResult {
    continuous: Box<[f32]>,
    discrete: Box<[u32]>,
}

impl ActionResult {
    /// Build a result from decoded action vectors.
    pub fn new(continuous: Vec<f32>, discrete: Vec<u32>) -> Self {
        Self {
            continuous: continuous.into_boxed_slice(),
            discrete: discrete.into_boxed_slice(),
        }
    }

    /// The explicit "no decision" result.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether this is the "no decision" result.
    pub fn is_empty(&self) -> bool {
        self.continuous.is_empty() && self.discrete.is_empty()
    }

    /// Continuous action vector.
    pub fn continuous(&self) -> &[f32] {
        &self.continuous
    }

    /// Discrete action vector, one chosen index per branch.
    pub fn discrete(&self) -> &[u32] {
        &self.discrete
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_has_no_actions() {
        let r = ActionResult::empty();
        assert!(r.is_empty());
        assert!(r.continuous().is_empty());
        assert!(r.discrete().is_empty());
    }

    #[test]
    fn clone_is_independent() {
        let a = ActionResult::new(vec![0.5, -0.5], vec![2]);
        let b = a.clone();
        drop(a);
        assert_eq!(b.continuous(), &[0.5, -0.5]);
        assert_eq!(b.discrete(), &[2]);
        assert!(!b.is_empty());
    }
}
