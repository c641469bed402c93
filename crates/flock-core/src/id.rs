//! Strongly-typed identifiers.

use std::fmt;

/// Identifies one agent while it is active.
///
/// Opaque to the scheduler. Hosts commonly use an episode id, so the same
/// value may come back after the agent's previous episode ended; the
/// scheduler drops all per-agent carry state on a terminal observation so
/// a reused id never sees state from the earlier episode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AgentId(pub u64);

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for AgentId {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

/// Identifies a model by the fingerprint of its bytes.
///
/// Two assets with identical bytes have the same `ModelId`, so they share
/// a scheduler regardless of where they were loaded from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModelId(pub u64);

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl From<u64> for ModelId {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_id_displays_as_fixed_width_hex() {
        assert_eq!(ModelId(0xab).to_string(), "00000000000000ab");
    }

    #[test]
    fn agent_id_from_u64() {
        assert_eq!(AgentId::from(7), AgentId(7));
        assert_eq!(AgentId(7).to_string(), "7");
    }
}
