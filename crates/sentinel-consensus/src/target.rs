//! The defensive action applied to a protected entity once consensus is
//! reached.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use sentinel_core::{Address, RequestId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionOutcome {
    Applied,
    Failed { reason: String },
}

impl ActionOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, ActionOutcome::Applied)
    }
}

/// A single idempotent, bounded call against the protected entity. Failure is
/// an ordinary outcome, not an error.
pub trait DefensiveTarget {
    fn apply(&mut self, target: &Address, request_id: &RequestId) -> ActionOutcome;
}

impl<T: DefensiveTarget + ?Sized> DefensiveTarget for Box<T> {
    fn apply(&mut self, target: &Address, request_id: &RequestId) -> ActionOutcome {
        (**self).apply(target, request_id)
    }
}

/// Pause switch kept in memory. Entities in `unreachable` fail every call.
#[derive(Debug, Default, Clone)]
pub struct InMemoryPauseTarget {
    paused: BTreeMap<Address, RequestId>,
    unreachable: BTreeSet<Address>,
    calls: u64,
}

impl InMemoryPauseTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_unreachable(&mut self, target: Address) {
        self.unreachable.insert(target);
    }

    pub fn is_paused(&self, target: &Address) -> bool {
        self.paused.contains_key(target)
    }

    pub fn paused_by(&self, target: &Address) -> Option<&RequestId> {
        self.paused.get(target)
    }

    pub fn calls(&self) -> u64 {
        self.calls
    }

    pub fn unpause(&mut self, target: &Address) -> bool {
        self.paused.remove(target).is_some()
    }
}

impl DefensiveTarget for InMemoryPauseTarget {
    fn apply(&mut self, target: &Address, request_id: &RequestId) -> ActionOutcome {
        self.calls += 1;
        if self.unreachable.contains(target) {
            return ActionOutcome::Failed {
                reason: format!("{} did not accept the pause call", target),
            };
        }
        // Already paused is success.
        self.paused.entry(*target).or_insert(*request_id);
        ActionOutcome::Applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_core::keccak256;

    #[test]
    fn test_apply_is_idempotent() {
        let mut board = InMemoryPauseTarget::new();
        let target = Address::derive(b"vault");
        let first = keccak256(b"1");
        let second = keccak256(b"2");

        assert_eq!(board.apply(&target, &first), ActionOutcome::Applied);
        assert_eq!(board.apply(&target, &second), ActionOutcome::Applied);
        assert_eq!(board.paused_by(&target), Some(&first));
        assert_eq!(board.calls(), 2);
    }

    #[test]
    fn test_unreachable_target_fails() {
        let mut board = InMemoryPauseTarget::new();
        let target = Address::derive(b"vault");
        board.mark_unreachable(target);
        assert!(!board.apply(&target, &keccak256(b"1")).is_applied());
        assert!(!board.is_paused(&target));
    }
}
