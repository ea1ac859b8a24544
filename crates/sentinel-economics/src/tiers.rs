/// BOUNTY TIER SCHEDULE
///
/// Bounty owed for a successful pause, as a step function of the protected
/// entity's TVL. Amounts are in base units (18 decimals).

use serde::{Deserialize, Serialize};

/// One whole token in base units.
pub const TOKEN: u128 = 1_000_000_000_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BountyTier {
    /// Tier applies while TVL is strictly below this bound
    pub tvl_below: u128,
    pub bounty: u128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierSchedule {
    /// Ascending by `tvl_below`
    pub tiers: Vec<BountyTier>,
    /// Bounty for TVL at or above the last bound
    pub top_bounty: u128,
}

impl Default for TierSchedule {
    fn default() -> Self {
        TierSchedule {
            tiers: vec![
                BountyTier { tvl_below: 1_000_000 * TOKEN, bounty: 1_000 * TOKEN },
                BountyTier { tvl_below: 10_000_000 * TOKEN, bounty: 5_000 * TOKEN },
                BountyTier { tvl_below: 100_000_000 * TOKEN, bounty: 25_000 * TOKEN },
            ],
            top_bounty: 100_000 * TOKEN,
        }
    }
}

impl TierSchedule {
    pub fn bounty_for(&self, tvl: u128) -> u128 {
        self.tiers
            .iter()
            .find(|tier| tvl < tier.tvl_below)
            .map(|tier| tier.bounty)
            .unwrap_or(self.top_bounty)
    }

    /// Bounds must be strictly increasing.
    pub fn is_sorted(&self) -> bool {
        self.tiers.windows(2).all(|w| w[0].tvl_below < w[1].tvl_below)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schedule_boundaries() {
        let schedule = TierSchedule::default();
        assert!(schedule.is_sorted());
        assert_eq!(schedule.bounty_for(0), 1_000 * TOKEN);
        assert_eq!(schedule.bounty_for(1_000_000 * TOKEN - 1), 1_000 * TOKEN);
        assert_eq!(schedule.bounty_for(1_000_000 * TOKEN), 5_000 * TOKEN);
        assert_eq!(schedule.bounty_for(99_999_999 * TOKEN), 25_000 * TOKEN);
        assert_eq!(schedule.bounty_for(100_000_000 * TOKEN), 100_000 * TOKEN);
        assert_eq!(schedule.bounty_for(u128::MAX), 100_000 * TOKEN);
    }

    #[test]
    fn test_unsorted_schedule_detected() {
        let schedule = TierSchedule {
            tiers: vec![
                BountyTier { tvl_below: 10, bounty: 1 },
                BountyTier { tvl_below: 10, bounty: 2 },
            ],
            top_bounty: 3,
        };
        assert!(!schedule.is_sorted());
    }
}
