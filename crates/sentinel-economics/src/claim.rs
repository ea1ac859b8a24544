/// BOUNTY CLAIM LIFECYCLE
///
/// Pending --dispute--> Disputed --approve--> Approved --payout--> Paid
/// Disputed --reject--> Rejected
/// Pending --verify evidence--> Approved
/// Pending --oracle deadline elapsed--> Rejected (lazily, at payout)
///
/// Paid and Rejected are terminal.

use std::fmt;

use serde::{Deserialize, Serialize};

use sentinel_core::{Address, ClaimId, EvidenceHash, RequestId, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClaimStatus {
    Pending,
    Disputed,
    Approved,
    Rejected,
    Paid,
}

impl ClaimStatus {
    pub fn can_transition_to(self, next: ClaimStatus) -> bool {
        use ClaimStatus::*;
        matches!(
            (self, next),
            (Pending, Disputed)
                | (Pending, Approved)
                | (Pending, Rejected)
                | (Disputed, Approved)
                | (Disputed, Rejected)
                | (Approved, Paid)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ClaimStatus::Paid | ClaimStatus::Rejected)
    }
}

impl fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ClaimStatus::Pending => "PENDING",
            ClaimStatus::Disputed => "DISPUTED",
            ClaimStatus::Approved => "APPROVED",
            ClaimStatus::Rejected => "REJECTED",
            ClaimStatus::Paid => "PAID",
        };
        f.write_str(s)
    }
}

/// Reward owed to the co-signers of one successful pause.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BountyClaim {
    pub id: ClaimId,
    /// Executed pause request this claim settles
    pub request_id: RequestId,
    /// Signer that opened the pause request; slashed if the claim is rejected
    pub originating_signer: Address,
    /// Every attester, in attestation order
    pub beneficiaries: Vec<Address>,
    pub target: Address,
    pub evidence: EvidenceHash,
    pub tvl_snapshot: u128,
    /// Tier amount capped by the unreserved escrow at creation
    pub bounty: u128,
    pub created_at: Timestamp,
    pub dispute_deadline: Timestamp,
    pub oracle_deadline: Timestamp,
    pub evidence_verified: bool,
    pub status: ClaimStatus,
    pub disputed_by: Option<Address>,
    pub paid_amount: u128,
}

impl BountyClaim {
    pub fn in_dispute_window(&self, now: Timestamp) -> bool {
        now < self.dispute_deadline
    }

    pub fn oracle_deadline_elapsed(&self, now: Timestamp) -> bool {
        now >= self.oracle_deadline
    }

    pub fn is_payable(&self) -> bool {
        self.status == ClaimStatus::Approved && self.evidence_verified
    }
}

/// Even split of `amount` across `beneficiaries`; the integer remainder goes
/// to the first beneficiary.
pub fn split_evenly(amount: u128, beneficiaries: &[Address]) -> Vec<(Address, u128)> {
    if beneficiaries.is_empty() {
        return Vec::new();
    }
    let n = beneficiaries.len() as u128;
    let share = amount / n;
    let remainder = amount % n;

    beneficiaries
        .iter()
        .enumerate()
        .map(|(i, b)| (*b, if i == 0 { share + remainder } else { share }))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_status_graph() {
        use ClaimStatus::*;
        assert!(Pending.can_transition_to(Disputed));
        assert!(Pending.can_transition_to(Approved));
        assert!(Disputed.can_transition_to(Rejected));
        assert!(Approved.can_transition_to(Paid));

        assert!(!Pending.can_transition_to(Paid));
        assert!(!Disputed.can_transition_to(Paid));
        assert!(!Rejected.can_transition_to(Paid));
        assert!(!Paid.can_transition_to(Approved));
        assert!(!Approved.can_transition_to(Disputed));
        assert!(Rejected.is_terminal() && Paid.is_terminal());
    }

    #[test]
    fn test_split_gives_remainder_to_first() {
        let b: Vec<Address> = (0u8..3).map(|i| Address::derive(&[i])).collect();
        let shares = split_evenly(100, &b);
        assert_eq!(shares, vec![(b[0], 34), (b[1], 33), (b[2], 33)]);
    }

    #[test]
    fn test_split_empty() {
        assert!(split_evenly(100, &[]).is_empty());
    }

    proptest! {
        #[test]
        fn prop_split_conserves_amount(amount in 0u128..u128::MAX / 2, n in 1usize..40) {
            let b: Vec<Address> = (0..n).map(|i| Address::derive(&i.to_be_bytes())).collect();
            let shares = split_evenly(amount, &b);
            let total: u128 = shares.iter().map(|(_, s)| *s).sum();
            prop_assert_eq!(total, amount);
            let min = shares.iter().map(|(_, s)| *s).min().unwrap();
            prop_assert!(shares.iter().skip(1).all(|(_, s)| *s == min));
        }
    }
}
