//! Append-only record of everything the ledger decided.

use serde::{Deserialize, Serialize};

use sentinel_core::{Address, ClaimId, RequestId, Timestamp};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LedgerEvent {
    RequestCreated {
        request_id: RequestId,
        target: Address,
        initiator: Address,
        at: Timestamp,
    },
    Attested {
        request_id: RequestId,
        signer: Address,
        attestations: usize,
        required: usize,
    },
    PauseExecuted {
        request_id: RequestId,
        target: Address,
        attesters: usize,
        succeeded: bool,
        reason: Option<String>,
    },
    ClaimOpened {
        claim_id: ClaimId,
        request_id: RequestId,
        bounty: u128,
    },
    ClaimOpenFailed {
        request_id: RequestId,
        reason: String,
    },
    ClaimDisputed {
        claim_id: ClaimId,
        by: Address,
    },
    EvidenceVerified {
        claim_id: ClaimId,
    },
    DisputeResolved {
        claim_id: ClaimId,
        approved: bool,
    },
    SignerSlashed {
        signer: Address,
        amount: u128,
        claim_id: ClaimId,
    },
    ClaimPaid {
        claim_id: ClaimId,
        amount: u128,
        beneficiaries: usize,
    },
    ClaimAutoRejected {
        claim_id: ClaimId,
    },
}
