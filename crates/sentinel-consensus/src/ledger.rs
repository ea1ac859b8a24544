/// SHIELD LEDGER
///
/// Serialized composition of the signer registry, pause consensus, bounty
/// escrow and the defensive target. Every operation runs to completion before
/// the next begins; callers sharing a ledger across threads wrap it in a lock.
///
/// Execution order on reaching threshold:
/// 1. request marked executed, cooldown and stats recorded (inside consensus)
/// 2. defensive action applied
/// 3. claim opened, only if the action succeeded; one claim per request

use log::{info, warn};

use sentinel_core::{
    attestation_message, Address, ClaimId, EvidenceHash, MembershipRegistry, RequestId,
    SignerRegistry, Timestamp,
};
use sentinel_crypto::{verify_aggregated, PublicKey, Signature};
use sentinel_economics::{BountyEscrow, EscrowConfig, EscrowError, PayoutOutcome, Resolution};

use crate::events::LedgerEvent;
use crate::pause::{AttestOutcome, ConsensusConfig, ConsensusError, Execution, PauseConsensus, PauseStats};
use crate::target::{ActionOutcome, DefensiveTarget};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionReport {
    pub request_id: RequestId,
    pub outcome: ActionOutcome,
    pub claim_id: Option<ClaimId>,
}

/// Result of submitting a request or an attestation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub request_id: RequestId,
    pub attestations: usize,
    pub required: usize,
    pub execution: Option<ExecutionReport>,
}

pub struct ShieldLedger<T: DefensiveTarget> {
    registry: SignerRegistry,
    consensus: PauseConsensus,
    escrow: BountyEscrow,
    target: T,
    events: Vec<LedgerEvent>,
}

impl<T: DefensiveTarget> ShieldLedger<T> {
    pub fn new(
        consensus: ConsensusConfig,
        escrow: EscrowConfig,
        min_stake: u128,
        admin: Address,
        oracle: Address,
        target: T,
    ) -> Result<Self, ConsensusError> {
        Ok(ShieldLedger {
            registry: SignerRegistry::new(min_stake),
            consensus: PauseConsensus::new(consensus),
            escrow: BountyEscrow::new(escrow, admin, oracle)?,
            target,
            events: Vec::new(),
        })
    }

    pub fn registry(&self) -> &SignerRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut SignerRegistry {
        &mut self.registry
    }

    pub fn consensus(&self) -> &PauseConsensus {
        &self.consensus
    }

    pub fn escrow(&self) -> &BountyEscrow {
        &self.escrow
    }

    /// Funding and protocol registration go straight to the escrow.
    pub fn escrow_mut(&mut self) -> &mut BountyEscrow {
        &mut self.escrow
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    pub fn target_mut(&mut self) -> &mut T {
        &mut self.target
    }

    pub fn events(&self) -> &[LedgerEvent] {
        &self.events
    }

    pub fn stats(&self) -> PauseStats {
        self.consensus.stats()
    }

    pub fn required_signers(&self) -> usize {
        self.consensus.required(&self.registry)
    }

    /// `created_at` comes from the initiator's signed body; `now` is ledger
    /// time.
    pub fn create_request(
        &mut self,
        initiator: Address,
        target: Address,
        evidence: EvidenceHash,
        signature: Signature,
        created_at: Timestamp,
        now: Timestamp,
    ) -> Result<Submission, ConsensusError> {
        if !self.escrow.is_registered(&target) {
            return Err(ConsensusError::UnknownTarget(target));
        }

        let (request_id, outcome) = self.consensus.create_request(
            &self.registry,
            initiator,
            target,
            evidence,
            signature,
            created_at,
            now,
        )?;
        self.events.push(LedgerEvent::RequestCreated {
            request_id,
            target,
            initiator,
            at: now,
        });
        Ok(self.settle(request_id, initiator, outcome, now))
    }

    pub fn attest(
        &mut self,
        request_id: &RequestId,
        signer: Address,
        signature: Signature,
        now: Timestamp,
    ) -> Result<Submission, ConsensusError> {
        let outcome = self
            .consensus
            .attest(&self.registry, request_id, signer, signature, now)?;
        Ok(self.settle(*request_id, signer, outcome, now))
    }

    fn settle(&mut self, request_id: RequestId, signer: Address, outcome: AttestOutcome, now: Timestamp) -> Submission {
        match outcome {
            AttestOutcome::Collecting { attestations, required } => {
                self.events.push(LedgerEvent::Attested {
                    request_id,
                    signer,
                    attestations,
                    required,
                });
                Submission {
                    request_id,
                    attestations,
                    required,
                    execution: None,
                }
            }
            AttestOutcome::ThresholdReached(execution) => {
                let attestations = execution.attesters.len();
                let required = self.required_signers();
                self.events.push(LedgerEvent::Attested {
                    request_id,
                    signer,
                    attestations,
                    required,
                });
                let report = self.execute(execution, now);
                Submission {
                    request_id,
                    attestations,
                    required,
                    execution: Some(report),
                }
            }
        }
    }

    /// The request is already terminal when this runs.
    fn execute(&mut self, execution: Execution, now: Timestamp) -> ExecutionReport {
        let outcome = self.target.apply(&execution.target, &execution.request_id);
        let succeeded = outcome.is_applied();
        self.consensus.record_outcome(succeeded);

        let reason = match &outcome {
            ActionOutcome::Applied => None,
            ActionOutcome::Failed { reason } => Some(reason.clone()),
        };
        self.events.push(LedgerEvent::PauseExecuted {
            request_id: execution.request_id,
            target: execution.target,
            attesters: execution.attesters.len(),
            succeeded,
            reason: reason.clone(),
        });

        if !succeeded {
            warn!(
                "Defensive action for request {} failed: {}",
                execution.request_id.short(),
                reason.unwrap_or_default()
            );
            return ExecutionReport {
                request_id: execution.request_id,
                outcome,
                claim_id: None,
            };
        }

        info!(
            "Paused {} on request {} with {} signers",
            execution.target,
            execution.request_id.short(),
            execution.attesters.len()
        );

        let claim_id = match self.escrow.open_claim(
            execution.request_id,
            execution.initiator,
            execution.attesters,
            execution.target,
            execution.evidence,
            now,
        ) {
            Ok(claim_id) => {
                let bounty = self.escrow.claim(&claim_id).map(|c| c.bounty).unwrap_or(0);
                self.events.push(LedgerEvent::ClaimOpened {
                    claim_id,
                    request_id: execution.request_id,
                    bounty,
                });
                Some(claim_id)
            }
            Err(e) => {
                warn!("Could not open claim for request {}: {}", execution.request_id.short(), e);
                self.events.push(LedgerEvent::ClaimOpenFailed {
                    request_id: execution.request_id,
                    reason: e.to_string(),
                });
                None
            }
        };

        ExecutionReport {
            request_id: execution.request_id,
            outcome,
            claim_id,
        }
    }

    pub fn dispute_claim(&mut self, caller: &Address, claim_id: &ClaimId, now: Timestamp) -> Result<(), EscrowError> {
        self.escrow.dispute_claim(caller, claim_id, now)?;
        self.events.push(LedgerEvent::ClaimDisputed {
            claim_id: *claim_id,
            by: *caller,
        });
        Ok(())
    }

    pub fn verify_evidence(&mut self, caller: &Address, claim_id: &ClaimId, now: Timestamp) -> Result<(), EscrowError> {
        self.escrow.verify_evidence(caller, claim_id, now)?;
        self.events.push(LedgerEvent::EvidenceVerified { claim_id: *claim_id });
        Ok(())
    }

    pub fn resolve_dispute(
        &mut self,
        caller: &Address,
        claim_id: &ClaimId,
        approve: bool,
    ) -> Result<Resolution, EscrowError> {
        let resolution = self
            .escrow
            .resolve_dispute(caller, claim_id, approve, &mut self.registry)?;
        self.events.push(LedgerEvent::DisputeResolved {
            claim_id: *claim_id,
            approved: approve,
        });
        if let Resolution::Rejected { slashed } = resolution {
            if let Some(claim) = self.escrow.claim(claim_id) {
                self.events.push(LedgerEvent::SignerSlashed {
                    signer: claim.originating_signer,
                    amount: slashed,
                    claim_id: *claim_id,
                });
            }
        }
        Ok(resolution)
    }

    pub fn process_payout(&mut self, claim_id: &ClaimId, now: Timestamp) -> Result<PayoutOutcome, EscrowError> {
        let outcome = self.escrow.process_payout(claim_id, now)?;
        let event = match &outcome {
            PayoutOutcome::Paid { amount, shares } => LedgerEvent::ClaimPaid {
                claim_id: *claim_id,
                amount: *amount,
                beneficiaries: shares.len(),
            },
            PayoutOutcome::AutoRejected => LedgerEvent::ClaimAutoRejected { claim_id: *claim_id },
        };
        self.events.push(event);
        Ok(outcome)
    }

    /// Check the stored aggregate signature of an executed request against
    /// the current public keys of its attesters.
    pub fn verify_decision(&self, request_id: &RequestId) -> Result<bool, ConsensusError> {
        let request = self
            .consensus
            .request(request_id)
            .ok_or(ConsensusError::UnknownRequest(*request_id))?;
        let Some(aggregated) = request.aggregated_signature else {
            return Ok(false);
        };

        let keys: Vec<PublicKey> = request
            .attesters
            .iter()
            .map(|a| {
                self.registry
                    .public_key(a)
                    .ok_or(ConsensusError::NotActiveSigner(*a))
            })
            .collect::<Result<_, _>>()?;
        let message = attestation_message(request_id);
        let messages: Vec<&[u8]> = vec![message.as_slice(); keys.len()];
        Ok(verify_aggregated(&aggregated, &messages, &keys)?)
    }
}
