// PAUSE REQUEST CONSENSUS
// Turns independent signer attestations into one collective decision.
//
// SAFETY INVARIANTS:
// 1. A request executes at most once; `executed` is set before any external call
// 2. A signer attests to a request at most once
// 3. The required count is recomputed from the live active-signer count at every attestation
// 4. Every attestation carries a BLS signature over the request's attestation message
// 5. New requests for a target are refused during its cooldown

use std::collections::{BTreeMap, HashMap};

use log::{info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use sentinel_core::{
    attestation_message, request_id, Address, EvidenceHash, MembershipRegistry, RequestId, Timestamp,
};
use sentinel_crypto::{aggregate_signatures, verify_signature, CryptoError, PublicKey, Signature};
use sentinel_economics::EscrowError;

use crate::threshold::{rate_window_reset, required_signers};

pub const DEFAULT_MIN_SIGNERS: usize = 5;
pub const DEFAULT_COOLDOWN_SECS: u64 = 3600;
pub const DEFAULT_MAX_REQUESTS_PER_WINDOW: u32 = 3;
pub const DEFAULT_RATE_WINDOW_SECS: u64 = 3600;
pub const DEFAULT_MAX_CLOCK_SKEW_SECS: u64 = 30;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConsensusError {
    #[error("{0} is not an active signer")]
    NotActiveSigner(Address),
    #[error("unknown pause request {0}")]
    UnknownRequest(RequestId),
    #[error("pause request {0} already executed")]
    AlreadyExecuted(RequestId),
    #[error("{signer} already attested to {request}")]
    AlreadyAttested { request: RequestId, signer: Address },
    #[error("pause request {0} already exists")]
    DuplicateRequest(RequestId),
    #[error("attestation signature from {0} does not verify")]
    InvalidSignature(Address),
    #[error("target {target} is cooling down until {until}")]
    CooldownActive { target: Address, until: Timestamp },
    #[error("{signer} exceeded its request limit until {resets_at}")]
    RateLimited { signer: Address, resets_at: Timestamp },
    #[error("{0} is not a protected entity")]
    UnknownTarget(Address),
    #[error("request created at {created_at} is too far from ledger time {now}")]
    ClockSkew { created_at: Timestamp, now: Timestamp },
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Escrow(#[from] EscrowError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusConfig {
    /// Absolute floor on the required attestation count
    pub min_signers: usize,
    pub cooldown_secs: u64,
    pub max_requests_per_window: u32,
    pub rate_window_secs: u64,
    /// How far a request's `created_at` may stray from ledger time
    pub max_clock_skew_secs: u64,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        ConsensusConfig {
            min_signers: DEFAULT_MIN_SIGNERS,
            cooldown_secs: DEFAULT_COOLDOWN_SECS,
            max_requests_per_window: DEFAULT_MAX_REQUESTS_PER_WINDOW,
            rate_window_secs: DEFAULT_RATE_WINDOW_SECS,
            max_clock_skew_secs: DEFAULT_MAX_CLOCK_SKEW_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PauseRequest {
    pub id: RequestId,
    pub target: Address,
    pub evidence: EvidenceHash,
    pub initiator: Address,
    pub created_at: Timestamp,
    /// Append-only, in attestation order, no duplicates
    pub attesters: Vec<Address>,
    /// `signatures[i]` was produced by `attesters[i]`
    pub signatures: Vec<Signature>,
    pub executed: bool,
    pub executed_at: Option<Timestamp>,
    /// Sum of all attestation signatures, set on execution
    pub aggregated_signature: Option<Signature>,
}

impl PauseRequest {
    pub fn has_attested(&self, signer: &Address) -> bool {
        self.attesters.contains(signer)
    }

    pub fn attestation_count(&self) -> usize {
        self.attesters.len()
    }
}

/// Everything the ledger needs to apply the defensive action and open the
/// claim. Produced once per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    pub request_id: RequestId,
    pub target: Address,
    pub evidence: EvidenceHash,
    pub initiator: Address,
    pub attesters: Vec<Address>,
    pub aggregated_signature: Signature,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttestOutcome {
    Collecting { attestations: usize, required: usize },
    ThresholdReached(Execution),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PauseStats {
    pub requests_created: u64,
    pub attestations: u64,
    pub pauses_attempted: u64,
    pub pauses_succeeded: u64,
    pub pauses_failed: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RateWindow {
    start: Timestamp,
    count: u32,
}

/// Ledger-resident pause state machine. Membership is passed into every
/// operation; nothing here is global.
#[derive(Debug, Clone)]
pub struct PauseConsensus {
    config: ConsensusConfig,
    requests: HashMap<RequestId, PauseRequest>,
    /// Last execution time per target
    last_execution: BTreeMap<Address, Timestamp>,
    rate_windows: HashMap<Address, RateWindow>,
    stats: PauseStats,
}

impl PauseConsensus {
    pub fn new(config: ConsensusConfig) -> Self {
        PauseConsensus {
            config,
            requests: HashMap::new(),
            last_execution: BTreeMap::new(),
            rate_windows: HashMap::new(),
            stats: PauseStats::default(),
        }
    }

    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    pub fn stats(&self) -> PauseStats {
        self.stats
    }

    pub fn request(&self, id: &RequestId) -> Option<&PauseRequest> {
        self.requests.get(id)
    }

    pub fn requests(&self) -> impl Iterator<Item = &PauseRequest> {
        self.requests.values()
    }

    pub fn required<R: MembershipRegistry + ?Sized>(&self, registry: &R) -> usize {
        required_signers(registry.active_signer_count(), self.config.min_signers)
    }

    /// End of the cooldown for `target`, if one is running at `now`.
    pub fn cooldown_until(&self, target: &Address, now: Timestamp) -> Option<Timestamp> {
        let until = self
            .last_execution
            .get(target)?
            .saturating_add(self.config.cooldown_secs);
        (now < until).then_some(until)
    }

    /// Open a pause request. The initiator's signature is its first
    /// attestation, so the request may execute immediately when the
    /// threshold is one.
    ///
    /// `created_at` is the initiator's timestamp and feeds the request ID.
    /// Cooldown and rate limits run on the ledger's own `now`.
    pub fn create_request<R: MembershipRegistry + ?Sized>(
        &mut self,
        registry: &R,
        initiator: Address,
        target: Address,
        evidence: EvidenceHash,
        signature: Signature,
        created_at: Timestamp,
        now: Timestamp,
    ) -> Result<(RequestId, AttestOutcome), ConsensusError> {
        let public_key = active_key(registry, &initiator)?;

        if created_at.abs_diff(now) > self.config.max_clock_skew_secs {
            warn!(
                "Rejected pause request from {}: created_at {} vs ledger time {}",
                initiator, created_at, now
            );
            return Err(ConsensusError::ClockSkew { created_at, now });
        }

        if let Some(until) = self.cooldown_until(&target, now) {
            return Err(ConsensusError::CooldownActive { target, until });
        }

        let window = self.next_rate_window(&initiator, now)?;

        let id = request_id(&target, &evidence, created_at);
        if self.requests.contains_key(&id) {
            return Err(ConsensusError::DuplicateRequest(id));
        }

        if !verify_signature(&signature, &attestation_message(&id), &public_key) {
            warn!("Rejected pause request from {}: bad signature", initiator);
            return Err(ConsensusError::InvalidSignature(initiator));
        }

        self.rate_windows.insert(initiator, window);
        self.requests.insert(
            id,
            PauseRequest {
                id,
                target,
                evidence,
                initiator,
                created_at,
                attesters: vec![initiator],
                signatures: vec![signature],
                executed: false,
                executed_at: None,
                aggregated_signature: None,
            },
        );
        self.stats.requests_created += 1;
        self.stats.attestations += 1;
        info!("Pause request {} opened by {} against {}", id.short(), initiator, target);

        let outcome = self.check_threshold(registry, &id, now)?;
        Ok((id, outcome))
    }

    /// Record one signer's attestation and execute if the live threshold is met.
    pub fn attest<R: MembershipRegistry + ?Sized>(
        &mut self,
        registry: &R,
        id: &RequestId,
        signer: Address,
        signature: Signature,
        now: Timestamp,
    ) -> Result<AttestOutcome, ConsensusError> {
        let request = self
            .requests
            .get_mut(id)
            .ok_or(ConsensusError::UnknownRequest(*id))?;

        if request.executed {
            return Err(ConsensusError::AlreadyExecuted(*id));
        }
        let public_key = active_key(registry, &signer)?;
        if request.has_attested(&signer) {
            return Err(ConsensusError::AlreadyAttested { request: *id, signer });
        }
        if !verify_signature(&signature, &attestation_message(id), &public_key) {
            warn!("Rejected attestation from {} on {}: bad signature", signer, id.short());
            return Err(ConsensusError::InvalidSignature(signer));
        }

        request.attesters.push(signer);
        request.signatures.push(signature);
        self.stats.attestations += 1;

        self.check_threshold(registry, id, now)
    }

    /// Mark the defensive action's result. Called by the ledger after `apply`.
    pub fn record_outcome(&mut self, succeeded: bool) {
        if succeeded {
            self.stats.pauses_succeeded += 1;
        } else {
            self.stats.pauses_failed += 1;
        }
    }

    fn check_threshold<R: MembershipRegistry + ?Sized>(
        &mut self,
        registry: &R,
        id: &RequestId,
        now: Timestamp,
    ) -> Result<AttestOutcome, ConsensusError> {
        let required = self.required(registry);
        let request = self
            .requests
            .get_mut(id)
            .ok_or(ConsensusError::UnknownRequest(*id))?;
        let attestations = request.attestation_count();

        if attestations < required {
            return Ok(AttestOutcome::Collecting { attestations, required });
        }

        let aggregated = aggregate_signatures(&request.signatures)?;

        // Terminal state first. Nothing after this point can re-open the request.
        request.executed = true;
        request.executed_at = Some(now);
        request.aggregated_signature = Some(aggregated);

        let execution = Execution {
            request_id: *id,
            target: request.target,
            evidence: request.evidence,
            initiator: request.initiator,
            attesters: request.attesters.clone(),
            aggregated_signature: aggregated,
        };

        self.last_execution.insert(execution.target, now);
        self.stats.pauses_attempted += 1;
        info!(
            "Pause request {} reached threshold ({}/{})",
            id.short(),
            attestations,
            required
        );
        Ok(AttestOutcome::ThresholdReached(execution))
    }

    fn next_rate_window(&self, signer: &Address, now: Timestamp) -> Result<RateWindow, ConsensusError> {
        let Some(window) = self.rate_windows.get(signer) else {
            return Ok(RateWindow { start: now, count: 1 });
        };

        let (reset, start) = rate_window_reset(window.start, now, self.config.rate_window_secs);
        if reset {
            return Ok(RateWindow { start, count: 1 });
        }
        if window.count >= self.config.max_requests_per_window {
            return Err(ConsensusError::RateLimited {
                signer: *signer,
                resets_at: start.saturating_add(self.config.rate_window_secs),
            });
        }
        Ok(RateWindow {
            start,
            count: window.count + 1,
        })
    }
}

fn active_key<R: MembershipRegistry + ?Sized>(registry: &R, signer: &Address) -> Result<PublicKey, ConsensusError> {
    if !registry.is_active_signer(signer) {
        return Err(ConsensusError::NotActiveSigner(*signer));
    }
    registry
        .public_key(signer)
        .ok_or(ConsensusError::NotActiveSigner(*signer))
}
