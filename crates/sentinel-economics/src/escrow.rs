/// BOUNTY ESCROW
///
/// Per-entity reward pools and the optimistic settlement of claims opened by
/// successful pause executions.
///
/// SAFETY INVARIANTS:
/// 1. balance == deposited - withdrawn - paid for every protected entity
/// 2. reserved == sum of bounties of open claims, and reserved <= balance
/// 3. Payout only from Approved with evidence verified
/// 4. Slashing only when a disputed claim is rejected
/// 5. Paid and Rejected are terminal
/// 6. At most one claim per executed request

use std::collections::BTreeMap;

use log::{info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use sentinel_core::{
    claim_id, Address, ClaimId, EvidenceHash, MembershipRegistry, RegistryError, RequestId,
    Timestamp, BPS_DENOMINATOR,
};

use crate::claim::{split_evenly, BountyClaim, ClaimStatus};
use crate::tiers::TierSchedule;

pub const DEFAULT_DISPUTE_WINDOW_SECS: u64 = 48 * 3600;
pub const DEFAULT_ORACLE_WINDOW_SECS: u64 = 7 * 24 * 3600;
pub const DEFAULT_REJECT_SLASH_BPS: u16 = 1_000;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EscrowError {
    #[error("protected entity {0} is not registered")]
    UnknownProtocol(Address),
    #[error("protected entity {0} is already registered")]
    ProtocolAlreadyRegistered(Address),
    #[error("amount must be non-zero")]
    ZeroAmount,
    #[error("insufficient escrow: requested {requested}, available {available}")]
    InsufficientEscrow { requested: u128, available: u128 },
    #[error("{caller} is not authorized to {action}")]
    Unauthorized { caller: Address, action: &'static str },
    #[error("unknown claim {0}")]
    UnknownClaim(ClaimId),
    #[error("claim {0} already exists")]
    DuplicateClaim(ClaimId),
    #[error("claim needs at least one beneficiary")]
    NoBeneficiaries,
    #[error("claim {claim} is {status}, cannot {action}")]
    UnexpectedStatus {
        claim: ClaimId,
        status: ClaimStatus,
        action: &'static str,
    },
    #[error("dispute window closed at {deadline}, now {now}")]
    DisputeWindowClosed { deadline: Timestamp, now: Timestamp },
    #[error("oracle window closed at {deadline}, now {now}")]
    OracleWindowClosed { deadline: Timestamp, now: Timestamp },
    #[error("oracle decision required for claim {0}")]
    OracleDecisionRequired(ClaimId),
    #[error("invalid claim {claim}: status {status}")]
    InvalidClaim { claim: ClaimId, status: ClaimStatus },
    #[error("slashing failed: {0}")]
    Slashing(#[from] RegistryError),
    #[error("escrow invariant violated: {0}")]
    InvariantViolation(String),
    #[error("invalid escrow config: {0}")]
    InvalidConfig(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowConfig {
    pub dispute_window_secs: u64,
    pub oracle_window_secs: u64,
    pub reject_slash_bps: u16,
    pub tiers: TierSchedule,
}

impl EscrowConfig {
    pub fn validate(&self) -> Result<(), EscrowError> {
        if self.dispute_window_secs == 0 {
            return Err(EscrowError::InvalidConfig("dispute window must be non-zero".into()));
        }
        if self.oracle_window_secs < self.dispute_window_secs {
            return Err(EscrowError::InvalidConfig(format!(
                "oracle window {}s is shorter than dispute window {}s",
                self.oracle_window_secs, self.dispute_window_secs
            )));
        }
        if !is_valid_bps(self.reject_slash_bps) {
            return Err(EscrowError::InvalidConfig(format!(
                "reject slash of {} bps exceeds 10000",
                self.reject_slash_bps
            )));
        }
        if !self.tiers.is_sorted() {
            return Err(EscrowError::InvalidConfig("bounty tiers must be sorted by tvl".into()));
        }
        Ok(())
    }
}

impl Default for EscrowConfig {
    fn default() -> Self {
        EscrowConfig {
            dispute_window_secs: DEFAULT_DISPUTE_WINDOW_SECS,
            oracle_window_secs: DEFAULT_ORACLE_WINDOW_SECS,
            reject_slash_bps: DEFAULT_REJECT_SLASH_BPS,
            tiers: TierSchedule::default(),
        }
    }
}

/// Escrow account of one protected entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolAccount {
    pub tvl: u128,
    pub balance: u128,
    /// Bounties of open claims; not withdrawable
    pub reserved: u128,
    pub deposited: u128,
    pub withdrawn: u128,
    pub paid: u128,
    pub registered_at: Timestamp,
}

impl ProtocolAccount {
    /// Balance not promised to an open claim.
    pub fn available(&self) -> u128 {
        self.balance.saturating_sub(self.reserved)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayoutOutcome {
    Paid {
        amount: u128,
        shares: Vec<(Address, u128)>,
    },
    /// Pending past its oracle deadline; rejected without slashing
    AutoRejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Approved,
    Rejected { slashed: u128 },
}

#[derive(Debug, Clone)]
pub struct BountyEscrow {
    config: EscrowConfig,
    admin: Address,
    oracle: Address,
    accounts: BTreeMap<Address, ProtocolAccount>,
    claims: BTreeMap<ClaimId, BountyClaim>,
    /// Credited on payout; transfer to the beneficiary happens elsewhere
    beneficiary_balances: BTreeMap<Address, u128>,
}

impl BountyEscrow {
    pub fn new(config: EscrowConfig, admin: Address, oracle: Address) -> Result<Self, EscrowError> {
        config.validate()?;
        Ok(BountyEscrow {
            config,
            admin,
            oracle,
            accounts: BTreeMap::new(),
            claims: BTreeMap::new(),
            beneficiary_balances: BTreeMap::new(),
        })
    }

    pub fn config(&self) -> &EscrowConfig {
        &self.config
    }

    pub fn oracle(&self) -> Address {
        self.oracle
    }

    pub fn admin(&self) -> Address {
        self.admin
    }

    pub fn is_registered(&self, entity: &Address) -> bool {
        self.accounts.contains_key(entity)
    }

    pub fn account(&self, entity: &Address) -> Option<&ProtocolAccount> {
        self.accounts.get(entity)
    }

    pub fn balance_of(&self, entity: &Address) -> u128 {
        self.accounts.get(entity).map(|a| a.balance).unwrap_or(0)
    }

    pub fn available_of(&self, entity: &Address) -> u128 {
        self.accounts.get(entity).map(|a| a.available()).unwrap_or(0)
    }

    /// The claim opened for an executed request, if any.
    pub fn claim_for_request(&self, request_id: &RequestId) -> Option<&BountyClaim> {
        self.claims.get(&claim_id(request_id))
    }

    pub fn claim(&self, id: &ClaimId) -> Option<&BountyClaim> {
        self.claims.get(id)
    }

    pub fn claims(&self) -> impl Iterator<Item = &BountyClaim> {
        self.claims.values()
    }

    pub fn beneficiary_balance(&self, who: &Address) -> u128 {
        self.beneficiary_balances.get(who).copied().unwrap_or(0)
    }

    pub fn register_protocol(
        &mut self,
        entity: Address,
        tvl: u128,
        now: Timestamp,
    ) -> Result<(), EscrowError> {
        if self.accounts.contains_key(&entity) {
            return Err(EscrowError::ProtocolAlreadyRegistered(entity));
        }
        self.accounts.insert(
            entity,
            ProtocolAccount {
                tvl,
                registered_at: now,
                ..ProtocolAccount::default()
            },
        );
        info!("Registered protected entity {} with TVL {}", entity, tvl);
        Ok(())
    }

    pub fn update_tvl(&mut self, caller: &Address, entity: &Address, tvl: u128) -> Result<(), EscrowError> {
        self.require_entity_or_admin(caller, entity, "update tvl")?;
        let account = self.account_mut(entity)?;
        account.tvl = tvl;
        Ok(())
    }

    /// Returns the new balance.
    pub fn deposit_bounty(&mut self, entity: &Address, amount: u128) -> Result<u128, EscrowError> {
        if amount == 0 {
            return Err(EscrowError::ZeroAmount);
        }
        let account = self.account_mut(entity)?;
        account.balance = account.balance.saturating_add(amount);
        account.deposited = account.deposited.saturating_add(amount);
        info!("Deposited {} into escrow of {}", amount, entity);
        Ok(account.balance)
    }

    /// Returns the new balance. Only the unreserved part can leave.
    pub fn withdraw_bounty(
        &mut self,
        caller: &Address,
        entity: &Address,
        amount: u128,
    ) -> Result<u128, EscrowError> {
        self.require_entity_or_admin(caller, entity, "withdraw bounty")?;
        if amount == 0 {
            return Err(EscrowError::ZeroAmount);
        }
        let account = self.account_mut(entity)?;
        if amount > account.available() {
            return Err(EscrowError::InsufficientEscrow {
                requested: amount,
                available: account.available(),
            });
        }
        account.balance -= amount;
        account.withdrawn += amount;
        info!("Withdrew {} from escrow of {}", amount, entity);
        Ok(account.balance)
    }

    /// Open the claim for the successful pause of `request_id`.
    /// `beneficiaries` is the full attester list, originating signer first.
    /// The bounty is reserved until the claim settles.
    pub fn open_claim(
        &mut self,
        request_id: RequestId,
        originating_signer: Address,
        beneficiaries: Vec<Address>,
        target: Address,
        evidence: EvidenceHash,
        now: Timestamp,
    ) -> Result<ClaimId, EscrowError> {
        if beneficiaries.is_empty() {
            return Err(EscrowError::NoBeneficiaries);
        }
        let id = claim_id(&request_id);
        if self.claims.contains_key(&id) {
            return Err(EscrowError::DuplicateClaim(id));
        }

        let tiers = &self.config.tiers;
        let account = self
            .accounts
            .get_mut(&target)
            .ok_or(EscrowError::UnknownProtocol(target))?;
        let bounty = tiers.bounty_for(account.tvl).min(account.available());
        account.reserved += bounty;
        let tvl_snapshot = account.tvl;

        let claim = BountyClaim {
            id,
            request_id,
            originating_signer,
            beneficiaries,
            target,
            evidence,
            tvl_snapshot,
            bounty,
            created_at: now,
            dispute_deadline: now.saturating_add(self.config.dispute_window_secs),
            oracle_deadline: now.saturating_add(self.config.oracle_window_secs),
            evidence_verified: false,
            status: ClaimStatus::Pending,
            disputed_by: None,
            paid_amount: 0,
        };

        info!(
            "Opened claim {} for {} (bounty {}, {} beneficiaries)",
            id.short(),
            target,
            bounty,
            claim.beneficiaries.len()
        );
        self.claims.insert(id, claim);
        Ok(id)
    }

    /// Contest a Pending claim. Only the target entity or the admin, and only
    /// before the dispute deadline.
    pub fn dispute_claim(&mut self, caller: &Address, id: &ClaimId, now: Timestamp) -> Result<(), EscrowError> {
        let admin = self.admin;
        let claim = self.claim_mut(id)?;

        if *caller != claim.target && *caller != admin {
            return Err(EscrowError::Unauthorized {
                caller: *caller,
                action: "dispute claim",
            });
        }
        check_transition(claim, ClaimStatus::Pending, ClaimStatus::Disputed, "dispute")?;
        if !claim.in_dispute_window(now) {
            return Err(EscrowError::DisputeWindowClosed {
                deadline: claim.dispute_deadline,
                now,
            });
        }

        transition(claim, ClaimStatus::Disputed, "dispute")?;
        claim.disputed_by = Some(*caller);
        warn!("Claim {} disputed by {}", id.short(), caller);
        Ok(())
    }

    /// Oracle confirms the evidence of an undisputed claim.
    pub fn verify_evidence(&mut self, caller: &Address, id: &ClaimId, now: Timestamp) -> Result<(), EscrowError> {
        self.require_oracle(caller, "verify evidence")?;
        let claim = self.claim_mut(id)?;

        check_transition(claim, ClaimStatus::Pending, ClaimStatus::Approved, "verify evidence")?;
        if claim.oracle_deadline_elapsed(now) {
            return Err(EscrowError::OracleWindowClosed {
                deadline: claim.oracle_deadline,
                now,
            });
        }

        transition(claim, ClaimStatus::Approved, "verify evidence")?;
        claim.evidence_verified = true;
        info!("Claim {} evidence verified", id.short());
        Ok(())
    }

    /// Oracle settles a disputed claim. Rejection slashes the originating
    /// signer by `reject_slash_bps` of its stake.
    pub fn resolve_dispute<R: MembershipRegistry + ?Sized>(
        &mut self,
        caller: &Address,
        id: &ClaimId,
        approve: bool,
        registry: &mut R,
    ) -> Result<Resolution, EscrowError> {
        self.require_oracle(caller, "resolve dispute")?;
        let reject_bps = self.config.reject_slash_bps;
        let claim = self.claim_mut(id)?;
        let next = if approve { ClaimStatus::Approved } else { ClaimStatus::Rejected };
        check_transition(claim, ClaimStatus::Disputed, next, "resolve dispute")?;

        if approve {
            transition(claim, ClaimStatus::Approved, "resolve dispute")?;
            claim.evidence_verified = true;
            info!("Dispute on claim {} resolved: approved", id.short());
            return Ok(Resolution::Approved);
        }

        let reason = format!("claim {} rejected by oracle", id);
        let slashed = registry.slash(&claim.originating_signer, reject_bps, &reason)?;
        transition(claim, ClaimStatus::Rejected, "resolve dispute")?;
        let (target, bounty, originator) = (claim.target, claim.bounty, claim.originating_signer);
        self.release(&target, bounty);
        warn!(
            "Dispute on claim {} resolved: rejected, slashed {} from {}",
            id.short(),
            slashed,
            originator
        );
        Ok(Resolution::Rejected { slashed })
    }

    /// Settle a claim. Pays an Approved, verified claim split evenly across its
    /// beneficiaries; auto-rejects a Pending claim whose oracle deadline has
    /// passed. Anything else is an error.
    pub fn process_payout(&mut self, id: &ClaimId, now: Timestamp) -> Result<PayoutOutcome, EscrowError> {
        let claim = self.claims.get(id).ok_or(EscrowError::UnknownClaim(*id))?;

        match claim.status {
            ClaimStatus::Pending if claim.oracle_deadline_elapsed(now) => {
                let (target, bounty) = (claim.target, claim.bounty);
                transition(self.claim_mut(id)?, ClaimStatus::Rejected, "auto-reject")?;
                self.release(&target, bounty);
                warn!("Claim {} auto-rejected: oracle deadline elapsed", id.short());
                return Ok(PayoutOutcome::AutoRejected);
            }
            ClaimStatus::Pending | ClaimStatus::Disputed => {
                return Err(EscrowError::OracleDecisionRequired(*id));
            }
            ClaimStatus::Approved if claim.is_payable() => {}
            status => {
                return Err(EscrowError::InvalidClaim { claim: *id, status });
            }
        }

        let target = claim.target;
        let bounty = claim.bounty;
        let beneficiaries = claim.beneficiaries.clone();

        transition(self.claim_mut(id)?, ClaimStatus::Paid, "pay out")?;

        let account = self.account_mut(&target)?;
        // Reserved at opening, so the balance always covers it.
        let amount = bounty.min(account.balance);
        account.reserved = account.reserved.saturating_sub(bounty);
        account.balance -= amount;
        account.paid += amount;

        let shares = split_evenly(amount, &beneficiaries);
        for (who, share) in &shares {
            let entry = self.beneficiary_balances.entry(*who).or_insert(0);
            *entry = entry.saturating_add(*share);
        }
        if let Some(claim) = self.claims.get_mut(id) {
            claim.paid_amount = amount;
        }
        info!(
            "Paid claim {}: {} across {} beneficiaries",
            id.short(),
            amount,
            shares.len()
        );
        Ok(PayoutOutcome::Paid { amount, shares })
    }

    /// Conservation checks over every account and claim.
    pub fn verify_invariants(&self) -> Result<(), EscrowError> {
        let mut paid_by_target: BTreeMap<Address, u128> = BTreeMap::new();
        let mut reserved_by_target: BTreeMap<Address, u128> = BTreeMap::new();
        for claim in self.claims.values() {
            if !claim.status.is_terminal() {
                *reserved_by_target.entry(claim.target).or_insert(0) += claim.bounty;
            }
            if claim.status == ClaimStatus::Paid {
                if !claim.evidence_verified {
                    return Err(EscrowError::InvariantViolation(format!(
                        "claim {} paid without verified evidence",
                        claim.id
                    )));
                }
                *paid_by_target.entry(claim.target).or_insert(0) += claim.paid_amount;
            } else if claim.paid_amount != 0 {
                return Err(EscrowError::InvariantViolation(format!(
                    "claim {} has payout but status {}",
                    claim.id, claim.status
                )));
            }
        }

        let mut total_paid: u128 = 0;
        for (entity, account) in &self.accounts {
            let expected = account
                .deposited
                .checked_sub(account.withdrawn)
                .and_then(|v| v.checked_sub(account.paid));
            if expected != Some(account.balance) {
                return Err(EscrowError::InvariantViolation(format!(
                    "balance of {} is {}, ledger implies {:?}",
                    entity, account.balance, expected
                )));
            }
            let reserved = reserved_by_target.get(entity).copied().unwrap_or(0);
            if reserved != account.reserved || account.reserved > account.balance {
                return Err(EscrowError::InvariantViolation(format!(
                    "{} reserves {} of balance {}, open claims hold {}",
                    entity, account.reserved, account.balance, reserved
                )));
            }
            let paid_claims = paid_by_target.get(entity).copied().unwrap_or(0);
            if paid_claims != account.paid {
                return Err(EscrowError::InvariantViolation(format!(
                    "{} paid {} but claims sum to {}",
                    entity, account.paid, paid_claims
                )));
            }
            total_paid += account.paid;
        }

        let credited: u128 = self.beneficiary_balances.values().sum();
        if credited != total_paid {
            return Err(EscrowError::InvariantViolation(format!(
                "beneficiaries credited {} but {} paid out",
                credited, total_paid
            )));
        }
        Ok(())
    }

    fn account_mut(&mut self, entity: &Address) -> Result<&mut ProtocolAccount, EscrowError> {
        self.accounts
            .get_mut(entity)
            .ok_or(EscrowError::UnknownProtocol(*entity))
    }

    fn claim_mut(&mut self, id: &ClaimId) -> Result<&mut BountyClaim, EscrowError> {
        self.claims.get_mut(id).ok_or(EscrowError::UnknownClaim(*id))
    }

    /// Return a rejected claim's bounty to the withdrawable pool.
    fn release(&mut self, entity: &Address, bounty: u128) {
        if let Some(account) = self.accounts.get_mut(entity) {
            account.reserved = account.reserved.saturating_sub(bounty);
        }
    }

    fn require_oracle(&self, caller: &Address, action: &'static str) -> Result<(), EscrowError> {
        if *caller != self.oracle {
            return Err(EscrowError::Unauthorized { caller: *caller, action });
        }
        Ok(())
    }

    fn require_entity_or_admin(
        &self,
        caller: &Address,
        entity: &Address,
        action: &'static str,
    ) -> Result<(), EscrowError> {
        if caller != entity && *caller != self.admin {
            return Err(EscrowError::Unauthorized { caller: *caller, action });
        }
        Ok(())
    }
}

/// The claim is in `from` and the lifecycle allows `from -> to`.
fn check_transition(
    claim: &BountyClaim,
    from: ClaimStatus,
    to: ClaimStatus,
    action: &'static str,
) -> Result<(), EscrowError> {
    if claim.status != from || !from.can_transition_to(to) {
        return Err(EscrowError::UnexpectedStatus {
            claim: claim.id,
            status: claim.status,
            action,
        });
    }
    Ok(())
}

/// Every status change goes through here.
fn transition(claim: &mut BountyClaim, to: ClaimStatus, action: &'static str) -> Result<(), EscrowError> {
    check_transition(claim, claim.status, to, action)?;
    claim.status = to;
    Ok(())
}

/// Reject-slash rates above 100% are meaningless.
pub fn is_valid_bps(bps: u16) -> bool {
    (bps as u128) <= BPS_DENOMINATOR
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tiers::TOKEN;
    use sentinel_core::{keccak256, request_id, SignerRegistry};
    use sentinel_crypto::BlsKeyPair;

    struct Fixture {
        escrow: BountyEscrow,
        registry: SignerRegistry,
        protocol: Address,
        admin: Address,
        oracle: Address,
        signers: Vec<Address>,
    }

    fn fixture(signers: usize) -> Fixture {
        let admin = Address::derive(b"admin");
        let oracle = Address::derive(b"oracle");
        let protocol = Address::derive(b"protocol");
        let mut escrow = BountyEscrow::new(EscrowConfig::default(), admin, oracle).unwrap();
        escrow.register_protocol(protocol, 500_000 * TOKEN, 0).unwrap();

        let mut registry = SignerRegistry::new(TOKEN);
        let ids: Vec<Address> = (0..signers)
            .map(|i| {
                let kp = BlsKeyPair::generate();
                let id = Address::derive(format!("signer-{}", i).as_bytes());
                registry
                    .register(id, kp.public, &kp.prove_possession(), 10 * TOKEN, 0)
                    .unwrap();
                registry.activate(&id).unwrap();
                id
            })
            .collect();

        Fixture { escrow, registry, protocol, admin, oracle, signers: ids }
    }

    fn open(f: &mut Fixture, now: Timestamp) -> ClaimId {
        let evidence = keccak256(b"evidence");
        let request = request_id(&f.protocol, &evidence, now);
        f.escrow
            .open_claim(request, f.signers[0], f.signers.clone(), f.protocol, evidence, now)
            .unwrap()
    }

    #[test]
    fn test_deposit_and_withdraw() {
        let mut f = fixture(1);
        assert_eq!(f.escrow.deposit_bounty(&f.protocol, 100).unwrap(), 100);
        assert_eq!(f.escrow.withdraw_bounty(&f.protocol, &f.protocol, 40).unwrap(), 60);
        assert_eq!(
            f.escrow.withdraw_bounty(&f.admin, &f.protocol, 61),
            Err(EscrowError::InsufficientEscrow { requested: 61, available: 60 })
        );
        let stranger = Address::derive(b"stranger");
        assert!(matches!(
            f.escrow.withdraw_bounty(&stranger, &f.protocol, 1),
            Err(EscrowError::Unauthorized { .. })
        ));
        assert_eq!(f.escrow.deposit_bounty(&f.protocol, 0), Err(EscrowError::ZeroAmount));
        f.escrow.verify_invariants().unwrap();
    }

    #[test]
    fn test_bounty_capped_by_balance() {
        let mut f = fixture(2);
        f.escrow.deposit_bounty(&f.protocol, 10 * TOKEN).unwrap();
        let id = open(&mut f, 0);
        assert_eq!(f.escrow.claim(&id).unwrap().bounty, 10 * TOKEN);

        let mut g = fixture(2);
        g.escrow.deposit_bounty(&g.protocol, 2_000 * TOKEN).unwrap();
        let id = open(&mut g, 0);
        assert_eq!(g.escrow.claim(&id).unwrap().bounty, 1_000 * TOKEN);
    }

    #[test]
    fn test_open_claim_sets_deadlines() {
        let mut f = fixture(1);
        let id = open(&mut f, 1_000);
        let claim = f.escrow.claim(&id).unwrap();
        assert_eq!(claim.status, ClaimStatus::Pending);
        assert_eq!(claim.dispute_deadline, 1_000 + 172_800);
        assert_eq!(claim.oracle_deadline, 1_000 + 604_800);
        assert!(!claim.evidence_verified);
    }

    #[test]
    fn test_open_claim_rejects_unknown_target_and_duplicates() {
        let mut f = fixture(1);
        let ghost = Address::derive(b"ghost");
        let stray = request_id(&ghost, &keccak256(b"e"), 0);
        assert_eq!(
            f.escrow.open_claim(stray, f.signers[0], f.signers.clone(), ghost, keccak256(b"e"), 0),
            Err(EscrowError::UnknownProtocol(ghost))
        );
        let id = open(&mut f, 5);
        let request = f.escrow.claim(&id).unwrap().request_id;
        assert_eq!(
            f.escrow.open_claim(request, f.signers[0], f.signers.clone(), f.protocol, keccak256(b"evidence"), 9),
            Err(EscrowError::DuplicateClaim(id))
        );
        assert_eq!(
            f.escrow.open_claim(stray, f.signers[0], vec![], f.protocol, keccak256(b"x"), 5),
            Err(EscrowError::NoBeneficiaries)
        );
    }

    #[test]
    fn test_requests_with_same_evidence_get_separate_claims() {
        let mut f = fixture(2);
        f.escrow.deposit_bounty(&f.protocol, 2_000).unwrap();
        let evidence = keccak256(b"evidence");
        let first = request_id(&f.protocol, &evidence, 1);
        let second = request_id(&f.protocol, &evidence, 2);

        let a = f
            .escrow
            .open_claim(first, f.signers[0], f.signers.clone(), f.protocol, evidence, 10)
            .unwrap();
        let b = f
            .escrow
            .open_claim(second, f.signers[1], f.signers.clone(), f.protocol, evidence, 10)
            .unwrap();
        assert_ne!(a, b);
        assert_eq!(f.escrow.claim_for_request(&second).unwrap().id, b);
        assert_eq!(f.escrow.claims().count(), 2);
        f.escrow.verify_invariants().unwrap();
    }

    #[test]
    fn test_dispute_only_by_target_or_admin_within_window() {
        let mut f = fixture(1);
        let id = open(&mut f, 0);

        let signer = f.signers[0];
        assert!(matches!(
            f.escrow.dispute_claim(&signer, &id, 10),
            Err(EscrowError::Unauthorized { .. })
        ));
        assert_eq!(
            f.escrow.dispute_claim(&f.protocol.clone(), &id, 172_800),
            Err(EscrowError::DisputeWindowClosed { deadline: 172_800, now: 172_800 })
        );

        let admin = f.admin;
        f.escrow.dispute_claim(&admin, &id, 10).unwrap();
        assert_eq!(f.escrow.claim(&id).unwrap().status, ClaimStatus::Disputed);
        assert!(matches!(
            f.escrow.dispute_claim(&admin, &id, 11),
            Err(EscrowError::UnexpectedStatus { .. })
        ));
    }

    #[test]
    fn test_only_oracle_verifies() {
        let mut f = fixture(1);
        let id = open(&mut f, 0);
        let protocol = f.protocol;
        assert!(matches!(
            f.escrow.verify_evidence(&protocol, &id, 1),
            Err(EscrowError::Unauthorized { .. })
        ));
        let oracle = f.oracle;
        f.escrow.verify_evidence(&oracle, &id, 1).unwrap();
        assert!(f.escrow.claim(&id).unwrap().is_payable());
    }

    #[test]
    fn test_verify_after_oracle_deadline_fails() {
        let mut f = fixture(1);
        let id = open(&mut f, 0);
        let oracle = f.oracle;
        assert_eq!(
            f.escrow.verify_evidence(&oracle, &id, 604_800),
            Err(EscrowError::OracleWindowClosed { deadline: 604_800, now: 604_800 })
        );
    }

    #[test]
    fn test_payout_requires_oracle_decision() {
        let mut f = fixture(3);
        f.escrow.deposit_bounty(&f.protocol, 5_000 * TOKEN).unwrap();
        let id = open(&mut f, 0);
        assert_eq!(
            f.escrow.process_payout(&id, 100),
            Err(EscrowError::OracleDecisionRequired(id))
        );

        // after dispute window, still no auto-approval
        assert_eq!(
            f.escrow.process_payout(&id, 200_000),
            Err(EscrowError::OracleDecisionRequired(id))
        );
    }

    #[test]
    fn test_pending_past_oracle_deadline_auto_rejects_without_slash() {
        let mut f = fixture(2);
        let id = open(&mut f, 0);
        let stake_before = f.registry.stake_of(&f.signers[0]);

        assert_eq!(f.escrow.process_payout(&id, 604_800), Ok(PayoutOutcome::AutoRejected));
        assert_eq!(f.escrow.claim(&id).unwrap().status, ClaimStatus::Rejected);
        assert_eq!(f.registry.stake_of(&f.signers[0]), stake_before);
        assert!(matches!(
            f.escrow.process_payout(&id, 604_801),
            Err(EscrowError::InvalidClaim { status: ClaimStatus::Rejected, .. })
        ));
    }

    #[test]
    fn test_payout_splits_with_remainder_to_first() {
        let mut f = fixture(3);
        f.escrow.deposit_bounty(&f.protocol, 1_000).unwrap();
        let id = open(&mut f, 0);
        let oracle = f.oracle;
        f.escrow.verify_evidence(&oracle, &id, 10).unwrap();

        let outcome = f.escrow.process_payout(&id, 11).unwrap();
        assert_eq!(
            outcome,
            PayoutOutcome::Paid {
                amount: 1_000,
                shares: vec![(f.signers[0], 334), (f.signers[1], 333), (f.signers[2], 333)],
            }
        );
        assert_eq!(f.escrow.beneficiary_balance(&f.signers[0]), 334);
        assert_eq!(f.escrow.balance_of(&f.protocol), 0);
        assert_eq!(f.escrow.claim(&id).unwrap().status, ClaimStatus::Paid);
        f.escrow.verify_invariants().unwrap();

        assert!(matches!(
            f.escrow.process_payout(&id, 12),
            Err(EscrowError::InvalidClaim { status: ClaimStatus::Paid, .. })
        ));
    }

    #[test]
    fn test_open_claim_reserves_its_bounty() {
        let mut f = fixture(2);
        f.escrow.deposit_bounty(&f.protocol, 1_500).unwrap();
        let id = open(&mut f, 0);
        let protocol = f.protocol;
        assert_eq!(f.escrow.account(&protocol).unwrap().reserved, 1_500);
        assert_eq!(f.escrow.available_of(&protocol), 0);

        // The target cannot drain the pool under a pending claim.
        assert_eq!(
            f.escrow.withdraw_bounty(&protocol, &protocol, 1),
            Err(EscrowError::InsufficientEscrow { requested: 1, available: 0 })
        );
        f.escrow.dispute_claim(&protocol, &id, 1).unwrap();
        assert!(f.escrow.withdraw_bounty(&protocol, &protocol, 1).is_err());
        f.escrow.deposit_bounty(&protocol, 200).unwrap();
        assert_eq!(f.escrow.withdraw_bounty(&protocol, &protocol, 200).unwrap(), 1_500);

        let oracle = f.oracle;
        f.escrow.resolve_dispute(&oracle, &id, true, &mut f.registry).unwrap();
        assert_eq!(
            f.escrow.process_payout(&id, 2),
            Ok(PayoutOutcome::Paid {
                amount: 1_500,
                shares: vec![(f.signers[0], 750), (f.signers[1], 750)],
            })
        );
        assert_eq!(f.escrow.account(&protocol).unwrap().reserved, 0);
        f.escrow.verify_invariants().unwrap();
    }

    #[test]
    fn test_second_claim_only_gets_unreserved_funds() {
        let mut f = fixture(1);
        f.escrow.deposit_bounty(&f.protocol, 1_500 * TOKEN).unwrap();
        let first = open(&mut f, 0);
        let second = open(&mut f, 1);
        assert_eq!(f.escrow.claim(&first).unwrap().bounty, 1_000 * TOKEN);
        assert_eq!(f.escrow.claim(&second).unwrap().bounty, 500 * TOKEN);
        assert_eq!(f.escrow.available_of(&f.protocol), 0);
        f.escrow.verify_invariants().unwrap();
    }

    #[test]
    fn test_rejection_releases_reservation() {
        let mut f = fixture(1);
        f.escrow.deposit_bounty(&f.protocol, 1_000).unwrap();
        let disputed = open(&mut f, 0);
        let protocol = f.protocol;
        f.escrow.dispute_claim(&protocol, &disputed, 1).unwrap();
        let oracle = f.oracle;
        f.escrow.resolve_dispute(&oracle, &disputed, false, &mut f.registry).unwrap();
        assert_eq!(f.escrow.available_of(&protocol), 1_000);

        let stale = open(&mut f, 10);
        assert_eq!(f.escrow.available_of(&protocol), 0);
        assert_eq!(f.escrow.process_payout(&stale, 10 + 604_800), Ok(PayoutOutcome::AutoRejected));
        assert_eq!(f.escrow.available_of(&protocol), 1_000);
        assert_eq!(f.escrow.withdraw_bounty(&protocol, &protocol, 1_000).unwrap(), 0);
        f.escrow.verify_invariants().unwrap();
    }

    #[test]
    fn test_status_changes_follow_lifecycle() {
        let mut f = fixture(1);
        f.escrow.deposit_bounty(&f.protocol, 1_000).unwrap();
        let id = open(&mut f, 0);
        let oracle = f.oracle;
        f.escrow.verify_evidence(&oracle, &id, 1).unwrap();

        // Approved claims cannot be disputed or re-verified.
        let protocol = f.protocol;
        assert!(matches!(
            f.escrow.dispute_claim(&protocol, &id, 2),
            Err(EscrowError::UnexpectedStatus { status: ClaimStatus::Approved, .. })
        ));
        assert!(matches!(
            f.escrow.verify_evidence(&oracle, &id, 2),
            Err(EscrowError::UnexpectedStatus { status: ClaimStatus::Approved, .. })
        ));
        f.escrow.process_payout(&id, 3).unwrap();
        assert!(matches!(
            f.escrow.resolve_dispute(&oracle, &id, false, &mut f.registry),
            Err(EscrowError::UnexpectedStatus { status: ClaimStatus::Paid, .. })
        ));
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let admin = Address::derive(b"admin");
        let oracle = Address::derive(b"oracle");
        let short_oracle = EscrowConfig {
            dispute_window_secs: 7_200,
            oracle_window_secs: 3_600,
            ..EscrowConfig::default()
        };
        assert!(matches!(
            BountyEscrow::new(short_oracle, admin, oracle),
            Err(EscrowError::InvalidConfig(_))
        ));

        let zero_dispute = EscrowConfig { dispute_window_secs: 0, ..EscrowConfig::default() };
        assert!(BountyEscrow::new(zero_dispute, admin, oracle).is_err());

        let over_bps = EscrowConfig { reject_slash_bps: 10_001, ..EscrowConfig::default() };
        assert!(BountyEscrow::new(over_bps, admin, oracle).is_err());

        let mut unsorted = EscrowConfig::default();
        unsorted.tiers.tiers.reverse();
        assert!(BountyEscrow::new(unsorted, admin, oracle).is_err());

        let equal = EscrowConfig {
            dispute_window_secs: 3_600,
            oracle_window_secs: 3_600,
            ..EscrowConfig::default()
        };
        assert!(BountyEscrow::new(equal, admin, oracle).is_ok());
    }

    #[test]
    fn test_rejected_dispute_slashes_originator() {
        let mut f = fixture(2);
        f.escrow.deposit_bounty(&f.protocol, 1_000).unwrap();
        let id = open(&mut f, 0);
        let protocol = f.protocol;
        f.escrow.dispute_claim(&protocol, &id, 1).unwrap();

        let stake = f.registry.stake_of(&f.signers[0]);
        let oracle = f.oracle;
        let resolution = f
            .escrow
            .resolve_dispute(&oracle, &id, false, &mut f.registry)
            .unwrap();
        assert_eq!(resolution, Resolution::Rejected { slashed: stake / 10 });
        assert_eq!(f.registry.stake_of(&f.signers[0]), stake - stake / 10);
        assert_eq!(f.registry.stake_of(&f.signers[1]), stake);
    }

    #[test]
    fn test_approved_dispute_is_payable() {
        let mut f = fixture(2);
        f.escrow.deposit_bounty(&f.protocol, 1_000).unwrap();
        let id = open(&mut f, 0);
        let protocol = f.protocol;
        f.escrow.dispute_claim(&protocol, &id, 1).unwrap();
        assert_eq!(f.escrow.process_payout(&id, 2), Err(EscrowError::OracleDecisionRequired(id)));

        let oracle = f.oracle;
        assert_eq!(
            f.escrow.resolve_dispute(&oracle, &id, true, &mut f.registry),
            Ok(Resolution::Approved)
        );
        assert!(matches!(f.escrow.process_payout(&id, 3), Ok(PayoutOutcome::Paid { amount: 1_000, .. })));
    }

    #[test]
    fn test_resolve_requires_disputed_status() {
        let mut f = fixture(1);
        let id = open(&mut f, 0);
        let oracle = f.oracle;
        assert!(matches!(
            f.escrow.resolve_dispute(&oracle, &id, true, &mut f.registry),
            Err(EscrowError::UnexpectedStatus { status: ClaimStatus::Pending, .. })
        ));
    }

    #[test]
    fn test_update_tvl_changes_future_tiers() {
        let mut f = fixture(1);
        f.escrow.deposit_bounty(&f.protocol, 1_000_000 * TOKEN).unwrap();
        let protocol = f.protocol;
        f.escrow.update_tvl(&protocol, &protocol, 50_000_000 * TOKEN).unwrap();
        let id = open(&mut f, 0);
        assert_eq!(f.escrow.claim(&id).unwrap().bounty, 25_000 * TOKEN);
        assert_eq!(f.escrow.claim(&id).unwrap().tvl_snapshot, 50_000_000 * TOKEN);
    }
}
