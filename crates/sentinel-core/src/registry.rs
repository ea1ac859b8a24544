// SIGNER MEMBERSHIP & STAKE REGISTRY
// Authoritative record of who may attest to pause requests.
//
// SAFETY INVARIANTS:
// 1. Each signer ID is registered at most once
// 2. A signer's BLS key is admitted only with a valid proof of possession
// 3. Only Active signers count toward the live threshold
// 4. A signer whose stake drops below the minimum is deactivated immediately
// 5. Slashing is recorded in an append-only audit trail

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use log::{info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use sentinel_crypto::{verify_possession, PublicKey, Signature};

use crate::types::{apply_bps, Address, Timestamp, BPS_DENOMINATOR};

/// Read/slash view of the registry consumed by the consensus and escrow
/// layers.
pub trait MembershipRegistry {
    fn is_active_signer(&self, id: &Address) -> bool;

    fn active_signer_count(&self) -> usize;

    fn public_key(&self, id: &Address) -> Option<PublicKey>;

    /// Remove `floor(stake * basis_points / 10000)` from the signer's stake.
    /// Returns the amount slashed.
    fn slash(&mut self, id: &Address, basis_points: u16, reason: &str) -> Result<u128, RegistryError>;
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("signer {0} already registered")]
    AlreadyRegistered(Address),
    #[error("signer {0} not found")]
    UnknownSigner(Address),
    #[error("proof of possession does not verify for signer {0}")]
    InvalidProofOfPossession(Address),
    #[error("stake {stake} below minimum {minimum}")]
    InsufficientStake { stake: u128, minimum: u128 },
    #[error("cannot unstake {requested}, only {available} staked")]
    UnstakeExceedsStake { requested: u128, available: u128 },
    #[error("signer {0} is already active")]
    AlreadyActive(Address),
    #[error("basis points {0} exceed 10000")]
    InvalidBasisPoints(u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignerState {
    /// Registered, not counted toward the threshold
    Inactive,
    /// Eligible to open and attest to pause requests
    Active,
}

impl fmt::Display for SignerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignerState::Inactive => write!(f, "INACTIVE"),
            SignerState::Active => write!(f, "ACTIVE"),
        }
    }
}

/// Registered signer record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignerIdentity {
    pub id: Address,
    pub public_key: PublicKey,
    pub stake: u128,
    pub state: SignerState,
    pub registered_at: Timestamp,
    /// Number of times this signer has been slashed (permanent record)
    pub slash_count: u32,
    pub total_slashed: u128,
}

impl SignerIdentity {
    pub fn is_active(&self) -> bool {
        matches!(self.state, SignerState::Active)
    }
}

impl fmt::Display for SignerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signer {} (state={}, stake={})", self.id, self.state, self.stake)
    }
}

/// Audit record of one slashing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlashRecord {
    pub signer: Address,
    pub basis_points: u16,
    pub amount: u128,
    pub remaining_stake: u128,
    pub deactivated: bool,
    pub reason: String,
}

pub struct SignerRegistry {
    signers: HashMap<Address, SignerIdentity>,
    /// Cached active set, kept in sync with `SignerIdentity::state`
    active: BTreeSet<Address>,
    min_stake: u128,
    slash_history: Vec<SlashRecord>,
}

impl SignerRegistry {
    pub fn new(min_stake: u128) -> Self {
        SignerRegistry {
            signers: HashMap::new(),
            active: BTreeSet::new(),
            min_stake,
            slash_history: Vec::new(),
        }
    }

    pub fn min_stake(&self) -> u128 {
        self.min_stake
    }

    /// Register a signer. The proof of possession blocks rogue-key
    /// aggregation. The signer starts Inactive.
    pub fn register(
        &mut self,
        id: Address,
        public_key: PublicKey,
        proof_of_possession: &Signature,
        stake: u128,
        now: Timestamp,
    ) -> Result<(), RegistryError> {
        if self.signers.contains_key(&id) {
            return Err(RegistryError::AlreadyRegistered(id));
        }
        if !verify_possession(&public_key, proof_of_possession) {
            return Err(RegistryError::InvalidProofOfPossession(id));
        }
        if stake < self.min_stake {
            return Err(RegistryError::InsufficientStake {
                stake,
                minimum: self.min_stake,
            });
        }

        self.signers.insert(
            id,
            SignerIdentity {
                id,
                public_key,
                stake,
                state: SignerState::Inactive,
                registered_at: now,
                slash_count: 0,
                total_slashed: 0,
            },
        );
        info!("Registered signer {} with stake {}", id, stake);
        Ok(())
    }

    pub fn activate(&mut self, id: &Address) -> Result<(), RegistryError> {
        let min_stake = self.min_stake;
        let signer = self
            .signers
            .get_mut(id)
            .ok_or(RegistryError::UnknownSigner(*id))?;

        if signer.is_active() {
            return Err(RegistryError::AlreadyActive(*id));
        }
        if signer.stake < min_stake {
            return Err(RegistryError::InsufficientStake {
                stake: signer.stake,
                minimum: min_stake,
            });
        }

        signer.state = SignerState::Active;
        self.active.insert(*id);
        Ok(())
    }

    pub fn add_stake(&mut self, id: &Address, amount: u128) -> Result<u128, RegistryError> {
        let signer = self
            .signers
            .get_mut(id)
            .ok_or(RegistryError::UnknownSigner(*id))?;
        signer.stake = signer.stake.saturating_add(amount);
        Ok(signer.stake)
    }

    /// Voluntary withdrawal of stake. Falling below the minimum deactivates.
    pub fn unstake(&mut self, id: &Address, amount: u128) -> Result<u128, RegistryError> {
        let signer = self
            .signers
            .get_mut(id)
            .ok_or(RegistryError::UnknownSigner(*id))?;

        if amount > signer.stake {
            return Err(RegistryError::UnstakeExceedsStake {
                requested: amount,
                available: signer.stake,
            });
        }

        signer.stake -= amount;
        let remaining = signer.stake;
        self.deactivate_if_under_minimum(id);
        Ok(remaining)
    }

    pub fn get(&self, id: &Address) -> Option<&SignerIdentity> {
        self.signers.get(id)
    }

    pub fn stake_of(&self, id: &Address) -> u128 {
        self.signers.get(id).map(|s| s.stake).unwrap_or(0)
    }

    pub fn active_signers(&self) -> Vec<&SignerIdentity> {
        self.active
            .iter()
            .filter_map(|id| self.signers.get(id))
            .collect()
    }

    pub fn slash_history(&self) -> &[SlashRecord] {
        &self.slash_history
    }

    pub fn total_slashed(&self) -> u128 {
        self.slash_history.iter().map(|r| r.amount).sum()
    }

    fn deactivate_if_under_minimum(&mut self, id: &Address) -> bool {
        let Some(signer) = self.signers.get_mut(id) else {
            return false;
        };
        if signer.is_active() && signer.stake < self.min_stake {
            signer.state = SignerState::Inactive;
            self.active.remove(id);
            warn!(
                "Signer {} deactivated: stake {} below minimum {}",
                id, signer.stake, self.min_stake
            );
            return true;
        }
        false
    }
}

impl MembershipRegistry for SignerRegistry {
    fn is_active_signer(&self, id: &Address) -> bool {
        self.active.contains(id)
    }

    fn active_signer_count(&self) -> usize {
        self.active.len()
    }

    fn public_key(&self, id: &Address) -> Option<PublicKey> {
        self.signers.get(id).map(|s| s.public_key)
    }

    fn slash(&mut self, id: &Address, basis_points: u16, reason: &str) -> Result<u128, RegistryError> {
        if basis_points as u128 > BPS_DENOMINATOR {
            return Err(RegistryError::InvalidBasisPoints(basis_points));
        }

        let signer = self
            .signers
            .get_mut(id)
            .ok_or(RegistryError::UnknownSigner(*id))?;

        let amount = apply_bps(signer.stake, basis_points);
        signer.stake -= amount;
        signer.total_slashed = signer.total_slashed.saturating_add(amount);
        signer.slash_count += 1;
        let remaining_stake = signer.stake;

        let deactivated = self.deactivate_if_under_minimum(id);
        info!("Slashed signer {} by {} ({} bps): {}", id, amount, basis_points, reason);

        self.slash_history.push(SlashRecord {
            signer: *id,
            basis_points,
            amount,
            remaining_stake,
            deactivated,
            reason: reason.to_string(),
        });

        Ok(amount)
    }
}

impl Default for SignerRegistry {
    fn default() -> Self {
        Self::new(0)
    }
}
