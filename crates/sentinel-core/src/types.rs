//! Identifiers shared by the ledger and the signer nodes.
//!
//! Request and claim IDs are pure functions of (target, evidence, time), so
//! any observer can recompute them without access to the ledger.

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Keccak256};
use thiserror::Error;

/// Seconds since the Unix epoch.
pub type Timestamp = u64;

pub const BPS_DENOMINATOR: u128 = 10_000;

const REQUEST_DOMAIN: &[u8] = b"SENTINEL_PAUSE_REQUEST_V1";
const CLAIM_DOMAIN: &[u8] = b"SENTINEL_BOUNTY_CLAIM_V1";
const ATTESTATION_DOMAIN: &[u8] = b"SENTINEL_PAUSE_V1";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid hex: {0}")]
    Hex(String),
    #[error("expected {expected} bytes, found {found}")]
    Length { expected: usize, found: usize },
}

fn decode_fixed<const N: usize>(s: &str) -> Result<[u8; N], ParseError> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(s).map_err(|e| ParseError::Hex(e.to_string()))?;
    if bytes.len() != N {
        return Err(ParseError::Length {
            expected: N,
            found: bytes.len(),
        });
    }
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes);
    Ok(out)
}

/// 20-byte account identifier for signers, protected entities, the oracle
/// and the admin.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address(pub [u8; 20]);

impl Address {
    /// Last 20 bytes of `keccak256(seed)`.
    pub fn derive(seed: &[u8]) -> Self {
        let hash = keccak256(seed);
        let mut out = [0u8; 20];
        out.copy_from_slice(&hash.0[12..]);
        Address(out)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

impl FromStr for Address {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_fixed::<20>(s).map(Address)
    }
}

/// 32-byte Keccak digest. Used for evidence digests, request IDs and claim IDs.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Hash32(pub [u8; 32]);

pub type EvidenceHash = Hash32;
pub type RequestId = Hash32;
pub type ClaimId = Hash32;

impl Hash32 {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// First 8 hex characters, for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for Hash32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Hash32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash32(0x{}..)", self.short())
    }
}

impl FromStr for Hash32 {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_fixed::<32>(s).map(Hash32)
    }
}

macro_rules! string_serde {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

string_serde!(Address);
string_serde!(Hash32);

pub fn keccak256(data: &[u8]) -> Hash32 {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Keccak256::digest(data));
    Hash32(out)
}

fn derive_id(domain: &[u8], target: &Address, evidence: &EvidenceHash, created_at: Timestamp) -> Hash32 {
    let mut hasher = Keccak256::new();
    hasher.update(domain);
    hasher.update(target.0);
    hasher.update(evidence.0);
    hasher.update(created_at.to_be_bytes());
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    Hash32(out)
}

/// `keccak256(domain || target || evidence || created_at_be)`.
pub fn request_id(target: &Address, evidence: &EvidenceHash, created_at: Timestamp) -> RequestId {
    derive_id(REQUEST_DOMAIN, target, evidence, created_at)
}

/// `keccak256(domain || request_id)`. One claim per executed request, and a
/// claim ID never equals the ID of the request that produced it.
pub fn claim_id(request_id: &RequestId) -> ClaimId {
    let mut hasher = Keccak256::new();
    hasher.update(CLAIM_DOMAIN);
    hasher.update(request_id.0);
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    Hash32(out)
}

/// The message every signer signs to attest to a pause request.
pub fn attestation_message(request_id: &RequestId) -> Vec<u8> {
    let mut hasher = Keccak256::new();
    hasher.update(ATTESTATION_DOMAIN);
    hasher.update(request_id.0);
    hasher.finalize().to_vec()
}

/// `floor(amount * bps / 10000)` without overflowing for large amounts.
pub fn apply_bps(amount: u128, bps: u16) -> u128 {
    let bps = bps as u128;
    (amount / BPS_DENOMINATOR) * bps + (amount % BPS_DENOMINATOR) * bps / BPS_DENOMINATOR
}

pub fn unix_now() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
