pub mod registry;
pub mod types;

pub use registry::{MembershipRegistry, RegistryError, SignerIdentity, SignerRegistry, SignerState, SlashRecord};
pub use types::{
    apply_bps, attestation_message, claim_id, keccak256, request_id, unix_now, Address, ClaimId,
    EvidenceHash, Hash32, ParseError, RequestId, Timestamp, BPS_DENOMINATOR,
};
