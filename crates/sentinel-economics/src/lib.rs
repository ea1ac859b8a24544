/// SENTINEL BOUNTY ECONOMICS
///
/// Gives the pause consensus economic teeth:
/// - Protected entities pre-fund a bounty pool
/// - Each successful pause opens one claim owed to every co-signer
/// - The target may dispute; an oracle verifies or resolves
/// - A rejected claim slashes the signer that opened the request

pub mod claim;
pub mod escrow;
pub mod tiers;

pub use claim::{split_evenly, BountyClaim, ClaimStatus};
pub use escrow::{
    is_valid_bps, BountyEscrow, EscrowConfig, EscrowError, PayoutOutcome, ProtocolAccount,
    Resolution, DEFAULT_DISPUTE_WINDOW_SECS, DEFAULT_ORACLE_WINDOW_SECS, DEFAULT_REJECT_SLASH_BPS,
};
pub use tiers::{BountyTier, TierSchedule, TOKEN};
