//! Threshold pause consensus for Sentinel.
//!
//! `PauseConsensus` is the request state machine; `ShieldLedger` composes it
//! with the signer registry, the bounty escrow and the defensive target so
//! that a pause executes exactly once and opens exactly one claim.

pub mod events;
pub mod ledger;
pub mod pause;
pub mod target;
pub mod threshold;

pub use events::LedgerEvent;
pub use ledger::{ExecutionReport, ShieldLedger, Submission};
pub use pause::{
    AttestOutcome, ConsensusConfig, ConsensusError, Execution, PauseConsensus, PauseRequest,
    PauseStats, DEFAULT_COOLDOWN_SECS, DEFAULT_MAX_CLOCK_SKEW_SECS, DEFAULT_MAX_REQUESTS_PER_WINDOW,
    DEFAULT_MIN_SIGNERS, DEFAULT_RATE_WINDOW_SECS,
};
pub use target::{ActionOutcome, DefensiveTarget, InMemoryPauseTarget};
pub use threshold::{rate_window_reset, required_signers};
