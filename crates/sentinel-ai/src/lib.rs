//! Risk scoring for Sentinel nodes.
//!
//! The node consumes a remote anomaly engine through [`InferenceBridge`],
//! which degrades to a selector/gas/value heuristic under timeouts and
//! repeated failures.

pub mod bridge;
pub mod heuristic;
pub mod types;

pub use bridge::{
    BreakerStatus, BridgeConfig, InferenceBridge, InferenceError, RiskEngine, CIRCUIT_OPEN_INDICATOR,
    FALLBACK_INDICATOR,
};
pub use heuristic::{heuristic_verdict, quick_filter, FLASH_LOAN_SELECTORS};
pub use types::{PendingAction, Recommendation, RiskLevel, RiskVerdict, ONE_ETHER};
