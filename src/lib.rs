//! Sentinel node runtime.
//!
//! Glue between the risk bridge, the coordination channel and the pause
//! ledger, plus configuration and logging for the `sentinel` binaries.

pub mod config;
pub mod devnet;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod node;

pub use config::{ConfigError, LogFormat, SentinelConfig};
pub use devnet::{Devnet, DevnetFeeder, DevnetHandle, DevnetLedger, DevnetNode};
pub use error::NodeError;
pub use gateway::{InProcessLedger, LedgerGateway};
pub use node::{signer_address, NodeSettings, NodeStats, Reaction, SentinelNode};
