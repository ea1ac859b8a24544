//! Coordination channel for Sentinel signer nodes.
//!
//! Nodes exchange pause requests, partial signatures, alerts and heartbeats
//! over one broadcast topic. A channel cannot exist without a
//! [`MessageVerifier`]; every non-heartbeat message must come from an active
//! signer, and pause requests must carry a valid attestation signature.

pub mod channel;
pub mod error;
pub mod message;
pub mod peers;
pub mod transport;

pub use channel::{ChannelConfig, CoordinationChannel, MessageVerifier, DEFAULT_TOPIC};
pub use error::ChannelError;
pub use message::{
    message_digest, Alert, AlertLevel, Envelope, Inbound, MessageKind, PartialSignature,
    PauseRequestBody, SignedPauseRequest,
};
pub use peers::{CleanupReport, PeerInfo, PeerTable};
pub use transport::{LocalHub, LocalTransport, Transport};
