use thiserror::Error;

use sentinel_consensus::ConsensusError;
use sentinel_core::{Address, RegistryError};
use sentinel_crypto::CryptoError;
use sentinel_economics::EscrowError;
use sentinel_p2p::ChannelError;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Escrow(#[from] EscrowError),
    #[error(transparent)]
    Consensus(#[from] ConsensusError),
    #[error("channel identity {channel} does not match signer identity {signer}")]
    IdentityMismatch { signer: Address, channel: Address },
    #[error("devnet needs at least one node")]
    EmptyDevnet,
}
