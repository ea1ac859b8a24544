use thiserror::Error;

use sentinel_core::Address;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("malformed message: {0}")]
    Malformed(String),
    #[error("could not encode message: {0}")]
    Encode(String),
    #[error("sender {0} is not an active signer")]
    UnregisteredSender(Address),
    #[error("pause request from {0} carries an invalid signature")]
    InvalidPauseRequest(Address),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid channel configuration: {0}")]
    InvalidConfig(String),
}
