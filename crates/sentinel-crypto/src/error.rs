use thiserror::Error;

/// Failures raised while decoding, aggregating or verifying BLS material.
///
/// Every decode path returns one of these instead of handing back a point
/// that was not checked against the curve equation and the subgroup order.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid BLS signature encoding")]
    InvalidSignature,
    #[error("invalid BLS public key encoding")]
    InvalidPublicKey,
    #[error("invalid BLS secret key")]
    InvalidSecretKey,
    #[error("point is not on the curve")]
    NotOnCurve,
    #[error("point is not in the prime-order subgroup")]
    WrongSubgroup,
    #[error("identity point is not a valid {0}")]
    IdentityPoint(&'static str),
    #[error("cannot aggregate an empty set of {0}")]
    EmptyAggregation(&'static str),
    #[error("message/public key count mismatch: {messages} messages, {keys} keys")]
    LengthMismatch { messages: usize, keys: usize },
    #[error("stored public key does not match the secret key")]
    KeyMismatch,
    #[error("key file error: {0}")]
    KeyFile(String),
}

pub type CryptoResult<T> = Result<T, CryptoError>;
