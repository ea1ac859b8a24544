//! BLS signer identities and threshold aggregation over BN254.

pub mod bls;
pub mod error;
pub mod keystore;

pub use bls::{
    aggregate_public_keys, aggregate_signatures, hash_to_g1, verify_aggregated, verify_possession,
    verify_signature, verify_signature_bytes, BlsKeyPair, PublicKey, SecretKey, Signature,
    PUBLIC_KEY_LENGTH, SIGNATURE_LENGTH,
};
pub use error::{CryptoError, CryptoResult};
pub use keystore::BlsSigner;
