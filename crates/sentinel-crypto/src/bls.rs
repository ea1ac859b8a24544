// BN254 BLS SIGNATURES
// Signatures and message points live in G1, public keys in G2.
//
// SAFETY INVARIANTS:
// 1. Every decoded point is checked for curve membership and subgroup order
//    before any arithmetic touches it
// 2. The identity point is never accepted as a signature or public key
// 3. Verification is a single multi-pairing product check
// 4. Hashing to G1 is deterministic (same message -> same point)

use std::fmt;

use ark_bn254::{Bn254, Fq, Fr, G1Affine, G1Projective, G2Affine, G2Projective};
use ark_ec::pairing::Pairing;
use ark_ec::short_weierstrass::SWCurveConfig;
use ark_ec::{AffineRepr, CurveGroup};
use ark_ff::{BigInteger, Field, One, PrimeField, Zero};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize, Compress, Validate};
use ark_std::UniformRand;
use rand::rngs::OsRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{CryptoError, CryptoResult};

/// Domain separation tag for pause attestations and other protocol messages.
pub const SIGNATURE_DST: &[u8] = b"SENTINEL_BLS_SIG_BN254G1_SHA256_TAI_V1";

/// Domain separation tag for proofs of possession (signing one's own key).
pub const POP_DST: &[u8] = b"SENTINEL_BLS_POP_BN254G1_SHA256_TAI_V1";

/// Compressed G1 point.
pub const SIGNATURE_LENGTH: usize = 32;
/// Compressed G2 point.
pub const PUBLIC_KEY_LENGTH: usize = 64;
/// Little-endian scalar.
pub const SECRET_KEY_LENGTH: usize = 32;

/// BLS secret scalar. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey(Fr);

impl SecretKey {
    /// Draw a fresh non-zero scalar from the OS RNG.
    pub fn generate() -> Self {
        loop {
            let scalar = Fr::rand(&mut OsRng);
            if !scalar.is_zero() {
                return SecretKey(scalar);
            }
        }
    }

    /// Decode a canonical little-endian scalar. Zero and out-of-range
    /// encodings are rejected.
    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() != SECRET_KEY_LENGTH {
            return Err(CryptoError::InvalidSecretKey);
        }
        let scalar = Fr::deserialize_compressed(bytes).map_err(|_| CryptoError::InvalidSecretKey)?;
        if scalar.is_zero() {
            return Err(CryptoError::InvalidSecretKey);
        }
        Ok(SecretKey(scalar))
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        encode(&self.0)
    }

    /// `sk * G2`.
    pub fn public_key(&self) -> PublicKey {
        PublicKey((G2Affine::generator() * self.0).into_affine())
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        self.sign_with_dst(message, SIGNATURE_DST)
    }

    fn sign_with_dst(&self, message: &[u8], dst: &[u8]) -> Signature {
        Signature((hash_to_g1_with_dst(message, dst) * self.0).into_affine())
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(..)")
    }
}

/// BLS public key (G2).
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PublicKey(G2Affine);

impl PublicKey {
    /// Decode a compressed G2 point, rejecting off-curve, wrong-subgroup and
    /// identity points.
    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() != PUBLIC_KEY_LENGTH {
            return Err(CryptoError::InvalidPublicKey);
        }
        let point = G2Affine::deserialize_with_mode(bytes, Compress::Yes, Validate::No)
            .map_err(|_| CryptoError::InvalidPublicKey)?;
        check_g2(&point)?;
        Ok(PublicKey(point))
    }

    pub fn from_hex(s: &str) -> CryptoResult<Self> {
        let bytes = hex::decode(s).map_err(|_| CryptoError::InvalidPublicKey)?;
        Self::from_bytes(&bytes)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        encode(&self.0)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = self.to_hex();
        write!(f, "PublicKey({}..)", &hex[..16])
    }
}

/// BLS signature (G1).
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature(G1Affine);

impl Signature {
    /// Decode a compressed G1 point, rejecting off-curve, wrong-subgroup and
    /// identity points.
    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() != SIGNATURE_LENGTH {
            return Err(CryptoError::InvalidSignature);
        }
        let point = G1Affine::deserialize_with_mode(bytes, Compress::Yes, Validate::No)
            .map_err(|_| CryptoError::InvalidSignature)?;
        check_g1(&point)?;
        Ok(Signature(point))
    }

    pub fn from_hex(s: &str) -> CryptoResult<Self> {
        let bytes = hex::decode(s).map_err(|_| CryptoError::InvalidSignature)?;
        Self::from_bytes(&bytes)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        encode(&self.0)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = self.to_hex();
        write!(f, "Signature({}..)", &hex[..16])
    }
}

macro_rules! hex_serde {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_hex())
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                <$ty>::from_hex(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

hex_serde!(PublicKey);
hex_serde!(Signature);

/// Keypair held by a signer node.
#[derive(Clone, Debug)]
pub struct BlsKeyPair {
    pub secret: SecretKey,
    pub public: PublicKey,
}

impl BlsKeyPair {
    pub fn generate() -> Self {
        Self::from_secret(SecretKey::generate())
    }

    pub fn from_secret(secret: SecretKey) -> Self {
        let public = secret.public_key();
        BlsKeyPair { secret, public }
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        self.secret.sign(message)
    }

    /// Signature over the signer's own public key under [`POP_DST`].
    /// Registries require this before admitting a key into same-message
    /// aggregation.
    pub fn prove_possession(&self) -> Signature {
        self.secret.sign_with_dst(&self.public.to_bytes(), POP_DST)
    }
}

/// Deterministic try-and-increment map into G1.
///
/// For counter = 0, 1, ... hash `DST || counter || message`, reduce into the
/// base field and take the first x for which `x^3 + 3` is a square. One hash
/// bit picks between the two roots. G1 has cofactor 1, so every curve point is
/// in the prime-order group.
pub fn hash_to_g1(message: &[u8]) -> G1Affine {
    hash_to_g1_with_dst(message, SIGNATURE_DST)
}

fn hash_to_g1_with_dst(message: &[u8], dst: &[u8]) -> G1Affine {
    let mut counter: u32 = 0;
    loop {
        let digest = Sha256::new()
            .chain_update(dst)
            .chain_update(counter.to_be_bytes())
            .chain_update(message)
            .finalize();

        let x = Fq::from_be_bytes_mod_order(&digest);
        let rhs = x.square() * x + ark_bn254::g1::Config::COEFF_B;

        if let Some(y) = rhs.sqrt() {
            let want_odd = digest[digest.len() - 1] & 1 == 1;
            let y = if y.into_bigint().is_odd() == want_odd { y } else { -y };
            return G1Affine::new_unchecked(x, y);
        }

        counter = counter.wrapping_add(1);
    }
}

/// Accepts iff `e(sig, G2) == e(H(m), pk)`, evaluated as
/// `e(sig, G2) * e(-H(m), pk) == 1` in one multi-pairing.
pub fn verify_signature(signature: &Signature, message: &[u8], public_key: &PublicKey) -> bool {
    if check_g1(&signature.0).is_err() || check_g2(&public_key.0).is_err() {
        return false;
    }

    let message_point = hash_to_g1(message);
    pairing_product_is_one(
        vec![signature.0, -message_point],
        vec![G2Affine::generator(), public_key.0],
    )
}

/// Byte-level entry point: malformed encodings surface as typed errors,
/// a well-formed but wrong signature as `Ok(false)`.
pub fn verify_signature_bytes(signature: &[u8], message: &[u8], public_key: &[u8]) -> CryptoResult<bool> {
    let signature = Signature::from_bytes(signature)?;
    let public_key = PublicKey::from_bytes(public_key)?;
    Ok(verify_signature(&signature, message, &public_key))
}

pub fn verify_possession(public_key: &PublicKey, proof: &Signature) -> bool {
    if check_g1(&proof.0).is_err() || check_g2(&public_key.0).is_err() {
        return false;
    }

    let message_point = hash_to_g1_with_dst(&public_key.to_bytes(), POP_DST);
    pairing_product_is_one(
        vec![proof.0, -message_point],
        vec![G2Affine::generator(), public_key.0],
    )
}

/// Point-wise sum in G1.
pub fn aggregate_signatures(signatures: &[Signature]) -> CryptoResult<Signature> {
    if signatures.is_empty() {
        return Err(CryptoError::EmptyAggregation("signatures"));
    }

    let mut acc = G1Projective::zero();
    for signature in signatures {
        check_g1(&signature.0)?;
        acc += signature.0;
    }

    Ok(Signature(acc.into_affine()))
}

/// Point-wise sum in G2.
pub fn aggregate_public_keys(public_keys: &[PublicKey]) -> CryptoResult<PublicKey> {
    if public_keys.is_empty() {
        return Err(CryptoError::EmptyAggregation("public keys"));
    }

    let mut acc = G2Projective::zero();
    for public_key in public_keys {
        check_g2(&public_key.0)?;
        acc += public_key.0;
    }

    Ok(PublicKey(acc.into_affine()))
}

/// Checks `e(agg, G2) * prod_i e(-H(m_i), pk_i) == 1` in one multi-pairing.
///
/// Requires `messages.len() == public_keys.len() > 0`.
pub fn verify_aggregated(
    aggregate: &Signature,
    messages: &[&[u8]],
    public_keys: &[PublicKey],
) -> CryptoResult<bool> {
    if messages.len() != public_keys.len() || messages.is_empty() {
        return Err(CryptoError::LengthMismatch {
            messages: messages.len(),
            keys: public_keys.len(),
        });
    }

    check_g1(&aggregate.0)?;

    let mut g1_points = Vec::with_capacity(messages.len() + 1);
    let mut g2_points = Vec::with_capacity(messages.len() + 1);
    g1_points.push(aggregate.0);
    g2_points.push(G2Affine::generator());

    for (message, public_key) in messages.iter().zip(public_keys) {
        check_g2(&public_key.0)?;
        g1_points.push(-hash_to_g1(message));
        g2_points.push(public_key.0);
    }

    Ok(pairing_product_is_one(g1_points, g2_points))
}

fn pairing_product_is_one(g1_points: Vec<G1Affine>, g2_points: Vec<G2Affine>) -> bool {
    Bn254::multi_pairing(g1_points, g2_points).0.is_one()
}

fn check_g1(point: &G1Affine) -> CryptoResult<()> {
    if point.infinity {
        return Err(CryptoError::IdentityPoint("signature"));
    }
    if !point.is_on_curve() {
        return Err(CryptoError::NotOnCurve);
    }
    if !point.is_in_correct_subgroup_assuming_on_curve() {
        return Err(CryptoError::WrongSubgroup);
    }
    Ok(())
}

fn check_g2(point: &G2Affine) -> CryptoResult<()> {
    if point.infinity {
        return Err(CryptoError::IdentityPoint("public key"));
    }
    if !point.is_on_curve() {
        return Err(CryptoError::NotOnCurve);
    }
    if !point.is_in_correct_subgroup_assuming_on_curve() {
        return Err(CryptoError::WrongSubgroup);
    }
    Ok(())
}

fn encode<T: CanonicalSerialize>(value: &T) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.compressed_size());
    // Writing into a Vec cannot fail.
    let _ = value.serialize_compressed(&mut out);
    out
}
