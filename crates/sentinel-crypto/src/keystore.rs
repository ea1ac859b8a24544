//! Signer key persistence.
//!
//! A key file holds the 32-byte secret scalar followed by the compressed G2
//! public key. Loading re-derives the public key and refuses a file whose
//! stored key does not match.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::Path;

use log::info;

use crate::bls::{BlsKeyPair, PublicKey, SecretKey, Signature, PUBLIC_KEY_LENGTH, SECRET_KEY_LENGTH};
use crate::error::{CryptoError, CryptoResult};

pub const KEY_FILE_LENGTH: usize = SECRET_KEY_LENGTH + PUBLIC_KEY_LENGTH;

/// A node's signing identity.
#[derive(Debug, Clone)]
pub struct BlsSigner {
    keypair: BlsKeyPair,
}

impl BlsSigner {
    /// Ephemeral signer, nothing written to disk.
    pub fn ephemeral() -> Self {
        BlsSigner {
            keypair: BlsKeyPair::generate(),
        }
    }

    pub fn from_keypair(keypair: BlsKeyPair) -> Self {
        BlsSigner { keypair }
    }

    /// Load the key at `path`, or generate one and write it there if the file
    /// does not exist yet.
    pub fn load_or_generate(path: &Path) -> CryptoResult<Self> {
        match fs::read(path) {
            Ok(data) => {
                let keypair = deserialize_keypair(&data)?;
                info!("Loaded BLS key from {}", path.display());
                Ok(BlsSigner { keypair })
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                let keypair = BlsKeyPair::generate();
                save_keypair(path, &keypair)?;
                info!("Generated new BLS key at {}", path.display());
                Ok(BlsSigner { keypair })
            }
            Err(e) => Err(CryptoError::KeyFile(e.to_string())),
        }
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        self.keypair.sign(message)
    }

    pub fn public_key(&self) -> PublicKey {
        self.keypair.public
    }

    pub fn public_key_hex(&self) -> String {
        self.keypair.public.to_hex()
    }

    pub fn prove_possession(&self) -> Signature {
        self.keypair.prove_possession()
    }

    pub fn keypair(&self) -> &BlsKeyPair {
        &self.keypair
    }
}

pub fn serialize_keypair(keypair: &BlsKeyPair) -> Vec<u8> {
    let mut out = keypair.secret.to_bytes();
    out.extend_from_slice(&keypair.public.to_bytes());
    out
}

pub fn deserialize_keypair(data: &[u8]) -> CryptoResult<BlsKeyPair> {
    if data.len() != KEY_FILE_LENGTH {
        return Err(CryptoError::KeyFile(format!(
            "expected {} bytes, found {}",
            KEY_FILE_LENGTH,
            data.len()
        )));
    }

    let secret = SecretKey::from_bytes(&data[..SECRET_KEY_LENGTH])?;
    let stored = PublicKey::from_bytes(&data[SECRET_KEY_LENGTH..])?;
    let keypair = BlsKeyPair::from_secret(secret);
    if keypair.public != stored {
        return Err(CryptoError::KeyMismatch);
    }
    Ok(keypair)
}

/// Write the key file with owner-only permissions.
pub fn save_keypair(path: &Path, keypair: &BlsKeyPair) -> CryptoResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| CryptoError::KeyFile(e.to_string()))?;
        }
    }

    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path).map_err(|e| CryptoError::KeyFile(e.to_string()))?;
    file.write_all(&serialize_keypair(keypair))
        .map_err(|e| CryptoError::KeyFile(e.to_string()))
}
