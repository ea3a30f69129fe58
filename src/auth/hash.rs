//! Hashing and generation of opaque secrets.

use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

use crate::types::TokenHash;

/// Bytes of CSPRNG entropy in every generated secret (256 bits).
pub const SECRET_BYTES: usize = 32;

/// Hash a credential for storage and lookup (don't store raw secrets).
pub fn hash_secret(secret: &str) -> TokenHash {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    TokenHash::new(format!("{:x}", hasher.finalize()))
}

/// Hex-encoded random bytes from the operating system's CSPRNG.
pub fn random_hex(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    OsRng.fill_bytes(&mut buf);
    hex::encode(buf)
}
