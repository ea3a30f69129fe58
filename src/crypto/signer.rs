//! Capability traits over the remote signing authority.
//!
//! The process only ever holds key *names*. Anything that needs a MAC or a
//! ciphertext asks an implementation of these traits, which in production is
//! a network round trip to the KMS.

use std::fmt;

use async_trait::async_trait;

use crate::types::SigningKeyRef;

/// Produce and check MACs under a named key.
#[async_trait]
pub trait MacSigner: Send + Sync {
    /// Compute a MAC over `data`.
    async fn sign(&self, key: &SigningKeyRef, data: &[u8]) -> Result<Vec<u8>, SignerError>;

    /// Check `mac` against `data`.
    ///
    /// `Ok(false)` means the MAC is wrong. Errors are reserved for failures
    /// of the call itself.
    async fn verify(
        &self,
        key: &SigningKeyRef,
        data: &[u8],
        mac: &[u8],
    ) -> Result<bool, SignerError>;
}

/// Encrypt and decrypt opaque blobs under a named key.
#[async_trait]
pub trait Cipher: Send + Sync {
    async fn encrypt(&self, key: &SigningKeyRef, plaintext: &[u8]) -> Result<Vec<u8>, SignerError>;

    async fn decrypt(&self, key: &SigningKeyRef, ciphertext: &[u8])
    -> Result<Vec<u8>, SignerError>;
}

/// Failures of a call to the signing authority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignerError {
    /// A transit checksum did not match. The request or response was
    /// corrupted, or tampered with, between the process and the authority.
    Integrity(String),
    /// The authority rejected the key or our credentials.
    Unauthorized(String),
    /// The authority could not be reached or is failing.
    Unavailable(String),
    /// The authority answered with something we cannot interpret.
    Protocol(String),
}

impl fmt::Display for SignerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integrity(msg) => write!(f, "Signer integrity check failed: {}", msg),
            Self::Unauthorized(msg) => write!(f, "Signer rejected request: {}", msg),
            Self::Unavailable(msg) => write!(f, "Signer unavailable: {}", msg),
            Self::Protocol(msg) => write!(f, "Unexpected signer response: {}", msg),
        }
    }
}

impl std::error::Error for SignerError {}
