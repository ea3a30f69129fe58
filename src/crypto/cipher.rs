//! Encryption strategy chosen once at startup.
//!
//! Production encrypts through the remote authority. Development replaces it
//! with [`InsecureHexCipher`], a reversible hex transform that is labeled as
//! what it is: *not* encryption. The choice is made in one place,
//! [`CipherStrategy::for_environment`], and never revisited at runtime.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::config::Environment;
use crate::crypto::signer::{Cipher, SignerError};
use crate::types::SigningKeyRef;

/// Development-only stand-in for remote encryption.
///
/// The "ciphertext" is the hex encoding of the plaintext, prefixed with
/// `insecure-hex:` so it can never be mistaken for real ciphertext when it
/// turns up in a database dump.
#[derive(Debug, Clone, Copy, Default)]
pub struct InsecureHexCipher;

impl InsecureHexCipher {
    pub const PREFIX: &'static str = "insecure-hex:";
}

#[async_trait]
impl Cipher for InsecureHexCipher {
    async fn encrypt(&self, _key: &SigningKeyRef, plaintext: &[u8]) -> Result<Vec<u8>, SignerError> {
        Ok(format!("{}{}", Self::PREFIX, hex::encode(plaintext)).into_bytes())
    }

    async fn decrypt(
        &self,
        _key: &SigningKeyRef,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, SignerError> {
        let text = std::str::from_utf8(ciphertext)
            .map_err(|_| SignerError::Protocol("insecure-hex payload is not UTF-8".to_string()))?;
        let encoded = text.strip_prefix(Self::PREFIX).ok_or_else(|| {
            SignerError::Protocol("payload was not produced by the insecure-hex cipher".to_string())
        })?;
        hex::decode(encoded)
            .map_err(|e| SignerError::Protocol(format!("invalid insecure-hex payload: {}", e)))
    }
}

/// Which implementation backs [`Cipher`] for this deployment.
#[derive(Clone)]
pub enum CipherStrategy {
    /// Encrypt and decrypt through the remote authority.
    Remote(Arc<dyn Cipher>),
    /// Reversible local transform for development only.
    InsecureHex,
}

impl CipherStrategy {
    /// Select the strategy for an environment.
    ///
    /// Production requires a remote cipher; there is no fallback.
    pub fn for_environment(
        environment: Environment,
        remote: Option<Arc<dyn Cipher>>,
    ) -> anyhow::Result<Self> {
        match (environment, remote) {
            (Environment::Production, Some(remote)) => Ok(Self::Remote(remote)),
            (Environment::Production, None) => Err(anyhow::anyhow!(
                "production deployments require a remote KMS for encryption"
            )),
            (Environment::Development, _) => {
                warn!("Using INSECURE hex transform in place of encryption (development only)");
                Ok(Self::InsecureHex)
            }
        }
    }

    /// Whether this strategy provides real confidentiality.
    pub fn is_secure(&self) -> bool {
        matches!(self, Self::Remote(_))
    }

    /// Materialize the strategy as a cipher.
    pub fn into_cipher(self) -> Arc<dyn Cipher> {
        match self {
            Self::Remote(remote) => remote,
            Self::InsecureHex => Arc::new(InsecureHexCipher),
        }
    }
}
