//! Signed-claims tokens whose MAC lives in the remote authority.
//!
//! Wire format is the familiar three dot-joined base64url segments:
//!
//! ```text
//! base64url(header) . base64url(payload) . base64url(mac)
//! ```
//!
//! where `mac = MacSigner::sign(key, "<header>.<payload>")`. The header pins
//! the algorithm to [`ALGORITHM`]; anything else is rejected before the
//! signer is consulted.
//!
//! There is no local verification path: every [`TokenCodec::parse`]
//! is a round trip to the authority, so no signing secret ever exists in this
//! process.

use std::fmt;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clock::Clock;
use crate::crypto::{MacSigner, SignerError};
use crate::types::SigningKeyRef;

/// Algorithm identifier carried in every token header.
pub const ALGORITHM: &str = "KMS-HS256";

const TOKEN_TYPE: &str = "JWT";

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    alg: String,
    typ: String,
}

/// Claims plus the registered time fields, as they appear in the payload.
#[derive(Serialize, Deserialize)]
struct Payload<C> {
    #[serde(flatten)]
    claims: C,
    iat: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    exp: Option<i64>,
}

/// A successfully parsed token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedClaims<C> {
    pub claims: C,
    pub issued_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Reasons a token could not be built or parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// Wrong segment count, bad base64, or bad JSON
    Malformed(String),
    /// Header names an algorithm other than [`ALGORITHM`]
    AlgorithmMismatch(String),
    /// The authority says the MAC does not match
    InvalidSignature,
    /// `now` is past the embedded expiry
    Expired,
    /// The round trip to the authority itself failed
    Signer(SignerError),
}

impl fmt::Display for TokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed(msg) => write!(f, "Malformed token: {}", msg),
            Self::AlgorithmMismatch(alg) => write!(f, "Unexpected token algorithm: {}", alg),
            Self::InvalidSignature => write!(f, "Token signature is invalid"),
            Self::Expired => write!(f, "Token has expired"),
            Self::Signer(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for TokenError {}

impl From<SignerError> for TokenError {
    fn from(err: SignerError) -> Self {
        Self::Signer(err)
    }
}

/// Builds and parses signed tokens under one key.
#[derive(Clone)]
pub struct TokenCodec {
    signer: Arc<dyn MacSigner>,
    key: SigningKeyRef,
    clock: Arc<dyn Clock>,
}

impl TokenCodec {
    pub fn new(signer: Arc<dyn MacSigner>, key: SigningKeyRef, clock: Arc<dyn Clock>) -> Self {
        Self { signer, key, clock }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Sign `claims` into an opaque token string.
    ///
    /// `claims` must serialize to a JSON object and must not use the field
    /// names `iat` or `exp`.
    pub async fn build<C: Serialize>(
        &self,
        claims: &C,
        issued_at: DateTime<Utc>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<String, TokenError> {
        let header = Header {
            alg: ALGORITHM.to_string(),
            typ: TOKEN_TYPE.to_string(),
        };
        let payload = Payload {
            claims,
            iat: issued_at.timestamp(),
            exp: expires_at.map(|t| t.timestamp()),
        };

        let header = encode_json(&header)?;
        let payload = encode_json(&payload)?;
        let signing_input = format!("{}.{}", header, payload);

        let mac = self.signer.sign(&self.key, signing_input.as_bytes()).await?;

        Ok(format!("{}.{}", signing_input, URL_SAFE_NO_PAD.encode(mac)))
    }

    /// Verify `token` with the authority and return its claims.
    pub async fn parse<C: DeserializeOwned>(
        &self,
        token: &str,
    ) -> Result<SignedClaims<C>, TokenError> {
        let mut segments = token.split('.');
        let (Some(header_b64), Some(payload_b64), Some(mac_b64), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return Err(TokenError::Malformed("expected three segments".to_string()));
        };

        let header: Header = decode_json(header_b64, "header")?;
        if header.alg != ALGORITHM {
            return Err(TokenError::AlgorithmMismatch(header.alg));
        }

        let payload: Payload<C> = decode_json(payload_b64, "payload")?;
        let mac = URL_SAFE_NO_PAD
            .decode(mac_b64)
            .map_err(|e| TokenError::Malformed(format!("signature: {}", e)))?;

        let signing_input = &token[..header_b64.len() + 1 + payload_b64.len()];
        if !self
            .signer
            .verify(&self.key, signing_input.as_bytes(), &mac)
            .await?
        {
            debug!("Token rejected: signature mismatch");
            return Err(TokenError::InvalidSignature);
        }

        let issued_at = from_timestamp(payload.iat, "iat")?;
        let expires_at = payload.exp.map(|exp| from_timestamp(exp, "exp")).transpose()?;

        if let Some(exp) = expires_at
            && self.clock.now() > exp
        {
            return Err(TokenError::Expired);
        }

        Ok(SignedClaims {
            claims: payload.claims,
            issued_at,
            expires_at,
        })
    }
}

fn encode_json<T: Serialize>(value: &T) -> Result<String, TokenError> {
    let json = serde_json::to_vec(value)
        .map_err(|e| TokenError::Malformed(format!("cannot serialize claims: {}", e)))?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

fn decode_json<T: DeserializeOwned>(segment: &str, what: &str) -> Result<T, TokenError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| TokenError::Malformed(format!("{}: {}", what, e)))?;
    serde_json::from_slice(&bytes).map_err(|e| TokenError::Malformed(format!("{}: {}", what, e)))
}

fn from_timestamp(secs: i64, field: &str) -> Result<DateTime<Utc>, TokenError> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| TokenError::Malformed(format!("{} out of range", field)))
}
