//! Error taxonomy for credential resolution.
//!
//! Two outcomes must never be confused:
//!
//! - **expected** ([`AuthError::NotFound`], [`AuthError::Malformed`]): the
//!   credential is absent, expired, revoked or garbage. The resolver folds
//!   these into an unauthenticated result and the route layer answers 401.
//! - **everything else**: propagated to the caller. `Forbidden` becomes a
//!   403; the rest become a 500 whose body never carries internal detail.

use std::fmt;

use crate::crypto::SignerError;
use crate::token::TokenError;

/// Authentication errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Credential absent, expired or revoked
    NotFound,
    /// Credential structurally invalid (bad encoding, bad signature)
    Malformed(String),
    /// Credential valid but its subject is administratively blocked
    Forbidden(String),
    /// Transit checksum mismatch on a remote crypto call
    Integrity(String),
    /// The signing authority rejected our key or credentials
    SignerUnauthorized(String),
    /// Signing authority or store unreachable
    UpstreamUnavailable(String),
    /// OAuth provider name not supported or not configured
    UnsupportedProvider(String),
    /// Anything else
    Internal(String),
}

impl AuthError {
    /// Whether this error means "not authenticated" rather than "failed".
    pub fn is_expected(&self) -> bool {
        matches!(self, Self::NotFound | Self::Malformed(_))
    }

    /// Message safe to show to clients.
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::NotFound | Self::Malformed(_) => "authentication required",
            Self::Forbidden(_) => "access denied",
            Self::UnsupportedProvider(_) => "unsupported identity provider",
            Self::Integrity(_)
            | Self::SignerUnauthorized(_)
            | Self::UpstreamUnavailable(_)
            | Self::Internal(_) => "internal error",
        }
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "Credential not found"),
            Self::Malformed(msg) => write!(f, "Malformed credential: {}", msg),
            Self::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            Self::Integrity(msg) => write!(f, "Integrity failure: {}", msg),
            Self::SignerUnauthorized(msg) => write!(f, "Signer authorization failure: {}", msg),
            Self::UpstreamUnavailable(msg) => write!(f, "Upstream unavailable: {}", msg),
            Self::UnsupportedProvider(name) => write!(f, "Unsupported provider: {}", name),
            Self::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<SignerError> for AuthError {
    fn from(err: SignerError) -> Self {
        match err {
            SignerError::Integrity(msg) => Self::Integrity(msg),
            SignerError::Unauthorized(msg) => Self::SignerUnauthorized(msg),
            SignerError::Unavailable(msg) => Self::UpstreamUnavailable(msg),
            SignerError::Protocol(msg) => Self::Internal(msg),
        }
    }
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => Self::NotFound,
            TokenError::Malformed(msg) => Self::Malformed(msg),
            TokenError::AlgorithmMismatch(alg) => Self::Malformed(format!("algorithm {}", alg)),
            TokenError::InvalidSignature => Self::Malformed("invalid signature".to_string()),
            TokenError::Signer(e) => e.into(),
        }
    }
}

impl From<surrealdb::Error> for AuthError {
    fn from(err: surrealdb::Error) -> Self {
        Self::UpstreamUnavailable(format!("store: {}", err))
    }
}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_absence_and_garbage_are_expected() {
        assert!(AuthError::NotFound.is_expected());
        assert!(AuthError::Malformed("x".to_string()).is_expected());

        assert!(!AuthError::Forbidden("x".to_string()).is_expected());
        assert!(!AuthError::Integrity("x".to_string()).is_expected());
        assert!(!AuthError::SignerUnauthorized("x".to_string()).is_expected());
        assert!(!AuthError::UpstreamUnavailable("x".to_string()).is_expected());
        assert!(!AuthError::Internal("x".to_string()).is_expected());
    }

    #[test]
    fn test_token_errors_classify() {
        assert_eq!(AuthError::from(TokenError::Expired), AuthError::NotFound);
        assert!(AuthError::from(TokenError::InvalidSignature).is_expected());
        assert!(AuthError::from(TokenError::AlgorithmMismatch("none".to_string())).is_expected());

        let integrity = AuthError::from(TokenError::Signer(SignerError::Integrity(
            "crc".to_string(),
        )));
        assert_eq!(integrity, AuthError::Integrity("crc".to_string()));
        assert!(!integrity.is_expected());
    }

    #[test]
    fn test_signer_errors_classify() {
        assert!(matches!(
            AuthError::from(SignerError::Unavailable("timeout".to_string())),
            AuthError::UpstreamUnavailable(_)
        ));
        assert!(matches!(
            AuthError::from(SignerError::Unauthorized("403".to_string())),
            AuthError::SignerUnauthorized(_)
        ));
    }

    #[test]
    fn test_public_message_hides_detail() {
        let err = AuthError::UpstreamUnavailable("store: connection refused at 10.0.0.7".to_string());
        assert_eq!(err.public_message(), "internal error");
        assert!(!err.public_message().contains("10.0.0.7"));

        assert_eq!(
            AuthError::Forbidden("user deactivated".to_string()).public_message(),
            "access denied"
        );
    }
}
