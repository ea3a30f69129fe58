//! NewType wrappers for the identifiers and secrets handled by the auth core.
//!
//! These types prevent accidental mixing of semantically different strings
//! (e.g., passing a raw session token where its hash is expected).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Macro to generate a NewType wrapper with standard trait implementations.
macro_rules! newtype_string {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new instance.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Get the inner value as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume and return the inner String.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

newtype_string!(
    /// Stable identifier of a user, owned by the identity layer.
    UserRef
);

newtype_string!(
    /// Stable identifier of a tenant organization.
    OrganizationRef
);

newtype_string!(
    /// Identifier of an organization's own customer, as used by link tokens.
    ///
    /// End customers never log in; they reach embedded views through a
    /// link token minted by the organization.
    EndCustomerRef
);

newtype_string!(
    /// Database identifier of a session row (e.g., "session:abc123").
    SessionRef
);

newtype_string!(
    /// Database identifier of an API key row.
    ApiKeyRef
);

newtype_string!(
    /// Database identifier of a link token shadow record.
    LinkTokenRef
);

newtype_string!(
    /// Name of a key held inside the remote signing authority.
    ///
    /// This is only ever a name. The key material itself never enters the
    /// process.
    SigningKeyRef
);

newtype_string!(
    /// SHA-256 hex digest of a secret credential.
    ///
    /// Session tokens, API keys and link tokens are never stored in plain
    /// text. They are hashed once on receipt and looked up by this value.
    TokenHash
);

newtype_string!(
    /// Display prefix of an API key (e.g., "ak_1a2b3c4d").
    ///
    /// The prefix can be shown in tooling to identify a key. It does not
    /// reveal the secret part and cannot be used for authentication.
    ApiKeyPrefix
);

impl TokenHash {
    /// Short form for log lines.
    pub fn short(&self) -> &str {
        let end = self.0.len().min(12);
        &self.0[..end]
    }
}
