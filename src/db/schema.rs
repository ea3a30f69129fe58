use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use surrealdb::{RecordId, sql::Datetime};

use crate::types::{
    ApiKeyPrefix, ApiKeyRef, EndCustomerRef, LinkTokenRef, OrganizationRef, SessionRef,
    TokenHash, UserRef,
};

/// Persisted tenant organization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    pub id: RecordId,
    pub organization_ref: OrganizationRef,
    #[serde(default)]
    pub name: Option<String>,
    /// Inactive organizations are administratively blocked
    pub is_active: bool,
    #[serde(default)]
    pub created_at: Option<Datetime>,
}

/// Persisted user record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: RecordId,
    pub user_ref: UserRef,
    /// Organization the user belongs to
    pub organization_ref: OrganizationRef,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    /// Inactive users are administratively blocked
    pub is_active: bool,
    #[serde(default)]
    pub created_at: Option<Datetime>,
}

/// Persisted browser session. One row per logged-in device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: RecordId,
    pub user_ref: UserRef,
    /// SHA-256 of the raw session token (never store raw tokens)
    pub token_hash: TokenHash,
    /// End of the sliding window
    pub expiration: Datetime,
    #[serde(default)]
    pub revoked_at: Option<Datetime>,
    #[serde(default)]
    pub created_at: Option<Datetime>,
}

impl Session {
    pub fn session_ref(&self) -> SessionRef {
        SessionRef::new(self.id.to_string())
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expiration.0
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }
}

/// Persisted organization API key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: RecordId,
    pub organization_ref: OrganizationRef,
    /// SHA-256 of the full key
    pub key_hash: TokenHash,
    /// Non-secret display handle
    pub key_prefix: ApiKeyPrefix,
    /// Base64 ciphertext of the full key, for reveal/rotation tooling
    #[serde(default)]
    pub encrypted_key: Option<String>,
    #[serde(default)]
    pub revoked_at: Option<Datetime>,
    #[serde(default)]
    pub last_used_at: Option<Datetime>,
    #[serde(default)]
    pub created_at: Option<Datetime>,
}

impl ApiKey {
    pub fn api_key_ref(&self) -> ApiKeyRef {
        ApiKeyRef::new(self.id.to_string())
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }
}

/// Server-side shadow of a signed link token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkTokenRecord {
    pub id: RecordId,
    pub organization_ref: OrganizationRef,
    pub end_customer_ref: EndCustomerRef,
    /// SHA-256 of the signed token string
    pub token_hash: TokenHash,
    pub expiration: Datetime,
    #[serde(default)]
    pub revoked_at: Option<Datetime>,
    #[serde(default)]
    pub created_at: Option<Datetime>,
}

impl LinkTokenRecord {
    pub fn link_token_ref(&self) -> LinkTokenRef {
        LinkTokenRef::new(self.id.to_string())
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expiration.0
    }
}

/// Credential lifecycle events written to the audit log.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    SessionCreated,
    SessionRevoked,
    ApiKeyCreated,
    ApiKeyRevoked,
    LinkTokenCreated,
    LinkTokenRevoked,
    UserDeactivated,
}

impl AuditAction {
    pub fn as_str(&self) -> &str {
        match self {
            Self::SessionCreated => "session_created",
            Self::SessionRevoked => "session_revoked",
            Self::ApiKeyCreated => "api_key_created",
            Self::ApiKeyRevoked => "api_key_revoked",
            Self::LinkTokenCreated => "link_token_created",
            Self::LinkTokenRevoked => "link_token_revoked",
            Self::UserDeactivated => "user_deactivated",
        }
    }
}

/// Persisted audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogRecord {
    pub id: RecordId,
    pub action: String,
    /// Kind of credential or subject affected ("session", "api_key", ...)
    pub subject_type: String,
    #[serde(default)]
    pub subject_id: Option<String>,
    #[serde(default)]
    pub organization_ref: Option<String>,
    #[serde(default)]
    pub user_ref: Option<String>,
    #[serde(default)]
    pub details: Option<Value>,
    #[serde(default)]
    pub created_at: Option<Datetime>,
}

/// Payload for creating an audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogCreate {
    pub action: AuditAction,
    pub subject_type: String,
    pub subject_id: Option<String>,
    pub organization_ref: Option<OrganizationRef>,
    pub user_ref: Option<UserRef>,
    pub details: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_action_as_str_matches_serde() {
        for action in [
            AuditAction::SessionCreated,
            AuditAction::SessionRevoked,
            AuditAction::ApiKeyCreated,
            AuditAction::ApiKeyRevoked,
            AuditAction::LinkTokenCreated,
            AuditAction::LinkTokenRevoked,
            AuditAction::UserDeactivated,
        ] {
            let json = serde_json::to_string(&action).unwrap();
            assert_eq!(json, format!("\"{}\"", action.as_str()));
        }
    }
}
