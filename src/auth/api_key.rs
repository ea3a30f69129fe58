//! Organization API keys.
//!
//! Keys look like `ak_<8 hex>_<64 hex>`. The first part is a display
//! handle that tooling can show and search by; the whole key is the secret.
//! Lookup is by SHA-256 of the full key. An encrypted copy is kept so
//! provisioning tooling can show the key again without reissuing it.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::json;
use surrealdb::sql::Datetime;
use tracing::{debug, info, warn};

use crate::auth::audit::AuditLog;
use crate::auth::error::AuthError;
use crate::auth::hash::{SECRET_BYTES, hash_secret, random_hex};
use crate::auth::user_store::UserStore;
use crate::clock::Clock;
use crate::crypto::Cipher;
use crate::db::Db;
use crate::db::schema::{ApiKey, AuditAction, AuditLogCreate, Organization};
use crate::types::{ApiKeyPrefix, OrganizationRef, SigningKeyRef, TokenHash};

const KEY_SCHEME: &str = "ak";
const PREFIX_BYTES: usize = 4;

/// Generate a new API key.
///
/// Returns `(full_key, display_prefix, hash)`.
pub fn generate_api_key() -> (String, ApiKeyPrefix, TokenHash) {
    let prefix = format!("{}_{}", KEY_SCHEME, random_hex(PREFIX_BYTES));
    let key = format!("{}_{}", prefix, random_hex(SECRET_BYTES));
    let hash = hash_secret(&key);
    (key, ApiKeyPrefix::new(prefix), hash)
}

/// Display prefix of a raw key, if it has the expected shape.
fn prefix_of(raw_key: &str) -> Option<&str> {
    let rest = raw_key.strip_prefix(KEY_SCHEME)?.strip_prefix('_')?;
    let (handle, secret) = rest.split_once('_')?;
    if handle.len() != PREFIX_BYTES * 2 || secret.is_empty() {
        return None;
    }
    Some(&raw_key[..KEY_SCHEME.len() + 1 + handle.len()])
}

#[derive(Clone)]
pub struct ApiKeyManager {
    db: Db,
    cipher: Arc<dyn Cipher>,
    encryption_key: SigningKeyRef,
    clock: Arc<dyn Clock>,
    users: UserStore,
    audit: AuditLog,
}

impl ApiKeyManager {
    pub fn new(
        db: Db,
        cipher: Arc<dyn Cipher>,
        encryption_key: SigningKeyRef,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            users: UserStore::new(db.clone()),
            audit: AuditLog::new(db.clone()),
            db,
            cipher,
            encryption_key,
            clock,
        }
    }

    /// Issue a key for an organization. The raw key is returned once.
    pub async fn create(
        &self,
        organization: &OrganizationRef,
    ) -> Result<(String, ApiKey), AuthError> {
        let (raw_key, key_prefix, key_hash) = generate_api_key();
        let ciphertext = self
            .cipher
            .encrypt(&self.encryption_key, raw_key.as_bytes())
            .await?;

        let query = r#"
            CREATE api_key CONTENT {
                organization_ref: $organization_ref,
                key_hash: $key_hash,
                key_prefix: $key_prefix,
                encrypted_key: $encrypted_key
            }
        "#;

        let mut res = self
            .db
            .query(query)
            .bind(("organization_ref", organization.as_str().to_string()))
            .bind(("key_hash", key_hash.into_inner()))
            .bind(("key_prefix", key_prefix.as_str().to_string()))
            .bind(("encrypted_key", STANDARD.encode(ciphertext)))
            .await?;

        let created: Vec<ApiKey> = res.take(0)?;
        let api_key = created
            .into_iter()
            .next()
            .ok_or_else(|| AuthError::Internal("failed to create API key".to_string()))?;

        info!("Created API key {} for organization {}", key_prefix, organization);
        self.audit
            .record(AuditLogCreate {
                action: AuditAction::ApiKeyCreated,
                subject_type: "api_key".to_string(),
                subject_id: Some(api_key.id.to_string()),
                organization_ref: Some(organization.clone()),
                user_ref: None,
                details: Some(json!({ "key_prefix": key_prefix.as_str() })),
            })
            .await?;

        Ok((raw_key, api_key))
    }

    /// Resolve a raw key to its organization.
    ///
    /// Unknown or revoked keys are `NotFound`; keys of a blocked
    /// organization are `Forbidden`.
    pub async fn validate(&self, raw_key: &str) -> Result<Organization, AuthError> {
        if prefix_of(raw_key).is_none() {
            return Err(AuthError::Malformed("unrecognized API key format".to_string()));
        }
        let key_hash = hash_secret(raw_key);

        let query = r#"
            SELECT * FROM api_key
            WHERE key_hash = $key_hash AND revoked_at = NONE
            LIMIT 1
        "#;

        let mut res = self
            .db
            .query(query)
            .bind(("key_hash", key_hash.as_str().to_string()))
            .await?;

        let keys: Vec<ApiKey> = res.take(0)?;
        let Some(api_key) = keys.into_iter().next() else {
            debug!("No active API key for {}", key_hash.short());
            return Err(AuthError::NotFound);
        };

        let organization = self
            .users
            .get_organization(&api_key.organization_ref)
            .await?
            .ok_or(AuthError::NotFound)?;
        if !organization.is_active {
            warn!(
                "API key {} used for blocked organization {}",
                api_key.key_prefix, organization.organization_ref
            );
            return Err(AuthError::Forbidden("organization is blocked".to_string()));
        }

        self.db
            .query("UPDATE $id SET last_used_at = $now")
            .bind(("id", api_key.id.clone()))
            .bind(("now", Datetime::from(self.clock.now())))
            .await?
            .check()?;

        Ok(organization)
    }

    /// Revoke a key. Revocation is terminal.
    pub async fn revoke(&self, api_key: &ApiKey) -> Result<bool, AuthError> {
        let query = r#"
            UPDATE $id SET revoked_at = $now
            WHERE revoked_at = NONE
        "#;

        let mut res = self
            .db
            .query(query)
            .bind(("id", api_key.id.clone()))
            .bind(("now", Datetime::from(self.clock.now())))
            .await?;

        let revoked: Vec<ApiKey> = res.take(0)?;
        if revoked.is_empty() {
            return Ok(false);
        }
        self.audit_revoked(&revoked).await?;
        Ok(true)
    }

    /// Revoke every active key with the given display prefix.
    pub async fn revoke_by_prefix(&self, prefix: &ApiKeyPrefix) -> Result<usize, AuthError> {
        let query = r#"
            UPDATE api_key SET revoked_at = $now
            WHERE key_prefix = $key_prefix AND revoked_at = NONE
        "#;

        let mut res = self
            .db
            .query(query)
            .bind(("key_prefix", prefix.as_str().to_string()))
            .bind(("now", Datetime::from(self.clock.now())))
            .await?;

        let revoked: Vec<ApiKey> = res.take(0)?;
        self.audit_revoked(&revoked).await?;
        Ok(revoked.len())
    }

    /// Replace the organization's active keys with a single new one.
    pub async fn rotate(
        &self,
        organization: &OrganizationRef,
    ) -> Result<(String, ApiKey), AuthError> {
        let query = r#"
            UPDATE api_key SET revoked_at = $now
            WHERE organization_ref = $organization_ref AND revoked_at = NONE
        "#;

        let mut res = self
            .db
            .query(query)
            .bind(("organization_ref", organization.as_str().to_string()))
            .bind(("now", Datetime::from(self.clock.now())))
            .await?;

        let revoked: Vec<ApiKey> = res.take(0)?;
        if !revoked.is_empty() {
            info!(
                "Rotating API key for organization {}: revoked {} key(s)",
                organization,
                revoked.len()
            );
        }
        self.audit_revoked(&revoked).await?;

        self.create(organization).await
    }

    /// Decrypt the stored copy of a key.
    pub async fn reveal(&self, api_key: &ApiKey) -> Result<String, AuthError> {
        let encoded = api_key
            .encrypted_key
            .as_deref()
            .ok_or_else(|| AuthError::Internal("API key has no stored copy".to_string()))?;
        let ciphertext = STANDARD
            .decode(encoded)
            .map_err(|e| AuthError::Internal(format!("stored API key is not base64: {}", e)))?;
        let plaintext = self.cipher.decrypt(&self.encryption_key, &ciphertext).await?;
        String::from_utf8(plaintext)
            .map_err(|_| AuthError::Internal("decrypted API key is not UTF-8".to_string()))
    }

    /// Find a key by its display prefix.
    pub async fn get_by_prefix(&self, prefix: &ApiKeyPrefix) -> Result<Option<ApiKey>, AuthError> {
        let query = r#"
            SELECT * FROM api_key
            WHERE key_prefix = $key_prefix
            ORDER BY created_at DESC
            LIMIT 1
        "#;

        let mut res = self
            .db
            .query(query)
            .bind(("key_prefix", prefix.as_str().to_string()))
            .await?;

        let keys: Vec<ApiKey> = res.take(0)?;
        Ok(keys.into_iter().next())
    }

    /// List keys, optionally restricted to one organization and to active keys.
    pub async fn list(
        &self,
        organization: Option<&OrganizationRef>,
        active_only: bool,
    ) -> Result<Vec<ApiKey>, AuthError> {
        let mut conditions = Vec::new();
        if organization.is_some() {
            conditions.push("organization_ref = $organization_ref");
        }
        if active_only {
            conditions.push("revoked_at = NONE");
        }

        let mut query = "SELECT * FROM api_key".to_string();
        if !conditions.is_empty() {
            query.push_str(" WHERE ");
            query.push_str(&conditions.join(" AND "));
        }
        query.push_str(" ORDER BY created_at DESC");

        let mut res = self
            .db
            .query(query)
            .bind((
                "organization_ref",
                organization.map(|o| o.as_str().to_string()),
            ))
            .await?;

        let keys: Vec<ApiKey> = res.take(0)?;
        Ok(keys)
    }

    async fn audit_revoked(&self, revoked: &[ApiKey]) -> Result<(), AuthError> {
        for api_key in revoked {
            info!("Revoked API key {}", api_key.key_prefix);
            self.audit
                .record(AuditLogCreate {
                    action: AuditAction::ApiKeyRevoked,
                    subject_type: "api_key".to_string(),
                    subject_id: Some(api_key.id.to_string()),
                    organization_ref: Some(api_key.organization_ref.clone()),
                    user_ref: None,
                    details: Some(json!({ "key_prefix": api_key.key_prefix.as_str() })),
                })
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::InsecureHexCipher;
    use crate::test_support::{ManualClock, fixed_now, memory_db};

    async fn manager() -> (ApiKeyManager, UserStore) {
        let db = memory_db().await;
        let users = UserStore::new(db.clone());
        users
            .create_organization(&OrganizationRef::new("org_1"), Some("Acme"))
            .await
            .unwrap();
        let manager = ApiKeyManager::new(
            db,
            Arc::new(InsecureHexCipher),
            SigningKeyRef::new("keyRings/auth/cryptoKeys/secrets"),
            Arc::new(ManualClock::new(fixed_now())),
        );
        (manager, users)
    }

    #[test]
    fn test_generate_api_key_format() {
        let (key, prefix, hash) = generate_api_key();

        assert!(key.starts_with("ak_"));
        assert_eq!(key.len(), 3 + 8 + 1 + 64);
        assert!(key.starts_with(prefix.as_str()));
        assert_eq!(prefix.as_str().len(), 11);
        assert_eq!(hash, hash_secret(&key));
        assert_eq!(prefix_of(&key), Some(prefix.as_str()));
    }

    #[test]
    fn test_prefix_of_rejects_other_shapes() {
        assert_eq!(prefix_of(""), None);
        assert_eq!(prefix_of("sk_12345678_abc"), None);
        assert_eq!(prefix_of("ak_123_abc"), None);
        assert_eq!(prefix_of("ak_12345678_"), None);
        assert_eq!(prefix_of("ak_12345678"), None);
    }

    #[tokio::test]
    async fn test_create_and_validate() {
        let (manager, _users) = manager().await;
        let org = OrganizationRef::new("org_1");

        let (raw, api_key) = manager.create(&org).await.unwrap();
        assert_eq!(api_key.organization_ref, org);
        assert!(!api_key.is_revoked());
        assert_ne!(api_key.encrypted_key.as_deref(), Some(raw.as_str()));

        let organization = manager.validate(&raw).await.unwrap();
        assert_eq!(organization.organization_ref, org);

        let used = manager.get_by_prefix(&api_key.key_prefix).await.unwrap().unwrap();
        assert_eq!(used.last_used_at.map(|t| t.0), Some(fixed_now()));
    }

    #[tokio::test]
    async fn test_unknown_and_garbage_keys_are_expected_errors() {
        let (manager, _users) = manager().await;

        let (unknown, _, _) = generate_api_key();
        assert_eq!(manager.validate(&unknown).await.unwrap_err(), AuthError::NotFound);

        let err = manager.validate("not-a-key").await.unwrap_err();
        assert!(matches!(err, AuthError::Malformed(_)));
        assert!(err.is_expected());
    }

    #[tokio::test]
    async fn test_revoked_key_rejected() {
        let (manager, _users) = manager().await;
        let (raw, api_key) = manager.create(&OrganizationRef::new("org_1")).await.unwrap();

        assert!(manager.revoke(&api_key).await.unwrap());
        assert_eq!(manager.validate(&raw).await.unwrap_err(), AuthError::NotFound);
        assert!(!manager.revoke(&api_key).await.unwrap());
    }

    #[tokio::test]
    async fn test_blocked_organization_is_forbidden() {
        let (manager, users) = manager().await;
        let org = OrganizationRef::new("org_1");
        let (raw, _) = manager.create(&org).await.unwrap();

        users.set_organization_active(&org, false).await.unwrap();
        let err = manager.validate(&raw).await.unwrap_err();
        assert!(matches!(err, AuthError::Forbidden(_)));
        assert!(!err.is_expected());
    }

    #[tokio::test]
    async fn test_rotate_leaves_one_active_key() {
        let (manager, _users) = manager().await;
        let org = OrganizationRef::new("org_1");

        let (old_raw, _) = manager.create(&org).await.unwrap();
        let (new_raw, new_key) = manager.rotate(&org).await.unwrap();

        assert!(manager.validate(&old_raw).await.is_err());
        assert!(manager.validate(&new_raw).await.is_ok());

        let active = manager.list(Some(&org), true).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, new_key.id);

        let all = manager.list(Some(&org), false).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_reveal_returns_original_key() {
        let (manager, _users) = manager().await;
        let (raw, api_key) = manager.create(&OrganizationRef::new("org_1")).await.unwrap();

        assert_eq!(manager.reveal(&api_key).await.unwrap(), raw);
    }

    #[tokio::test]
    async fn test_revoke_by_prefix() {
        let (manager, _users) = manager().await;
        let (raw, api_key) = manager.create(&OrganizationRef::new("org_1")).await.unwrap();

        assert_eq!(manager.revoke_by_prefix(&api_key.key_prefix).await.unwrap(), 1);
        assert!(manager.validate(&raw).await.is_err());
        assert_eq!(manager.revoke_by_prefix(&api_key.key_prefix).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_list_across_organizations() {
        let (manager, _users) = manager().await;
        manager.create(&OrganizationRef::new("org_1")).await.unwrap();
        manager.create(&OrganizationRef::new("org_2")).await.unwrap();

        assert_eq!(manager.list(None, true).await.unwrap().len(), 2);
        assert_eq!(
            manager
                .list(Some(&OrganizationRef::new("org_2")), true)
                .await
                .unwrap()
                .len(),
            1
        );
    }
}
