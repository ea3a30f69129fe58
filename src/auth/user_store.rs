//! Users and organizations, as far as authentication needs them.
//!
//! The resolver only asks two questions of this store: who owns a session,
//! and is the subject still allowed in. An inactive user or organization
//! turns an otherwise valid credential into [`AuthError::Forbidden`].

use serde_json::json;
use tracing::info;

use crate::auth::audit::AuditLog;
use crate::auth::error::AuthError;
use crate::db::Db;
use crate::db::schema::{AuditAction, AuditLogCreate, Organization, User};
use crate::types::{OrganizationRef, UserRef};

/// User store for database operations.
#[derive(Clone)]
pub struct UserStore {
    db: Db,
    audit: AuditLog,
}

impl UserStore {
    /// Create a new user store.
    pub fn new(db: Db) -> Self {
        Self {
            audit: AuditLog::new(db.clone()),
            db,
        }
    }

    /// Create an organization.
    pub async fn create_organization(
        &self,
        organization: &OrganizationRef,
        name: Option<&str>,
    ) -> Result<Organization, AuthError> {
        let query = r#"
            CREATE organization CONTENT {
                organization_ref: $organization_ref,
                name: $name,
                is_active: true
            }
        "#;

        let mut res = self
            .db
            .query(query)
            .bind(("organization_ref", organization.as_str().to_string()))
            .bind(("name", name.map(|s| s.to_string())))
            .await?;

        let created: Vec<Organization> = res.take(0)?;
        created
            .into_iter()
            .next()
            .ok_or_else(|| AuthError::Internal("failed to create organization".to_string()))
    }

    /// Get an organization by its reference.
    pub async fn get_organization(
        &self,
        organization: &OrganizationRef,
    ) -> Result<Option<Organization>, AuthError> {
        let query = "SELECT * FROM organization WHERE organization_ref = $organization_ref LIMIT 1";

        let mut res = self
            .db
            .query(query)
            .bind(("organization_ref", organization.as_str().to_string()))
            .await?;

        let found: Vec<Organization> = res.take(0)?;
        Ok(found.into_iter().next())
    }

    /// Block or unblock an organization.
    pub async fn set_organization_active(
        &self,
        organization: &OrganizationRef,
        is_active: bool,
    ) -> Result<bool, AuthError> {
        let query = r#"
            UPDATE organization SET is_active = $is_active
            WHERE organization_ref = $organization_ref
        "#;

        let mut res = self
            .db
            .query(query)
            .bind(("organization_ref", organization.as_str().to_string()))
            .bind(("is_active", is_active))
            .await?;

        let updated: Vec<Organization> = res.take(0)?;
        Ok(!updated.is_empty())
    }

    /// Create a user inside an organization.
    pub async fn create_user(
        &self,
        user: &UserRef,
        organization: &OrganizationRef,
        email: Option<&str>,
        display_name: Option<&str>,
    ) -> Result<User, AuthError> {
        let query = r#"
            CREATE user CONTENT {
                user_ref: $user_ref,
                organization_ref: $organization_ref,
                email: $email,
                display_name: $display_name,
                is_active: true
            }
        "#;

        let mut res = self
            .db
            .query(query)
            .bind(("user_ref", user.as_str().to_string()))
            .bind(("organization_ref", organization.as_str().to_string()))
            .bind(("email", email.map(|s| s.to_string())))
            .bind(("display_name", display_name.map(|s| s.to_string())))
            .await?;

        let created: Vec<User> = res.take(0)?;
        created
            .into_iter()
            .next()
            .ok_or_else(|| AuthError::Internal("failed to create user".to_string()))
    }

    /// Get a user by reference.
    pub async fn get_user(&self, user: &UserRef) -> Result<Option<User>, AuthError> {
        let query = "SELECT * FROM user WHERE user_ref = $user_ref LIMIT 1";

        let mut res = self
            .db
            .query(query)
            .bind(("user_ref", user.as_str().to_string()))
            .await?;

        let users: Vec<User> = res.take(0)?;
        Ok(users.into_iter().next())
    }

    /// Deactivate a user account.
    pub async fn deactivate_user(&self, user: &UserRef) -> Result<bool, AuthError> {
        let changed = self.set_user_active(user, false).await?;
        if let Some(record) = changed {
            info!("Deactivated user {}", user);
            self.audit
                .record(AuditLogCreate {
                    action: AuditAction::UserDeactivated,
                    subject_type: "user".to_string(),
                    subject_id: Some(record.id.to_string()),
                    organization_ref: Some(record.organization_ref.clone()),
                    user_ref: Some(user.clone()),
                    details: Some(json!({ "email": record.email })),
                })
                .await?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Reactivate a user account.
    pub async fn reactivate_user(&self, user: &UserRef) -> Result<bool, AuthError> {
        Ok(self.set_user_active(user, true).await?.is_some())
    }

    async fn set_user_active(
        &self,
        user: &UserRef,
        is_active: bool,
    ) -> Result<Option<User>, AuthError> {
        let query = r#"
            UPDATE user SET is_active = $is_active
            WHERE user_ref = $user_ref
        "#;

        let mut res = self
            .db
            .query(query)
            .bind(("user_ref", user.as_str().to_string()))
            .bind(("is_active", is_active))
            .await?;

        let updated: Vec<User> = res.take(0)?;
        Ok(updated.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::memory_db;

    #[tokio::test]
    async fn test_create_and_get_user() {
        let store = UserStore::new(memory_db().await);
        let org = OrganizationRef::new("org_1");
        store.create_organization(&org, Some("Acme")).await.unwrap();

        let user = store
            .create_user(
                &UserRef::new("user_1"),
                &org,
                Some("ada@example.com"),
                Some("Ada"),
            )
            .await
            .unwrap();
        assert!(user.is_active);
        assert_eq!(user.organization_ref, org);

        let fetched = store.get_user(&UserRef::new("user_1")).await.unwrap().unwrap();
        assert_eq!(fetched.id, user.id);
        assert_eq!(fetched.email.as_deref(), Some("ada@example.com"));

        assert!(store.get_user(&UserRef::new("nobody")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_user_deactivation() {
        let db = memory_db().await;
        let store = UserStore::new(db.clone());
        let org = OrganizationRef::new("org_1");
        let user = UserRef::new("user_1");
        store.create_user(&user, &org, None, None).await.unwrap();

        assert!(store.deactivate_user(&user).await.unwrap());
        assert!(!store.get_user(&user).await.unwrap().unwrap().is_active);

        let entries = AuditLog::new(db).recent_for_organization(&org, 5).await.unwrap();
        assert_eq!(entries[0].action, "user_deactivated");

        assert!(store.reactivate_user(&user).await.unwrap());
        assert!(store.get_user(&user).await.unwrap().unwrap().is_active);

        assert!(!store.deactivate_user(&UserRef::new("ghost")).await.unwrap());
    }

    #[tokio::test]
    async fn test_organization_block() {
        let store = UserStore::new(memory_db().await);
        let org = OrganizationRef::new("org_1");
        store.create_organization(&org, None).await.unwrap();

        assert!(store.set_organization_active(&org, false).await.unwrap());
        assert!(!store.get_organization(&org).await.unwrap().unwrap().is_active);
        assert!(
            !store
                .set_organization_active(&OrganizationRef::new("org_missing"), false)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_duplicate_user_ref_rejected() {
        let store = UserStore::new(memory_db().await);
        let org = OrganizationRef::new("org_1");
        let user = UserRef::new("user_1");
        store.create_user(&user, &org, None, None).await.unwrap();

        assert!(store.create_user(&user, &org, None, None).await.is_err());
    }
}
