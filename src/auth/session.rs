//! Browser sessions backed by opaque random tokens.
//!
//! The raw token only ever exists in the cookie. The store keeps its SHA-256
//! and a sliding expiration that every authenticated hit pushes forward.

use std::sync::Arc;

use chrono::Duration;
use serde_json::json;
use surrealdb::sql::Datetime;
use tracing::{debug, info};

use crate::auth::audit::AuditLog;
use crate::auth::error::AuthError;
use crate::auth::hash::{SECRET_BYTES, hash_secret, random_hex};
use crate::clock::Clock;
use crate::db::Db;
use crate::db::schema::{AuditAction, AuditLogCreate, Session};
use crate::types::UserRef;

/// Creates, validates, slides and revokes sessions.
#[derive(Clone)]
pub struct SessionManager {
    db: Db,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    audit: AuditLog,
}

impl SessionManager {
    pub fn new(db: Db, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            audit: AuditLog::new(db.clone()),
            db,
            clock,
            ttl,
        }
    }

    /// Start a session for `user`. Returns the raw token for the cookie.
    pub async fn create(&self, user: &UserRef) -> Result<(String, Session), AuthError> {
        let raw_token = random_hex(SECRET_BYTES);
        let token_hash = hash_secret(&raw_token);
        let expiration = self.clock.now() + self.ttl;

        let query = r#"
            CREATE session CONTENT {
                user_ref: $user_ref,
                token_hash: $token_hash,
                expiration: $expiration
            }
        "#;

        let mut res = self
            .db
            .query(query)
            .bind(("user_ref", user.as_str().to_string()))
            .bind(("token_hash", token_hash.as_str().to_string()))
            .bind(("expiration", Datetime::from(expiration)))
            .await?;

        let created: Vec<Session> = res.take(0)?;
        let session = created
            .into_iter()
            .next()
            .ok_or_else(|| AuthError::Internal("failed to create session".to_string()))?;

        info!("Created session {} for user {}", token_hash.short(), user);
        self.audit
            .record(AuditLogCreate {
                action: AuditAction::SessionCreated,
                subject_type: "session".to_string(),
                subject_id: Some(session.id.to_string()),
                organization_ref: None,
                user_ref: Some(user.clone()),
                details: Some(json!({ "expiration": expiration.to_rfc3339() })),
            })
            .await?;

        Ok((raw_token, session))
    }

    /// Look up a live session by its raw token.
    pub async fn load_valid(&self, raw_token: &str) -> Result<Session, AuthError> {
        let token_hash = hash_secret(raw_token);

        let query = r#"
            SELECT * FROM session
            WHERE token_hash = $token_hash
              AND expiration >= $now
              AND revoked_at = NONE
            LIMIT 1
        "#;

        let mut res = self
            .db
            .query(query)
            .bind(("token_hash", token_hash.as_str().to_string()))
            .bind(("now", Datetime::from(self.clock.now())))
            .await?;

        let sessions: Vec<Session> = res.take(0)?;
        sessions.into_iter().next().ok_or_else(|| {
            debug!("No live session for {}", token_hash.short());
            AuthError::NotFound
        })
    }

    /// Slide the expiration to `now + ttl`. Never moves it backwards.
    pub async fn refresh(&self, session: &Session) -> Result<Session, AuthError> {
        let expiration = self.clock.now() + self.ttl;

        let query = r#"
            UPDATE $id SET expiration = $expiration
            WHERE expiration < $expiration AND revoked_at = NONE
        "#;

        let mut res = self
            .db
            .query(query)
            .bind(("id", session.id.clone()))
            .bind(("expiration", Datetime::from(expiration)))
            .await?;

        let updated: Vec<Session> = res.take(0)?;
        if let Some(session) = updated.into_iter().next() {
            return Ok(session);
        }

        // A concurrent refresh got there first, or the row is already further out
        let mut res = self
            .db
            .query("SELECT * FROM $id")
            .bind(("id", session.id.clone()))
            .await?;
        let current: Vec<Session> = res.take(0)?;
        current.into_iter().next().ok_or(AuthError::NotFound)
    }

    /// Revoke one session. Revoking twice is a no-op.
    pub async fn revoke(&self, session: &Session) -> Result<bool, AuthError> {
        let query = r#"
            UPDATE $id SET revoked_at = $now
            WHERE revoked_at = NONE
        "#;

        let mut res = self
            .db
            .query(query)
            .bind(("id", session.id.clone()))
            .bind(("now", Datetime::from(self.clock.now())))
            .await?;

        let revoked: Vec<Session> = res.take(0)?;
        if revoked.is_empty() {
            return Ok(false);
        }

        info!("Revoked session {}", session.token_hash.short());
        self.audit
            .record(AuditLogCreate {
                action: AuditAction::SessionRevoked,
                subject_type: "session".to_string(),
                subject_id: Some(session.id.to_string()),
                organization_ref: None,
                user_ref: Some(session.user_ref.clone()),
                details: None,
            })
            .await?;
        Ok(true)
    }

    /// Revoke every live session of a user. Returns how many were revoked.
    pub async fn revoke_all_for_user(&self, user: &UserRef) -> Result<usize, AuthError> {
        let query = r#"
            UPDATE session SET revoked_at = $now
            WHERE user_ref = $user_ref AND revoked_at = NONE
        "#;

        let mut res = self
            .db
            .query(query)
            .bind(("user_ref", user.as_str().to_string()))
            .bind(("now", Datetime::from(self.clock.now())))
            .await?;

        let revoked: Vec<Session> = res.take(0)?;
        if !revoked.is_empty() {
            info!("Revoked {} sessions for user {}", revoked.len(), user);
            self.audit
                .record(AuditLogCreate {
                    action: AuditAction::SessionRevoked,
                    subject_type: "session".to_string(),
                    subject_id: None,
                    organization_ref: None,
                    user_ref: Some(user.clone()),
                    details: Some(json!({ "count": revoked.len() })),
                })
                .await?;
        }
        Ok(revoked.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_SESSION_TTL_SECONDS;
    use crate::test_support::{ManualClock, fixed_now, memory_db};

    async fn manager() -> (SessionManager, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(fixed_now()));
        let manager = SessionManager::new(
            memory_db().await,
            clock.clone(),
            Duration::seconds(DEFAULT_SESSION_TTL_SECONDS),
        );
        (manager, clock)
    }

    #[tokio::test]
    async fn test_create_then_load() {
        let (manager, _clock) = manager().await;
        let user = UserRef::new("user_1");

        let (raw, session) = manager.create(&user).await.unwrap();
        assert_eq!(raw.len(), SECRET_BYTES * 2);
        assert_ne!(session.token_hash.as_str(), raw);
        assert_eq!(session.token_hash, hash_secret(&raw));
        assert_eq!(session.expires_at(), fixed_now() + Duration::days(14));

        let loaded = manager.load_valid(&raw).await.unwrap();
        assert_eq!(loaded.id, session.id);
        assert_eq!(loaded.user_ref, user);
    }

    #[tokio::test]
    async fn test_unknown_token_not_found() {
        let (manager, _clock) = manager().await;
        let err = manager.load_valid("deadbeef").await.unwrap_err();
        assert_eq!(err, AuthError::NotFound);
    }

    #[tokio::test]
    async fn test_revoked_session_not_found_before_expiry() {
        let (manager, _clock) = manager().await;
        let (raw, session) = manager.create(&UserRef::new("user_1")).await.unwrap();

        assert!(manager.revoke(&session).await.unwrap());
        assert_eq!(manager.load_valid(&raw).await.unwrap_err(), AuthError::NotFound);

        // Second revoke changes nothing
        assert!(!manager.revoke(&session).await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_session_not_found() {
        let (manager, clock) = manager().await;
        let (raw, _session) = manager.create(&UserRef::new("user_1")).await.unwrap();

        clock.advance(Duration::days(14));
        assert!(manager.load_valid(&raw).await.is_ok());

        clock.advance(Duration::seconds(1));
        assert_eq!(manager.load_valid(&raw).await.unwrap_err(), AuthError::NotFound);
    }

    #[tokio::test]
    async fn test_refresh_strictly_increases_expiration() {
        let (manager, clock) = manager().await;
        let (raw, session) = manager.create(&UserRef::new("user_1")).await.unwrap();

        clock.advance(Duration::hours(1));
        let refreshed = manager.refresh(&session).await.unwrap();
        assert!(refreshed.expires_at() > session.expires_at());
        assert_eq!(
            refreshed.expires_at(),
            fixed_now() + Duration::hours(1) + Duration::days(14)
        );

        // Still valid past the original expiry
        clock.advance(Duration::days(14) - Duration::minutes(30));
        assert!(manager.load_valid(&raw).await.is_ok());
    }

    #[tokio::test]
    async fn test_refresh_never_lowers_expiration() {
        let db = memory_db().await;
        let ttl = Duration::days(14);
        let later = Arc::new(ManualClock::new(fixed_now() + Duration::hours(2)));
        let earlier = Arc::new(ManualClock::new(fixed_now()));

        let ahead = SessionManager::new(db.clone(), later, ttl);
        let behind = SessionManager::new(db, earlier, ttl);

        let (_raw, session) = ahead.create(&UserRef::new("user_1")).await.unwrap();
        let after = behind.refresh(&session).await.unwrap();
        assert_eq!(after.expires_at(), session.expires_at());
    }

    #[tokio::test]
    async fn test_revoke_all_for_user() {
        let (manager, _clock) = manager().await;
        let user = UserRef::new("user_1");
        let other = UserRef::new("user_2");

        let (raw_a, _) = manager.create(&user).await.unwrap();
        let (raw_b, _) = manager.create(&user).await.unwrap();
        let (raw_c, _) = manager.create(&other).await.unwrap();

        assert_eq!(manager.revoke_all_for_user(&user).await.unwrap(), 2);
        assert!(manager.load_valid(&raw_a).await.is_err());
        assert!(manager.load_valid(&raw_b).await.is_err());
        assert!(manager.load_valid(&raw_c).await.is_ok());

        assert_eq!(manager.revoke_all_for_user(&user).await.unwrap(), 0);
    }
}
