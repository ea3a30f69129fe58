//! Capability-scoped link tokens for an organization's end customers.
//!
//! A link token is a signed token *and* a server-side shadow row. Both must
//! agree for the token to be accepted: the signature proves we issued it,
//! the shadow row lets us revoke it before it expires.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{Duration, SubsecRound};
use serde::{Deserialize, Serialize};
use serde_json::json;
use surrealdb::sql::Datetime;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::audit::AuditLog;
use crate::auth::error::AuthError;
use crate::auth::hash::hash_secret;
use crate::db::Db;
use crate::db::schema::{AuditAction, AuditLogCreate, LinkTokenRecord};
use crate::token::TokenCodec;
use crate::types::{EndCustomerRef, LinkTokenRef, OrganizationRef};

/// Header carrying a base64url-wrapped link token.
pub const LINK_TOKEN_HEADER: &str = "X-LINK-TOKEN";

/// Claims signed into every link token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkClaims {
    pub organization: OrganizationRef,
    pub end_customer: EndCustomerRef,
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Unique per token so that no two tokens share a hash
    pub jti: String,
}

/// What a validated link token grants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkGrant {
    pub organization_ref: OrganizationRef,
    pub end_customer_ref: EndCustomerRef,
    pub scopes: Vec<String>,
    pub link_token_ref: LinkTokenRef,
}

/// Wrap a signed token for the `X-LINK-TOKEN` header.
pub fn encode_header(token: &str) -> String {
    URL_SAFE_NO_PAD.encode(token)
}

/// Unwrap an `X-LINK-TOKEN` header value.
pub fn decode_header(value: &str) -> Result<String, AuthError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(value.trim())
        .map_err(|e| AuthError::Malformed(format!("link token header: {}", e)))?;
    String::from_utf8(bytes)
        .map_err(|_| AuthError::Malformed("link token header is not UTF-8".to_string()))
}

#[derive(Clone)]
pub struct LinkTokenManager {
    db: Db,
    codec: TokenCodec,
    ttl: Duration,
    audit: AuditLog,
}

impl LinkTokenManager {
    pub fn new(db: Db, codec: TokenCodec, ttl: Duration) -> Self {
        Self {
            audit: AuditLog::new(db.clone()),
            db,
            codec,
            ttl,
        }
    }

    /// Issue a link token and its shadow record.
    pub async fn create(
        &self,
        organization: &OrganizationRef,
        end_customer: &EndCustomerRef,
        scopes: Vec<String>,
    ) -> Result<(String, LinkTokenRecord), AuthError> {
        // Token timestamps are whole seconds; keep the shadow row in step
        let issued_at = self.codec.clock().now().trunc_subsecs(0);
        let expires_at = issued_at + self.ttl;

        let claims = LinkClaims {
            organization: organization.clone(),
            end_customer: end_customer.clone(),
            scopes,
            jti: Uuid::new_v4().to_string(),
        };
        let token = self.codec.build(&claims, issued_at, Some(expires_at)).await?;
        let token_hash = hash_secret(&token);

        let query = r#"
            CREATE link_token CONTENT {
                organization_ref: $organization_ref,
                end_customer_ref: $end_customer_ref,
                token_hash: $token_hash,
                expiration: $expiration
            }
        "#;

        let mut res = self
            .db
            .query(query)
            .bind(("organization_ref", organization.as_str().to_string()))
            .bind(("end_customer_ref", end_customer.as_str().to_string()))
            .bind(("token_hash", token_hash.as_str().to_string()))
            .bind(("expiration", Datetime::from(expires_at)))
            .await?;

        let created: Vec<LinkTokenRecord> = res.take(0)?;
        let record = created
            .into_iter()
            .next()
            .ok_or_else(|| AuthError::Internal("failed to create link token".to_string()))?;

        info!(
            "Created link token {} for {}/{}",
            token_hash.short(),
            organization,
            end_customer
        );
        self.audit
            .record(AuditLogCreate {
                action: AuditAction::LinkTokenCreated,
                subject_type: "link_token".to_string(),
                subject_id: Some(record.id.to_string()),
                organization_ref: Some(organization.clone()),
                user_ref: None,
                details: Some(json!({
                    "end_customer_ref": end_customer.as_str(),
                    "scopes": claims.scopes,
                })),
            })
            .await?;

        Ok((token, record))
    }

    /// Accept a token only if its signature and its shadow record both hold.
    pub async fn validate(&self, token: &str) -> Result<LinkGrant, AuthError> {
        let signed = self.codec.parse::<LinkClaims>(token).await?;
        let claims = signed.claims;
        let token_hash = hash_secret(token);

        let query = r#"
            SELECT * FROM link_token
            WHERE token_hash = $token_hash
              AND expiration >= $now
              AND revoked_at = NONE
            LIMIT 1
        "#;

        let mut res = self
            .db
            .query(query)
            .bind(("token_hash", token_hash.as_str().to_string()))
            .bind(("now", Datetime::from(self.codec.clock().now())))
            .await?;

        let records: Vec<LinkTokenRecord> = res.take(0)?;
        let Some(record) = records.into_iter().next() else {
            debug!("No live shadow record for link token {}", token_hash.short());
            return Err(AuthError::NotFound);
        };

        if record.organization_ref != claims.organization
            || record.end_customer_ref != claims.end_customer
        {
            warn!(
                "Link token {} claims disagree with its shadow record",
                token_hash.short()
            );
            return Err(AuthError::Malformed(
                "link token does not match its record".to_string(),
            ));
        }

        Ok(LinkGrant {
            link_token_ref: record.link_token_ref(),
            organization_ref: claims.organization,
            end_customer_ref: claims.end_customer,
            scopes: claims.scopes,
        })
    }

    /// Revoke one link token by its shadow record.
    pub async fn revoke(&self, record: &LinkTokenRecord) -> Result<bool, AuthError> {
        let query = r#"
            UPDATE $id SET revoked_at = $now
            WHERE revoked_at = NONE
        "#;

        let mut res = self
            .db
            .query(query)
            .bind(("id", record.id.clone()))
            .bind(("now", Datetime::from(self.codec.clock().now())))
            .await?;

        let revoked: Vec<LinkTokenRecord> = res.take(0)?;
        self.audit_revoked(&revoked).await?;
        Ok(!revoked.is_empty())
    }

    /// Revoke a link token given the token string itself.
    pub async fn revoke_token(&self, token: &str) -> Result<bool, AuthError> {
        let query = r#"
            UPDATE link_token SET revoked_at = $now
            WHERE token_hash = $token_hash AND revoked_at = NONE
        "#;

        let mut res = self
            .db
            .query(query)
            .bind(("token_hash", hash_secret(token).into_inner()))
            .bind(("now", Datetime::from(self.codec.clock().now())))
            .await?;

        let revoked: Vec<LinkTokenRecord> = res.take(0)?;
        self.audit_revoked(&revoked).await?;
        Ok(!revoked.is_empty())
    }

    /// Revoke every live link token issued to one end customer.
    pub async fn revoke_for_end_customer(
        &self,
        organization: &OrganizationRef,
        end_customer: &EndCustomerRef,
    ) -> Result<usize, AuthError> {
        let query = r#"
            UPDATE link_token SET revoked_at = $now
            WHERE organization_ref = $organization_ref
              AND end_customer_ref = $end_customer_ref
              AND revoked_at = NONE
        "#;

        let mut res = self
            .db
            .query(query)
            .bind(("organization_ref", organization.as_str().to_string()))
            .bind(("end_customer_ref", end_customer.as_str().to_string()))
            .bind(("now", Datetime::from(self.codec.clock().now())))
            .await?;

        let revoked: Vec<LinkTokenRecord> = res.take(0)?;
        self.audit_revoked(&revoked).await?;
        Ok(revoked.len())
    }

    async fn audit_revoked(&self, revoked: &[LinkTokenRecord]) -> Result<(), AuthError> {
        for record in revoked {
            info!("Revoked link token {}", record.token_hash.short());
            self.audit
                .record(AuditLogCreate {
                    action: AuditAction::LinkTokenRevoked,
                    subject_type: "link_token".to_string(),
                    subject_id: Some(record.id.to_string()),
                    organization_ref: Some(record.organization_ref.clone()),
                    user_ref: None,
                    details: Some(json!({ "end_customer_ref": record.end_customer_ref.as_str() })),
                })
                .await?;
        }
        Ok(())
    }
}
