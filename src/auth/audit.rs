//! Append-only audit trail of credential lifecycle events.

use crate::auth::error::AuthError;
use crate::db::Db;
use crate::db::schema::{AuditLogCreate, AuditLogRecord};
use crate::types::OrganizationRef;

/// Writer and reader for the `audit_log` table.
#[derive(Clone)]
pub struct AuditLog {
    db: Db,
}

impl AuditLog {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Write an audit log entry.
    pub async fn record(&self, entry: AuditLogCreate) -> Result<(), AuthError> {
        let query = r#"
            CREATE audit_log CONTENT {
                action: $action,
                subject_type: $subject_type,
                subject_id: $subject_id,
                organization_ref: $organization_ref,
                user_ref: $user_ref,
                details: $details,
                created_at: time::now()
            }
        "#;

        self.db
            .query(query)
            .bind(("action", entry.action.as_str().to_string()))
            .bind(("subject_type", entry.subject_type))
            .bind(("subject_id", entry.subject_id))
            .bind(("organization_ref", entry.organization_ref.map(|o| o.into_inner())))
            .bind(("user_ref", entry.user_ref.map(|u| u.into_inner())))
            .bind(("details", entry.details))
            .await?
            .check()?;

        Ok(())
    }

    /// Most recent entries for an organization, newest first.
    pub async fn recent_for_organization(
        &self,
        organization: &OrganizationRef,
        limit: u32,
    ) -> Result<Vec<AuditLogRecord>, AuthError> {
        let query = r#"
            SELECT * FROM audit_log
            WHERE organization_ref = $organization_ref
            ORDER BY created_at DESC
            LIMIT $limit
        "#;

        let mut res = self
            .db
            .query(query)
            .bind(("organization_ref", organization.as_str().to_string()))
            .bind(("limit", limit))
            .await?;

        let entries: Vec<AuditLogRecord> = res.take(0)?;
        Ok(entries)
    }
}
