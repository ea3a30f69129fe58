use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use surrealdb::Surreal;
use surrealdb::engine::any::Any;
use surrealdb::opt::auth::Root;
use tracing::debug;

pub type Db = Surreal<Any>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub namespace: String,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: env::var("SURREALDB_URL").unwrap_or_else(|_| "memory".to_string()),
            namespace: env::var("SURREALDB_NAMESPACE").unwrap_or_else(|_| "tenant".to_string()),
            database: env::var("SURREALDB_DATABASE").unwrap_or_else(|_| "auth".to_string()),
            username: env::var("SURREALDB_USERNAME").ok(),
            password: env::var("SURREALDB_PASSWORD").ok(),
        }
    }
}

pub async fn create_connection(config: DatabaseConfig) -> Result<Db> {
    let db = surrealdb::engine::any::connect(config.url).await?;

    // Sign in if credentials are provided
    if let (Some(username), Some(password)) = (config.username, config.password) {
        db.signin(Root {
            username: &username,
            password: &password,
        })
        .await?;
    }

    db.use_ns(config.namespace).use_db(config.database).await?;

    Ok(db)
}

/// Define tables and indexes for every credential store.
///
/// Hash columns carry UNIQUE indexes: a given hash can name at most one row.
pub async fn ensure_schema(db: &Db) -> Result<()> {
    let schema_queries = [
        "DEFINE TABLE IF NOT EXISTS organization SCHEMAFULL;
         DEFINE FIELD IF NOT EXISTS organization_ref ON TABLE organization TYPE string;
         DEFINE FIELD IF NOT EXISTS name ON TABLE organization TYPE option<string>;
         DEFINE FIELD IF NOT EXISTS is_active ON TABLE organization TYPE bool DEFAULT true;
         DEFINE FIELD IF NOT EXISTS created_at ON TABLE organization TYPE datetime DEFAULT time::now();
         DEFINE INDEX IF NOT EXISTS organization_ref_unique ON TABLE organization COLUMNS organization_ref UNIQUE;",

        "DEFINE TABLE IF NOT EXISTS user SCHEMAFULL;
         DEFINE FIELD IF NOT EXISTS user_ref ON TABLE user TYPE string;
         DEFINE FIELD IF NOT EXISTS organization_ref ON TABLE user TYPE string;
         DEFINE FIELD IF NOT EXISTS email ON TABLE user TYPE option<string>;
         DEFINE FIELD IF NOT EXISTS display_name ON TABLE user TYPE option<string>;
         DEFINE FIELD IF NOT EXISTS is_active ON TABLE user TYPE bool DEFAULT true;
         DEFINE FIELD IF NOT EXISTS created_at ON TABLE user TYPE datetime DEFAULT time::now();
         DEFINE INDEX IF NOT EXISTS user_ref_unique ON TABLE user COLUMNS user_ref UNIQUE;",

        "DEFINE TABLE IF NOT EXISTS session SCHEMAFULL;
         DEFINE FIELD IF NOT EXISTS user_ref ON TABLE session TYPE string;
         DEFINE FIELD IF NOT EXISTS token_hash ON TABLE session TYPE string;
         DEFINE FIELD IF NOT EXISTS expiration ON TABLE session TYPE datetime;
         DEFINE FIELD IF NOT EXISTS revoked_at ON TABLE session TYPE option<datetime>;
         DEFINE FIELD IF NOT EXISTS created_at ON TABLE session TYPE datetime DEFAULT time::now();
         DEFINE INDEX IF NOT EXISTS session_token_hash ON TABLE session COLUMNS token_hash UNIQUE;
         DEFINE INDEX IF NOT EXISTS session_user ON TABLE session COLUMNS user_ref;",

        "DEFINE TABLE IF NOT EXISTS api_key SCHEMAFULL;
         DEFINE FIELD IF NOT EXISTS organization_ref ON TABLE api_key TYPE string;
         DEFINE FIELD IF NOT EXISTS key_hash ON TABLE api_key TYPE string;
         DEFINE FIELD IF NOT EXISTS key_prefix ON TABLE api_key TYPE string;
         DEFINE FIELD IF NOT EXISTS encrypted_key ON TABLE api_key TYPE option<string>;
         DEFINE FIELD IF NOT EXISTS revoked_at ON TABLE api_key TYPE option<datetime>;
         DEFINE FIELD IF NOT EXISTS last_used_at ON TABLE api_key TYPE option<datetime>;
         DEFINE FIELD IF NOT EXISTS created_at ON TABLE api_key TYPE datetime DEFAULT time::now();
         DEFINE INDEX IF NOT EXISTS api_key_hash ON TABLE api_key COLUMNS key_hash UNIQUE;
         DEFINE INDEX IF NOT EXISTS api_key_prefix ON TABLE api_key COLUMNS key_prefix;
         DEFINE INDEX IF NOT EXISTS api_key_organization ON TABLE api_key COLUMNS organization_ref;",

        "DEFINE TABLE IF NOT EXISTS link_token SCHEMAFULL;
         DEFINE FIELD IF NOT EXISTS organization_ref ON TABLE link_token TYPE string;
         DEFINE FIELD IF NOT EXISTS end_customer_ref ON TABLE link_token TYPE string;
         DEFINE FIELD IF NOT EXISTS token_hash ON TABLE link_token TYPE string;
         DEFINE FIELD IF NOT EXISTS expiration ON TABLE link_token TYPE datetime;
         DEFINE FIELD IF NOT EXISTS revoked_at ON TABLE link_token TYPE option<datetime>;
         DEFINE FIELD IF NOT EXISTS created_at ON TABLE link_token TYPE datetime DEFAULT time::now();
         DEFINE INDEX IF NOT EXISTS link_token_hash ON TABLE link_token COLUMNS token_hash UNIQUE;
         DEFINE INDEX IF NOT EXISTS link_token_customer ON TABLE link_token COLUMNS organization_ref, end_customer_ref;",

        // Audit entries carry free-form details, so the table stays schemaless
        "DEFINE TABLE IF NOT EXISTS audit_log SCHEMALESS;
         DEFINE INDEX IF NOT EXISTS audit_log_organization ON TABLE audit_log COLUMNS organization_ref;",
    ];

    for query in schema_queries {
        db.query(query).await?.check()?;
    }

    debug!("Auth schema ensured");
    Ok(())
}
