use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tenant_auth::api::{ApiState, create_router};
use tenant_auth::auth::cookie::CookieOptions;
use tenant_auth::crypto::{Cipher, CipherStrategy, KmsClient};
use tenant_auth::types::{ApiKeyPrefix, EndCustomerRef, OrganizationRef, UserRef};
use tenant_auth::{
    ApiKeyManager, AuthConfig, AuthCore, Clock, DatabaseConfig, Db, LinkTokenManager,
    SessionManager, SystemClock, TokenCodec, UserStore,
};

#[derive(Parser)]
#[command(name = "tenant-auth")]
#[command(about = "Tenant credential authentication service")]
struct Cli {
    #[arg(long, global = true, env = "SURREALDB_URL", default_value = "memory")]
    db_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        #[arg(long, default_value = "0.0.0.0:8080")]
        bind: String,
    },
    /// Initialize the database
    Init,
    /// Create an organization
    CreateOrganization {
        organization_ref: String,
        #[arg(long)]
        name: Option<String>,
    },
    /// Block an organization (or unblock it with --unblock)
    BlockOrganization {
        organization_ref: String,
        #[arg(long, default_value_t = false)]
        unblock: bool,
    },
    /// Create a user inside an organization
    CreateUser {
        user_ref: String,
        #[arg(long)]
        organization_ref: String,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        display_name: Option<String>,
    },
    /// Deactivate a user and end all of their sessions
    DeactivateUser { user_ref: String },
    /// Issue the organization's API key, revoking any it already has
    CreateApiKey { organization_ref: String },
    /// List API keys
    ListApiKeys {
        #[arg(long)]
        organization_ref: Option<String>,
        /// Show only active keys
        #[arg(long, default_value_t = false)]
        active_only: bool,
    },
    /// Print the full key for a prefix
    ShowApiKey { key_prefix: String },
    /// Revoke an API key by its prefix
    RevokeApiKey {
        /// The key prefix to revoke (e.g., "ak_1a2b3c4d")
        key_prefix: String,
    },
    /// Issue a link token for an end customer
    CreateLinkToken {
        organization_ref: String,
        end_customer_ref: String,
        /// Comma-separated list of scopes
        #[arg(long)]
        scopes: Option<String>,
    },
    /// Revoke one link token
    RevokeLinkToken { token: String },
    /// Revoke every link token issued to an end customer
    RevokeEndCustomerLinks {
        organization_ref: String,
        end_customer_ref: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("tenant_auth=info".parse()?))
        .init();

    let cli = Cli::parse();
    let config = AuthConfig::default();
    config.validate()?;

    let db_config = DatabaseConfig {
        url: cli.db_url,
        ..Default::default()
    };
    info!(
        "Using database url {} ({} environment)",
        db_config.url, config.environment
    );
    let db = tenant_auth::create_connection(db_config).await?;
    tenant_auth::ensure_schema(&db).await?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    match cli.command {
        Commands::Serve { bind } => {
            let kms = kms_client(&config)?;
            let cipher = cipher(&config, Some(kms.clone()))?;
            let core = AuthCore::new(db, kms, cipher, clock, &config);
            let state = Arc::new(ApiState {
                core,
                cookie: CookieOptions::for_environment(
                    config.environment,
                    config.cookie_domain.as_deref(),
                ),
            });

            let listener = tokio::net::TcpListener::bind(&bind).await?;
            info!("Auth server listening on http://{}", bind);
            axum::serve(listener, create_router(state)).await?;
        }
        Commands::Init => {
            info!("Database initialized successfully");
        }
        Commands::CreateOrganization {
            organization_ref,
            name,
        } => {
            let users = UserStore::new(db);
            let org = users
                .create_organization(&OrganizationRef::new(organization_ref), name.as_deref())
                .await?;
            println!("Organization '{}' created.", org.organization_ref);
        }
        Commands::BlockOrganization {
            organization_ref,
            unblock,
        } => {
            let users = UserStore::new(db);
            let org = OrganizationRef::new(organization_ref);
            if users.set_organization_active(&org, unblock).await? {
                let state = if unblock { "unblocked" } else { "blocked" };
                println!("Organization '{}' {}.", org, state);
            } else {
                println!("No organization '{}'.", org);
            }
        }
        Commands::CreateUser {
            user_ref,
            organization_ref,
            email,
            display_name,
        } => {
            let users = UserStore::new(db);
            let org = OrganizationRef::new(organization_ref);
            if users.get_organization(&org).await?.is_none() {
                anyhow::bail!("no organization '{}'", org);
            }
            let user = users
                .create_user(
                    &UserRef::new(user_ref),
                    &org,
                    email.as_deref(),
                    display_name.as_deref(),
                )
                .await?;
            println!("User '{}' created in '{}'.", user.user_ref, user.organization_ref);
        }
        Commands::DeactivateUser { user_ref } => {
            let user = UserRef::new(user_ref);
            let users = UserStore::new(db.clone());
            if !users.deactivate_user(&user).await? {
                println!("No user '{}'.", user);
                return Ok(());
            }
            let sessions = SessionManager::new(db, clock, config.session_ttl());
            let revoked = sessions.revoke_all_for_user(&user).await?;
            println!("User '{}' deactivated; {} session(s) revoked.", user, revoked);
        }
        Commands::CreateApiKey { organization_ref } => {
            let org = OrganizationRef::new(organization_ref);
            if UserStore::new(db.clone()).get_organization(&org).await?.is_none() {
                anyhow::bail!("no organization '{}'", org);
            }
            let api_keys = api_key_manager(db, clock, &config)?;
            let (full_key, api_key) = api_keys.rotate(&org).await?;

            println!("API Key created successfully!");
            println!();
            println!("  Key:          {}", full_key);
            println!("  Prefix:       {}", api_key.key_prefix);
            println!("  Organization: {}", api_key.organization_ref);
            println!();
            println!("Any previous key for this organization has been revoked.");
            println!("Use with: -H 'X-API-KEY: {}'", full_key);
        }
        Commands::ListApiKeys {
            organization_ref,
            active_only,
        } => {
            let api_keys = api_key_manager(db, clock, &config)?;
            let org = organization_ref.map(OrganizationRef::new);
            let keys = api_keys.list(org.as_ref(), active_only).await?;

            if keys.is_empty() {
                println!("No API keys found.");
                return Ok(());
            }

            println!(
                "{:<14} {:<20} {:<10} {:<25} {:<25}",
                "PREFIX", "ORGANIZATION", "STATUS", "CREATED", "LAST USED"
            );
            println!("{}", "-".repeat(96));

            for key in keys {
                let status = if key.is_revoked() { "Revoked" } else { "Active" };
                let created = key
                    .created_at
                    .map(|dt| dt.to_string())
                    .unwrap_or_else(|| "-".to_string());
                let last_used = key
                    .last_used_at
                    .map(|dt| dt.to_string())
                    .unwrap_or_else(|| "Never".to_string());

                println!(
                    "{:<14} {:<20} {:<10} {:<25} {:<25}",
                    key.key_prefix, key.organization_ref, status, created, last_used
                );
            }
        }
        Commands::ShowApiKey { key_prefix } => {
            let api_keys = api_key_manager(db, clock, &config)?;
            let prefix = ApiKeyPrefix::new(key_prefix);
            let Some(api_key) = api_keys.get_by_prefix(&prefix).await? else {
                println!("No API key found with prefix '{}'.", prefix);
                return Ok(());
            };
            if api_key.is_revoked() {
                warn!("API key {} is revoked", prefix);
            }
            println!("{}", api_keys.reveal(&api_key).await?);
        }
        Commands::RevokeApiKey { key_prefix } => {
            let api_keys = api_key_manager(db, clock, &config)?;
            let prefix = ApiKeyPrefix::new(key_prefix);
            let revoked = api_keys.revoke_by_prefix(&prefix).await?;

            if revoked > 0 {
                println!("API key '{}' has been revoked.", prefix);
            } else {
                println!("No active API key found with prefix '{}'.", prefix);
            }
        }
        Commands::CreateLinkToken {
            organization_ref,
            end_customer_ref,
            scopes,
        } => {
            let link_tokens = link_token_manager(db, clock, &config)?;
            let scopes = scopes
                .map(|s| {
                    s.split(',')
                        .map(|scope| scope.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default();

            let (token, record) = link_tokens
                .create(
                    &OrganizationRef::new(organization_ref),
                    &EndCustomerRef::new(end_customer_ref),
                    scopes,
                )
                .await?;

            println!("Link token created successfully!");
            println!();
            println!("  Token:   {}", token);
            println!("  Expires: {}", record.expires_at().format("%Y-%m-%d %H:%M:%S UTC"));
            println!();
            println!(
                "Use with: -H 'X-LINK-TOKEN: {}'",
                tenant_auth::auth::link_token::encode_header(&token)
            );
        }
        Commands::RevokeLinkToken { token } => {
            let link_tokens = link_token_manager(db, clock, &config)?;
            if link_tokens.revoke_token(token.trim()).await? {
                println!("Link token has been revoked.");
            } else {
                println!("No live link token matches.");
            }
        }
        Commands::RevokeEndCustomerLinks {
            organization_ref,
            end_customer_ref,
        } => {
            let link_tokens = link_token_manager(db, clock, &config)?;
            let revoked = link_tokens
                .revoke_for_end_customer(
                    &OrganizationRef::new(organization_ref),
                    &EndCustomerRef::new(end_customer_ref),
                )
                .await?;
            println!("{} link token(s) revoked.", revoked);
        }
    }

    Ok(())
}

/// Remote authority; token signing has no local substitute.
fn kms_client(config: &AuthConfig) -> Result<Arc<KmsClient>> {
    let kms = config
        .kms
        .as_ref()
        .context("token signing requires TENANT_AUTH_KMS_ENDPOINT")?;
    Ok(Arc::new(KmsClient::new(kms)?))
}

fn cipher(config: &AuthConfig, kms: Option<Arc<KmsClient>>) -> Result<Arc<dyn Cipher>> {
    let remote = kms.map(|k| k as Arc<dyn Cipher>);
    let strategy = CipherStrategy::for_environment(config.environment, remote)?;
    Ok(strategy.into_cipher())
}

fn api_key_manager(db: Db, clock: Arc<dyn Clock>, config: &AuthConfig) -> Result<ApiKeyManager> {
    let kms = config.kms.as_ref().map(|_| kms_client(config)).transpose()?;
    let cipher = cipher(config, kms)?;
    Ok(ApiKeyManager::new(
        db,
        cipher,
        config.encryption_key.clone(),
        clock,
    ))
}

fn link_token_manager(
    db: Db,
    clock: Arc<dyn Clock>,
    config: &AuthConfig,
) -> Result<LinkTokenManager> {
    let codec = TokenCodec::new(kms_client(config)?, config.token_key.clone(), clock);
    Ok(LinkTokenManager::new(db, codec, config.link_token_ttl()))
}
