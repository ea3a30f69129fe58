//! Runtime configuration for the auth core.
//!
//! Every field has a default read from the environment, so a bare
//! `AuthConfig::default()` picks up a deployment's settings. The CLI overrides
//! individual fields on top of that.

use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::types::SigningKeyRef;

/// Default session sliding window (14 days).
pub const DEFAULT_SESSION_TTL_SECONDS: i64 = 14 * 24 * 60 * 60;

/// Default link token lifetime (1 hour).
pub const DEFAULT_LINK_TOKEN_TTL_SECONDS: i64 = 60 * 60;

/// Default OAuth state lifetime (10 minutes).
pub const DEFAULT_OAUTH_STATE_TTL_SECONDS: i64 = 10 * 60;

/// Default timeout for one KMS round trip.
pub const DEFAULT_KMS_TIMEOUT_MS: u64 = 5_000;

/// Deployment environment.
///
/// This single switch controls cookie attributes and whether encryption goes
/// through the remote authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Production,
    #[default]
    Development,
}

impl Environment {
    pub fn is_production(self) -> bool {
        self == Self::Production
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::Development => "development",
        }
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Self::Production),
            "development" | "dev" | "local" => Ok(Self::Development),
            other => Err(format!("unknown environment: {}", other)),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection settings for the remote KMS.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KmsConfig {
    /// Base URL, e.g. `https://cloudkms.googleapis.com`
    pub endpoint: String,
    /// Bearer token sent with every call, if the endpoint needs one
    #[serde(default)]
    pub access_token: Option<String>,
    /// Per-call timeout in milliseconds
    #[serde(default = "default_kms_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_kms_timeout_ms() -> u64 {
    DEFAULT_KMS_TIMEOUT_MS
}

/// Client registration with one external identity provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthProviderConfig {
    pub client_id: String,
    /// Override for the provider's authorize endpoint
    #[serde(default)]
    pub authorize_url: Option<String>,
}

/// Authentication configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Production or development
    pub environment: Environment,
    /// Apex domain the session cookie is scoped to (production only)
    pub cookie_domain: Option<String>,
    /// Remote KMS; required to sign tokens in every environment
    pub kms: Option<KmsConfig>,
    /// Key used to MAC signed tokens
    pub token_key: SigningKeyRef,
    /// Key used to encrypt reversible secrets
    pub encryption_key: SigningKeyRef,
    #[serde(default = "default_session_ttl")]
    pub session_ttl_seconds: i64,
    #[serde(default = "default_link_token_ttl")]
    pub link_token_ttl_seconds: i64,
    #[serde(default = "default_oauth_state_ttl")]
    pub oauth_state_ttl_seconds: i64,
    /// Our OAuth callback URL, registered with every provider
    pub oauth_redirect_uri: String,
    /// Enabled providers by normalized name ("google", "microsoft", "github")
    #[serde(default)]
    pub oauth_providers: BTreeMap<String, OAuthProviderConfig>,
}

fn default_session_ttl() -> i64 {
    DEFAULT_SESSION_TTL_SECONDS
}

fn default_link_token_ttl() -> i64 {
    DEFAULT_LINK_TOKEN_TTL_SECONDS
}

fn default_oauth_state_ttl() -> i64 {
    DEFAULT_OAUTH_STATE_TTL_SECONDS
}

impl Default for AuthConfig {
    fn default() -> Self {
        let environment = env::var("TENANT_AUTH_ENV")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_default();

        let kms = env::var("TENANT_AUTH_KMS_ENDPOINT").ok().map(|endpoint| KmsConfig {
            endpoint,
            access_token: env::var("TENANT_AUTH_KMS_ACCESS_TOKEN").ok(),
            timeout_ms: env::var("TENANT_AUTH_KMS_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_KMS_TIMEOUT_MS),
        });

        let mut oauth_providers = BTreeMap::new();
        for (name, var) in [
            ("google", "TENANT_AUTH_GOOGLE_CLIENT_ID"),
            ("microsoft", "TENANT_AUTH_MICROSOFT_CLIENT_ID"),
            ("github", "TENANT_AUTH_GITHUB_CLIENT_ID"),
        ] {
            if let Ok(client_id) = env::var(var) {
                oauth_providers.insert(
                    name.to_string(),
                    OAuthProviderConfig {
                        client_id,
                        authorize_url: None,
                    },
                );
            }
        }

        Self {
            environment,
            cookie_domain: env::var("TENANT_AUTH_COOKIE_DOMAIN").ok(),
            kms,
            token_key: SigningKeyRef::new(
                env::var("TENANT_AUTH_TOKEN_KEY").unwrap_or_else(|_| "tenant-auth/token".to_string()),
            ),
            encryption_key: SigningKeyRef::new(
                env::var("TENANT_AUTH_ENCRYPTION_KEY")
                    .unwrap_or_else(|_| "tenant-auth/secrets".to_string()),
            ),
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            link_token_ttl_seconds: DEFAULT_LINK_TOKEN_TTL_SECONDS,
            oauth_state_ttl_seconds: DEFAULT_OAUTH_STATE_TTL_SECONDS,
            oauth_redirect_uri: env::var("TENANT_AUTH_OAUTH_REDIRECT_URI")
                .unwrap_or_else(|_| "http://localhost:8080/oauth/callback".to_string()),
            oauth_providers,
        }
    }
}

impl AuthConfig {
    /// Config for local development with no KMS or providers.
    pub fn development() -> Self {
        Self {
            environment: Environment::Development,
            cookie_domain: None,
            kms: None,
            oauth_providers: BTreeMap::new(),
            ..Default::default()
        }
    }

    /// Reject settings that would weaken a production deployment.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.environment.is_production() {
            if self.kms.is_none() {
                anyhow::bail!("production requires TENANT_AUTH_KMS_ENDPOINT");
            }
            if self.cookie_domain.as_deref().is_none_or(str::is_empty) {
                anyhow::bail!("production requires TENANT_AUTH_COOKIE_DOMAIN");
            }
        }
        if self.session_ttl_seconds <= 0
            || self.link_token_ttl_seconds <= 0
            || self.oauth_state_ttl_seconds <= 0
        {
            anyhow::bail!("credential lifetimes must be positive");
        }
        Ok(())
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.session_ttl_seconds)
    }

    pub fn link_token_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.link_token_ttl_seconds)
    }

    pub fn oauth_state_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.oauth_state_ttl_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_parse() {
        assert_eq!("production".parse::<Environment>(), Ok(Environment::Production));
        assert_eq!(" PROD ".parse::<Environment>(), Ok(Environment::Production));
        assert_eq!("dev".parse::<Environment>(), Ok(Environment::Development));
        assert!("staging".parse::<Environment>().is_err());
    }

    #[test]
    fn test_development_config_defaults() {
        let config = AuthConfig::development();
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.session_ttl(), chrono::Duration::days(14));
        assert_eq!(config.link_token_ttl(), chrono::Duration::hours(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_production_requires_kms_and_domain() {
        let mut config = AuthConfig {
            environment: Environment::Production,
            ..AuthConfig::development()
        };
        assert!(config.validate().is_err());

        config.kms = Some(KmsConfig {
            endpoint: "https://kms.example.com".to_string(),
            access_token: None,
            timeout_ms: DEFAULT_KMS_TIMEOUT_MS,
        });
        assert!(config.validate().is_err());

        config.cookie_domain = Some("example.com".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_non_positive_ttl_rejected() {
        let config = AuthConfig {
            link_token_ttl_seconds: 0,
            ..AuthConfig::development()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_kms_config_deserialization() {
        let json = r#"{ "endpoint": "https://kms.example.com" }"#;
        let kms: KmsConfig = serde_json::from_str(json).unwrap();
        assert_eq!(kms.endpoint, "https://kms.example.com");
        assert!(kms.access_token.is_none());
        assert_eq!(kms.timeout_ms, DEFAULT_KMS_TIMEOUT_MS);
    }
}
