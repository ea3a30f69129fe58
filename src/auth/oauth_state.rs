//! OAuth `state` round trip.
//!
//! The state parameter is a short-lived signed token carrying the origin the
//! login started from and the provider it was sent to. Nothing is stored
//! server-side; the signature and the issuance window are the whole check.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{Duration, SubsecRound};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::auth::error::AuthError;
use crate::auth::hash::random_hex;
use crate::config::{AuthConfig, OAuthProviderConfig};
use crate::token::TokenCodec;

/// External identity providers we can send users to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OAuthProvider {
    Google,
    Microsoft,
    Github,
}

impl OAuthProvider {
    /// Parse a provider name, ignoring case and surrounding whitespace.
    pub fn normalize(name: &str) -> Result<Self, AuthError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "google" => Ok(Self::Google),
            "microsoft" => Ok(Self::Microsoft),
            "github" => Ok(Self::Github),
            other => Err(AuthError::UnsupportedProvider(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Microsoft => "microsoft",
            Self::Github => "github",
        }
    }

    fn default_authorize_url(&self) -> &'static str {
        match self {
            Self::Google => "https://accounts.google.com/o/oauth2/v2/auth",
            Self::Microsoft => "https://login.microsoftonline.com/common/oauth2/v2.0/authorize",
            Self::Github => "https://github.com/login/oauth/authorize",
        }
    }

    fn scope(&self) -> &'static str {
        match self {
            Self::Google | Self::Microsoft => "openid email profile",
            Self::Github => "read:user user:email",
        }
    }
}

impl fmt::Display for OAuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StateClaims {
    origin: String,
    provider: String,
    nonce: String,
}

/// What a validated state parameter tells the callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthState {
    pub provider: OAuthProvider,
    pub origin: String,
}

#[derive(Clone)]
pub struct OAuthStateCodec {
    codec: TokenCodec,
    ttl: Duration,
    redirect_uri: String,
    providers: BTreeMap<String, OAuthProviderConfig>,
}

impl OAuthStateCodec {
    pub fn new(
        codec: TokenCodec,
        ttl: Duration,
        redirect_uri: impl Into<String>,
        providers: BTreeMap<String, OAuthProviderConfig>,
    ) -> Self {
        Self {
            codec,
            ttl,
            redirect_uri: redirect_uri.into(),
            providers,
        }
    }

    pub fn from_config(codec: TokenCodec, config: &AuthConfig) -> Self {
        Self::new(
            codec,
            config.oauth_state_ttl(),
            config.oauth_redirect_uri.clone(),
            config.oauth_providers.clone(),
        )
    }

    /// Build the provider's authorize URL with a fresh signed state.
    ///
    /// Unknown or unconfigured providers fail before anything is signed.
    pub async fn get_redirect(&self, origin: &str, provider_name: &str) -> Result<Url, AuthError> {
        let provider = OAuthProvider::normalize(provider_name)?;
        let provider_config = self
            .providers
            .get(provider.as_str())
            .ok_or_else(|| AuthError::UnsupportedProvider(provider.as_str().to_string()))?;

        let origin_url = Url::parse(origin)
            .map_err(|e| AuthError::Malformed(format!("origin: {}", e)))?;
        if !matches!(origin_url.scheme(), "http" | "https") {
            return Err(AuthError::Malformed(format!(
                "origin scheme {}",
                origin_url.scheme()
            )));
        }

        let issued_at = self.codec.clock().now().trunc_subsecs(0);
        let claims = StateClaims {
            origin: origin.to_string(),
            provider: provider.as_str().to_string(),
            nonce: random_hex(16),
        };
        let state = self
            .codec
            .build(&claims, issued_at, Some(issued_at + self.ttl))
            .await?;

        let authorize_url = provider_config
            .authorize_url
            .as_deref()
            .unwrap_or(provider.default_authorize_url());
        let mut url = Url::parse(authorize_url)
            .map_err(|e| AuthError::Internal(format!("authorize URL for {}: {}", provider, e)))?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &provider_config.client_id)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("scope", provider.scope())
            .append_pair("state", &state);

        Ok(url)
    }

    /// Check a state parameter returned by a provider.
    pub async fn validate_state(&self, state: &str) -> Result<OAuthState, AuthError> {
        let signed = self.codec.parse::<StateClaims>(state).await?;
        let now = self.codec.clock().now();

        if signed.issued_at > now {
            return Err(AuthError::Malformed("state issued in the future".to_string()));
        }
        if now - signed.issued_at > self.ttl {
            return Err(AuthError::NotFound);
        }

        Ok(OAuthState {
            provider: OAuthProvider::normalize(&signed.claims.provider)?,
            origin: signed.claims.origin,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::crypto::SignerError;
    use crate::test_support::{FakeSigner, ManualClock, fixed_now};
    use crate::types::SigningKeyRef;

    fn codec_with(signer: Arc<FakeSigner>, clock: Arc<ManualClock>) -> OAuthStateCodec {
        let codec = TokenCodec::new(
            signer,
            SigningKeyRef::new("keyRings/auth/cryptoKeys/tokens"),
            clock,
        );
        let mut providers = BTreeMap::new();
        providers.insert(
            "google".to_string(),
            OAuthProviderConfig {
                client_id: "google-client".to_string(),
                authorize_url: None,
            },
        );
        OAuthStateCodec::new(
            codec,
            Duration::minutes(10),
            "https://api.example.com/oauth/callback",
            providers,
        )
    }

    fn state_of(url: &Url) -> String {
        url.query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .unwrap()
    }

    #[tokio::test]
    async fn test_redirect_and_state_round_trip() {
        let clock = Arc::new(ManualClock::new(fixed_now()));
        let codec = codec_with(Arc::new(FakeSigner::new()), clock);

        let url = codec
            .get_redirect("https://app.example.com", "google")
            .await
            .unwrap();
        let state = codec.validate_state(&state_of(&url)).await.unwrap();

        assert_eq!(
            serde_json::to_value(&state).unwrap(),
            serde_json::json!({ "provider": "google", "origin": "https://app.example.com" })
        );
    }

    #[tokio::test]
    async fn test_redirect_url_parameters() {
        let clock = Arc::new(ManualClock::new(fixed_now()));
        let codec = codec_with(Arc::new(FakeSigner::new()), clock);

        let url = codec
            .get_redirect("https://app.example.com", "  Google ")
            .await
            .unwrap();
        assert_eq!(url.host_str(), Some("accounts.google.com"));

        let params: BTreeMap<String, String> = url.query_pairs().into_owned().collect();
        assert_eq!(params["response_type"], "code");
        assert_eq!(params["client_id"], "google-client");
        assert_eq!(params["redirect_uri"], "https://api.example.com/oauth/callback");
        assert_eq!(params["scope"], "openid email profile");
        assert!(params.contains_key("state"));
    }

    #[tokio::test]
    async fn test_unsupported_provider_fails_before_signing() {
        let signer = Arc::new(FakeSigner::new());
        signer.fail_with(SignerError::Unavailable("down".to_string()));
        let codec = codec_with(signer, Arc::new(ManualClock::new(fixed_now())));

        let err = codec
            .get_redirect("https://app.example.com", "myspace")
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::UnsupportedProvider("myspace".to_string()));

        // Known but not configured
        let err = codec
            .get_redirect("https://app.example.com", "github")
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::UnsupportedProvider("github".to_string()));
    }

    #[tokio::test]
    async fn test_state_expires_after_ttl() {
        let clock = Arc::new(ManualClock::new(fixed_now()));
        let codec = codec_with(Arc::new(FakeSigner::new()), clock.clone());

        let url = codec
            .get_redirect("https://app.example.com", "google")
            .await
            .unwrap();

        clock.advance(Duration::minutes(11));
        let err = codec.validate_state(&state_of(&url)).await.unwrap_err();
        assert_eq!(err, AuthError::NotFound);
    }

    #[tokio::test]
    async fn test_state_from_the_future_rejected() {
        let signer = Arc::new(FakeSigner::new());
        let future = Arc::new(ManualClock::new(fixed_now() + Duration::minutes(5)));
        let present = Arc::new(ManualClock::new(fixed_now()));

        let issuer = codec_with(signer.clone(), future);
        let checker = codec_with(signer, present);

        let url = issuer
            .get_redirect("https://app.example.com", "google")
            .await
            .unwrap();
        let err = checker.validate_state(&state_of(&url)).await.unwrap_err();
        assert!(matches!(err, AuthError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_garbage_state_is_malformed() {
        let codec = codec_with(
            Arc::new(FakeSigner::new()),
            Arc::new(ManualClock::new(fixed_now())),
        );
        let err = codec.validate_state("not-a-token").await.unwrap_err();
        assert!(err.is_expected());
    }

    #[tokio::test]
    async fn test_origin_must_be_http_url() {
        let codec = codec_with(
            Arc::new(FakeSigner::new()),
            Arc::new(ManualClock::new(fixed_now())),
        );
        assert!(matches!(
            codec.get_redirect("javascript:alert(1)", "google").await,
            Err(AuthError::Malformed(_))
        ));
        assert!(matches!(
            codec.get_redirect("not a url", "google").await,
            Err(AuthError::Malformed(_))
        ));
    }

    #[test]
    fn test_normalize() {
        assert_eq!(OAuthProvider::normalize("GitHub").unwrap(), OAuthProvider::Github);
        assert_eq!(
            OAuthProvider::normalize(" microsoft\n").unwrap(),
            OAuthProvider::Microsoft
        );
        assert!(OAuthProvider::normalize("").is_err());
    }
}
