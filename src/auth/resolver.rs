//! Resolve a request's headers to a single [`Authentication`].
//!
//! Schemes are tried in a fixed order: session cookie, then API key. A
//! credential that is absent, expired, revoked or malformed simply moves on
//! to the next scheme. Anything else (a blocked subject, a broken signer,
//! an unreachable store) stops resolution and is returned to the caller,
//! who must not mistake it for "not logged in".

use http::HeaderMap;
use tracing::{debug, warn};

use crate::auth::api_key::ApiKeyManager;
use crate::auth::context::Authentication;
use crate::auth::cookie::session_token_from_headers;
use crate::auth::error::AuthError;
use crate::auth::link_token::{LINK_TOKEN_HEADER, LinkTokenManager, decode_header};
use crate::auth::session::SessionManager;
use crate::auth::user_store::UserStore;

/// Header carrying an organization API key.
pub const API_KEY_HEADER: &str = "X-API-KEY";

#[derive(Clone)]
pub struct AuthResolver {
    sessions: SessionManager,
    api_keys: ApiKeyManager,
    link_tokens: LinkTokenManager,
    users: UserStore,
}

impl AuthResolver {
    pub fn new(
        sessions: SessionManager,
        api_keys: ApiKeyManager,
        link_tokens: LinkTokenManager,
        users: UserStore,
    ) -> Self {
        Self {
            sessions,
            api_keys,
            link_tokens,
            users,
        }
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Session cookie, then `X-API-KEY`, then unauthenticated.
    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<Authentication, AuthError> {
        if let Some(token) = session_token_from_headers(headers) {
            match self.authenticate_session(&token).await {
                Ok(auth) => return Ok(auth),
                Err(e) if e.is_expected() => debug!("Session cookie not accepted: {}", e),
                Err(e) => return Err(e),
            }
        }

        if let Some(value) = headers.get(API_KEY_HEADER) {
            match value.to_str() {
                Ok(raw_key) => match self.api_keys.validate(raw_key.trim()).await {
                    Ok(organization) => {
                        return Ok(Authentication::for_api_key(organization.organization_ref));
                    }
                    Err(e) if e.is_expected() => debug!("API key not accepted: {}", e),
                    Err(e) => return Err(e),
                },
                Err(_) => debug!("API key header is not visible ASCII"),
            }
        }

        Ok(Authentication::unauthenticated())
    }

    /// `X-LINK-TOKEN` first, then everything [`Self::authenticate`] accepts.
    pub async fn authenticate_link(
        &self,
        headers: &HeaderMap,
    ) -> Result<Authentication, AuthError> {
        if let Some(value) = headers.get(LINK_TOKEN_HEADER) {
            match self.authenticate_link_header(value.to_str().ok()).await {
                Ok(auth) => return Ok(auth),
                Err(e) if e.is_expected() => debug!("Link token not accepted: {}", e),
                Err(e) => return Err(e),
            }
        }

        self.authenticate(headers).await
    }

    async fn authenticate_session(&self, raw_token: &str) -> Result<Authentication, AuthError> {
        let session = self.sessions.load_valid(raw_token).await?;

        let user = self
            .users
            .get_user(&session.user_ref)
            .await?
            .ok_or(AuthError::NotFound)?;
        if !user.is_active {
            warn!("Session presented for deactivated user {}", user.user_ref);
            return Err(AuthError::Forbidden("user is deactivated".to_string()));
        }

        let organization = self
            .users
            .get_organization(&user.organization_ref)
            .await?
            .ok_or(AuthError::NotFound)?;
        if !organization.is_active {
            warn!(
                "Session presented for user {} of blocked organization {}",
                user.user_ref, organization.organization_ref
            );
            return Err(AuthError::Forbidden("organization is blocked".to_string()));
        }

        let session = self.sessions.refresh(&session).await?;

        Ok(Authentication::for_session(
            session.session_ref(),
            user.user_ref,
            organization.organization_ref,
        ))
    }

    async fn authenticate_link_header(
        &self,
        value: Option<&str>,
    ) -> Result<Authentication, AuthError> {
        let value =
            value.ok_or_else(|| AuthError::Malformed("link token header is not ASCII".to_string()))?;
        let token = decode_header(value)?;
        let grant = self.link_tokens.validate(&token).await?;

        Ok(Authentication::for_link(
            grant.link_token_ref,
            grant.organization_ref,
            grant.end_customer_ref,
            grant.scopes,
        ))
    }
}
