// Core modules
pub mod api;
pub mod auth;
pub mod clock;
pub mod config;
pub mod crypto;
pub mod db;
pub mod token;
pub mod types;

#[cfg(test)]
mod test_support;

// Re-export key types and functions
pub use auth::{
    ApiKeyManager, AuthError, AuthResolver, Authentication, LinkTokenManager, OAuthStateCodec,
    SessionManager, UserStore,
};
pub use clock::{Clock, SystemClock};
pub use config::{AuthConfig, Environment};
pub use db::{DatabaseConfig, Db, create_connection, ensure_schema};
pub use token::TokenCodec;

use std::sync::Arc;

use crypto::{Cipher, MacSigner};

/// Every credential component, wired to one store, signer, cipher and clock.
#[derive(Clone)]
pub struct AuthCore {
    pub users: UserStore,
    pub sessions: SessionManager,
    pub api_keys: ApiKeyManager,
    pub link_tokens: LinkTokenManager,
    pub oauth: OAuthStateCodec,
    pub resolver: AuthResolver,
}

impl AuthCore {
    pub fn new(
        db: Db,
        signer: Arc<dyn MacSigner>,
        cipher: Arc<dyn Cipher>,
        clock: Arc<dyn Clock>,
        config: &AuthConfig,
    ) -> Self {
        let codec = TokenCodec::new(signer, config.token_key.clone(), clock.clone());

        let users = UserStore::new(db.clone());
        let sessions = SessionManager::new(db.clone(), clock.clone(), config.session_ttl());
        let api_keys =
            ApiKeyManager::new(db.clone(), cipher, config.encryption_key.clone(), clock);
        let link_tokens = LinkTokenManager::new(db, codec.clone(), config.link_token_ttl());
        let oauth = OAuthStateCodec::from_config(codec, config);
        let resolver = AuthResolver::new(
            sessions.clone(),
            api_keys.clone(),
            link_tokens.clone(),
            users.clone(),
        );

        Self {
            users,
            sessions,
            api_keys,
            link_tokens,
            oauth,
            resolver,
        }
    }
}
