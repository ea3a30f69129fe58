//! Credential schemes and their resolution.
//!
//! Three independent schemes can authenticate a request:
//!
//! - **Session**: opaque random token in the `X-Session-Token` cookie,
//!   stored as a SHA-256 hash with a sliding 14-day expiration
//! - **API key**: `X-API-KEY` header, authenticates an organization, no expiry
//! - **Link token**: `X-LINK-TOKEN` header, a signed token plus a revocable
//!   shadow record, scoped to one end customer of an organization
//!
//! [`AuthResolver`] tries them in a fixed order and produces one
//! [`Authentication`]. The OAuth `state` round trip lives here too since it
//! shares the token codec.
//!
//! ## Security Model
//!
//! - Raw secrets are never stored; lookups go through their hash
//! - Signing keys never enter the process; every MAC is a remote call
//! - Absent or invalid credentials mean "unauthenticated", never an error
//! - Blocked subjects and infrastructure failures are errors, never "unauthenticated"

pub mod api_key;
mod audit;
mod context;
pub mod cookie;
mod error;
mod hash;
pub mod link_token;
pub mod oauth_state;
mod resolver;
mod session;
mod user_store;

pub use api_key::{ApiKeyManager, generate_api_key};
pub use audit::AuditLog;
pub use context::{AuthMethod, Authentication};
pub use cookie::{CookieOptions, SESSION_COOKIE_NAME};
pub use error::AuthError;
pub use hash::hash_secret;
pub use link_token::{LINK_TOKEN_HEADER, LinkGrant, LinkTokenManager};
pub use oauth_state::{OAuthProvider, OAuthState, OAuthStateCodec};
pub use resolver::{API_KEY_HEADER, AuthResolver};
pub use session::SessionManager;
pub use user_store::UserStore;
