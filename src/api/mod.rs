// HTTP surface over the auth core

use axum::{
    Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    response::{IntoResponse, Json, Redirect, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, warn};

use crate::AuthCore;
use crate::auth::cookie::{CookieOptions, build_clear_cookie, session_token_from_headers};
use crate::auth::{AuthError, Authentication};

pub struct ApiState {
    pub core: AuthCore,
    pub cookie: CookieOptions,
}

pub type AppState = Arc<ApiState>;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/whoami", get(whoami))
        .route("/link/whoami", get(link_whoami))
        .route("/logout", post(logout))
        .route("/oauth/{provider}/authorize", get(oauth_authorize))
        .route("/oauth/callback", get(oauth_callback))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

/// Errors surfaced by route handlers.
#[derive(Debug)]
pub enum ApiError {
    Auth(AuthError),
    BadRequest(String),
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        Self::Auth(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Auth(err) => err.into_response(),
            Self::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": msg }))).into_response()
            }
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = if self.is_expected() {
            StatusCode::UNAUTHORIZED
        } else {
            match &self {
                AuthError::Forbidden(_) => StatusCode::FORBIDDEN,
                AuthError::UnsupportedProvider(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            }
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("Authentication failed: {}", self);
        } else {
            debug!("Request rejected ({}): {}", status, self);
        }

        (status, Json(json!({ "error": self.public_message() }))).into_response()
    }
}

fn require_authenticated(auth: Authentication) -> Result<Json<Authentication>, ApiError> {
    if auth.is_authenticated() {
        Ok(Json(auth))
    } else {
        Err(AuthError::NotFound.into())
    }
}

async fn health_check() -> Result<Json<Value>, StatusCode> {
    Ok(Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    })))
}

async fn whoami(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Authentication>, ApiError> {
    let auth = state.core.resolver.authenticate(&headers).await?;
    require_authenticated(auth)
}

async fn link_whoami(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Authentication>, ApiError> {
    let auth = state.core.resolver.authenticate_link(&headers).await?;
    require_authenticated(auth)
}

/// Revoke the presented session, if any, and clear the cookie either way.
async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    if let Some(token) = session_token_from_headers(&headers) {
        match state.core.sessions.load_valid(&token).await {
            Ok(session) => {
                state.core.sessions.revoke(&session).await?;
            }
            Err(e) if e.is_expected() => debug!("Logout without a live session"),
            Err(e) => return Err(e.into()),
        }
    }

    Ok((
        StatusCode::NO_CONTENT,
        [(SET_COOKIE, build_clear_cookie(&state.cookie))],
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
struct AuthorizeParams {
    origin: String,
}

async fn oauth_authorize(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(params): Query<AuthorizeParams>,
) -> Result<Redirect, ApiError> {
    let url = state
        .core
        .oauth
        .get_redirect(&params.origin, &provider)
        .await
        .map_err(|e| match e {
            AuthError::Malformed(msg) => ApiError::BadRequest(msg),
            other => other.into(),
        })?;
    Ok(Redirect::to(url.as_str()))
}

#[derive(Debug, Deserialize)]
struct CallbackParams {
    state: String,
    #[serde(default)]
    code: Option<String>,
}

/// Validate the returned state. Exchanging the code is the identity layer's job.
async fn oauth_callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> Result<Json<Value>, ApiError> {
    let oauth_state = state.core.oauth.validate_state(&params.state).await?;
    if params.code.is_none() {
        warn!("OAuth callback from {} without a code", oauth_state.provider);
    }

    Ok(Json(json!({
        "provider": oauth_state.provider,
        "origin": oauth_state.origin,
        "has_code": params.code.is_some(),
    })))
}
