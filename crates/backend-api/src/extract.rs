//! Request extractors shared by the route handlers.
//!
//! Every rejection is rendered through [`ApiError`] so clients always receive
//! the `{success, message}` envelope with a 400 or 401 status.

use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use whisperwall_auth::{AuthSession, User};

use crate::{ApiError, AppState};

/// JSON body extractor that reports malformed or incomplete bodies as 400.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// Query string extractor with the same error envelope as [`ApiJson`].
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct ApiPath<T>(pub T);

/// The caller behind the `Authorization: Bearer` header.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user: User,
    pub session: AuthSession,
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)?;
        let (user, session) = state.authenticate(token).await?;
        Ok(Self { user, session })
    }
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    let value = headers
        .get(AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .ok_or_else(|| ApiError::unauthorized("missing authorization header"))?;

    match value.split_once(char::is_whitespace) {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("Bearer") && !token.trim().is_empty() => {
            Ok(token.trim())
        }
        Some((scheme, _)) if scheme.eq_ignore_ascii_case("Bearer") => {
            Err(ApiError::unauthorized("missing bearer token"))
        }
        None if value.eq_ignore_ascii_case("Bearer") => {
            Err(ApiError::unauthorized("missing bearer token"))
        }
        _ => Err(ApiError::unauthorized("invalid authorization scheme")),
    }
}
