use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use whisperwall_auth::{timestamp, AuthSession, User};

use crate::{
    extract::{ApiJson, AuthUser},
    routes::models::UserView,
    ApiError, AppState,
};

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub success: bool,
    pub user: UserView,
    pub token: String,
    pub expires_at: String,
}

impl SessionResponse {
    pub fn new(session: AuthSession, user: &User) -> Self {
        Self {
            success: true,
            user: UserView::from(user),
            token: session.token,
            expires_at: timestamp(session.expires_at),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CurrentUserResponse {
    pub success: bool,
    pub user: UserView,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeviceTokenRequest {
    /// `null` clears the stored token.
    pub device_token: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/auth/register",
    tag = "Auth",
    responses(
        (status = 201, description = "Anonymous identity created", body = SessionResponse),
        (status = 500, description = "Identity generation failed", body = crate::error::ErrorResponse)
    )
)]
pub async fn register(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<SessionResponse>), ApiError> {
    let (user, session) = state.authenticator().register_anonymous().await?;
    tracing::info!(anonymous_id = %user.anonymous_id, "registered anonymous user");

    Ok((StatusCode::CREATED, Json(SessionResponse::new(session, &user))))
}

#[utoipa::path(
    get,
    path = "/api/auth/me",
    tag = "Auth",
    responses(
        (status = 200, description = "Current user", body = CurrentUserResponse),
        (status = 401, description = "Missing or invalid session", body = crate::error::ErrorResponse)
    ),
    security(("bearerAuth" = []))
)]
pub async fn me(AuthUser { user, .. }: AuthUser) -> Json<CurrentUserResponse> {
    Json(CurrentUserResponse {
        success: true,
        user: UserView::from(&user),
    })
}

#[utoipa::path(
    put,
    path = "/api/auth/device-token",
    tag = "Auth",
    request_body = DeviceTokenRequest,
    responses(
        (status = 200, description = "Device token stored", body = CurrentUserResponse),
        (status = 400, description = "Invalid token", body = crate::error::ErrorResponse),
        (status = 401, description = "Missing or invalid session", body = crate::error::ErrorResponse)
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_device_token(
    State(state): State<AppState>,
    AuthUser { user, .. }: AuthUser,
    ApiJson(request): ApiJson<DeviceTokenRequest>,
) -> Result<Json<CurrentUserResponse>, ApiError> {
    let updated = state
        .authenticator()
        .update_device_token(user.id, request.device_token.as_deref())
        .await?;

    Ok(Json(CurrentUserResponse {
        success: true,
        user: UserView::from(&updated),
    }))
}

#[utoipa::path(
    post,
    path = "/api/auth/logout",
    tag = "Auth",
    responses(
        (status = 200, description = "Session revoked", body = MessageResponse),
        (status = 401, description = "Missing or invalid session", body = crate::error::ErrorResponse)
    ),
    security(("bearerAuth" = []))
)]
pub async fn logout(
    State(state): State<AppState>,
    AuthUser { session, .. }: AuthUser,
) -> Result<Json<MessageResponse>, ApiError> {
    state.authenticator().revoke_session(&session.token).await?;

    Ok(Json(MessageResponse::new("Logged out")))
}
