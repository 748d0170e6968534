use axum::{extract::State, Json};
use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    extract::{ApiPath, ApiQuery, AuthUser},
    routes::models::{SearchQuery, UserProfile, UserSummary},
    services::user as user_service,
    ApiError, AppState,
};

#[derive(Debug, Serialize, ToSchema)]
pub struct UserProfileResponse {
    pub success: bool,
    pub user: UserProfile,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserSearchResponse {
    pub success: bool,
    pub users: Vec<UserSummary>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EchoResponse {
    pub success: bool,
    pub is_echoing: bool,
}

#[utoipa::path(
    get,
    path = "/api/users/search",
    tag = "Users",
    params(SearchQuery),
    responses(
        (status = 200, description = "Users matching a prefix", body = UserSearchResponse),
        (status = 400, description = "Missing query", body = crate::error::ErrorResponse)
    ),
    security(("bearerAuth" = []))
)]
pub async fn search_users(
    State(state): State<AppState>,
    _caller: AuthUser,
    ApiQuery(query): ApiQuery<SearchQuery>,
) -> Result<Json<UserSearchResponse>, ApiError> {
    let users = user_service::search(state.db_pool(), query.q.as_deref()).await?;

    Ok(Json(UserSearchResponse {
        success: true,
        users,
    }))
}

#[utoipa::path(
    get,
    path = "/api/users/{anonymous_id}",
    tag = "Users",
    params(("anonymous_id" = String, Path, description = "Anonymous ID")),
    responses(
        (status = 200, description = "Public profile", body = UserProfileResponse),
        (status = 404, description = "User not found", body = crate::error::ErrorResponse)
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_profile(
    State(state): State<AppState>,
    AuthUser { user, .. }: AuthUser,
    ApiPath(anonymous_id): ApiPath<String>,
) -> Result<Json<UserProfileResponse>, ApiError> {
    let profile = user_service::profile(state.db_pool(), user.id, &anonymous_id, Utc::now()).await?;

    Ok(Json(UserProfileResponse {
        success: true,
        user: profile,
    }))
}

#[utoipa::path(
    post,
    path = "/api/users/{anonymous_id}/echo",
    tag = "Users",
    params(("anonymous_id" = String, Path, description = "Anonymous ID to echo")),
    responses(
        (status = 200, description = "Now echoing", body = EchoResponse),
        (status = 400, description = "Cannot echo yourself", body = crate::error::ErrorResponse),
        (status = 404, description = "User not found", body = crate::error::ErrorResponse)
    ),
    security(("bearerAuth" = []))
)]
pub async fn echo_user(
    State(state): State<AppState>,
    AuthUser { user, .. }: AuthUser,
    ApiPath(anonymous_id): ApiPath<String>,
) -> Result<Json<EchoResponse>, ApiError> {
    let outcome = user_service::echo(state.db_pool(), &user, &anonymous_id, Utc::now()).await?;
    state.notify(outcome.notification).await;

    Ok(Json(EchoResponse {
        success: true,
        is_echoing: outcome.echoing,
    }))
}

#[utoipa::path(
    delete,
    path = "/api/users/{anonymous_id}/echo",
    tag = "Users",
    params(("anonymous_id" = String, Path, description = "Anonymous ID to stop echoing")),
    responses(
        (status = 200, description = "No longer echoing", body = EchoResponse),
        (status = 404, description = "User not found", body = crate::error::ErrorResponse)
    ),
    security(("bearerAuth" = []))
)]
pub async fn unecho_user(
    State(state): State<AppState>,
    AuthUser { user, .. }: AuthUser,
    ApiPath(anonymous_id): ApiPath<String>,
) -> Result<Json<EchoResponse>, ApiError> {
    let outcome = user_service::unecho(state.db_pool(), &user, &anonymous_id).await?;

    Ok(Json(EchoResponse {
        success: true,
        is_echoing: outcome.echoing,
    }))
}
