use axum::{extract::State, Json};
use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    extract::{ApiJson, AuthUser},
    routes::models::ToggleLikeRequest,
    services::like as like_service,
    ApiError, AppState,
};

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ToggleLikeResponse {
    pub success: bool,
    pub likes_count: i64,
    pub is_liked: bool,
}

#[utoipa::path(
    post,
    path = "/api/likes/toggle",
    tag = "Likes",
    request_body = ToggleLikeRequest,
    responses(
        (status = 200, description = "Like flipped", body = ToggleLikeResponse),
        (status = 404, description = "Post not found", body = crate::error::ErrorResponse)
    ),
    security(("bearerAuth" = []))
)]
pub async fn toggle_like(
    State(state): State<AppState>,
    AuthUser { user, .. }: AuthUser,
    ApiJson(request): ApiJson<ToggleLikeRequest>,
) -> Result<Json<ToggleLikeResponse>, ApiError> {
    let outcome =
        like_service::toggle_like(state.db_pool(), &user, &request.post_id, Utc::now()).await?;
    state.notify(outcome.notification).await;

    Ok(Json(ToggleLikeResponse {
        success: true,
        likes_count: outcome.likes_count,
        is_liked: outcome.is_liked,
    }))
}
