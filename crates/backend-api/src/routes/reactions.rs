use std::collections::BTreeMap;

use axum::{extract::State, Json};
use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    extract::{ApiJson, AuthUser},
    routes::models::ToggleReactionRequest,
    services::reaction as reaction_service,
    ApiError, AppState,
};

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ToggleReactionResponse {
    pub success: bool,
    /// Anonymous ids holding each reaction type.
    pub reactions: BTreeMap<String, Vec<String>>,
    pub reaction_type: String,
    pub is_reacted: bool,
}

#[utoipa::path(
    post,
    path = "/api/reactions/toggle",
    tag = "Reactions",
    request_body = ToggleReactionRequest,
    responses(
        (status = 200, description = "Reaction flipped", body = ToggleReactionResponse),
        (status = 400, description = "Invalid reaction type", body = crate::error::ErrorResponse),
        (status = 403, description = "Reactions locked", body = crate::error::ErrorResponse),
        (status = 404, description = "Post not found", body = crate::error::ErrorResponse)
    ),
    security(("bearerAuth" = []))
)]
pub async fn toggle_reaction(
    State(state): State<AppState>,
    AuthUser { user, .. }: AuthUser,
    ApiJson(request): ApiJson<ToggleReactionRequest>,
) -> Result<Json<ToggleReactionResponse>, ApiError> {
    let outcome = reaction_service::toggle_reaction(
        state.db_pool(),
        &user,
        &request.post_id,
        &request.reaction_type,
        Utc::now(),
    )
    .await?;
    state.notify(outcome.notification).await;

    Ok(Json(ToggleReactionResponse {
        success: true,
        reactions: outcome.reactions,
        reaction_type: outcome.reaction_type.as_str().to_string(),
        is_reacted: outcome.is_reacted,
    }))
}
