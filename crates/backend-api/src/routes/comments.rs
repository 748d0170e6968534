use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    extract::{ApiJson, ApiPath, ApiQuery, AuthUser},
    routes::auth::MessageResponse,
    routes::models::{CommentView, CreateCommentRequest, Page, PageQuery},
    services::comment as comment_service,
    ApiError, AppState,
};

#[derive(Debug, Serialize, ToSchema)]
pub struct CommentResponse {
    pub success: bool,
    pub comment: CommentView,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CommentsResponse {
    pub success: bool,
    pub comments: Vec<CommentView>,
    pub pagination: Page,
}

#[utoipa::path(
    post,
    path = "/api/comments",
    tag = "Comments",
    request_body = CreateCommentRequest,
    responses(
        (status = 201, description = "Comment added", body = CommentResponse),
        (status = 400, description = "Invalid comment", body = crate::error::ErrorResponse),
        (status = 403, description = "Comments locked", body = crate::error::ErrorResponse),
        (status = 404, description = "Post not found", body = crate::error::ErrorResponse)
    ),
    security(("bearerAuth" = []))
)]
pub async fn add_comment(
    State(state): State<AppState>,
    AuthUser { user, .. }: AuthUser,
    ApiJson(request): ApiJson<CreateCommentRequest>,
) -> Result<(StatusCode, Json<CommentResponse>), ApiError> {
    let outcome = comment_service::add_comment(
        state.db_pool(),
        &user,
        &request.post_id,
        request.text.as_deref(),
        Utc::now(),
    )
    .await?;

    state.notify(outcome.notification).await;

    Ok((
        StatusCode::CREATED,
        Json(CommentResponse {
            success: true,
            comment: outcome.comment,
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/api/posts/{post_id}/comments",
    tag = "Comments",
    params(
        ("post_id" = String, Path, description = "Post public ID"),
        PageQuery
    ),
    responses(
        (status = 200, description = "Comments, oldest first", body = CommentsResponse),
        (status = 404, description = "Post not found", body = crate::error::ErrorResponse)
    ),
    security(("bearerAuth" = []))
)]
pub async fn list_comments(
    State(state): State<AppState>,
    AuthUser { user, .. }: AuthUser,
    ApiPath(post_id): ApiPath<String>,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> Result<Json<CommentsResponse>, ApiError> {
    let page = query.resolve();
    let comments =
        comment_service::list_comments(state.db_pool(), user.id, &post_id, page, Utc::now()).await?;

    Ok(Json(CommentsResponse {
        success: true,
        comments,
        pagination: page,
    }))
}

#[utoipa::path(
    delete,
    path = "/api/comments/{comment_id}",
    tag = "Comments",
    params(("comment_id" = String, Path, description = "Comment public ID")),
    responses(
        (status = 200, description = "Comment deleted", body = MessageResponse),
        (status = 403, description = "Not the comment owner", body = crate::error::ErrorResponse),
        (status = 404, description = "Comment not found", body = crate::error::ErrorResponse)
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_comment(
    State(state): State<AppState>,
    AuthUser { user, .. }: AuthUser,
    ApiPath(comment_id): ApiPath<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    comment_service::delete_comment(state.db_pool(), &user, &comment_id, Utc::now()).await?;

    Ok(Json(MessageResponse::new("Comment deleted")))
}
