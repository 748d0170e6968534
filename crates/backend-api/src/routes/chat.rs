use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    extract::{ApiJson, ApiPath, ApiQuery, AuthUser},
    routes::models::{ChatMessageView, ConversationView, Page, PageQuery, SendMessageRequest},
    services::chat as chat_service,
    state::{ChatMessageEvent, ServerEvent},
    ApiError, AppState,
};

#[derive(Debug, Serialize, ToSchema)]
pub struct ConversationsResponse {
    pub success: bool,
    pub conversations: Vec<ConversationView>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ChatMessagesResponse {
    pub success: bool,
    pub messages: Vec<ChatMessageView>,
    pub pagination: Page,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ChatMessageResponse {
    pub success: bool,
    pub message: ChatMessageView,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MarkChatReadResponse {
    pub success: bool,
    pub updated: u64,
}

#[utoipa::path(
    get,
    path = "/api/chat/conversations",
    tag = "Chat",
    responses(
        (status = 200, description = "One entry per peer, most recent first", body = ConversationsResponse),
        (status = 401, description = "Missing or invalid session", body = crate::error::ErrorResponse)
    ),
    security(("bearerAuth" = []))
)]
pub async fn list_conversations(
    State(state): State<AppState>,
    AuthUser { user, .. }: AuthUser,
) -> Result<Json<ConversationsResponse>, ApiError> {
    let conversations = chat_service::conversations(state.db_pool(), user.id).await?;

    Ok(Json(ConversationsResponse {
        success: true,
        conversations,
    }))
}

#[utoipa::path(
    get,
    path = "/api/chat/{peer_id}/messages",
    tag = "Chat",
    params(
        ("peer_id" = String, Path, description = "Peer anonymous ID"),
        PageQuery
    ),
    responses(
        (status = 200, description = "Messages, newest first", body = ChatMessagesResponse),
        (status = 404, description = "Peer not found", body = crate::error::ErrorResponse)
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_messages(
    State(state): State<AppState>,
    AuthUser { user, .. }: AuthUser,
    ApiPath(peer_id): ApiPath<String>,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> Result<Json<ChatMessagesResponse>, ApiError> {
    let page = query.resolve();
    let messages = chat_service::messages(state.db_pool(), user.id, &peer_id, page).await?;

    Ok(Json(ChatMessagesResponse {
        success: true,
        messages,
        pagination: page,
    }))
}

#[utoipa::path(
    post,
    path = "/api/chat/{peer_id}/messages",
    tag = "Chat",
    params(("peer_id" = String, Path, description = "Peer anonymous ID")),
    request_body = SendMessageRequest,
    responses(
        (status = 201, description = "Message sent", body = ChatMessageResponse),
        (status = 400, description = "Invalid message", body = crate::error::ErrorResponse),
        (status = 404, description = "Peer not found", body = crate::error::ErrorResponse)
    ),
    security(("bearerAuth" = []))
)]
pub async fn send_message(
    State(state): State<AppState>,
    AuthUser { user, .. }: AuthUser,
    ApiPath(peer_id): ApiPath<String>,
    ApiJson(request): ApiJson<SendMessageRequest>,
) -> Result<(StatusCode, Json<ChatMessageResponse>), ApiError> {
    let sent = chat_service::send_message(
        state.db_pool(),
        &user,
        &peer_id,
        request.text.as_deref(),
        Utc::now(),
    )
    .await?;

    state
        .publish(
            sent.recipient_id,
            ServerEvent::ChatMessage {
                message: ChatMessageEvent::from(&sent.for_recipient()),
            },
        )
        .await;
    state.notify(sent.notification).await;

    Ok((
        StatusCode::CREATED,
        Json(ChatMessageResponse {
            success: true,
            message: sent.message,
        }),
    ))
}

#[utoipa::path(
    patch,
    path = "/api/chat/{peer_id}/read",
    tag = "Chat",
    params(("peer_id" = String, Path, description = "Peer anonymous ID")),
    responses(
        (status = 200, description = "Messages from the peer marked as read", body = MarkChatReadResponse),
        (status = 404, description = "Peer not found", body = crate::error::ErrorResponse)
    ),
    security(("bearerAuth" = []))
)]
pub async fn mark_read(
    State(state): State<AppState>,
    AuthUser { user, .. }: AuthUser,
    ApiPath(peer_id): ApiPath<String>,
) -> Result<Json<MarkChatReadResponse>, ApiError> {
    let updated = chat_service::mark_read(state.db_pool(), user.id, &peer_id, Utc::now()).await?;

    Ok(Json(MarkChatReadResponse {
        success: true,
        updated,
    }))
}
