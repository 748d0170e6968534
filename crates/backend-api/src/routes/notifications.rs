use axum::{extract::State, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    extract::{ApiPath, ApiQuery, AuthUser},
    routes::models::{Notification, Page, PageQuery},
    services::notification as notification_service,
    ApiError, AppState,
};

#[derive(Debug, Serialize, ToSchema)]
pub struct NotificationsResponse {
    pub success: bool,
    pub notifications: Vec<Notification>,
    pub pagination: Page,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UnreadCountResponse {
    pub success: bool,
    pub count: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct NotificationResponse {
    pub success: bool,
    pub notification: Notification,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MarkAllReadResponse {
    pub success: bool,
    pub updated: u64,
}

#[utoipa::path(
    get,
    path = "/api/notifications/unread",
    tag = "Notifications",
    params(PageQuery),
    responses(
        (status = 200, description = "Unread notifications, newest first", body = NotificationsResponse),
        (status = 401, description = "Missing or invalid session", body = crate::error::ErrorResponse)
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_unread(
    State(state): State<AppState>,
    AuthUser { user, .. }: AuthUser,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> Result<Json<NotificationsResponse>, ApiError> {
    let page = query.resolve();
    let notifications = notification_service::list_unread(state.db_pool(), user.id, page).await?;

    Ok(Json(NotificationsResponse {
        success: true,
        notifications,
        pagination: page,
    }))
}

#[utoipa::path(
    get,
    path = "/api/notifications/unread/count",
    tag = "Notifications",
    responses(
        (status = 200, description = "Unread notification count", body = UnreadCountResponse),
        (status = 401, description = "Missing or invalid session", body = crate::error::ErrorResponse)
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_unread_count(
    State(state): State<AppState>,
    AuthUser { user, .. }: AuthUser,
) -> Result<Json<UnreadCountResponse>, ApiError> {
    let count = notification_service::get_unread_count(state.db_pool(), user.id).await?;

    Ok(Json(UnreadCountResponse {
        success: true,
        count,
    }))
}

#[utoipa::path(
    patch,
    path = "/api/notifications/read/{notification_id}",
    tag = "Notifications",
    params(("notification_id" = i64, Path, description = "Notification ID")),
    responses(
        (status = 200, description = "Notification marked as read", body = NotificationResponse),
        (status = 404, description = "Notification not found", body = crate::error::ErrorResponse)
    ),
    security(("bearerAuth" = []))
)]
pub async fn mark_notification_read(
    State(state): State<AppState>,
    AuthUser { user, .. }: AuthUser,
    ApiPath(notification_id): ApiPath<i64>,
) -> Result<Json<NotificationResponse>, ApiError> {
    let notification =
        notification_service::mark_notification_read(state.db_pool(), user.id, notification_id)
            .await?;

    Ok(Json(NotificationResponse {
        success: true,
        notification,
    }))
}

#[utoipa::path(
    patch,
    path = "/api/notifications/read-all",
    tag = "Notifications",
    responses(
        (status = 200, description = "All notifications marked as read", body = MarkAllReadResponse),
        (status = 401, description = "Missing or invalid session", body = crate::error::ErrorResponse)
    ),
    security(("bearerAuth" = []))
)]
pub async fn mark_all_read(
    State(state): State<AppState>,
    AuthUser { user, .. }: AuthUser,
) -> Result<Json<MarkAllReadResponse>, ApiError> {
    let updated = notification_service::mark_all_read(state.db_pool(), user.id).await?;
    tracing::debug!(user_id = user.id, updated, "marked notifications read");

    Ok(Json(MarkAllReadResponse {
        success: true,
        updated,
    }))
}
