use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use whisperwall_auth::{timestamp, User};

use super::error::{ServiceError, ServiceResult};
use crate::routes::models::{Notification, Page};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Follow,
    Like,
    Comment,
    Reaction,
    Message,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Follow => "follow",
            Self::Like => "like",
            Self::Comment => "comment",
            Self::Reaction => "reaction",
            Self::Message => "message",
        }
    }
}

/// A notification a service wants delivered once its own work has committed.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingNotification {
    pub recipient_id: i64,
    pub kind: NotificationKind,
    pub source_user: String,
    pub post_id: Option<String>,
}

impl PendingNotification {
    /// `None` when the actor would be notifying themselves.
    pub fn new(
        recipient_id: i64,
        kind: NotificationKind,
        actor: &User,
        post_id: Option<&str>,
    ) -> Option<Self> {
        if recipient_id == actor.id {
            return None;
        }

        Some(Self {
            recipient_id,
            kind,
            source_user: actor.anonymous_id.clone(),
            post_id: post_id.map(str::to_owned),
        })
    }
}

pub async fn create_notification(
    pool: &SqlitePool,
    pending: &PendingNotification,
    now: DateTime<Utc>,
) -> ServiceResult<Notification> {
    let notification = sqlx::query_as::<_, Notification>(
        r#"
        INSERT INTO notifications (user_id, type, source_user, post_id, read, created_at)
        VALUES (?, ?, ?, ?, FALSE, ?)
        RETURNING id, type, source_user, post_id, read, created_at
        "#,
    )
    .bind(pending.recipient_id)
    .bind(pending.kind.as_str())
    .bind(&pending.source_user)
    .bind(&pending.post_id)
    .bind(timestamp(now))
    .fetch_one(pool)
    .await?;

    Ok(notification)
}

pub async fn list_unread(
    pool: &SqlitePool,
    user_id: i64,
    page: Page,
) -> ServiceResult<Vec<Notification>> {
    let notifications = sqlx::query_as::<_, Notification>(
        r#"
        SELECT id, type, source_user, post_id, read, created_at
        FROM notifications
        WHERE user_id = ? AND read = FALSE
        ORDER BY created_at DESC, id DESC
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(user_id)
    .bind(page.limit)
    .bind(page.offset())
    .fetch_all(pool)
    .await?;

    Ok(notifications)
}

pub async fn get_unread_count(pool: &SqlitePool, user_id: i64) -> ServiceResult<i64> {
    let count =
        sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE user_id = ? AND read = FALSE")
            .bind(user_id)
            .fetch_one(pool)
            .await?;

    Ok(count)
}

pub async fn mark_notification_read(
    pool: &SqlitePool,
    user_id: i64,
    notification_id: i64,
) -> ServiceResult<Notification> {
    sqlx::query_as::<_, Notification>(
        r#"
        UPDATE notifications
        SET read = TRUE
        WHERE id = ? AND user_id = ?
        RETURNING id, type, source_user, post_id, read, created_at
        "#,
    )
    .bind(notification_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| ServiceError::not_found("Notification not found"))
}

pub async fn mark_all_read(pool: &SqlitePool, user_id: i64) -> ServiceResult<u64> {
    let result =
        sqlx::query("UPDATE notifications SET read = TRUE WHERE user_id = ? AND read = FALSE")
            .bind(user_id)
            .execute(pool)
            .await?;

    Ok(result.rows_affected())
}
