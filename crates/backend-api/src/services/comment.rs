use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::info;
use whisperwall_auth::{timestamp, User};

use super::error::{ServiceError, ServiceResult};
use super::notification::{NotificationKind, PendingNotification};
use super::post::{load_active_post, refresh_trending_score};
use super::{new_public_id, normalize_text};
use crate::routes::models::{AuthorView, CommentRow, CommentView, Page};

pub const MAX_COMMENT_LENGTH: usize = 500;

const COMMENT_SELECT: &str = r#"
    SELECT c.id, c.public_id, p.public_id AS post_public_id, c.author_id,
           u.anonymous_id AS author_anonymous_id, u.display_name AS author_display_name,
           c.text, c.created_at, c.updated_at
    FROM comments c
    JOIN posts p ON p.id = c.post_id
    JOIN users u ON u.id = c.author_id
"#;

#[derive(Debug, Clone)]
pub struct CommentOutcome {
    pub comment: CommentView,
    pub notification: Option<PendingNotification>,
}

fn to_view(row: CommentRow, viewer_id: i64) -> CommentView {
    CommentView {
        id: row.public_id,
        post_id: row.post_public_id,
        author: AuthorView {
            anonymous_id: row.author_anonymous_id,
            display_name: row.author_display_name,
        },
        text: row.text,
        is_mine: row.author_id == viewer_id,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

pub fn validate_comment_text(text: Option<&str>) -> ServiceResult<String> {
    let text = normalize_text(text).ok_or_else(|| ServiceError::bad_request("Comment text is required"))?;

    if text.chars().count() > MAX_COMMENT_LENGTH {
        return Err(ServiceError::bad_request(format!(
            "Comment cannot exceed {MAX_COMMENT_LENGTH} characters"
        )));
    }

    Ok(text)
}

pub async fn add_comment(
    pool: &SqlitePool,
    author: &User,
    post_public_id: &str,
    text: Option<&str>,
    now: DateTime<Utc>,
) -> ServiceResult<CommentOutcome> {
    let text = validate_comment_text(text)?;
    let post = load_active_post(pool, author.id, post_public_id, now).await?;

    if post.comments_locked && post.author_id != author.id {
        return Err(ServiceError::forbidden("Comments are locked on this post"));
    }

    let public_id = new_public_id();
    let created_at = timestamp(now);

    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO comments (public_id, post_id, author_id, text, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&public_id)
    .bind(post.id)
    .bind(author.id)
    .bind(&text)
    .bind(&created_at)
    .bind(&created_at)
    .execute(&mut *tx)
    .await?;

    refresh_trending_score(&mut tx, post.id, now).await?;
    tx.commit().await?;

    info!(comment = %public_id, post = %post.public_id, "comment added");

    let comment = CommentView {
        id: public_id,
        post_id: post.public_id.clone(),
        author: AuthorView {
            anonymous_id: author.anonymous_id.clone(),
            display_name: author.display_name.clone(),
        },
        text,
        is_mine: true,
        created_at: created_at.clone(),
        updated_at: created_at,
    };

    let notification = PendingNotification::new(
        post.author_id,
        NotificationKind::Comment,
        author,
        Some(&post.public_id),
    );

    Ok(CommentOutcome {
        comment,
        notification,
    })
}

/// Comments on a post, oldest first.
pub async fn list_comments(
    pool: &SqlitePool,
    viewer_id: i64,
    post_public_id: &str,
    page: Page,
    now: DateTime<Utc>,
) -> ServiceResult<Vec<CommentView>> {
    let post = load_active_post(pool, viewer_id, post_public_id, now).await?;

    let sql = format!("{COMMENT_SELECT} WHERE c.post_id = ? ORDER BY c.created_at ASC, c.id ASC LIMIT ? OFFSET ?");
    let rows = sqlx::query_as::<_, CommentRow>(&sql)
        .bind(post.id)
        .bind(page.limit)
        .bind(page.offset())
        .fetch_all(pool)
        .await?;

    Ok(rows.into_iter().map(|row| to_view(row, viewer_id)).collect())
}

pub async fn delete_comment(
    pool: &SqlitePool,
    user: &User,
    comment_public_id: &str,
    now: DateTime<Utc>,
) -> ServiceResult<()> {
    let sql = format!("{COMMENT_SELECT} WHERE c.public_id = ?");
    let comment = sqlx::query_as::<_, CommentRow>(&sql)
        .bind(comment_public_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ServiceError::not_found("Comment not found"))?;

    if comment.author_id != user.id {
        return Err(ServiceError::forbidden("You can only delete your own comments"));
    }

    let mut tx = pool.begin().await?;

    let post_id: i64 = sqlx::query_scalar("DELETE FROM comments WHERE id = ? RETURNING post_id")
        .bind(comment.id)
        .fetch_one(&mut *tx)
        .await?;

    refresh_trending_score(&mut tx, post_id, now).await?;
    tx.commit().await?;

    info!(comment = %comment_public_id, "comment deleted");
    Ok(())
}
