use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;
use whisperwall_auth::{timestamp, User};

use super::error::ServiceResult;
use super::notification::{NotificationKind, PendingNotification};
use super::post::{load_active_post, refresh_trending_score};

#[derive(Debug, Clone)]
pub struct LikeOutcome {
    pub likes_count: i64,
    pub is_liked: bool,
    pub notification: Option<PendingNotification>,
}

/// Flip the caller's like on a post.
pub async fn toggle_like(
    pool: &SqlitePool,
    user: &User,
    post_public_id: &str,
    now: DateTime<Utc>,
) -> ServiceResult<LikeOutcome> {
    let post = load_active_post(pool, user.id, post_public_id, now).await?;

    let mut tx = pool.begin().await?;

    let removed = sqlx::query("DELETE FROM post_likes WHERE post_id = ? AND user_id = ?")
        .bind(post.id)
        .bind(user.id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    let is_liked = removed == 0;
    if is_liked {
        sqlx::query("INSERT INTO post_likes (post_id, user_id, created_at) VALUES (?, ?, ?)")
            .bind(post.id)
            .bind(user.id)
            .bind(timestamp(now))
            .execute(&mut *tx)
            .await?;
    }

    refresh_trending_score(&mut tx, post.id, now).await?;

    let likes_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM post_likes WHERE post_id = ?")
        .bind(post.id)
        .fetch_one(&mut *tx)
        .await?;

    tx.commit().await?;

    debug!(post = %post.public_id, user = %user.anonymous_id, is_liked, likes_count, "like toggled");

    let notification = if is_liked {
        PendingNotification::new(
            post.author_id,
            NotificationKind::Like,
            user,
            Some(&post.public_id),
        )
    } else {
        None
    };

    Ok(LikeOutcome {
        likes_count,
        is_liked,
        notification,
    })
}
