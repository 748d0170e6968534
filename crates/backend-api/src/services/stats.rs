use serde::Serialize;
use sqlx::{FromRow, SqlitePool};

use super::error::ServiceResult;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, FromRow)]
pub struct PlatformStats {
    pub users: i64,
    pub posts: i64,
    pub comments: i64,
    pub likes: i64,
    pub reactions: i64,
    pub echoes: i64,
    pub chat_messages: i64,
    pub unread_notifications: i64,
}

pub async fn platform_stats(pool: &SqlitePool) -> ServiceResult<PlatformStats> {
    let stats = sqlx::query_as::<_, PlatformStats>(
        r#"
        SELECT
            (SELECT COUNT(*) FROM users) AS users,
            (SELECT COUNT(*) FROM posts) AS posts,
            (SELECT COUNT(*) FROM comments) AS comments,
            (SELECT COUNT(*) FROM post_likes) AS likes,
            (SELECT COUNT(*) FROM post_reactions) AS reactions,
            (SELECT COUNT(*) FROM follows) AS echoes,
            (SELECT COUNT(*) FROM chat_messages) AS chat_messages,
            (SELECT COUNT(*) FROM notifications WHERE read = FALSE) AS unread_notifications
        "#,
    )
    .fetch_one(pool)
    .await?;

    Ok(stats)
}
