use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use tracing::debug;
use whisperwall_auth::{timestamp, validate_anonymous_id, User};

use super::error::{ServiceError, ServiceResult};
use super::notification::{NotificationKind, PendingNotification};
use crate::routes::models::{UserProfile, UserSummary};

pub const MAX_SEARCH_RESULTS: i64 = 20;
pub const MAX_SEARCH_QUERY_LENGTH: usize = 64;

#[derive(Debug, Clone, FromRow)]
pub struct UserRecord {
    pub id: i64,
    pub anonymous_id: String,
    pub display_name: String,
    pub created_at: String,
}

pub async fn find_user(pool: &SqlitePool, anonymous_id: &str) -> ServiceResult<UserRecord> {
    if validate_anonymous_id(anonymous_id).is_err() {
        return Err(ServiceError::not_found("User not found"));
    }

    sqlx::query_as::<_, UserRecord>(
        "SELECT id, anonymous_id, display_name, created_at FROM users WHERE anonymous_id = ?",
    )
    .bind(anonymous_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| ServiceError::not_found("User not found"))
}

pub async fn profile(
    pool: &SqlitePool,
    viewer_id: i64,
    anonymous_id: &str,
    now: DateTime<Utc>,
) -> ServiceResult<UserProfile> {
    let user = find_user(pool, anonymous_id).await?;

    let (posts_count, echoes_count, echoing_count, is_echoing): (i64, i64, i64, bool) =
        sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM posts WHERE author_id = ?1 AND (vanish_at IS NULL OR vanish_at > ?3)),
                (SELECT COUNT(*) FROM follows WHERE followee_id = ?1),
                (SELECT COUNT(*) FROM follows WHERE follower_id = ?1),
                EXISTS (SELECT 1 FROM follows WHERE follower_id = ?2 AND followee_id = ?1)
            "#,
        )
        .bind(user.id)
        .bind(viewer_id)
        .bind(timestamp(now))
        .fetch_one(pool)
        .await?;

    Ok(UserProfile {
        anonymous_id: user.anonymous_id,
        display_name: user.display_name,
        created_at: user.created_at,
        posts_count,
        echoes_count,
        echoing_count,
        is_echoing,
        is_self: user.id == viewer_id,
    })
}

fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for ch in term.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Prefix match on display name or anonymous id.
pub async fn search(pool: &SqlitePool, query: Option<&str>) -> ServiceResult<Vec<UserSummary>> {
    let term = query.map(str::trim).unwrap_or_default();
    if term.is_empty() {
        return Err(ServiceError::bad_request("Search query is required"));
    }
    if term.chars().count() > MAX_SEARCH_QUERY_LENGTH {
        return Err(ServiceError::bad_request("Search query is too long"));
    }

    let pattern = format!("{}%", escape_like(term));

    let users = sqlx::query_as::<_, UserSummary>(
        r#"
        SELECT anonymous_id, display_name
        FROM users
        WHERE display_name LIKE ?1 ESCAPE '\' OR anonymous_id LIKE ?1 ESCAPE '\'
        ORDER BY display_name ASC, anonymous_id ASC
        LIMIT ?2
        "#,
    )
    .bind(pattern)
    .bind(MAX_SEARCH_RESULTS)
    .fetch_all(pool)
    .await?;

    debug!(term, results = users.len(), "user search");
    Ok(users)
}

#[derive(Debug, Clone)]
pub struct EchoOutcome {
    pub echoing: bool,
    pub notification: Option<PendingNotification>,
}

/// Follow a user. Repeating an existing echo is a no-op.
pub async fn echo(
    pool: &SqlitePool,
    follower: &User,
    anonymous_id: &str,
    now: DateTime<Utc>,
) -> ServiceResult<EchoOutcome> {
    let target = find_user(pool, anonymous_id).await?;
    if target.id == follower.id {
        return Err(ServiceError::bad_request("You cannot echo yourself"));
    }

    let inserted = sqlx::query(
        "INSERT OR IGNORE INTO follows (follower_id, followee_id, created_at) VALUES (?, ?, ?)",
    )
    .bind(follower.id)
    .bind(target.id)
    .bind(timestamp(now))
    .execute(pool)
    .await?
    .rows_affected();

    let notification = if inserted > 0 {
        PendingNotification::new(target.id, NotificationKind::Follow, follower, None)
    } else {
        None
    };

    Ok(EchoOutcome {
        echoing: true,
        notification,
    })
}

pub async fn unecho(pool: &SqlitePool, follower: &User, anonymous_id: &str) -> ServiceResult<EchoOutcome> {
    let target = find_user(pool, anonymous_id).await?;
    if target.id == follower.id {
        return Err(ServiceError::bad_request("You cannot echo yourself"));
    }

    sqlx::query("DELETE FROM follows WHERE follower_id = ? AND followee_id = ?")
        .bind(follower.id)
        .bind(target.id)
        .execute(pool)
        .await?;

    Ok(EchoOutcome {
        echoing: false,
        notification: None,
    })
}
