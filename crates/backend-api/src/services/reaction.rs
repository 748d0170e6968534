use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;
use whisperwall_auth::{timestamp, User};

use super::error::{ServiceError, ServiceResult};
use super::notification::{NotificationKind, PendingNotification};
use super::post::{load_active_post, refresh_trending_score};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReactionType {
    Funny,
    Rage,
    Shock,
    Relatable,
    Love,
    Thinking,
}

impl ReactionType {
    pub const ALL: [ReactionType; 6] = [
        Self::Funny,
        Self::Rage,
        Self::Shock,
        Self::Relatable,
        Self::Love,
        Self::Thinking,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Funny => "funny",
            Self::Rage => "rage",
            Self::Shock => "shock",
            Self::Relatable => "relatable",
            Self::Love => "love",
            Self::Thinking => "thinking",
        }
    }
}

impl FromStr for ReactionType {
    type Err = ServiceError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == value)
            .ok_or_else(|| ServiceError::bad_request("Invalid reaction type"))
    }
}

#[derive(Debug, Clone)]
pub struct ReactionOutcome {
    /// Every reaction type mapped to the anonymous ids holding it.
    pub reactions: BTreeMap<String, Vec<String>>,
    pub reaction_type: ReactionType,
    pub is_reacted: bool,
    pub notification: Option<PendingNotification>,
}

pub async fn toggle_reaction(
    pool: &SqlitePool,
    user: &User,
    post_public_id: &str,
    reaction_type: &str,
    now: DateTime<Utc>,
) -> ServiceResult<ReactionOutcome> {
    let reaction_type = ReactionType::from_str(reaction_type)?;
    let post = load_active_post(pool, user.id, post_public_id, now).await?;

    if post.reactions_locked && post.author_id != user.id {
        return Err(ServiceError::forbidden("Reactions are locked on this post"));
    }

    let mut tx = pool.begin().await?;

    let removed = sqlx::query(
        "DELETE FROM post_reactions WHERE post_id = ? AND user_id = ? AND reaction_type = ?",
    )
    .bind(post.id)
    .bind(user.id)
    .bind(reaction_type.as_str())
    .execute(&mut *tx)
    .await?
    .rows_affected();

    let is_reacted = removed == 0;
    if is_reacted {
        sqlx::query(
            "INSERT INTO post_reactions (post_id, user_id, reaction_type, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(post.id)
        .bind(user.id)
        .bind(reaction_type.as_str())
        .bind(timestamp(now))
        .execute(&mut *tx)
        .await?;
    }

    refresh_trending_score(&mut tx, post.id, now).await?;

    let holders: Vec<(String, String)> = sqlx::query_as(
        r#"
        SELECT r.reaction_type, u.anonymous_id
        FROM post_reactions r
        JOIN users u ON u.id = r.user_id
        WHERE r.post_id = ?
        ORDER BY r.created_at ASC, u.anonymous_id ASC
        "#,
    )
    .bind(post.id)
    .fetch_all(&mut *tx)
    .await?;

    tx.commit().await?;

    let mut reactions: BTreeMap<String, Vec<String>> = ReactionType::ALL
        .iter()
        .map(|kind| (kind.as_str().to_string(), Vec::new()))
        .collect();
    for (kind, anonymous_id) in holders {
        reactions.entry(kind).or_default().push(anonymous_id);
    }

    debug!(post = %post.public_id, reaction = reaction_type.as_str(), is_reacted, "reaction toggled");

    let notification = if is_reacted {
        PendingNotification::new(
            post.author_id,
            NotificationKind::Reaction,
            user,
            Some(&post.public_id),
        )
    } else {
        None
    };

    Ok(ReactionOutcome {
        reactions,
        reaction_type,
        is_reacted,
        notification,
    })
}
