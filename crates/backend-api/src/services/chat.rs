use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::info;
use whisperwall_auth::{timestamp, User};

use super::error::{ServiceError, ServiceResult};
use super::notification::{NotificationKind, PendingNotification};
use super::user::find_user;
use super::{new_public_id, normalize_text};
use crate::routes::models::{ChatMessageRow, ChatMessageView, ConversationRow, ConversationView, Page};

pub const MAX_MESSAGE_LENGTH: usize = 2000;

const MESSAGE_SELECT: &str = r#"
    SELECT m.public_id, m.sender_id,
           s.anonymous_id AS sender_anonymous_id,
           r.anonymous_id AS recipient_anonymous_id,
           m.body, m.read_at, m.created_at
    FROM chat_messages m
    JOIN users s ON s.id = m.sender_id
    JOIN users r ON r.id = m.recipient_id
"#;

fn to_view(row: ChatMessageRow, viewer_id: i64) -> ChatMessageView {
    ChatMessageView {
        id: row.public_id,
        sender_id: row.sender_anonymous_id,
        recipient_id: row.recipient_anonymous_id,
        text: row.body,
        is_mine: row.sender_id == viewer_id,
        read_at: row.read_at,
        created_at: row.created_at,
    }
}

#[derive(Debug, Clone)]
pub struct SentMessage {
    /// The message as the sender sees it.
    pub message: ChatMessageView,
    pub recipient_id: i64,
    pub notification: Option<PendingNotification>,
}

impl SentMessage {
    /// The same message from the recipient's side.
    pub fn for_recipient(&self) -> ChatMessageView {
        ChatMessageView {
            is_mine: false,
            ..self.message.clone()
        }
    }
}

/// One entry per peer with the latest message, most recent first.
pub async fn conversations(pool: &SqlitePool, user_id: i64) -> ServiceResult<Vec<ConversationView>> {
    let rows = sqlx::query_as::<_, ConversationRow>(
        r#"
        WITH mine AS (
            SELECT m.id, m.public_id, m.sender_id, m.body, m.created_at,
                   CASE WHEN m.sender_id = ?1 THEN m.recipient_id ELSE m.sender_id END AS peer_id
            FROM chat_messages m
            WHERE m.sender_id = ?1 OR m.recipient_id = ?1
        ),
        ranked AS (
            SELECT mine.*,
                   ROW_NUMBER() OVER (PARTITION BY peer_id ORDER BY created_at DESC, id DESC) AS position
            FROM mine
        )
        SELECT u.anonymous_id AS peer_anonymous_id,
               u.display_name AS peer_display_name,
               ranked.public_id AS last_message_id,
               ranked.body AS last_message_body,
               ranked.sender_id = ?1 AS last_message_from_me,
               ranked.created_at AS last_message_at,
               (SELECT COUNT(*) FROM chat_messages x
                 WHERE x.sender_id = ranked.peer_id AND x.recipient_id = ?1 AND x.read_at IS NULL) AS unread_count
        FROM ranked
        JOIN users u ON u.id = ranked.peer_id
        WHERE ranked.position = 1
        ORDER BY ranked.created_at DESC, ranked.id DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(ConversationView::from).collect())
}

/// Messages exchanged with a peer, newest first.
pub async fn messages(
    pool: &SqlitePool,
    user_id: i64,
    peer_anonymous_id: &str,
    page: Page,
) -> ServiceResult<Vec<ChatMessageView>> {
    let peer = find_user(pool, peer_anonymous_id).await?;

    let sql = format!(
        r#"{MESSAGE_SELECT}
        WHERE (m.sender_id = ?1 AND m.recipient_id = ?2) OR (m.sender_id = ?2 AND m.recipient_id = ?1)
        ORDER BY m.created_at DESC, m.id DESC
        LIMIT ?3 OFFSET ?4"#
    );

    let rows = sqlx::query_as::<_, ChatMessageRow>(&sql)
        .bind(user_id)
        .bind(peer.id)
        .bind(page.limit)
        .bind(page.offset())
        .fetch_all(pool)
        .await?;

    Ok(rows.into_iter().map(|row| to_view(row, user_id)).collect())
}

pub fn validate_message_text(text: Option<&str>) -> ServiceResult<String> {
    let text = normalize_text(text).ok_or_else(|| ServiceError::bad_request("Message text is required"))?;

    if text.chars().count() > MAX_MESSAGE_LENGTH {
        return Err(ServiceError::bad_request(format!(
            "Message cannot exceed {MAX_MESSAGE_LENGTH} characters"
        )));
    }

    Ok(text)
}

pub async fn send_message(
    pool: &SqlitePool,
    sender: &User,
    peer_anonymous_id: &str,
    text: Option<&str>,
    now: DateTime<Utc>,
) -> ServiceResult<SentMessage> {
    let peer = find_user(pool, peer_anonymous_id).await?;
    if peer.id == sender.id {
        return Err(ServiceError::bad_request("You cannot message yourself"));
    }

    let body = validate_message_text(text)?;
    let public_id = new_public_id();
    let created_at = timestamp(now);

    sqlx::query(
        r#"
        INSERT INTO chat_messages (public_id, sender_id, recipient_id, body, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&public_id)
    .bind(sender.id)
    .bind(peer.id)
    .bind(&body)
    .bind(&created_at)
    .execute(pool)
    .await?;

    info!(message = %public_id, from = %sender.anonymous_id, to = %peer.anonymous_id, "chat message sent");

    Ok(SentMessage {
        message: ChatMessageView {
            id: public_id,
            sender_id: sender.anonymous_id.clone(),
            recipient_id: peer.anonymous_id,
            text: body,
            is_mine: true,
            read_at: None,
            created_at,
        },
        recipient_id: peer.id,
        notification: PendingNotification::new(peer.id, NotificationKind::Message, sender, None),
    })
}

/// Mark everything the peer sent to the user as read. Returns the number updated.
pub async fn mark_read(
    pool: &SqlitePool,
    user_id: i64,
    peer_anonymous_id: &str,
    now: DateTime<Utc>,
) -> ServiceResult<u64> {
    let peer = find_user(pool, peer_anonymous_id).await?;

    let result = sqlx::query(
        "UPDATE chat_messages SET read_at = ? WHERE sender_id = ? AND recipient_id = ? AND read_at IS NULL",
    )
    .bind(timestamp(now))
    .bind(peer.id)
    .bind(user_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}
