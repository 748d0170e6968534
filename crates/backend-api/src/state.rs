use std::{collections::HashMap, sync::Arc};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tokio::sync::{broadcast, Mutex};
use whisperwall_auth::{AuthSession, Authenticator, User};
use whisperwall_config::AppConfig;

use crate::routes::models::{ChatMessageView, Notification};
use crate::services::notification::{create_notification, PendingNotification};
use crate::ApiError;

const USER_CHANNEL_CAPACITY: usize = 64;

/// Events pushed to connected websocket clients.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Hello {
        version: String,
        anonymous_id: String,
    },
    Notification {
        notification: NotificationEvent,
    },
    ChatMessage {
        message: ChatMessageEvent,
    },
    Pong,
    Error {
        message: String,
    },
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEvent {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub source_user: String,
    pub post_id: Option<String>,
    pub created_at: String,
}

impl From<&Notification> for NotificationEvent {
    fn from(notification: &Notification) -> Self {
        Self {
            id: notification.id,
            kind: notification.kind.clone(),
            source_user: notification.source_user.clone(),
            post_id: notification.post_id.clone(),
            created_at: notification.created_at.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessageEvent {
    pub id: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub text: String,
    pub created_at: String,
}

impl From<&ChatMessageView> for ChatMessageEvent {
    fn from(message: &ChatMessageView) -> Self {
        Self {
            id: message.id.clone(),
            sender_id: message.sender_id.clone(),
            recipient_id: message.recipient_id.clone(),
            text: message.text.clone(),
            created_at: message.created_at.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    Ping,
}

#[derive(Clone)]
pub struct AppState {
    db_pool: SqlitePool,
    authenticator: Authenticator,
    config: Arc<AppConfig>,
    user_channels: Arc<Mutex<HashMap<i64, broadcast::Sender<ServerEvent>>>>,
}

impl AppState {
    pub fn new(db_pool: SqlitePool, authenticator: Authenticator, config: AppConfig) -> Self {
        Self {
            db_pool,
            authenticator,
            config: Arc::new(config),
            user_channels: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn db_pool(&self) -> &SqlitePool {
        &self.db_pool
    }

    pub fn authenticator(&self) -> &Authenticator {
        &self.authenticator
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub async fn authenticate(&self, token: &str) -> Result<(User, AuthSession), ApiError> {
        self.authenticator
            .authenticate_token(token)
            .await
            .map_err(ApiError::from)
    }

    /// Subscribe to the live event stream of a user. Multiple sockets per user share a channel.
    pub async fn subscribe(&self, user_id: i64) -> broadcast::Receiver<ServerEvent> {
        let mut channels = self.user_channels.lock().await;
        channels
            .entry(user_id)
            .or_insert_with(|| broadcast::channel(USER_CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Push an event to every socket of a user. Returns how many sockets received it.
    pub async fn publish(&self, user_id: i64, event: ServerEvent) -> usize {
        let mut channels = self.user_channels.lock().await;
        let Some(sender) = channels.get(&user_id) else {
            return 0;
        };

        match sender.send(event) {
            Ok(receivers) => receivers,
            Err(_) => {
                channels.remove(&user_id);
                0
            }
        }
    }

    /// Persist a notification and push it live. Failures are logged, never surfaced.
    pub async fn notify(&self, pending: Option<PendingNotification>) {
        let Some(pending) = pending else {
            return;
        };

        match create_notification(&self.db_pool, &pending, Utc::now()).await {
            Ok(notification) => {
                self.publish(
                    pending.recipient_id,
                    ServerEvent::Notification {
                        notification: NotificationEvent::from(&notification),
                    },
                )
                .await;
            }
            Err(error) => {
                tracing::warn!(
                    recipient = pending.recipient_id,
                    kind = pending.kind.as_str(),
                    "failed to record notification: {error}"
                );
            }
        }
    }
}
