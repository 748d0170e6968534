use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::{broadcast, mpsc};
use utoipa::IntoParams;
use whisperwall_auth::User;

use crate::{
    extract::ApiQuery,
    state::{AppState, ClientEvent, ServerEvent},
    ApiError,
};

const PROTOCOL_VERSION: &str = "1.0";

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct WebSocketQuery {
    /// Session token issued at registration.
    token: Option<String>,
}

#[utoipa::path(
    get,
    path = "/ws",
    tag = "Realtime",
    params(WebSocketQuery),
    responses(
        (status = 101, description = "Switching to the websocket protocol"),
        (status = 401, description = "Missing or invalid session", body = crate::error::ErrorResponse),
        (status = 426, description = "Not a websocket upgrade request", body = crate::error::ErrorResponse)
    )
)]
pub async fn websocket_handler(
    ApiQuery(params): ApiQuery<WebSocketQuery>,
    State(state): State<AppState>,
    ws: Option<WebSocketUpgrade>,
) -> Result<Response, ApiError> {
    let token = params
        .token
        .filter(|token| !token.trim().is_empty())
        .ok_or_else(|| ApiError::unauthorized("missing session token"))?;
    let (user, _) = state.authenticate(&token).await?;

    let ws = ws.ok_or_else(|| {
        ApiError::new(StatusCode::UPGRADE_REQUIRED, "websocket upgrade required")
    })?;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, user)))
}

async fn handle_socket(socket: WebSocket, state: AppState, user: User) {
    let (mut ws_sender, mut receiver) = socket.split();
    let mut events = state.subscribe(user.id).await;

    let (out_tx, mut out_rx) = mpsc::channel::<ServerEvent>(32);
    let sender_task = tokio::spawn(async move {
        while let Some(event) = out_rx.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(error) => {
                    tracing::error!("failed to encode websocket event: {error}");
                    continue;
                }
            };
            if let Err(error) = ws_sender.send(Message::Text(json)).await {
                tracing::debug!("websocket send failed: {error}");
                break;
            }
        }
    });

    let forward_tx = out_tx.clone();
    let user_id = user.id;
    let forward_task = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if forward_tx.send(event).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(user_id, skipped, "websocket client lagged behind");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let _ = out_tx
        .send(ServerEvent::Hello {
            version: PROTOCOL_VERSION.to_string(),
            anonymous_id: user.anonymous_id.clone(),
        })
        .await;

    tracing::info!(anonymous_id = %user.anonymous_id, "websocket connected");

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                let reply = match serde_json::from_str::<ClientEvent>(&text) {
                    Ok(ClientEvent::Ping) => ServerEvent::Pong,
                    Err(error) => {
                        tracing::debug!(user_id, "unparseable client event: {error}");
                        ServerEvent::Error {
                            message: "Invalid event format".to_string(),
                        }
                    }
                };
                if out_tx.send(reply).await.is_err() {
                    break;
                }
            }
            Ok(Message::Close(_)) => break,
            Err(error) => {
                tracing::debug!(user_id, "websocket error: {error}");
                break;
            }
            _ => {}
        }
    }

    forward_task.abort();
    drop(out_tx);
    let _ = sender_task.await;

    tracing::info!(anonymous_id = %user.anonymous_id, "websocket disconnected");
}
