//! Bidirectional chat channel. Clients authenticate with their session
//! token, join one room at a time, and exchange the same event verbs the
//! REST surface publishes.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use serde::Deserialize;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::db::queries;
use crate::errors::AppError;
use crate::handlers::auth;
use crate::models::{ChatEvent, ClientEvent, User};
use crate::services::{authz, chat, rate_limit};
use crate::state::AppState;

// GET /chat/ws?token=...
#[derive(Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

pub async fn upgrade(
    State(state): State<Arc<AppState>>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, AppError> {
    let user = auth::authenticate_token(&state, query.token.as_deref().unwrap_or(""))?;
    Ok(ws.on_upgrade(move |socket| run_socket(socket, state, user)))
}

/// The room a connection is currently subscribed to. Joining another
/// room replaces it; a `chatDeleted` delivery clears it.
struct RoomSubscription {
    room_id: String,
    stream: BroadcastStream<ChatEvent>,
}

fn is_joined(subscription: &Option<RoomSubscription>, room_id: &str) -> bool {
    subscription
        .as_ref()
        .map(|s| s.room_id == room_id)
        .unwrap_or(false)
}

async fn run_socket(mut socket: WebSocket, state: Arc<AppState>, user: User) {
    tracing::info!("chat socket opened for {}", user.username);
    let mut subscription: Option<RoomSubscription> = None;

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if handle_frame(&mut socket, &state, &user, &mut subscription, &text)
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!("chat socket error for {}: {e}", user.username);
                        break;
                    }
                }
            }
            event = next_event(&mut subscription) => {
                match event {
                    Ok(event) => {
                        if !event.should_deliver_to(&user.id) {
                            continue;
                        }
                        let room_gone = matches!(event, ChatEvent::ChatDeleted { .. });
                        if send_event(&mut socket, &event).await.is_err() {
                            break;
                        }
                        if room_gone {
                            subscription = None;
                        }
                    }
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        tracing::warn!(
                            "chat socket for {} lagged, dropped {skipped} events",
                            user.username
                        );
                    }
                }
            }
        }
    }

    tracing::info!("chat socket closed for {}", user.username);
}

/// Next event from the current subscription, or never if there is none.
/// A stream that ends without a `chatDeleted` (sender dropped) parks the
/// connection until the client joins again.
async fn next_event(
    subscription: &mut Option<RoomSubscription>,
) -> Result<ChatEvent, BroadcastStreamRecvError> {
    match subscription {
        Some(sub) => match sub.stream.next().await {
            Some(item) => item,
            None => {
                *subscription = None;
                std::future::pending().await
            }
        },
        None => std::future::pending().await,
    }
}

async fn handle_frame(
    socket: &mut WebSocket,
    state: &Arc<AppState>,
    user: &User,
    subscription: &mut Option<RoomSubscription>,
    text: &str,
) -> Result<(), ()> {
    let event = match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => event,
        Err(e) => return send_error(socket, &format!("Malformed frame: {e}")).await,
    };

    match event {
        ClientEvent::JoinRoom { chat_room_id } => {
            let room = {
                let db = state.db.lock().unwrap();
                queries::get_chat_room(&db, &chat_room_id)
            };
            match room {
                Ok(Some(room)) if authz::can_access_room(user, &room) => {
                    let receiver = state.room_channel(&room.id).subscribe();
                    *subscription = Some(RoomSubscription {
                        room_id: room.id.clone(),
                        stream: BroadcastStream::new(receiver),
                    });
                    tracing::debug!("{} joined chat room {}", user.username, room.id);
                    Ok(())
                }
                Ok(_) => send_error(socket, "Unauthorized").await,
                Err(e) => {
                    tracing::error!("chat room lookup failed: {e}");
                    send_error(socket, "Server error").await
                }
            }
        }

        ClientEvent::Typing { chat_room_id } => {
            if !is_joined(subscription, &chat_room_id) {
                return send_error(socket, "Join the room first").await;
            }
            state.publish(
                &chat_room_id,
                ChatEvent::Typing {
                    chat_room_id: chat_room_id.clone(),
                    user_id: user.id.clone(),
                },
            );
            Ok(())
        }

        ClientEvent::StopTyping { chat_room_id } => {
            if !is_joined(subscription, &chat_room_id) {
                return send_error(socket, "Join the room first").await;
            }
            state.publish(
                &chat_room_id,
                ChatEvent::StopTyping {
                    chat_room_id: chat_room_id.clone(),
                    user_id: user.id.clone(),
                },
            );
            Ok(())
        }

        ClientEvent::SendMessage {
            chat_room_id,
            content,
        } => {
            let result = {
                let db = state.db.lock().unwrap();
                rate_limit::check(&db, &user.id, state.config.rate_limit_per_hour)
                    .and_then(|_| chat::send_message(&db, user, &chat_room_id, &content))
            };
            match result {
                Ok(view) => {
                    state.publish(
                        &chat_room_id,
                        ChatEvent::NewMessage {
                            message: view.clone(),
                        },
                    );
                    send_ack(
                        socket,
                        serde_json::json!({ "status": "ok", "message": view }),
                    )
                    .await
                }
                Err(e) => {
                    send_ack(
                        socket,
                        serde_json::json!({ "status": "error", "msg": client_text(&e) }),
                    )
                    .await
                }
            }
        }

        ClientEvent::MarkSeen { chat_room_id } => {
            let result = {
                let db = state.db.lock().unwrap();
                chat::mark_seen(&db, user, &chat_room_id)
            };
            match result {
                Ok(_) => {
                    state.publish(
                        &chat_room_id,
                        ChatEvent::MessagesSeen {
                            chat_room_id: chat_room_id.clone(),
                            user_id: user.id.clone(),
                        },
                    );
                    Ok(())
                }
                Err(e) => send_error(socket, &client_text(&e)).await,
            }
        }

        ClientEvent::DeleteMessage { message_id } => {
            let result = {
                let db = state.db.lock().unwrap();
                chat::delete_message(&db, user, &message_id)
            };
            match result {
                Ok((message, room)) => {
                    state.publish(
                        &room.id,
                        ChatEvent::MessageDeleted {
                            chat_room_id: room.id.clone(),
                            message_id: message.id,
                        },
                    );
                    Ok(())
                }
                Err(e) => send_error(socket, &client_text(&e)).await,
            }
        }

        ClientEvent::DeleteChat { chat_room_id } => {
            let result = {
                let db = state.db.lock().unwrap();
                chat::delete_room(&db, user, &chat_room_id)
            };
            match result {
                Ok(room) => {
                    state.publish(
                        &room.id,
                        ChatEvent::ChatDeleted {
                            chat_room_id: room.id.clone(),
                        },
                    );
                    state.drop_room_channel(&room.id);
                    Ok(())
                }
                Err(e) => send_error(socket, &client_text(&e)).await,
            }
        }
    }
}

async fn send_frame(socket: &mut WebSocket, value: &serde_json::Value) -> Result<(), ()> {
    socket
        .send(Message::Text(value.to_string()))
        .await
        .map_err(|_| ())
}

async fn send_event(socket: &mut WebSocket, event: &ChatEvent) -> Result<(), ()> {
    match serde_json::to_value(event) {
        Ok(value) => send_frame(socket, &value).await,
        Err(e) => {
            tracing::error!("failed to encode chat event: {e}");
            Ok(())
        }
    }
}

async fn send_ack(socket: &mut WebSocket, data: serde_json::Value) -> Result<(), ()> {
    send_frame(socket, &serde_json::json!({ "event": "ack", "data": data })).await
}

async fn send_error(socket: &mut WebSocket, msg: &str) -> Result<(), ()> {
    send_frame(
        socket,
        &serde_json::json!({ "event": "error", "data": { "msg": msg } }),
    )
    .await
}

/// Client-facing text for a failed operation. Database and internal
/// errors stay in the logs.
fn client_text(err: &AppError) -> String {
    match err {
        AppError::Database(_) | AppError::Internal(_) => {
            tracing::error!("chat socket operation failed: {err}");
            "Server error".to_string()
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_text_hides_internals() {
        let db_err = AppError::Database(rusqlite::Error::InvalidQuery);
        assert_eq!(client_text(&db_err), "Server error");

        let internal = AppError::Internal(anyhow::anyhow!("row vanished"));
        assert_eq!(client_text(&internal), "Server error");

        let domain = AppError::BadRequest("Missing fields".to_string());
        assert_eq!(client_text(&domain), "Missing fields");
    }

    #[test]
    fn join_state_tracks_room_id() {
        assert!(!is_joined(&None, "r1"));

        let (tx, _) = tokio::sync::broadcast::channel(4);
        let sub = Some(RoomSubscription {
            room_id: "r1".to_string(),
            stream: BroadcastStream::new(tx.subscribe()),
        });
        assert!(is_joined(&sub, "r1"));
        assert!(!is_joined(&sub, "r2"));
    }
}
