use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::Redirect;
use axum::Json;

use crate::db::queries;
use crate::errors::AppError;
use crate::handlers::auth::CurrentUser;
use crate::models::{ChatEvent, ChatRoomView, MessageView};
use crate::services::chat;
use crate::state::AppState;

fn room_redirect(room_id: &str) -> Redirect {
    Redirect::to(&format!("/chat?roomId={room_id}"))
}

// GET /chat/room/:appointment_id
pub async fn open_room(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(appointment_id): Path<String>,
) -> Result<Redirect, AppError> {
    let room = {
        let db = state.db.lock().unwrap();
        chat::room_for_appointment(&db, &user, &appointment_id)?
    };
    Ok(room_redirect(&room.id))
}

// GET /chat/lawyer/:lawyer_id
pub async fn open_room_with_lawyer(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(lawyer_id): Path<String>,
) -> Result<Redirect, AppError> {
    let room = {
        let db = state.db.lock().unwrap();
        chat::room_with_lawyer(&db, &user, &lawyer_id)?
    };
    Ok(room_redirect(&room.id))
}

// GET /chat/rooms
pub async fn rooms(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<ChatRoomView>>, AppError> {
    let rooms = {
        let db = state.db.lock().unwrap();
        queries::list_rooms_for_user(&db, &user.id)?
    };
    Ok(Json(rooms))
}

// GET /chat/messages/:chat_room_id
pub async fn messages(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(chat_room_id): Path<String>,
) -> Result<Json<Vec<MessageView>>, AppError> {
    let messages = {
        let db = state.db.lock().unwrap();
        chat::messages_for_room(&db, &user, &chat_room_id)?
    };
    Ok(Json(messages))
}

// DELETE /chat/messages/:message_id
pub async fn delete_message(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(message_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let (message, room) = {
        let db = state.db.lock().unwrap();
        chat::delete_message(&db, &user, &message_id)?
    };

    // Connected subscribers hear about REST deletions too.
    state.publish(
        &room.id,
        ChatEvent::MessageDeleted {
            chat_room_id: room.id.clone(),
            message_id: message.id.clone(),
        },
    );

    Ok(Json(serde_json::json!({ "ok": true, "message_id": message.id })))
}

// DELETE /chat/room/:chat_room_id
pub async fn delete_room(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(chat_room_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let room = {
        let db = state.db.lock().unwrap();
        chat::delete_room(&db, &user, &chat_room_id)?
    };

    state.publish(
        &room.id,
        ChatEvent::ChatDeleted {
            chat_room_id: room.id.clone(),
        },
    );
    state.drop_room_channel(&room.id);

    tracing::info!("chat room {} deleted by {}", room.id, user.username);

    Ok(Json(serde_json::json!({ "ok": true })))
}
