use chrono::Utc;
use rusqlite::Connection;
use uuid::Uuid;

use crate::db::queries;
use crate::errors::{self, AppError};
use crate::models::{ChatMessage, ChatRoom, MessageView, User};
use crate::services::authz;

/// Preview text shown when the newest message in a room was removed.
pub const DELETED_MESSAGE_PREVIEW: &str = "This message was deleted";

/// Fetches the room for an appointment, creating it on first access.
/// Creation is racy across connections; the unique appointment index
/// decides the winner and the loser adopts the winning row.
pub fn room_for_appointment(
    conn: &Connection,
    user: &User,
    appointment_id: &str,
) -> Result<ChatRoom, AppError> {
    let appointment = queries::get_appointment(conn, appointment_id)?
        .ok_or_else(|| AppError::NotFound("Appointment not found".to_string()))?;

    if !authz::can_chat_about(user, &appointment) {
        return Err(AppError::Forbidden("Unauthorized".to_string()));
    }

    if let Some(room) = queries::get_room_for_appointment(conn, appointment_id)? {
        return Ok(room);
    }

    let now = Utc::now().naive_utc();
    let room = ChatRoom {
        id: Uuid::new_v4().to_string(),
        appointment_id: appointment_id.to_string(),
        client_id: appointment.client_id.clone(),
        lawyer_id: appointment.lawyer_id.clone(),
        last_message: None,
        last_message_at: None,
        last_message_sender_id: None,
        created_at: now,
        updated_at: now,
    };

    match queries::create_chat_room(conn, &room) {
        Ok(()) => Ok(room),
        Err(e) if errors::is_unique_violation(&e) => {
            match queries::get_room_for_appointment(conn, appointment_id)? {
                Some(existing) => Ok(existing),
                None => Err(e.into()),
            }
        }
        Err(e) => Err(e.into()),
    }
}

/// Opens the room backing the newest appointment between the user and a
/// lawyer. Users without any appointment are turned away.
pub fn room_with_lawyer(
    conn: &Connection,
    user: &User,
    lawyer_id: &str,
) -> Result<ChatRoom, AppError> {
    let appointment = queries::find_appointment_between(conn, &user.id, lawyer_id)?.ok_or_else(
        || {
            AppError::Forbidden(
                "You must have a confirmed booking to chat with this lawyer.".to_string(),
            )
        },
    )?;

    room_for_appointment(conn, user, &appointment.id)
}

pub fn messages_for_room(
    conn: &Connection,
    user: &User,
    chat_room_id: &str,
) -> Result<Vec<MessageView>, AppError> {
    let room = queries::get_chat_room(conn, chat_room_id)?
        .ok_or_else(|| AppError::NotFound("Chat room not found".to_string()))?;

    if !authz::can_access_room(user, &room) {
        return Err(AppError::Forbidden("Unauthorized".to_string()));
    }

    Ok(queries::list_messages(conn, &room.id)?)
}

/// Persists a message from `sender` and rolls the room preview forward.
pub fn send_message(
    conn: &Connection,
    sender: &User,
    chat_room_id: &str,
    content: &str,
) -> Result<MessageView, AppError> {
    let content = content.trim();
    if content.is_empty() {
        return Err(AppError::BadRequest("Missing fields".to_string()));
    }

    let room = queries::get_chat_room(conn, chat_room_id)?
        .ok_or_else(|| AppError::NotFound("Chat room not found".to_string()))?;

    if !authz::can_access_room(sender, &room) {
        return Err(AppError::Forbidden("Unauthorized".to_string()));
    }

    let now = Utc::now().naive_utc();
    let message = ChatMessage {
        id: Uuid::new_v4().to_string(),
        chat_room_id: room.id.clone(),
        sender_id: sender.id.clone(),
        receiver_id: room.counterpart_of(&sender.id).to_string(),
        content: content.to_string(),
        seen: false,
        deleted: false,
        deleted_at: None,
        created_at: now,
    };

    queries::create_message(conn, &message)?;
    queries::set_room_preview(conn, &room.id, content, &now, &sender.id)?;

    let view = queries::get_message_view(conn, &message.id)?
        .ok_or_else(|| anyhow::anyhow!("message missing right after insert"))?;
    Ok(view)
}

/// Soft-deletes a message and recomputes the room preview. Returns the
/// deleted message and its room so callers can notify subscribers.
pub fn delete_message(
    conn: &Connection,
    user: &User,
    message_id: &str,
) -> Result<(ChatMessage, ChatRoom), AppError> {
    let message = queries::get_message(conn, message_id)?
        .ok_or_else(|| AppError::NotFound("Message not found".to_string()))?;

    if message.deleted {
        return Err(AppError::BadRequest("Message is already deleted".to_string()));
    }

    let room = queries::get_chat_room(conn, &message.chat_room_id)?
        .ok_or_else(|| AppError::NotFound("Chat room not found".to_string()))?;

    if !authz::can_access_room(user, &room) {
        return Err(AppError::Forbidden("Unauthorized".to_string()));
    }

    let now = Utc::now().naive_utc();
    queries::mark_message_deleted(conn, &message.id, &now)?;
    refresh_room_preview(conn, &room.id, &message)?;

    Ok((message, room))
}

/// Marks everything the counterpart sent as seen. Returns how many
/// messages flipped.
pub fn mark_seen(conn: &Connection, user: &User, chat_room_id: &str) -> Result<usize, AppError> {
    let room = queries::get_chat_room(conn, chat_room_id)?
        .ok_or_else(|| AppError::NotFound("Chat room not found".to_string()))?;

    if !authz::can_access_room(user, &room) {
        return Err(AppError::Forbidden("Unauthorized".to_string()));
    }

    Ok(queries::mark_messages_seen(conn, &room.id, &user.id)?)
}

/// Hard-deletes a room and every message in it.
pub fn delete_room(
    conn: &Connection,
    user: &User,
    chat_room_id: &str,
) -> Result<ChatRoom, AppError> {
    let room = queries::get_chat_room(conn, chat_room_id)?
        .ok_or_else(|| AppError::NotFound("Chat room not found".to_string()))?;

    if !authz::can_access_room(user, &room) {
        return Err(AppError::Forbidden("Unauthorized".to_string()));
    }

    queries::delete_chat_room(conn, &room.id)?;
    Ok(room)
}

/// Rolls the preview after `deleted` was removed: a room whose newest
/// message is gone shows the placeholder stamped with the deleted
/// message's time and sender; otherwise the newest surviving message
/// takes over; with nothing left the placeholder applies as well.
fn refresh_room_preview(
    conn: &Connection,
    room_id: &str,
    deleted: &ChatMessage,
) -> anyhow::Result<()> {
    let newest = queries::newest_message(conn, room_id)?;
    let deleted_was_newest = newest.map(|m| m.id == deleted.id).unwrap_or(true);

    if !deleted_was_newest {
        if let Some(survivor) = queries::newest_visible_message(conn, room_id)? {
            return queries::set_room_preview(
                conn,
                room_id,
                &survivor.content,
                &survivor.created_at,
                &survivor.sender_id,
            );
        }
    }

    queries::set_room_preview(
        conn,
        room_id,
        DELETED_MESSAGE_PREVIEW,
        &deleted.created_at,
        &deleted.sender_id,
    )
}
