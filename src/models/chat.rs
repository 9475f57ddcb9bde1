use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::models::user::Party;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRoom {
    pub id: String,
    pub appointment_id: String,
    pub client_id: String,
    pub lawyer_id: String,
    pub last_message: Option<String>,
    pub last_message_at: Option<NaiveDateTime>,
    pub last_message_sender_id: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl ChatRoom {
    pub fn is_participant(&self, user_id: &str) -> bool {
        self.client_id == user_id || self.lawyer_id == user_id
    }

    /// The other side of the conversation.
    pub fn counterpart_of(&self, user_id: &str) -> &str {
        if self.client_id == user_id {
            &self.lawyer_id
        } else {
            &self.client_id
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub chat_room_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    pub seen: bool,
    pub deleted: bool,
    pub deleted_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

/// Message as returned to clients, with both parties resolved to their
/// display fields.
#[derive(Debug, Clone, Serialize)]
pub struct MessageView {
    pub id: String,
    pub chat_room_id: String,
    pub sender: Party,
    pub receiver: Party,
    pub content: String,
    pub seen: bool,
    pub deleted: bool,
    pub created_at: NaiveDateTime,
}

/// Room as listed for a user: participants plus enough of the backing
/// appointment to label the conversation.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRoomView {
    pub id: String,
    pub appointment_id: String,
    pub participants: Vec<Party>,
    pub appointment_date: String,
    pub appointment_status: String,
    pub last_message: Option<String>,
    pub last_message_at: Option<NaiveDateTime>,
    pub last_message_sender_id: Option<String>,
    pub updated_at: NaiveDateTime,
}

/// Events fanned out to every subscriber of a room channel. Event names
/// keep the wire verbs the web client already speaks.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum ChatEvent {
    #[serde(rename = "newMessage")]
    NewMessage { message: MessageView },
    #[serde(rename = "typing")]
    Typing {
        chat_room_id: String,
        user_id: String,
    },
    #[serde(rename = "stopTyping")]
    StopTyping {
        chat_room_id: String,
        user_id: String,
    },
    #[serde(rename = "messagesSeen")]
    MessagesSeen {
        chat_room_id: String,
        user_id: String,
    },
    #[serde(rename = "messageDeleted")]
    MessageDeleted {
        chat_room_id: String,
        message_id: String,
    },
    #[serde(rename = "chatDeleted")]
    ChatDeleted { chat_room_id: String },
}

impl ChatEvent {
    /// Typing indicators are not echoed back to the user producing
    /// them; everything else goes to all subscribers.
    pub fn should_deliver_to(&self, user_id: &str) -> bool {
        match self {
            ChatEvent::Typing { user_id: from, .. }
            | ChatEvent::StopTyping { user_id: from, .. } => from != user_id,
            _ => true,
        }
    }
}

/// Frames a connected client may send. Sender identity always comes
/// from the authenticated connection, never from the frame.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "joinRoom")]
    JoinRoom { chat_room_id: String },
    #[serde(rename = "typing")]
    Typing { chat_room_id: String },
    #[serde(rename = "stopTyping")]
    StopTyping { chat_room_id: String },
    #[serde(rename = "sendMessage")]
    SendMessage {
        chat_room_id: String,
        content: String,
    },
    #[serde(rename = "markSeen")]
    MarkSeen { chat_room_id: String },
    #[serde(rename = "deleteMessage")]
    DeleteMessage { message_id: String },
    #[serde(rename = "deleteChat")]
    DeleteChat { chat_room_id: String },
}
