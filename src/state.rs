use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use rusqlite::Connection;
use tokio::sync::broadcast;

use crate::config::AppConfig;
use crate::models::ChatEvent;

pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub config: AppConfig,
    /// One broadcast channel per chat room, created on first use.
    pub chat_channels: Mutex<HashMap<String, broadcast::Sender<ChatEvent>>>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(conn: Connection, config: AppConfig) -> Self {
        Self {
            db: Arc::new(Mutex::new(conn)),
            config,
            chat_channels: Mutex::new(HashMap::new()),
            started_at: Instant::now(),
        }
    }

    /// Sender for a room's event channel. Senders stay alive in the map
    /// so events published while nobody listens are simply dropped.
    pub fn room_channel(&self, room_id: &str) -> broadcast::Sender<ChatEvent> {
        let mut channels = self.chat_channels.lock().unwrap();
        channels
            .entry(room_id.to_string())
            .or_insert_with(|| broadcast::channel(256).0)
            .clone()
    }

    /// Publishes an event to a room if its channel exists. Rooms nobody
    /// ever joined have no channel and nothing to notify.
    pub fn publish(&self, room_id: &str, event: ChatEvent) {
        let channels = self.chat_channels.lock().unwrap();
        if let Some(tx) = channels.get(room_id) {
            let _ = tx.send(event);
        }
    }

    /// Drops a room's channel, ending every live subscription.
    pub fn drop_room_channel(&self, room_id: &str) {
        let mut channels = self.chat_channels.lock().unwrap();
        channels.remove(room_id);
    }
}
