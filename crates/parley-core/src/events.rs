use tokio::sync::broadcast;

#[derive(Debug, Clone)]
pub struct ServerEvent {
    pub event_type: String,
    pub payload: serde_json::Value,
    /// Chat group this event belongs to, if applicable.
    pub chat_id: Option<i64>,
    /// When set, only deliver this event to the specified user IDs.
    pub target_user_ids: Option<Vec<i64>>,
}

/// Broadcast-based event bus for real-time dispatch. Every gateway session
/// subscribes once and filters by target/chat scope on its own side.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ServerEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, event: ServerEvent) {
        // Ignore error if no receivers
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.sender.subscribe()
    }

    /// Unscoped fan-out to every connected peer.
    pub fn broadcast(&self, event_type: &str, payload: serde_json::Value) {
        self.publish(ServerEvent {
            event_type: event_type.to_string(),
            payload,
            chat_id: None,
            target_user_ids: None,
        });
    }

    /// Deliver only to sessions that joined the chat's broadcast group.
    pub fn dispatch_to_chat(&self, event_type: &str, payload: serde_json::Value, chat_id: i64) {
        self.publish(ServerEvent {
            event_type: event_type.to_string(),
            payload,
            chat_id: Some(chat_id),
            target_user_ids: None,
        });
    }

    /// Deliver only to the specified users.
    pub fn dispatch_to_users(
        &self,
        event_type: &str,
        payload: serde_json::Value,
        target_user_ids: Vec<i64>,
    ) {
        self.publish(ServerEvent {
            event_type: event_type.to_string(),
            payload,
            chat_id: None,
            target_user_ids: Some(target_user_ids),
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(4096)
    }
}
