use crate::events::EventBus;
use parley_models::events::*;
use serde_json::Value;

/// Stateless forwarder for chat-room traffic. The server inspects only the
/// routing key (`chatId`); message content, receipts, and reactions pass
/// through untouched because persistence and read-state live elsewhere.
pub struct ChatRelay {
    bus: EventBus,
}

impl ChatRelay {
    pub fn new(bus: EventBus) -> Self {
        Self { bus }
    }

    /// Re-emits a chat event to every session joined to its chat group,
    /// sender included. Message-bearing events additionally nudge all
    /// clients to refresh their unread badges for that chat.
    pub fn forward(&self, event_name: &str, body: &parley_models::events::ChatEventBody) {
        let payload = match serde_json::to_value(body) {
            Ok(v) => v,
            Err(err) => {
                tracing::warn!(event_name, "failed to reserialize chat event: {err}");
                return;
            }
        };
        self.bus.dispatch_to_chat(event_name, payload, body.chat_id);

        if event_name == EVENT_SEND_MESSAGE || event_name == EVENT_MESSAGE_SEEN {
            self.bus.broadcast(
                EVENT_UNREAD_COUNT_CHANGED,
                serde_json::json!({ "chatId": body.chat_id }),
            );
        }
    }

    /// Global passthrough for events with no chat scope, such as client-raised
    /// unread refreshes and profile updates.
    pub fn broadcast_passthrough(&self, event_name: &str, rest: serde_json::Map<String, Value>) {
        self.bus.broadcast(event_name, Value::Object(rest));
    }
}
