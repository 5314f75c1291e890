use serde::{Deserialize, Serialize};
use serde_json::Value;

// Server -> client event names
pub const EVENT_PRESENCE_CHANGED: &str = "presence-changed";
pub const EVENT_CALL_INCOMING: &str = "call:incoming";
pub const EVENT_CALL_ANSWER_RECEIVED: &str = "call:answer-received";
pub const EVENT_CALL_ACCEPTED: &str = "call:accepted-notification";
pub const EVENT_CALL_REJECTED: &str = "call:rejected";
pub const EVENT_CALL_ENDED: &str = "call:ended";
pub const EVENT_CALL_USER_OFFLINE: &str = "call:user-offline";
pub const EVENT_CALL_BUSY: &str = "call:busy";
pub const EVENT_CALL_SESSION_NOT_FOUND: &str = "call:session-not-found";
pub const EVENT_ICE_CANDIDATE: &str = "ice-candidate";
pub const EVENT_CALL_TOGGLE_MEDIA: &str = "call:toggle-media";
pub const EVENT_UNREAD_COUNT_CHANGED: &str = "unread-count-changed";
pub const EVENT_PROFILE_UPDATED: &str = "profile-updated";

// Chat relay event names (forwarded verbatim to the chat group)
pub const EVENT_SEND_MESSAGE: &str = "send-message";
pub const EVENT_MESSAGE_DELIVERED: &str = "message-delivered";
pub const EVENT_MESSAGE_SEEN: &str = "message-seen";
pub const EVENT_TYPING: &str = "typing";
pub const EVENT_STOP_TYPING: &str = "stop-typing";
pub const EVENT_MESSAGE_REACTED: &str = "message-reacted";

/// One frame on the gateway socket, both directions:
/// `{"event": "<name>", "data": {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub event: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

impl Frame {
    pub fn new(event: &str, data: Value) -> Self {
        Self {
            event: event.to_string(),
            data,
        }
    }
}

/// Body of a chat-room relay event. Everything except `chat_id` is opaque to
/// the server and forwarded exactly as received.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatEventBody {
    #[serde(rename = "chatId")]
    pub chat_id: i64,
    #[serde(flatten)]
    pub rest: serde_json::Map<String, Value>,
}

/// Inbound client events, validated at the boundary: a frame that fails to
/// deserialize into one of these variants never reaches the coordinator.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "user-online", rename_all = "camelCase")]
    UserOnline { user_id: i64, login_epoch: i64 },

    #[serde(rename = "user-offline", rename_all = "camelCase")]
    UserOffline { user_id: i64 },

    #[serde(rename = "call:initiate", rename_all = "camelCase")]
    CallInitiate {
        caller_id: i64,
        receiver_id: i64,
        offer: Value,
        caller_name: String,
        #[serde(default)]
        caller_profile: Option<String>,
        chat_id: i64,
    },

    #[serde(rename = "call:accept", rename_all = "camelCase")]
    CallAccept {
        caller_id: i64,
        receiver_id: i64,
        answer: Value,
        #[serde(default)]
        receiver_name: Option<String>,
    },

    #[serde(rename = "call:reject", rename_all = "camelCase")]
    CallReject {
        caller_id: i64,
        receiver_id: i64,
        #[serde(default)]
        reason: Option<String>,
        #[serde(default)]
        receiver_name: Option<String>,
    },

    #[serde(rename = "call:end", rename_all = "camelCase")]
    CallEnd {
        caller_id: i64,
        receiver_id: i64,
        #[serde(default)]
        reason: Option<String>,
    },

    #[serde(rename = "ice-candidate", rename_all = "camelCase")]
    IceCandidate {
        from_user_id: i64,
        to_user_id: i64,
        candidate: Value,
    },

    #[serde(rename = "call:toggle-media", rename_all = "camelCase")]
    CallToggleMedia {
        to_user_id: i64,
        #[serde(rename = "type")]
        kind: String,
        enabled: bool,
    },

    #[serde(rename = "join-group", rename_all = "camelCase")]
    JoinGroup { chat_id: i64 },

    #[serde(rename = "send-message")]
    SendMessage(ChatEventBody),
    #[serde(rename = "message-delivered")]
    MessageDelivered(ChatEventBody),
    #[serde(rename = "message-seen")]
    MessageSeen(ChatEventBody),
    #[serde(rename = "typing")]
    Typing(ChatEventBody),
    #[serde(rename = "stop-typing")]
    StopTyping(ChatEventBody),
    #[serde(rename = "message-reacted")]
    MessageReacted(ChatEventBody),

    #[serde(rename = "unread-count-changed")]
    UnreadCountChanged {
        #[serde(flatten)]
        rest: serde_json::Map<String, Value>,
    },
    #[serde(rename = "profile-updated")]
    ProfileUpdated {
        #[serde(flatten)]
        rest: serde_json::Map<String, Value>,
    },
}
