use serde::{Deserialize, Serialize};

/// Lifecycle state of one side of a call. The caller's entry moves
/// `Calling -> Connected`, the receiver's `Ringing -> Connected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    Calling,
    Ringing,
    Connected,
}

/// Terminal reason delivered in `call:ended`. The no-answer pair is
/// deliberately asymmetric so each client renders the right message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    NoAnswer,
    NoAnswerTimeout,
    RejectedByUser,
    Disconnected,
    /// Caller-supplied free text (e.g. "hangup").
    #[serde(untagged)]
    Other(String),
}

impl EndReason {
    pub fn from_client(raw: Option<String>) -> Self {
        match raw {
            Some(text) if !text.trim().is_empty() => Self::Other(text),
            _ => Self::Other("ended".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_reasons_serialize_to_wire_names() {
        assert_eq!(
            serde_json::to_value(EndReason::NoAnswerTimeout).unwrap(),
            serde_json::json!("no_answer_timeout")
        );
        assert_eq!(
            serde_json::to_value(EndReason::Other("hangup".into())).unwrap(),
            serde_json::json!("hangup")
        );
    }

    #[test]
    fn free_text_reason_round_trips() {
        let parsed: EndReason = serde_json::from_str("\"busy elsewhere\"").unwrap();
        assert_eq!(parsed, EndReason::Other("busy elsewhere".into()));
        let parsed: EndReason = serde_json::from_str("\"disconnected\"").unwrap();
        assert_eq!(parsed, EndReason::Disconnected);
    }
}
