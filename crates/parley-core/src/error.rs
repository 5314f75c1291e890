use thiserror::Error;

/// Call-flow failures. Always unicast to the socket that raised the
/// triggering event, never broadcast.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CallError {
    #[error("user is offline")]
    UserOffline,
    #[error("{0}")]
    Busy(String),
    #[error("call session not found")]
    SessionNotFound,
}
