//! Error taxonomy for the connection core.
//!
//! Transport failures (close and error events) are not errors here: they are
//! routed through the reconnect controller. `WsError` covers programming
//! errors in the calling layer and failures of explicit operations.

use crate::ReadyState;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WsError {
    /// A subscriber tried to leave a URL set it is not a member of.
    #[error("a subscriber that is no longer registered attempted to unsubscribe from {url}")]
    UnregisteredSubscriber { url: String },

    #[error("socket is not open (ready state: {0})")]
    NotOpen(ReadyState),

    #[error("invalid url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("this transport is receive-only")]
    SendUnsupported,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("failed to serialize message: {0}")]
    Serialize(String),

    /// Options were replaced on a consumer created with `enforce_static_options`.
    #[error("the options passed to this socket must be static")]
    StaticOptions,
}

impl WsError {
    /// Programming errors are raised to the caller and never retried.
    pub fn is_programming_error(&self) -> bool {
        matches!(
            self,
            WsError::UnregisteredSubscriber { .. } | WsError::StaticOptions
        )
    }
}

impl From<serde_json::Error> for WsError {
    fn from(err: serde_json::Error) -> Self {
        WsError::Serialize(err.to_string())
    }
}

pub type Result<T, E = WsError> = std::result::Result<T, E>;
