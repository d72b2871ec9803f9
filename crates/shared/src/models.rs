//! Ready states, payloads and the event records delivered by transports.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Lifecycle of a socket as seen by a consumer.
///
/// `Uninstantiated` is a client-side label only: no transport reports it.
/// The other four mirror the numeric `readyState` of a WebSocket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ReadyState {
    #[default]
    Uninstantiated,
    Connecting,
    Open,
    Closing,
    Closed,
}

impl ReadyState {
    /// Map a transport `readyState` code (0..=3).
    pub fn from_code(code: u16) -> Self {
        match code {
            0 => ReadyState::Connecting,
            1 => ReadyState::Open,
            2 => ReadyState::Closing,
            _ => ReadyState::Closed,
        }
    }

    /// Numeric code, `-1` for `Uninstantiated`.
    pub fn code(&self) -> i8 {
        match self {
            ReadyState::Uninstantiated => -1,
            ReadyState::Connecting => 0,
            ReadyState::Open => 1,
            ReadyState::Closing => 2,
            ReadyState::Closed => 3,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, ReadyState::Open)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ReadyState::Closing | ReadyState::Closed)
    }
}

impl std::fmt::Display for ReadyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ReadyState::Uninstantiated => "uninstantiated",
            ReadyState::Connecting => "connecting",
            ReadyState::Open => "open",
            ReadyState::Closing => "closing",
            ReadyState::Closed => "closed",
        };
        f.write_str(label)
    }
}

/// A payload carried by a transport, in either direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WsMessage {
    Text(String),
    Binary(Vec<u8>),
}

impl WsMessage {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            WsMessage::Text(text) => Some(text),
            WsMessage::Binary(_) => None,
        }
    }

    /// Parse a text payload as JSON.
    ///
    /// Returns `None` for binary payloads and for text that does not parse.
    pub fn json<T: DeserializeOwned>(&self) -> Option<T> {
        serde_json::from_str(self.as_text()?).ok()
    }
}

impl From<String> for WsMessage {
    fn from(text: String) -> Self {
        WsMessage::Text(text)
    }
}

impl From<&str> for WsMessage {
    fn from(text: &str) -> Self {
        WsMessage::Text(text.to_string())
    }
}

impl From<Vec<u8>> for WsMessage {
    fn from(bytes: Vec<u8>) -> Self {
        WsMessage::Binary(bytes)
    }
}

/// The connection finished its handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenEvent {
    pub url: String,
}

/// The connection is gone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseEvent {
    pub code: u16,
    pub reason: String,
    pub was_clean: bool,
}

impl CloseEvent {
    /// Close code used when the peer vanished without a close frame.
    pub const ABNORMAL: u16 = 1006;

    pub fn normal() -> Self {
        Self {
            code: 1000,
            reason: String::new(),
            was_clean: true,
        }
    }

    pub fn abnormal(reason: impl Into<String>) -> Self {
        Self {
            code: Self::ABNORMAL,
            reason: reason.into(),
            was_clean: false,
        }
    }
}

/// An inbound payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEvent {
    pub data: WsMessage,
    /// Named event for Server-Sent-Events streams (`None` for WebSocket frames
    /// and unnamed SSE messages).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl MessageEvent {
    pub fn new(data: impl Into<WsMessage>) -> Self {
        Self {
            data: data.into(),
            event: None,
            received_at: Utc::now(),
        }
    }

    pub fn named(event: impl Into<String>, data: impl Into<WsMessage>) -> Self {
        Self {
            event: Some(event.into()),
            ..Self::new(data)
        }
    }

    pub fn text(&self) -> Option<&str> {
        self.data.as_text()
    }
}

/// A transport-level failure description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEvent {
    pub message: String,
}

impl ErrorEvent {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// One of the four events a transport can emit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Open(OpenEvent),
    Close(CloseEvent),
    Message(MessageEvent),
    Error(ErrorEvent),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_state_codes_follow_the_websocket_enum() {
        assert_eq!(ReadyState::from_code(0), ReadyState::Connecting);
        assert_eq!(ReadyState::from_code(1), ReadyState::Open);
        assert_eq!(ReadyState::from_code(2), ReadyState::Closing);
        assert_eq!(ReadyState::from_code(3), ReadyState::Closed);
        assert_eq!(ReadyState::Uninstantiated.code(), -1);
        assert_eq!(ReadyState::default(), ReadyState::Uninstantiated);
    }

    #[test]
    fn json_parses_text_payloads_only() {
        let text = WsMessage::from(r#"{"count":3}"#);
        let parsed: Option<serde_json::Value> = text.json();
        assert_eq!(parsed.unwrap()["count"], 3);

        let binary = WsMessage::Binary(vec![1, 2, 3]);
        assert!(binary.json::<serde_json::Value>().is_none());
        assert!(WsMessage::from("not json").json::<serde_json::Value>().is_none());
    }

    #[test]
    fn named_events_keep_their_name() {
        let event = MessageEvent::named("tick", "42");
        assert_eq!(event.event.as_deref(), Some("tick"));
        assert_eq!(event.text(), Some("42"));
    }
}
