//! sockshare client
//!
//! Shared, self-reconnecting WebSocket and Server-Sent-Events connections for
//! Dioxus apps, plus the framework-independent core they are built on.

pub mod logging;
pub mod ws;

pub use sockshare_shared::{
    CloseEvent, ErrorEvent, HeartbeatOptions, MessageEvent, OpenEvent, ReadyState, WsError,
    WsMessage,
};
pub use ws::{use_websocket, Options, SocketEnv, UrlSource, UseWebSocket, WebSocketClient};
