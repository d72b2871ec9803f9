//! Connection management for WebSocket and Server-Sent-Events transports.
//!
//! This module provides:
//! - One physical connection per URL shared by any number of consumers
//! - Per-consumer reconnect policy with an attempt budget
//! - A send queue that is flushed, in order, when the connection opens
//!
//! # Architecture
//!
//! ```text
//! ┌────────────┐ ┌────────────┐ ┌────────────┐
//! │ Component  │ │ Component  │ │ Component  │
//! │ (use_ws..) │ │ (use_ws..) │ │ (use_ws..) │
//! └────────────┘ └────────────┘ └────────────┘
//!        │              │              │
//!        ▼              ▼              ▼
//! ┌────────────┐ ┌────────────┐ ┌────────────┐
//! │  Client    │ │  Client    │ │  Client    │
//! │ queue,     │ │ queue,     │ │ queue,     │
//! │ reconnect  │ │ reconnect  │ │ reconnect  │
//! └────────────┘ └────────────┘ └────────────┘
//!        │              │              │
//!        └──────────────┼──────────────┘
//!                       ▼
//!            ┌─────────────────────┐
//!            │   create_or_join    │──── ConnectionRegistry
//!            └─────────────────────┘     SubscriberRegistry
//!                       │
//!                       ▼
//!            ┌─────────────────────┐
//!            │  fan-out handlers   │ (bound once per connection)
//!            └─────────────────────┘
//!                       │
//!                       ▼
//!            ┌─────────────────────┐
//!            │ Transport (ws/sse)  │
//!            └─────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! let env = SocketEnv::platform_default();
//! let client = WebSocketClient::connect(
//!     env,
//!     "wss://example.com/feed",
//!     Options::new().share(true).always_reconnect(),
//! );
//! client.send("subscribe")?; // queued until open
//! ```

mod client;
mod env;
mod factory;
mod fanout;
mod guard;
mod heartbeat;
mod hooks;
mod options;
mod reconnect;
mod registry;
mod scheduler;
mod subscriber;
mod url;

pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use client::WebSocketClient;
pub use env::SocketEnv;
pub use factory::{create_or_join, Joined, Teardown};
pub use guard::SocketGuard;
pub use heartbeat::Heartbeat;
pub use options::{
    CloseDecider, EventCallback, MessageFilter, Options, OptionsCell, ReconnectInterval,
};
pub use reconnect::{ReconnectController, ReconnectDecision, ReconnectState, ReconnectTrigger};
pub use registry::{ConnectionRegistry, SocketRegistries, SubscriberRegistry};
#[cfg(target_arch = "wasm32")]
pub use scheduler::BrowserScheduler;
#[cfg(not(target_arch = "wasm32"))]
pub use scheduler::LocalTokioScheduler;
pub use scheduler::{default_scheduler, DioxusScheduler, Scheduler, TimerHandle};
pub use subscriber::{RestartFn, Setters, Subscriber};
pub use url::{append_query_params, UrlSource};

pub use hooks::{use_websocket, UseWebSocket};
#[cfg(target_arch = "wasm32")]
pub use hooks::{use_event_source, UseEventSource};
