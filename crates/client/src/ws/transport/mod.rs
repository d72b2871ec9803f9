//! The transport seam: an opaque socket with `send`, `close`, a ready state
//! and four event callbacks.
//!
//! This module provides the shared traits and conditionally includes the
//! platform-specific implementations.

use std::rc::Rc;

use sockshare_shared::{
    CloseEvent, ErrorEvent, MessageEvent, OpenEvent, ReadyState, TransportEvent, WsError, WsMessage,
};

/// The physical connection for a URL.
pub type SocketHandle = Rc<dyn Transport>;

/// The four callbacks a transport invokes. Installed once per connection.
pub struct TransportHandlers {
    pub on_open: Box<dyn Fn(OpenEvent)>,
    pub on_close: Box<dyn Fn(CloseEvent)>,
    pub on_message: Box<dyn Fn(MessageEvent)>,
    pub on_error: Box<dyn Fn(ErrorEvent)>,
}

impl TransportHandlers {
    pub fn dispatch(&self, event: TransportEvent) {
        match event {
            TransportEvent::Open(event) => (self.on_open)(event),
            TransportEvent::Close(event) => (self.on_close)(event),
            TransportEvent::Message(event) => (self.on_message)(event),
            TransportEvent::Error(event) => (self.on_error)(event),
        }
    }
}

pub trait Transport {
    fn url(&self) -> &str;

    fn ready_state(&self) -> ReadyState;

    fn send(&self, message: WsMessage) -> Result<(), WsError>;

    /// Start closing. Closing an already closed socket is not an error.
    fn close(&self) -> Result<(), WsError>;

    /// Install the event callbacks, replacing any previous set.
    fn bind(&self, handlers: TransportHandlers);

    /// Drop the event callbacks; later events are discarded.
    fn unbind(&self);
}

impl std::fmt::Debug for dyn Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("url", &self.url())
            .field("ready_state", &self.ready_state())
            .finish()
    }
}

/// Creates physical connections.
pub trait Connector {
    /// Returns immediately with a socket in `Connecting` state.
    fn open(&self, url: &str, protocols: &[String]) -> Result<SocketHandle, WsError>;
}

/// Compare two handles by identity.
pub fn same_socket(a: &SocketHandle, b: &SocketHandle) -> bool {
    std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b))
}

// Include platform-specific implementation
#[cfg(target_arch = "wasm32")]
mod transport_wasm;
#[cfg(target_arch = "wasm32")]
pub use transport_wasm::{BrowserWebSocketConnector, EventSourceConnector};

#[cfg(not(target_arch = "wasm32"))]
mod transport_native;
#[cfg(not(target_arch = "wasm32"))]
pub use transport_native::TungsteniteConnector;

/// The WebSocket connector for this platform.
#[cfg(not(target_arch = "wasm32"))]
pub fn default_connector(scheduler: Rc<dyn crate::ws::Scheduler>) -> Rc<dyn Connector> {
    Rc::new(TungsteniteConnector::new(scheduler))
}

/// The WebSocket connector for this platform.
#[cfg(target_arch = "wasm32")]
pub fn default_connector(_scheduler: Rc<dyn crate::ws::Scheduler>) -> Rc<dyn Connector> {
    Rc::new(BrowserWebSocketConnector)
}
