//! Dioxus hooks over [`WebSocketClient`].
//!
//! Each hook owns one client for the lifetime of the component. Ready state
//! and the last message are mirrored into signals; everything else goes
//! through the returned handle.
//!
//! ```rust,ignore
//! fn Ticker() -> Element {
//!     let socket = use_websocket(Some("wss://example.com/ticks"), Options::new().share(true));
//!     let state = socket.ready_state.read();
//!     rsx! { "connection: {state}" }
//! }
//! ```

use std::cell::RefCell;
use std::rc::Rc;

use dioxus::prelude::*;
use serde::{de::DeserializeOwned, Serialize};
use sockshare_shared::{MessageEvent, ReadyState, WsError, WsMessage};

use super::client::WebSocketClient;
use super::env::SocketEnv;
use super::guard::SocketGuard;
use super::options::Options;
use super::url::UrlSource;

/// Handle returned by [`use_websocket`].
#[derive(Clone)]
pub struct UseWebSocket {
    client: Rc<WebSocketClient>,
    pub ready_state: Signal<ReadyState>,
    pub last_message: Signal<Option<MessageEvent>>,
}

impl UseWebSocket {
    pub fn send(&self, message: impl Into<WsMessage>) -> Result<(), WsError> {
        self.client.send(message)
    }

    pub fn send_with(&self, message: impl Into<WsMessage>, keep: bool) -> Result<(), WsError> {
        self.client.send_with(message, keep)
    }

    pub fn send_json<T: Serialize>(&self, value: &T) -> Result<(), WsError> {
        self.client.send_json(value)
    }

    pub fn last_json<T: DeserializeOwned>(&self) -> Option<T> {
        self.client.last_json()
    }

    pub fn get_socket(&self) -> Option<SocketGuard> {
        self.client.get_socket()
    }

    pub fn reconnect(&self) {
        self.client.reconnect();
    }

    pub fn client(&self) -> &WebSocketClient {
        &self.client
    }
}

/// Connect a component to a WebSocket URL.
///
/// `None` keeps the socket `Uninstantiated`. A changed URL restarts the
/// connection; new options replace the old ones unless the first options
/// asked to stay static. Uses the [`SocketEnv`] from context when one is
/// provided.
pub fn use_websocket(url: Option<impl Into<UrlSource>>, options: Options) -> UseWebSocket {
    let url = url.map(Into::into);
    let env = use_hook(|| try_consume_context::<SocketEnv>().unwrap_or_else(SocketEnv::platform_default));
    use_socket_client(env, url, options)
}

fn use_socket_client(env: SocketEnv, url: Option<UrlSource>, options: Options) -> UseWebSocket {
    let ready_state = use_signal(|| ReadyState::Uninstantiated);
    let last_message = use_signal(|| None::<MessageEvent>);

    let client = use_hook({
        let url = url.clone();
        let options = options.clone();
        move || {
            let client = Rc::new(WebSocketClient::new(env, url, options));
            client.on_ready_state(move |next| {
                let mut state = ready_state;
                state.set(next);
            });
            client.on_message(move |event| {
                let mut message = last_message;
                message.set(Some(event.clone()));
            });
            client.start();
            client
        }
    });

    let current_url = use_hook(|| Rc::new(RefCell::new(url.clone())));
    let changed = match (&*current_url.borrow(), &url) {
        (Some(old), Some(new)) => !old.same_target(new),
        (None, None) => false,
        _ => true,
    };
    if changed {
        *current_url.borrow_mut() = url.clone();
        let client = client.clone();
        spawn(async move {
            client.set_url(url);
        });
    }

    if !client.options().enforce_static_options {
        // Rejected only for static options, checked just above.
        let _ = client.set_options(options);
    }

    use_drop({
        let client = client.clone();
        move || {
            if let Err(e) = client.close() {
                crate::log_error!("Error closing socket on unmount: {}", e);
            }
        }
    });

    UseWebSocket {
        client,
        ready_state,
        last_message,
    }
}

/// Handle returned by [`use_event_source`]. Receive-only.
#[cfg(target_arch = "wasm32")]
#[derive(Clone)]
pub struct UseEventSource {
    inner: UseWebSocket,
    pub ready_state: Signal<ReadyState>,
    pub last_message: Signal<Option<MessageEvent>>,
}

#[cfg(target_arch = "wasm32")]
impl UseEventSource {
    pub fn last_json<T: DeserializeOwned>(&self) -> Option<T> {
        self.inner.last_json()
    }

    pub fn reconnect(&self) {
        self.inner.reconnect();
    }
}

/// Subscribe a component to a Server-Sent-Events stream.
///
/// Named events listed on `connector` arrive as messages carrying the event
/// name.
#[cfg(target_arch = "wasm32")]
pub fn use_event_source(
    url: Option<impl Into<UrlSource>>,
    options: Options,
    connector: super::transport::EventSourceConnector,
) -> UseEventSource {
    let url = url.map(Into::into);
    let env = use_hook(move || {
        try_consume_context::<SocketEnv>()
            .unwrap_or_else(SocketEnv::platform_default)
            .with_connector(Rc::new(connector))
    });
    let inner = use_socket_client(env, url, options);
    UseEventSource {
        ready_state: inner.ready_state,
        last_message: inner.last_message,
        inner,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::testing::test_env;
    use dioxus::dioxus_core::{VNode, VirtualDom};

    fn consumer() -> Element {
        let socket = use_websocket(Some("ws://host/hook"), Options::new().share(true));
        use_hook(|| {
            let _ = socket.send("hello");
        });
        VNode::empty()
    }

    #[test]
    fn component_joins_and_leaves_the_shared_connection() {
        let (env, connector, _) = test_env();
        let mut dom = VirtualDom::new(consumer).with_root_context(env.clone());
        dom.rebuild_in_place();

        assert_eq!(connector.opened(), 1);
        assert_eq!(env.registries.subscribers.count("ws://host/hook"), 1);
        dom.in_runtime(|| connector.last().open());
        assert_eq!(connector.last().sent_texts(), vec!["hello"]);

        drop(dom);
        assert_eq!(connector.last().closes(), 1);
        assert!(env.registries.connections.is_empty());
    }
}
