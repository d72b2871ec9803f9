//! Creates a physical connection for a consumer, or joins the shared one.

use std::rc::Rc;

use sockshare_shared::{ReadyState, WsError};

use super::env::SocketEnv;
use super::fanout::{bind_exclusive, bind_shared};
use super::heartbeat::Heartbeat;
use super::subscriber::Subscriber;
use super::transport::{same_socket, SocketHandle};

/// Undo a [`create_or_join`]. Runs at most once.
pub struct Teardown(Box<dyn FnOnce() -> Result<(), WsError>>);

impl Teardown {
    pub fn new(run: impl FnOnce() -> Result<(), WsError> + 'static) -> Self {
        Self(Box::new(run))
    }

    pub fn run(self) -> Result<(), WsError> {
        (self.0)()
    }
}

impl std::fmt::Debug for Teardown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Teardown(..)")
    }
}

/// The connection a consumer ended up on.
#[derive(Debug)]
pub struct Joined {
    pub socket: SocketHandle,
    pub teardown: Teardown,
}

/// Give `subscriber` a connection to `url`.
///
/// Unshared consumers always get a fresh connection. Shared consumers reuse
/// the registered connection for `url` when there is one. Everything here
/// runs synchronously, so the first caller for a URL creates the connection
/// before a second caller can look for it.
pub fn create_or_join(env: &SocketEnv, url: &str, subscriber: &Rc<Subscriber>) -> Result<Joined, WsError> {
    let options = subscriber.options.current();

    if !options.share {
        subscriber.set_ready_state(ReadyState::Connecting);
        let socket = env.connector.open(url, &options.protocols)?;
        crate::log_debug!("Opened exclusive connection to {} for {}", url, subscriber.id());
        let teardown = bind_exclusive(env, &socket, subscriber);
        return Ok(Joined { socket, teardown });
    }

    let connections = &env.registries.connections;
    let socket = match connections.get(url) {
        Some(existing) => {
            // A late joiner sees the live state, not a stale "connecting".
            subscriber.set_ready_state(existing.ready_state());
            existing
        }
        None => {
            subscriber.set_ready_state(ReadyState::Connecting);
            let socket = env.connector.open(url, &options.protocols)?;
            connections.set(url, socket.clone());
            let heartbeat = options
                .heartbeat
                .clone()
                .map(|heartbeat| Heartbeat::new(&socket, heartbeat, env.scheduler.clone()));
            bind_shared(env, url, &socket, heartbeat);
            crate::log_debug!("Opened shared connection to {}", url);
            socket
        }
    };
    env.registries.subscribers.add(url, subscriber);

    let registries = env.registries.clone();
    let url = url.to_string();
    let subscriber = subscriber.clone();
    let handle = socket.clone();
    let teardown = Teardown::new(move || {
        subscriber.reconnect.cancel();
        registries.subscribers.remove(&url, &subscriber)?;
        if !registries.subscribers.has_any(&url) {
            handle.unbind();
            if let Err(e) = handle.close() {
                crate::log_warn!("Ignoring close failure for {}: {}", url, e);
            }
            if registries
                .connections
                .get(&url)
                .is_some_and(|current| same_socket(&current, &handle))
            {
                registries.connections.delete(&url);
            }
            crate::log_debug!("Last subscriber left {}, connection closed", url);
        }
        Ok(())
    });

    Ok(Joined { socket, teardown })
}
