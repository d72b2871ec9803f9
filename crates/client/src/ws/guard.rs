use std::rc::{Rc, Weak};

use sockshare_shared::{ReadyState, WsError, WsMessage};

use super::client::ClientInner;
use super::transport::SocketHandle;

/// Read-mostly view of a consumer's connection.
///
/// The transport's callbacks belong to the fan-out and cannot be reached
/// through a guard; neither can a raw `close`. Sends go through the owning
/// client, so they queue while the connection is down.
#[derive(Clone)]
pub struct SocketGuard {
    client: Weak<ClientInner>,
    socket: SocketHandle,
}

impl SocketGuard {
    pub(crate) fn new(client: Weak<ClientInner>, socket: SocketHandle) -> Self {
        Self { client, socket }
    }

    pub fn url(&self) -> &str {
        self.socket.url()
    }

    /// Live state of the transport, not the consumer's label.
    pub fn ready_state(&self) -> ReadyState {
        self.socket.ready_state()
    }

    pub fn send(&self, message: impl Into<WsMessage>) -> Result<(), WsError> {
        match self.client.upgrade() {
            Some(client) => client.send_with(message.into(), true),
            None => Err(WsError::NotOpen(ReadyState::Closed)),
        }
    }

    /// Restart the owning client with a fresh attempt budget.
    pub fn reconnect(&self) {
        if let Some(client) = self.client.upgrade() {
            client.manual_reconnect();
        }
    }
}

impl std::fmt::Debug for SocketGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketGuard")
            .field("url", &self.url())
            .field("ready_state", &self.ready_state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::ws::client::WebSocketClient;
    use crate::ws::options::Options;
    use crate::ws::testing::test_env;
    use sockshare_shared::{ReadyState, WsError};

    #[test]
    fn guard_sends_through_the_client() {
        let (env, connector, _) = test_env();
        let client = WebSocketClient::connect(env, "ws://host/x", Options::new());
        let guard = client.get_socket().unwrap();
        assert_eq!(guard.url(), "ws://host/x");
        assert_eq!(guard.ready_state(), ReadyState::Connecting);

        guard.send("queued").unwrap();
        assert_eq!(client.queued(), 1);
        connector.last().open();
        assert_eq!(connector.last().sent_texts(), vec!["queued"]);
    }

    #[test]
    fn guard_outliving_its_client_cannot_send() {
        let (env, _, _) = test_env();
        let client = WebSocketClient::connect(env, "ws://host/x", Options::new());
        let guard = client.get_socket().unwrap();
        drop(client);
        assert_eq!(
            guard.send("late").unwrap_err(),
            WsError::NotOpen(ReadyState::Closed)
        );
        guard.reconnect();
    }

    #[test]
    fn guard_reconnect_restarts_the_client() {
        let (env, connector, _) = test_env();
        let client = WebSocketClient::connect(env, "ws://host/x", Options::new());
        client.get_socket().unwrap().reconnect();
        assert_eq!(connector.opened(), 2);
        assert_eq!(client.ready_state(), ReadyState::Connecting);
    }
}
