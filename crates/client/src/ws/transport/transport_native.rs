//! Native/Desktop WebSocket transport using tokio-tungstenite.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use futures_channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures_util::{SinkExt, StreamExt};
use sockshare_shared::{
    CloseEvent, ErrorEvent, MessageEvent, OpenEvent, ReadyState, TransportEvent, WsError, WsMessage,
};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use super::{Connector, SocketHandle, Transport, TransportHandlers};
use crate::ws::Scheduler;

/// Opens tokio-tungstenite connections on a local task.
pub struct TungsteniteConnector {
    scheduler: Rc<dyn Scheduler>,
}

impl TungsteniteConnector {
    pub fn new(scheduler: Rc<dyn Scheduler>) -> Self {
        Self { scheduler }
    }
}

impl Connector for TungsteniteConnector {
    fn open(&self, url: &str, protocols: &[String]) -> Result<SocketHandle, WsError> {
        let request = build_request(url, protocols)?;
        let (sender, receiver) = unbounded();
        let inner = Rc::new(SocketInner {
            url: url.to_string(),
            state: Cell::new(ReadyState::Connecting),
            handlers: RefCell::new(None),
        });

        self.scheduler
            .spawn(Box::pin(run_socket(inner.clone(), request, receiver)));

        Ok(Rc::new(NativeSocket { inner, sender }))
    }
}

fn build_request(url: &str, protocols: &[String]) -> Result<Request, WsError> {
    let invalid = |reason: String| WsError::InvalidUrl {
        url: url.to_string(),
        reason,
    };
    let mut request = url.into_client_request().map_err(|e| invalid(e.to_string()))?;
    if !protocols.is_empty() {
        let value = HeaderValue::from_str(&protocols.join(", ")).map_err(|e| invalid(e.to_string()))?;
        request.headers_mut().insert("Sec-WebSocket-Protocol", value);
    }
    Ok(request)
}

enum Outgoing {
    Message(WsMessage),
    Close,
}

struct SocketInner {
    url: String,
    state: Cell<ReadyState>,
    handlers: RefCell<Option<Rc<TransportHandlers>>>,
}

impl SocketInner {
    fn emit(&self, event: TransportEvent) {
        // Handlers may unbind while running, so never hold the borrow.
        let handlers = self.handlers.borrow().clone();
        if let Some(handlers) = handlers {
            handlers.dispatch(event);
        }
    }
}

struct NativeSocket {
    inner: Rc<SocketInner>,
    sender: UnboundedSender<Outgoing>,
}

impl Transport for NativeSocket {
    fn url(&self) -> &str {
        &self.inner.url
    }

    fn ready_state(&self) -> ReadyState {
        self.inner.state.get()
    }

    fn send(&self, message: WsMessage) -> Result<(), WsError> {
        let state = self.inner.state.get();
        if state != ReadyState::Open {
            return Err(WsError::NotOpen(state));
        }
        self.sender
            .unbounded_send(Outgoing::Message(message))
            .map_err(|e| WsError::Transport(format!("Failed to send: {}", e)))
    }

    fn close(&self) -> Result<(), WsError> {
        if self.inner.state.get().is_terminal() {
            return Ok(());
        }
        self.inner.state.set(ReadyState::Closing);
        self.sender
            .unbounded_send(Outgoing::Close)
            .map_err(|e| WsError::Transport(format!("Failed to close: {}", e)))
    }

    fn bind(&self, handlers: TransportHandlers) {
        *self.inner.handlers.borrow_mut() = Some(Rc::new(handlers));
    }

    fn unbind(&self) {
        self.inner.handlers.borrow_mut().take();
    }
}

/// Connect, then pump frames in both directions until either side closes.
async fn run_socket(
    inner: Rc<SocketInner>,
    request: Request,
    mut outgoing: UnboundedReceiver<Outgoing>,
) {
    let url = inner.url.clone();

    let stream = tokio::select! {
        result = connect_async(request) => match result {
            Ok((stream, _response)) => stream,
            Err(e) => {
                crate::log_error!("WebSocket error for {}: {}", url, e);
                inner.state.set(ReadyState::Closed);
                inner.emit(TransportEvent::Error(ErrorEvent::new(e.to_string())));
                inner.emit(TransportEvent::Close(CloseEvent::abnormal(e.to_string())));
                return;
            }
        },
        _ = outgoing.next() => {
            crate::log_debug!("WebSocket to {} closed before the handshake finished", url);
            inner.state.set(ReadyState::Closed);
            inner.emit(TransportEvent::Close(CloseEvent::abnormal(
                "closed before the connection was established",
            )));
            return;
        }
    };

    inner.state.set(ReadyState::Open);
    crate::log_info!("WebSocket connected to {}", url);
    inner.emit(TransportEvent::Open(OpenEvent { url: url.clone() }));

    let (mut write, mut read) = stream.split();
    let mut close_event = None;

    loop {
        tokio::select! {
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    inner.emit(TransportEvent::Message(MessageEvent::new(text.as_str().to_owned())));
                }
                Some(Ok(Message::Binary(bytes))) => {
                    inner.emit(TransportEvent::Message(MessageEvent::new(bytes.to_vec())));
                }
                Some(Ok(Message::Close(frame))) => {
                    crate::log_info!("WebSocket to {} received close frame", url);
                    close_event = Some(match frame {
                        Some(frame) => CloseEvent {
                            code: u16::from(frame.code),
                            reason: frame.reason.as_str().to_owned(),
                            was_clean: true,
                        },
                        None => CloseEvent::normal(),
                    });
                    break;
                }
                Some(Ok(_)) => {
                    // Ping/pong are answered by tungstenite
                }
                Some(Err(e)) => {
                    crate::log_error!("WebSocket read error: {}", e);
                    inner.emit(TransportEvent::Error(ErrorEvent::new(e.to_string())));
                    close_event = Some(CloseEvent::abnormal(e.to_string()));
                    break;
                }
                None => break,
            },
            command = outgoing.next() => match command {
                Some(Outgoing::Message(message)) => {
                    let frame = match message {
                        WsMessage::Text(text) => Message::text(text),
                        WsMessage::Binary(bytes) => Message::binary(bytes),
                    };
                    if let Err(e) = write.send(frame).await {
                        crate::log_error!("Send failed: {}", e);
                        inner.emit(TransportEvent::Error(ErrorEvent::new(e.to_string())));
                        close_event = Some(CloseEvent::abnormal(e.to_string()));
                        break;
                    }
                }
                Some(Outgoing::Close) | None => {
                    inner.state.set(ReadyState::Closing);
                    close_event = Some(CloseEvent::normal());
                    break;
                }
            }
        }
    }

    let _ = write.close().await;
    inner.state.set(ReadyState::Closed);
    crate::log_info!("WebSocket to {} closed", url);
    inner.emit(TransportEvent::Close(
        close_event.unwrap_or_else(|| CloseEvent::abnormal("connection dropped")),
    ));
}
