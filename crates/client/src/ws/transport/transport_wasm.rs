//! Browser transports: `WebSocket` and the read-only `EventSource`.

use std::cell::RefCell;
use std::rc::Rc;

use sockshare_shared::{
    CloseEvent, ErrorEvent, MessageEvent, OpenEvent, ReadyState, TransportEvent, WsError, WsMessage,
};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::js_sys;

use super::{Connector, SocketHandle, Transport, TransportHandlers};

fn message_from_js(data: JsValue) -> Option<WsMessage> {
    if let Some(text) = data.as_string() {
        return Some(WsMessage::Text(text));
    }
    let buffer = data.dyn_into::<js_sys::ArrayBuffer>().ok()?;
    Some(WsMessage::Binary(js_sys::Uint8Array::new(&buffer).to_vec()))
}

// =========================================
// WebSocket
// =========================================

#[derive(Debug, Clone, Copy, Default)]
pub struct BrowserWebSocketConnector;

impl Connector for BrowserWebSocketConnector {
    fn open(&self, url: &str, protocols: &[String]) -> Result<SocketHandle, WsError> {
        let ws = if protocols.is_empty() {
            web_sys::WebSocket::new(url)
        } else {
            let list = js_sys::Array::new();
            for protocol in protocols {
                list.push(&JsValue::from_str(protocol));
            }
            web_sys::WebSocket::new_with_str_sequence(url, &list)
        }
        .map_err(|e| WsError::InvalidUrl {
            url: url.to_string(),
            reason: format!("{:?}", e),
        })?;
        ws.set_binary_type(web_sys::BinaryType::Arraybuffer);

        Ok(Rc::new(BrowserSocket {
            url: url.to_string(),
            ws,
            closures: RefCell::new(None),
        }))
    }
}

struct SocketClosures {
    _open: Closure<dyn FnMut(web_sys::Event)>,
    _close: Closure<dyn FnMut(web_sys::CloseEvent)>,
    _message: Closure<dyn FnMut(web_sys::MessageEvent)>,
    _error: Closure<dyn FnMut(web_sys::Event)>,
}

struct BrowserSocket {
    url: String,
    ws: web_sys::WebSocket,
    closures: RefCell<Option<SocketClosures>>,
}

impl Transport for BrowserSocket {
    fn url(&self) -> &str {
        &self.url
    }

    fn ready_state(&self) -> ReadyState {
        ReadyState::from_code(self.ws.ready_state())
    }

    fn send(&self, message: WsMessage) -> Result<(), WsError> {
        let state = self.ready_state();
        if state != ReadyState::Open {
            return Err(WsError::NotOpen(state));
        }
        match message {
            WsMessage::Text(text) => self.ws.send_with_str(&text),
            WsMessage::Binary(bytes) => self.ws.send_with_u8_array(&bytes),
        }
        .map_err(|e| WsError::Transport(format!("Send failed: {:?}", e)))
    }

    fn close(&self) -> Result<(), WsError> {
        self.ws
            .close()
            .map_err(|e| WsError::Transport(format!("Close failed: {:?}", e)))
    }

    fn bind(&self, handlers: TransportHandlers) {
        let handlers = Rc::new(handlers);

        let url = self.url.clone();
        let on_open = handlers.clone();
        let open = Closure::wrap(Box::new(move |_: web_sys::Event| {
            on_open.dispatch(TransportEvent::Open(OpenEvent { url: url.clone() }));
        }) as Box<dyn FnMut(web_sys::Event)>);
        self.ws.set_onopen(Some(open.as_ref().unchecked_ref()));

        let on_close = handlers.clone();
        let close = Closure::wrap(Box::new(move |e: web_sys::CloseEvent| {
            on_close.dispatch(TransportEvent::Close(CloseEvent {
                code: e.code(),
                reason: e.reason(),
                was_clean: e.was_clean(),
            }));
        }) as Box<dyn FnMut(web_sys::CloseEvent)>);
        self.ws.set_onclose(Some(close.as_ref().unchecked_ref()));

        let on_message = handlers.clone();
        let message = Closure::wrap(Box::new(move |e: web_sys::MessageEvent| {
            if let Some(data) = message_from_js(e.data()) {
                on_message.dispatch(TransportEvent::Message(MessageEvent::new(data)));
            }
        }) as Box<dyn FnMut(web_sys::MessageEvent)>);
        self.ws.set_onmessage(Some(message.as_ref().unchecked_ref()));

        let on_error = handlers;
        let error = Closure::wrap(Box::new(move |_: web_sys::Event| {
            on_error.dispatch(TransportEvent::Error(ErrorEvent::new("WebSocket error")));
        }) as Box<dyn FnMut(web_sys::Event)>);
        self.ws.set_onerror(Some(error.as_ref().unchecked_ref()));

        *self.closures.borrow_mut() = Some(SocketClosures {
            _open: open,
            _close: close,
            _message: message,
            _error: error,
        });
    }

    fn unbind(&self) {
        self.ws.set_onopen(None);
        self.ws.set_onclose(None);
        self.ws.set_onmessage(None);
        self.ws.set_onerror(None);
        release_later(self.closures.borrow_mut().take());
    }
}

impl Drop for BrowserSocket {
    fn drop(&mut self) {
        self.unbind();
    }
}

/// Unbinding can happen from inside one of the callbacks, so the closures
/// are dropped on a later tick rather than while they may be running.
fn release_later<T: 'static>(closures: Option<T>) {
    if let Some(closures) = closures {
        wasm_bindgen_futures::spawn_local(async move {
            drop(closures);
        });
    }
}

// =========================================
// Server-Sent Events
// =========================================

/// Opens `EventSource` streams. Named events are delivered as message events
/// carrying the event name.
#[derive(Debug, Clone, Default)]
pub struct EventSourceConnector {
    events: Vec<String>,
    with_credentials: bool,
}

impl EventSourceConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_events<I, S>(mut self, events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.events = events.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_credentials(mut self, with_credentials: bool) -> Self {
        self.with_credentials = with_credentials;
        self
    }
}

impl Connector for EventSourceConnector {
    fn open(&self, url: &str, _protocols: &[String]) -> Result<SocketHandle, WsError> {
        let init = web_sys::EventSourceInit::new();
        init.set_with_credentials(self.with_credentials);
        let source = web_sys::EventSource::new_with_event_source_init_dict(url, &init).map_err(
            |e| WsError::InvalidUrl {
                url: url.to_string(),
                reason: format!("{:?}", e),
            },
        )?;

        Ok(Rc::new(EventSourceSocket {
            url: url.to_string(),
            source,
            events: self.events.clone(),
            closures: RefCell::new(None),
        }))
    }
}

struct SourceClosures {
    _open: Closure<dyn FnMut(web_sys::Event)>,
    _message: Closure<dyn FnMut(web_sys::MessageEvent)>,
    _error: Closure<dyn FnMut(web_sys::Event)>,
    named: Vec<(String, Closure<dyn FnMut(web_sys::MessageEvent)>)>,
}

struct EventSourceSocket {
    url: String,
    source: web_sys::EventSource,
    events: Vec<String>,
    closures: RefCell<Option<SourceClosures>>,
}

impl Transport for EventSourceSocket {
    fn url(&self) -> &str {
        &self.url
    }

    fn ready_state(&self) -> ReadyState {
        // EventSource has no closing state: 2 means closed
        match self.source.ready_state() {
            0 => ReadyState::Connecting,
            1 => ReadyState::Open,
            _ => ReadyState::Closed,
        }
    }

    fn send(&self, _message: WsMessage) -> Result<(), WsError> {
        Err(WsError::SendUnsupported)
    }

    fn close(&self) -> Result<(), WsError> {
        self.source.close();
        Ok(())
    }

    fn bind(&self, handlers: TransportHandlers) {
        let handlers = Rc::new(handlers);

        let url = self.url.clone();
        let on_open = handlers.clone();
        let open = Closure::wrap(Box::new(move |_: web_sys::Event| {
            on_open.dispatch(TransportEvent::Open(OpenEvent { url: url.clone() }));
        }) as Box<dyn FnMut(web_sys::Event)>);
        self.source.set_onopen(Some(open.as_ref().unchecked_ref()));

        let on_message = handlers.clone();
        let message = Closure::wrap(Box::new(move |e: web_sys::MessageEvent| {
            if let Some(data) = message_from_js(e.data()) {
                on_message.dispatch(TransportEvent::Message(MessageEvent::new(data)));
            }
        }) as Box<dyn FnMut(web_sys::MessageEvent)>);
        self.source.set_onmessage(Some(message.as_ref().unchecked_ref()));

        // The browser retries on its own while readyState stays CONNECTING;
        // only a CLOSED source counts as a close.
        let on_error = handlers.clone();
        let source = self.source.clone();
        let error = Closure::wrap(Box::new(move |_: web_sys::Event| {
            on_error.dispatch(TransportEvent::Error(ErrorEvent::new("EventSource error")));
            if source.ready_state() == 2 {
                on_error.dispatch(TransportEvent::Close(CloseEvent::abnormal(
                    "EventSource closed",
                )));
            }
        }) as Box<dyn FnMut(web_sys::Event)>);
        self.source.set_onerror(Some(error.as_ref().unchecked_ref()));

        let mut named = Vec::new();
        for name in &self.events {
            let on_named = handlers.clone();
            let event_name = name.clone();
            let listener = Closure::wrap(Box::new(move |e: web_sys::MessageEvent| {
                if let Some(data) = message_from_js(e.data()) {
                    on_named.dispatch(TransportEvent::Message(MessageEvent::named(
                        event_name.clone(),
                        data,
                    )));
                }
            }) as Box<dyn FnMut(web_sys::MessageEvent)>);
            if let Err(e) = self
                .source
                .add_event_listener_with_callback(name, listener.as_ref().unchecked_ref())
            {
                crate::log_error!("Failed to listen for '{}' events: {:?}", name, e);
            }
            named.push((name.clone(), listener));
        }

        *self.closures.borrow_mut() = Some(SourceClosures {
            _open: open,
            _message: message,
            _error: error,
            named,
        });
    }

    fn unbind(&self) {
        self.source.set_onopen(None);
        self.source.set_onmessage(None);
        self.source.set_onerror(None);
        let closures = self.closures.borrow_mut().take();
        if let Some(closures) = &closures {
            for (name, listener) in &closures.named {
                let _ = self
                    .source
                    .remove_event_listener_with_callback(name, listener.as_ref().unchecked_ref());
            }
        }
        release_later(closures);
    }
}

impl Drop for EventSourceSocket {
    fn drop(&mut self) {
        self.unbind();
    }
}
