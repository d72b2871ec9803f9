//! The per-consumer façade over the connection core.
//!
//! A `WebSocketClient` owns the consumer's message queue, its "expect close"
//! flag and its reconnect controller. It builds a fresh subscriber record on
//! every (re)start and hands it to [`create_or_join`].

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use serde::{de::DeserializeOwned, Serialize};
use sockshare_shared::{MessageEvent, ReadyState, WsError, WsMessage};

use super::env::SocketEnv;
use super::factory::{create_or_join, Teardown};
use super::guard::SocketGuard;
use super::options::{Options, OptionsCell};
use super::reconnect::{ReconnectController, ReconnectDecision, ReconnectTrigger};
use super::subscriber::{RestartFn, Setters, Subscriber};
use super::transport::SocketHandle;
use super::url::{append_query_params, UrlSource};

type ReadyStateObserver = Rc<dyn Fn(ReadyState)>;
type MessageObserver = Rc<dyn Fn(&MessageEvent)>;

pub(crate) struct ClientInner {
    env: SocketEnv,
    url: RefCell<Option<UrlSource>>,
    resolved_url: RefCell<Option<String>>,
    options: OptionsCell,
    reconnect: ReconnectController,
    ready_state: Cell<ReadyState>,
    last_message: RefCell<Option<MessageEvent>>,
    /// Set right before an intentional teardown; suppresses delivery until
    /// the next start.
    expect_close: Cell<bool>,
    queue: RefCell<VecDeque<WsMessage>>,
    socket: RefCell<Option<SocketHandle>>,
    teardown: RefCell<Option<Teardown>>,
    /// Bumped on every start and close so a late URL resolution is dropped.
    generation: Cell<u64>,
    state_observers: RefCell<Vec<ReadyStateObserver>>,
    message_observers: RefCell<Vec<MessageObserver>>,
}

impl ClientInner {
    fn subscriber(self: &Rc<Self>) -> Rc<Subscriber> {
        let weak = Rc::downgrade(self);
        let on_message = weak.clone();
        let on_state = weak.clone();
        Subscriber::new(
            Setters {
                set_last_message: Rc::new(move |message| {
                    if let Some(inner) = on_message.upgrade() {
                        inner.apply_message(message);
                    }
                }),
                set_ready_state: Rc::new(move |state| {
                    if let Some(inner) = on_state.upgrade() {
                        inner.apply_ready_state(state);
                    }
                }),
            },
            self.options.clone(),
            self.reconnect.clone(),
            Rc::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.restart();
                }
            }),
        )
    }

    fn start(self: &Rc<Self>) {
        let generation = self.generation.get() + 1;
        self.generation.set(generation);
        self.expect_close.set(false);
        self.reconnect.resume();

        let source = self.url.borrow().clone();
        match source {
            None => self.apply_ready_state(ReadyState::Uninstantiated),
            Some(UrlSource::Static(url)) => self.connect(url),
            Some(UrlSource::Deferred(resolve)) => {
                self.apply_ready_state(ReadyState::Connecting);
                let weak = Rc::downgrade(self);
                let pending = resolve();
                self.env.scheduler.spawn(Box::pin(async move {
                    let resolved = pending.await;
                    let Some(inner) = weak.upgrade() else { return };
                    if inner.generation.get() != generation {
                        crate::log_debug!("Discarding a URL resolved for a previous start");
                        return;
                    }
                    match resolved {
                        Ok(url) => inner.connect(url),
                        Err(e) => inner.url_failed(e),
                    }
                }));
            }
        }
    }

    /// A deferred URL could not be produced. Retried like a transport error;
    /// the label stays `Connecting` while a retry is pending.
    fn url_failed(self: &Rc<Self>, error: WsError) {
        crate::log_warn!("Could not resolve socket URL: {}", error);
        let weak = Rc::downgrade(self);
        let restart: RestartFn = Rc::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.restart();
            }
        });
        let options = self.options.current();
        match self.reconnect.evaluate(&options, ReconnectTrigger::Error, restart) {
            ReconnectDecision::Scheduled(_) | ReconnectDecision::AlreadyScheduled => {}
            ReconnectDecision::Declined | ReconnectDecision::Exhausted => {
                self.apply_ready_state(ReadyState::Closed);
            }
        }
    }

    fn connect(self: &Rc<Self>, base_url: String) {
        let options = self.options.current();
        let url = append_query_params(&base_url, &options.query_params);
        *self.resolved_url.borrow_mut() = Some(url.clone());

        let subscriber = self.subscriber();
        match create_or_join(&self.env, &url, &subscriber) {
            Ok(joined) => {
                *self.socket.borrow_mut() = Some(joined.socket);
                *self.teardown.borrow_mut() = Some(joined.teardown);
                // A late joiner may already be open.
                if self.ready_state.get().is_open() {
                    self.flush();
                }
            }
            Err(e) => {
                crate::log_error!("Could not connect to {}: {}", url, e);
                self.apply_ready_state(ReadyState::Closed);
            }
        }
    }

    /// Tear the current connection down and start again.
    fn restart(self: &Rc<Self>) {
        self.expect_close.set(true);
        self.run_teardown();
        self.start();
    }

    fn run_teardown(&self) {
        let teardown = self.teardown.borrow_mut().take();
        self.socket.borrow_mut().take();
        if let Some(teardown) = teardown {
            if let Err(e) = teardown.run() {
                crate::log_error!("Teardown failed: {}", e);
            }
        }
    }

    fn apply_ready_state(&self, state: ReadyState) {
        if self.expect_close.get() {
            return;
        }
        self.ready_state.set(state);
        let observers = self.state_observers.borrow().clone();
        for observer in observers {
            observer(state);
        }
        if state.is_open() {
            self.flush();
        }
    }

    fn apply_message(&self, message: MessageEvent) {
        if self.expect_close.get() {
            return;
        }
        *self.last_message.borrow_mut() = Some(message.clone());
        let observers = self.message_observers.borrow().clone();
        for observer in observers {
            observer(&message);
        }
    }

    /// The connection sends should go to. In shared mode this is whatever
    /// the registry holds for the URL now.
    fn live_socket(&self) -> Option<SocketHandle> {
        if self.options.current().share {
            if let Some(url) = self.resolved_url.borrow().as_deref() {
                if let Some(shared) = self.env.registries.connections.get(url) {
                    return Some(shared);
                }
            }
        }
        self.socket.borrow().clone()
    }

    fn flush(&self) {
        let Some(socket) = self.live_socket() else { return };
        loop {
            let Some(message) = self.queue.borrow_mut().pop_front() else {
                break;
            };
            if let Err(e) = socket.send(message.clone()) {
                crate::log_warn!("Flush to {} interrupted: {}", socket.url(), e);
                self.queue.borrow_mut().push_front(message);
                break;
            }
        }
    }

    pub(crate) fn send_with(&self, message: WsMessage, keep: bool) -> Result<(), WsError> {
        let state = self.ready_state.get();
        if state.is_open() && self.queue.borrow().is_empty() {
            if let Some(socket) = self.live_socket() {
                if socket.ready_state().is_open() {
                    return socket.send(message);
                }
            }
        }
        if keep {
            self.queue.borrow_mut().push_back(message);
            Ok(())
        } else {
            Err(WsError::NotOpen(state))
        }
    }

    pub(crate) fn manual_reconnect(self: &Rc<Self>) {
        self.reconnect.cancel();
        self.reconnect.reset();
        self.restart();
    }

    fn close(&self) -> Result<(), WsError> {
        self.generation.set(self.generation.get() + 1);
        self.expect_close.set(true);
        self.reconnect.shut_down();
        let teardown = self.teardown.borrow_mut().take();
        self.socket.borrow_mut().take();
        if self.ready_state.get() != ReadyState::Uninstantiated {
            self.ready_state.set(ReadyState::Closed);
        }
        match teardown {
            Some(teardown) => teardown.run(),
            None => Ok(()),
        }
    }
}

/// One consumer of a socket URL.
///
/// Dropping the client closes it.
pub struct WebSocketClient {
    inner: Rc<ClientInner>,
}

impl WebSocketClient {
    /// Create a client without connecting. Call [`WebSocketClient::start`].
    pub fn new(env: SocketEnv, url: Option<UrlSource>, options: Options) -> Self {
        let reconnect = ReconnectController::new(env.scheduler.clone());
        Self {
            inner: Rc::new(ClientInner {
                env,
                url: RefCell::new(url),
                resolved_url: RefCell::new(None),
                options: OptionsCell::new(options),
                reconnect,
                ready_state: Cell::new(ReadyState::Uninstantiated),
                last_message: RefCell::new(None),
                expect_close: Cell::new(false),
                queue: RefCell::new(VecDeque::new()),
                socket: RefCell::new(None),
                teardown: RefCell::new(None),
                generation: Cell::new(0),
                state_observers: RefCell::new(Vec::new()),
                message_observers: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Create and start.
    pub fn connect(env: SocketEnv, url: impl Into<UrlSource>, options: Options) -> Self {
        let client = Self::new(env, Some(url.into()), options);
        client.start();
        client
    }

    /// Begin connecting, replacing any current connection.
    pub fn start(&self) {
        if self.inner.teardown.borrow().is_some() {
            self.inner.restart();
        } else {
            self.inner.start();
        }
    }

    /// Send now if open, otherwise queue until the next open.
    pub fn send(&self, message: impl Into<WsMessage>) -> Result<(), WsError> {
        self.inner.send_with(message.into(), true)
    }

    /// Like [`send`](Self::send), but with `keep == false` a message sent
    /// while not open is dropped and `NotOpen` is returned.
    pub fn send_with(&self, message: impl Into<WsMessage>, keep: bool) -> Result<(), WsError> {
        self.inner.send_with(message.into(), keep)
    }

    pub fn send_json<T: Serialize>(&self, value: &T) -> Result<(), WsError> {
        let text = serde_json::to_string(value)?;
        self.send(text)
    }

    pub fn ready_state(&self) -> ReadyState {
        self.inner.ready_state.get()
    }

    pub fn last_message(&self) -> Option<MessageEvent> {
        self.inner.last_message.borrow().clone()
    }

    /// The last text message parsed as JSON.
    pub fn last_json<T: DeserializeOwned>(&self) -> Option<T> {
        self.inner.last_message.borrow().as_ref()?.data.json()
    }

    /// Messages waiting for the connection to open.
    pub fn queued(&self) -> usize {
        self.inner.queue.borrow().len()
    }

    /// The URL of the current connection, query parameters included.
    pub fn url(&self) -> Option<String> {
        self.inner.resolved_url.borrow().clone()
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.reconnect.attempts()
    }

    pub fn options(&self) -> Rc<Options> {
        self.inner.options.current()
    }

    pub fn get_socket(&self) -> Option<SocketGuard> {
        let socket = self.inner.live_socket()?;
        Some(SocketGuard::new(Rc::downgrade(&self.inner), socket))
    }

    /// Restart now with a fresh attempt budget.
    pub fn reconnect(&self) {
        self.inner.manual_reconnect();
    }

    /// Replace the options. Handlers already bound read the new version on
    /// their next event.
    pub fn set_options(&self, options: Options) -> Result<(), WsError> {
        if self.inner.options.current().enforce_static_options {
            return Err(WsError::StaticOptions);
        }
        self.inner.options.replace(options);
        Ok(())
    }

    /// Point the client somewhere else and restart.
    pub fn set_url(&self, url: Option<UrlSource>) {
        *self.inner.url.borrow_mut() = url;
        self.inner.restart();
    }

    /// Stop for good: ignore in-flight events, cancel a pending retry, leave
    /// the subscriber set and close the connection if it was the last one.
    pub fn close(&self) -> Result<(), WsError> {
        self.inner.close()
    }

    pub fn on_ready_state(&self, observer: impl Fn(ReadyState) + 'static) {
        self.inner.state_observers.borrow_mut().push(Rc::new(observer));
    }

    pub fn on_message(&self, observer: impl Fn(&MessageEvent) + 'static) {
        self.inner.message_observers.borrow_mut().push(Rc::new(observer));
    }
}

impl Drop for WebSocketClient {
    fn drop(&mut self) {
        if let Err(e) = self.inner.close() {
            crate::log_error!("Error closing socket client: {}", e);
        }
    }
}
