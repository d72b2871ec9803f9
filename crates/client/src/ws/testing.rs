//! Test doubles: a scripted transport, its connector and a virtual clock.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use futures::executor::{LocalPool, LocalSpawner};
use futures::task::LocalSpawnExt;
use futures_util::future::LocalBoxFuture;
use sockshare_shared::{
    CloseEvent, ErrorEvent, MessageEvent, OpenEvent, ReadyState, TransportEvent, WsError, WsMessage,
};

use super::env::SocketEnv;
use super::options::OptionsCell;
use super::reconnect::ReconnectController;
use super::registry::SocketRegistries;
use super::scheduler::{Scheduler, TimerHandle};
use super::subscriber::{Setters, Subscriber};
use super::transport::{Connector, SocketHandle, Transport, TransportHandlers};

// =========================================
// Virtual time
// =========================================

struct PendingTimer {
    deadline: Duration,
    seq: u64,
    handle: TimerHandle,
    callback: Box<dyn FnOnce()>,
}

/// Timers only fire from [`ManualScheduler::advance`]; spawned futures run
/// on a `LocalPool` whenever time is advanced or the pool is drained.
pub struct ManualScheduler {
    now: Cell<Duration>,
    seq: Cell<u64>,
    timers: RefCell<Vec<PendingTimer>>,
    pool: RefCell<LocalPool>,
    spawner: LocalSpawner,
}

impl ManualScheduler {
    pub fn new() -> Rc<Self> {
        let pool = LocalPool::new();
        let spawner = pool.spawner();
        Rc::new(Self {
            now: Cell::new(Duration::ZERO),
            seq: Cell::new(0),
            timers: RefCell::new(Vec::new()),
            pool: RefCell::new(pool),
            spawner,
        })
    }

    pub fn run_until_stalled(&self) {
        self.pool.borrow_mut().run_until_stalled();
    }

    /// Live (not cancelled, not fired) timers.
    pub fn pending_timers(&self) -> usize {
        self.timers
            .borrow()
            .iter()
            .filter(|timer| !timer.handle.is_cancelled())
            .count()
    }

    /// Move the clock forward, firing due timers in deadline order.
    pub fn advance(&self, by: Duration) {
        let target = self.now.get() + by;
        loop {
            self.run_until_stalled();
            let next = {
                let mut timers = self.timers.borrow_mut();
                timers.retain(|timer| !timer.handle.is_cancelled());
                timers
                    .iter()
                    .enumerate()
                    .filter(|(_, timer)| timer.deadline <= target)
                    .min_by_key(|(_, timer)| (timer.deadline, timer.seq))
                    .map(|(index, _)| index)
                    .map(|index| timers.remove(index))
            };
            let Some(timer) = next else { break };
            self.now.set(timer.deadline);
            (timer.callback)();
        }
        self.now.set(target);
        self.run_until_stalled();
    }
}

impl Scheduler for ManualScheduler {
    fn spawn(&self, task: LocalBoxFuture<'static, ()>) {
        if let Err(e) = self.spawner.spawn_local(task) {
            panic!("test pool is gone: {e}");
        }
    }

    fn set_timeout(&self, delay: Duration, callback: Box<dyn FnOnce()>) -> TimerHandle {
        let handle = TimerHandle::new();
        let seq = self.seq.get();
        self.seq.set(seq + 1);
        self.timers.borrow_mut().push(PendingTimer {
            deadline: self.now.get() + delay,
            seq,
            handle: handle.clone(),
            callback: Box::new(handle.guard(callback)),
        });
        handle
    }
}

// =========================================
// Scripted transport
// =========================================

/// A transport whose events are driven by the test.
pub struct MockSocket {
    url: String,
    pub protocols: Vec<String>,
    state: Cell<ReadyState>,
    handlers: RefCell<Option<Rc<TransportHandlers>>>,
    sent: RefCell<Vec<WsMessage>>,
    closes: Cell<u32>,
    binds: Cell<u32>,
    fail_close: Cell<bool>,
}

impl MockSocket {
    fn new(url: &str, protocols: &[String]) -> Self {
        Self {
            url: url.to_string(),
            protocols: protocols.to_vec(),
            state: Cell::new(ReadyState::Connecting),
            handlers: RefCell::new(None),
            sent: RefCell::new(Vec::new()),
            closes: Cell::new(0),
            binds: Cell::new(0),
            fail_close: Cell::new(false),
        }
    }

    fn emit(&self, event: TransportEvent) {
        let handlers = self.handlers.borrow().clone();
        if let Some(handlers) = handlers {
            handlers.dispatch(event);
        }
    }

    /// Finish the handshake.
    pub fn open(&self) {
        self.state.set(ReadyState::Open);
        self.emit(TransportEvent::Open(OpenEvent {
            url: self.url.clone(),
        }));
    }

    pub fn receive(&self, text: &str) {
        self.emit(TransportEvent::Message(MessageEvent::new(text)));
    }

    /// The peer went away with `code`.
    pub fn server_close(&self, code: u16) {
        self.state.set(ReadyState::Closed);
        self.emit(TransportEvent::Close(CloseEvent {
            code,
            reason: String::new(),
            was_clean: code == 1000,
        }));
    }

    pub fn fail(&self) {
        self.emit(TransportEvent::Error(ErrorEvent::new("mock failure")));
    }

    pub fn fail_close(&self) {
        self.fail_close.set(true);
    }

    pub fn sent(&self) -> Vec<WsMessage> {
        self.sent.borrow().clone()
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.sent
            .borrow()
            .iter()
            .filter_map(|message| message.as_text().map(str::to_string))
            .collect()
    }

    pub fn closes(&self) -> u32 {
        self.closes.get()
    }

    pub fn binds(&self) -> u32 {
        self.binds.get()
    }

    pub fn is_bound(&self) -> bool {
        self.handlers.borrow().is_some()
    }
}

impl Transport for MockSocket {
    fn url(&self) -> &str {
        &self.url
    }

    fn ready_state(&self) -> ReadyState {
        self.state.get()
    }

    fn send(&self, message: WsMessage) -> Result<(), WsError> {
        let state = self.state.get();
        if state != ReadyState::Open {
            return Err(WsError::NotOpen(state));
        }
        self.sent.borrow_mut().push(message);
        Ok(())
    }

    fn close(&self) -> Result<(), WsError> {
        self.closes.set(self.closes.get() + 1);
        if self.fail_close.get() {
            return Err(WsError::Transport("already closed".to_string()));
        }
        self.state.set(ReadyState::Closed);
        Ok(())
    }

    fn bind(&self, handlers: TransportHandlers) {
        self.binds.set(self.binds.get() + 1);
        *self.handlers.borrow_mut() = Some(Rc::new(handlers));
    }

    fn unbind(&self) {
        self.handlers.borrow_mut().take();
    }
}

/// Records every socket it opens.
#[derive(Default)]
pub struct MockConnector {
    sockets: RefCell<Vec<Rc<MockSocket>>>,
}

impl MockConnector {
    pub fn open_mock(&self, url: &str) -> Rc<MockSocket> {
        self.open_with(url, &[])
    }

    fn open_with(&self, url: &str, protocols: &[String]) -> Rc<MockSocket> {
        let socket = Rc::new(MockSocket::new(url, protocols));
        self.sockets.borrow_mut().push(socket.clone());
        socket
    }

    /// Number of physical connections opened so far.
    pub fn opened(&self) -> usize {
        self.sockets.borrow().len()
    }

    pub fn socket(&self, index: usize) -> Rc<MockSocket> {
        self.sockets.borrow()[index].clone()
    }

    pub fn last(&self) -> Rc<MockSocket> {
        self.sockets
            .borrow()
            .last()
            .cloned()
            .unwrap_or_else(|| panic!("no socket was opened"))
    }
}

impl Connector for MockConnector {
    fn open(&self, url: &str, protocols: &[String]) -> Result<SocketHandle, WsError> {
        let socket: SocketHandle = self.open_with(url, protocols);
        Ok(socket)
    }
}

// =========================================
// Fixtures
// =========================================

pub fn test_env() -> (SocketEnv, Rc<MockConnector>, Rc<ManualScheduler>) {
    let scheduler = ManualScheduler::new();
    let connector = Rc::new(MockConnector::default());
    let env = SocketEnv::new(SocketRegistries::new(), connector.clone(), scheduler.clone());
    (env, connector, scheduler)
}

pub fn noop_subscriber(env: &SocketEnv) -> Rc<Subscriber> {
    Subscriber::new(
        Setters {
            set_last_message: Rc::new(|_| {}),
            set_ready_state: Rc::new(|_| {}),
        },
        OptionsCell::default(),
        ReconnectController::new(env.scheduler.clone()),
        Rc::new(|| {}),
    )
}

/// A subscriber that records what the fan-out delivers to it.
pub struct Recorder {
    pub subscriber: Rc<Subscriber>,
    pub states: Rc<RefCell<Vec<ReadyState>>>,
    pub messages: Rc<RefCell<Vec<MessageEvent>>>,
    pub restarts: Rc<Cell<u32>>,
}

impl Recorder {
    pub fn new(env: &SocketEnv, options: super::options::Options) -> Self {
        let states = Rc::new(RefCell::new(Vec::new()));
        let messages = Rc::new(RefCell::new(Vec::new()));
        let restarts = Rc::new(Cell::new(0));
        let (seen_states, seen_messages, seen_restarts) =
            (states.clone(), messages.clone(), restarts.clone());
        let subscriber = Subscriber::new(
            Setters {
                set_last_message: Rc::new(move |message| seen_messages.borrow_mut().push(message)),
                set_ready_state: Rc::new(move |state| seen_states.borrow_mut().push(state)),
            },
            OptionsCell::new(options),
            ReconnectController::new(env.scheduler.clone()),
            Rc::new(move || seen_restarts.set(seen_restarts.get() + 1)),
        );
        Self {
            subscriber,
            states,
            messages,
            restarts,
        }
    }

    pub fn last_state(&self) -> Option<ReadyState> {
        self.states.borrow().last().copied()
    }

    pub fn message_texts(&self) -> Vec<String> {
        self.messages
            .borrow()
            .iter()
            .filter_map(|message| message.text().map(str::to_string))
            .collect()
    }
}
