//! Keepalive pings and a staleness watchdog for one physical connection.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use sockshare_shared::{HeartbeatOptions, MessageEvent, ReadyState, WsMessage};

use super::scheduler::{Scheduler, TimerHandle};
use super::transport::{SocketHandle, Transport};

struct HeartbeatState {
    socket: Weak<dyn Transport>,
    options: HeartbeatOptions,
    scheduler: Rc<dyn Scheduler>,
    alive: Cell<bool>,
    stopped: Cell<bool>,
    ping: RefCell<Option<TimerHandle>>,
    watchdog: RefCell<Option<TimerHandle>>,
}

/// Heartbeat for a socket. Does nothing until [`Heartbeat::start`].
#[derive(Clone)]
pub struct Heartbeat {
    state: Rc<HeartbeatState>,
}

impl Heartbeat {
    pub fn new(socket: &SocketHandle, options: HeartbeatOptions, scheduler: Rc<dyn Scheduler>) -> Self {
        Self {
            state: Rc::new(HeartbeatState {
                socket: Rc::downgrade(socket),
                options,
                scheduler,
                alive: Cell::new(false),
                stopped: Cell::new(true),
                ping: RefCell::new(None),
                watchdog: RefCell::new(None),
            }),
        }
    }

    /// Arm both timers. Called when the socket opens.
    pub fn start(&self) {
        self.stop();
        self.state.stopped.set(false);
        self.state.alive.set(false);
        arm_ping(&self.state);
        arm_watchdog(&self.state);
    }

    /// Any inbound message counts as liveness.
    pub fn mark_alive(&self) {
        self.state.alive.set(true);
    }

    /// Whether `message` is the expected pong, which is not delivered.
    pub fn is_pong(&self, message: &MessageEvent) -> bool {
        match (&self.state.options.return_message, message.text()) {
            (Some(pong), Some(text)) => pong == text,
            _ => false,
        }
    }

    pub fn stop(&self) {
        stop(&self.state);
    }

    pub fn is_running(&self) -> bool {
        !self.state.stopped.get()
    }
}

fn stop(state: &HeartbeatState) {
    state.stopped.set(true);
    if let Some(timer) = state.ping.borrow_mut().take() {
        timer.cancel();
    }
    if let Some(timer) = state.watchdog.borrow_mut().take() {
        timer.cancel();
    }
}

/// The socket, if it is still worth keeping alive.
fn live_socket(state: &HeartbeatState) -> Option<SocketHandle> {
    if state.stopped.get() {
        return None;
    }
    let socket = state.socket.upgrade()?;
    if socket.ready_state().is_terminal() {
        stop(state);
        return None;
    }
    Some(socket)
}

fn arm_ping(state: &Rc<HeartbeatState>) {
    let weak = Rc::downgrade(state);
    let timer = state.scheduler.set_timeout(
        state.options.interval(),
        Box::new(move || {
            let Some(state) = weak.upgrade() else { return };
            let Some(socket) = live_socket(&state) else { return };
            if socket.ready_state() == ReadyState::Open {
                let _ = socket.send(WsMessage::Text(state.options.message.clone()));
            }
            arm_ping(&state);
        }),
    );
    *state.ping.borrow_mut() = Some(timer);
}

fn arm_watchdog(state: &Rc<HeartbeatState>) {
    let weak = Rc::downgrade(state);
    let timer = state.scheduler.set_timeout(
        state.options.timeout(),
        Box::new(move || {
            let Some(state) = weak.upgrade() else { return };
            let Some(socket) = live_socket(&state) else { return };
            if !state.alive.replace(false) {
                crate::log_warn!(
                    "No message from {} in {}ms, closing",
                    socket.url(),
                    state.options.timeout_ms
                );
                stop(&state);
                if let Err(e) = socket.close() {
                    crate::log_warn!("Failed to close stale socket {}: {}", socket.url(), e);
                }
                return;
            }
            arm_watchdog(&state);
        }),
    );
    *state.watchdog.borrow_mut() = Some(timer);
}
