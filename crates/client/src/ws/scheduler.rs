//! Task spawning and cancellable timers on the UI thread.
//!
//! Everything in the connection core runs on one logical thread. Reconnect
//! delays and heartbeats use [`Scheduler::set_timeout`] rather than blocking.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use futures_util::future::LocalBoxFuture;

/// Cancellation token for a pending timer.
///
/// Cancelling twice, or after the timer fired, does nothing.
#[derive(Debug, Clone, Default)]
pub struct TimerHandle {
    cancelled: Rc<Cell<bool>>,
}

impl TimerHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.set(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.get()
    }

    /// Wrap a callback so it becomes a no-op once this handle is cancelled.
    pub fn guard(&self, callback: Box<dyn FnOnce()>) -> impl FnOnce() + 'static {
        let handle = self.clone();
        move || {
            if !handle.is_cancelled() {
                callback();
            }
        }
    }
}

pub trait Scheduler {
    /// Run a future on the current thread.
    fn spawn(&self, task: LocalBoxFuture<'static, ()>);

    /// Run `callback` once after `delay` unless the returned handle is cancelled.
    fn set_timeout(&self, delay: Duration, callback: Box<dyn FnOnce()>) -> TimerHandle;
}

/// Native scheduler backed by `tokio::task::spawn_local`.
///
/// Must be used from inside a `tokio::task::LocalSet`.
#[cfg(not(target_arch = "wasm32"))]
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalTokioScheduler;

#[cfg(not(target_arch = "wasm32"))]
impl Scheduler for LocalTokioScheduler {
    fn spawn(&self, task: LocalBoxFuture<'static, ()>) {
        tokio::task::spawn_local(task);
    }

    fn set_timeout(&self, delay: Duration, callback: Box<dyn FnOnce()>) -> TimerHandle {
        let handle = TimerHandle::new();
        let fire = handle.guard(callback);
        tokio::task::spawn_local(async move {
            tokio::time::sleep(delay).await;
            fire();
        });
        handle
    }
}

/// Browser scheduler backed by `wasm_bindgen_futures::spawn_local`.
#[cfg(target_arch = "wasm32")]
#[derive(Debug, Clone, Copy, Default)]
pub struct BrowserScheduler;

#[cfg(target_arch = "wasm32")]
impl Scheduler for BrowserScheduler {
    fn spawn(&self, task: LocalBoxFuture<'static, ()>) {
        wasm_bindgen_futures::spawn_local(task);
    }

    fn set_timeout(&self, delay: Duration, callback: Box<dyn FnOnce()>) -> TimerHandle {
        let handle = TimerHandle::new();
        let fire = handle.guard(callback);
        wasm_bindgen_futures::spawn_local(async move {
            gloo_timers::future::TimeoutFuture::new(delay.as_millis() as u32).await;
            fire();
        });
        handle
    }
}

/// Scheduler for use inside a Dioxus app.
///
/// Tasks are spawned on the root scope so a shared connection keeps running
/// after the component that opened it unmounts.
#[derive(Debug, Clone, Copy, Default)]
pub struct DioxusScheduler;

impl Scheduler for DioxusScheduler {
    fn spawn(&self, task: LocalBoxFuture<'static, ()>) {
        let _ = dioxus::dioxus_core::spawn_forever(task);
    }

    fn set_timeout(&self, delay: Duration, callback: Box<dyn FnOnce()>) -> TimerHandle {
        let handle = TimerHandle::new();
        let fire = handle.guard(callback);
        let _ = dioxus::dioxus_core::spawn_forever(async move {
            sleep(delay).await;
            fire();
        });
        handle
    }
}

#[cfg(target_arch = "wasm32")]
async fn sleep(delay: Duration) {
    gloo_timers::future::TimeoutFuture::new(delay.as_millis() as u32).await;
}

#[cfg(not(target_arch = "wasm32"))]
async fn sleep(delay: Duration) {
    tokio::time::sleep(delay).await;
}

/// The scheduler a UI app should use on this platform.
pub fn default_scheduler() -> Rc<dyn Scheduler> {
    Rc::new(DioxusScheduler)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn guarded_callback_is_skipped_after_cancel() {
        let fired = Rc::new(RefCell::new(0));
        let handle = TimerHandle::new();
        let counter = fired.clone();
        let fire = handle.guard(Box::new(move || *counter.borrow_mut() += 1));
        handle.cancel();
        handle.cancel();
        fire();
        assert_eq!(*fired.borrow(), 0);
        assert!(handle.is_cancelled());
    }
}
