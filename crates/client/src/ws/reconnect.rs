//! Per-consumer reconnect policy: `Idle -> Scheduled -> Idle` on a successful
//! retry, `Idle -> Stopped` once the attempt budget is spent.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use sockshare_shared::CloseEvent;

use super::options::Options;
use super::scheduler::{Scheduler, TimerHandle};
use super::subscriber::RestartFn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectState {
    Idle,
    Scheduled,
    Stopped,
}

/// What caused a reconnect evaluation.
#[derive(Debug, Clone, Copy)]
pub enum ReconnectTrigger<'a> {
    Close(&'a CloseEvent),
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// The policy does not want a retry for this trigger.
    Declined,
    Scheduled(Duration),
    /// A retry is already pending; no second timer.
    AlreadyScheduled,
    /// Budget spent; `on_reconnect_stop` has been notified.
    Exhausted,
}

struct ControllerInner {
    scheduler: Rc<dyn Scheduler>,
    attempts: Cell<u32>,
    pending: RefCell<Option<TimerHandle>>,
    stopped: Cell<bool>,
    /// Set when the owning consumer closed for good; every trigger is
    /// declined until the next start.
    shut_down: Cell<bool>,
}

/// Attempt counter and pending retry timer for one consumer.
///
/// Clones share state. Errors raised by the restart function are not caught.
#[derive(Clone)]
pub struct ReconnectController {
    inner: Rc<ControllerInner>,
}

impl ReconnectController {
    pub fn new(scheduler: Rc<dyn Scheduler>) -> Self {
        Self {
            inner: Rc::new(ControllerInner {
                scheduler,
                attempts: Cell::new(0),
                pending: RefCell::new(None),
                stopped: Cell::new(false),
                shut_down: Cell::new(false),
            }),
        }
    }

    pub fn attempts(&self) -> u32 {
        self.inner.attempts.get()
    }

    pub fn state(&self) -> ReconnectState {
        if self.inner.pending.borrow().is_some() {
            ReconnectState::Scheduled
        } else if self.inner.stopped.get() {
            ReconnectState::Stopped
        } else {
            ReconnectState::Idle
        }
    }

    /// Called on every successful open: a later drop gets a fresh budget.
    pub fn reset(&self) {
        self.inner.attempts.set(0);
        self.inner.stopped.set(false);
    }

    /// Cancel the pending retry, if any.
    pub fn cancel(&self) {
        if let Some(timer) = self.inner.pending.borrow_mut().take() {
            timer.cancel();
        }
    }

    /// Cancel the pending retry and decline every later trigger until
    /// [`resume`](Self::resume).
    pub fn shut_down(&self) {
        self.inner.shut_down.set(true);
        self.cancel();
    }

    pub fn resume(&self) {
        self.inner.shut_down.set(false);
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.get()
    }

    pub fn evaluate(
        &self,
        options: &Options,
        trigger: ReconnectTrigger<'_>,
        restart: RestartFn,
    ) -> ReconnectDecision {
        if self.inner.shut_down.get() {
            return ReconnectDecision::Declined;
        }
        let wanted = match trigger {
            ReconnectTrigger::Close(event) => options
                .should_reconnect
                .as_ref()
                .is_some_and(|decide| decide(event)),
            ReconnectTrigger::Error => options.retry_on_error,
        };
        if !wanted {
            return ReconnectDecision::Declined;
        }

        let budget = options.attempt_budget();
        let attempts = self.attempts();
        if attempts >= budget {
            if !self.inner.stopped.replace(true) {
                crate::log_error!("Max reconnect attempts of {} exceeded", budget);
                if let Some(on_stop) = &options.on_reconnect_stop {
                    on_stop(budget);
                }
            }
            return ReconnectDecision::Exhausted;
        }

        if self.inner.pending.borrow().is_some() {
            return ReconnectDecision::AlreadyScheduled;
        }

        let delay = options.delay_for_attempt(attempts);
        crate::log_info!(
            "Reconnecting in {}ms (attempt {} of {})",
            delay.as_millis(),
            attempts + 1,
            budget
        );

        let weak = Rc::downgrade(&self.inner);
        let timer = self.inner.scheduler.set_timeout(
            delay,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.pending.borrow_mut().take();
                    if inner.shut_down.get() {
                        return;
                    }
                    inner.attempts.set(inner.attempts.get() + 1);
                }
                restart();
            }),
        );
        *self.inner.pending.borrow_mut() = Some(timer);
        ReconnectDecision::Scheduled(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::testing::ManualScheduler;

    fn counter() -> (Rc<Cell<u32>>, RestartFn) {
        let calls = Rc::new(Cell::new(0));
        let seen = calls.clone();
        (calls, Rc::new(move || seen.set(seen.get() + 1)))
    }

    fn controller() -> (ReconnectController, Rc<ManualScheduler>) {
        let scheduler = ManualScheduler::new();
        (ReconnectController::new(scheduler.clone()), scheduler)
    }

    #[test]
    fn close_without_a_decider_is_declined() {
        let (controller, scheduler) = controller();
        let (_, restart) = counter();
        let decision = controller.evaluate(
            &Options::new(),
            ReconnectTrigger::Close(&CloseEvent::normal()),
            restart,
        );
        assert_eq!(decision, ReconnectDecision::Declined);
        assert_eq!(scheduler.pending_timers(), 0);
    }

    #[test]
    fn retry_fires_after_the_interval_and_counts_the_attempt() {
        let (controller, scheduler) = controller();
        let (calls, restart) = counter();
        let options = Options::new()
            .always_reconnect()
            .reconnect_interval(Duration::from_millis(500));

        let decision =
            controller.evaluate(&options, ReconnectTrigger::Close(&CloseEvent::normal()), restart);
        assert_eq!(decision, ReconnectDecision::Scheduled(Duration::from_millis(500)));
        assert_eq!(controller.state(), ReconnectState::Scheduled);

        scheduler.advance(Duration::from_millis(499));
        assert_eq!(calls.get(), 0);
        scheduler.advance(Duration::from_millis(1));
        assert_eq!(calls.get(), 1);
        assert_eq!(controller.attempts(), 1);
        assert_eq!(controller.state(), ReconnectState::Idle);
    }

    #[test]
    fn at_most_one_timer_is_pending() {
        let (controller, scheduler) = controller();
        let (calls, restart) = counter();
        let options = Options::new().always_reconnect().retry_on_error(true);

        controller.evaluate(&options, ReconnectTrigger::Error, restart.clone());
        let second =
            controller.evaluate(&options, ReconnectTrigger::Close(&CloseEvent::normal()), restart);
        assert_eq!(second, ReconnectDecision::AlreadyScheduled);
        assert_eq!(scheduler.pending_timers(), 1);

        scheduler.advance(Duration::from_secs(5));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn error_trigger_needs_retry_on_error() {
        let (controller, _) = controller();
        let (_, restart) = counter();
        let decision =
            controller.evaluate(&Options::new().always_reconnect(), ReconnectTrigger::Error, restart);
        assert_eq!(decision, ReconnectDecision::Declined);
    }

    #[test]
    fn exhaustion_notifies_once_with_the_budget() {
        let (controller, scheduler) = controller();
        let (calls, restart) = counter();
        let stops = Rc::new(RefCell::new(Vec::new()));
        let seen = stops.clone();
        let options = Options::new()
            .always_reconnect()
            .retry_on_error(true)
            .reconnect_attempts(2)
            .reconnect_interval(Duration::from_millis(10))
            .on_reconnect_stop(move |budget| seen.borrow_mut().push(budget));
        let close = CloseEvent::abnormal("gone");

        for _ in 0..2 {
            controller.evaluate(&options, ReconnectTrigger::Close(&close), restart.clone());
            scheduler.advance(Duration::from_millis(10));
        }
        assert_eq!(calls.get(), 2);

        assert_eq!(
            controller.evaluate(&options, ReconnectTrigger::Close(&close), restart.clone()),
            ReconnectDecision::Exhausted
        );
        assert_eq!(
            controller.evaluate(&options, ReconnectTrigger::Error, restart),
            ReconnectDecision::Exhausted
        );
        assert_eq!(*stops.borrow(), vec![2]);
        assert_eq!(controller.state(), ReconnectState::Stopped);
        assert_eq!(scheduler.pending_timers(), 0);
    }

    #[test]
    fn reset_restores_the_budget() {
        let (controller, scheduler) = controller();
        let (_, restart) = counter();
        let options = Options::new().always_reconnect().reconnect_attempts(1);
        let close = CloseEvent::abnormal("gone");

        controller.evaluate(&options, ReconnectTrigger::Close(&close), restart.clone());
        scheduler.advance(Duration::from_secs(5));
        assert_eq!(controller.attempts(), 1);

        controller.reset();
        assert_eq!(controller.attempts(), 0);
        assert!(matches!(
            controller.evaluate(&options, ReconnectTrigger::Close(&close), restart),
            ReconnectDecision::Scheduled(_)
        ));
    }

    #[test]
    fn cancelled_retry_never_restarts() {
        let (controller, scheduler) = controller();
        let (calls, restart) = counter();
        controller.evaluate(
            &Options::new().always_reconnect(),
            ReconnectTrigger::Close(&CloseEvent::normal()),
            restart,
        );
        controller.cancel();
        controller.cancel();
        scheduler.advance(Duration::from_secs(10));
        assert_eq!(calls.get(), 0);
        assert_eq!(controller.attempts(), 0);
    }

    #[test]
    fn shut_down_declines_until_resumed() {
        let (controller, scheduler) = controller();
        let (calls, restart) = counter();
        let options = Options::new().always_reconnect().retry_on_error(true);
        let close = CloseEvent::abnormal("gone");

        controller.shut_down();
        assert_eq!(
            controller.evaluate(&options, ReconnectTrigger::Close(&close), restart.clone()),
            ReconnectDecision::Declined
        );
        assert_eq!(
            controller.evaluate(&options, ReconnectTrigger::Error, restart.clone()),
            ReconnectDecision::Declined
        );
        scheduler.advance(Duration::from_secs(30));
        assert_eq!(calls.get(), 0);

        controller.resume();
        assert!(matches!(
            controller.evaluate(&options, ReconnectTrigger::Close(&close), restart),
            ReconnectDecision::Scheduled(_)
        ));
    }

    #[test]
    fn shut_down_cancels_the_pending_retry() {
        let (controller, scheduler) = controller();
        let (calls, restart) = counter();
        controller.evaluate(
            &Options::new().always_reconnect(),
            ReconnectTrigger::Close(&CloseEvent::normal()),
            restart,
        );
        controller.shut_down();
        assert_eq!(scheduler.pending_timers(), 0);
        scheduler.advance(Duration::from_secs(10));
        assert_eq!(calls.get(), 0);
    }
}
