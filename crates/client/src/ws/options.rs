//! Consumer configuration and the cell that holds its latest version.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use sockshare_shared::{
    CloseEvent, ErrorEvent, HeartbeatOptions, MessageEvent, OpenEvent, DEFAULT_RECONNECT_INTERVAL_MS,
    DEFAULT_RECONNECT_LIMIT,
};

pub type EventCallback<E> = Rc<dyn Fn(&E)>;
pub type CloseDecider = Rc<dyn Fn(&CloseEvent) -> bool>;
pub type MessageFilter = Rc<dyn Fn(&MessageEvent) -> bool>;

/// Delay before a reconnect attempt.
#[derive(Clone)]
pub enum ReconnectInterval {
    Fixed(Duration),
    /// Computed from the number of attempts already made.
    Custom(Rc<dyn Fn(u32) -> Duration>),
    /// `initial * multiplier^attempt`, capped at `max`.
    Exponential {
        initial: Duration,
        multiplier: f32,
        max: Duration,
    },
}

impl Default for ReconnectInterval {
    fn default() -> Self {
        ReconnectInterval::Fixed(Duration::from_millis(DEFAULT_RECONNECT_INTERVAL_MS))
    }
}

impl std::fmt::Debug for ReconnectInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReconnectInterval::Fixed(delay) => f.debug_tuple("Fixed").field(delay).finish(),
            ReconnectInterval::Custom(_) => f.write_str("Custom(..)"),
            ReconnectInterval::Exponential {
                initial,
                multiplier,
                max,
            } => f
                .debug_struct("Exponential")
                .field("initial", initial)
                .field("multiplier", multiplier)
                .field("max", max)
                .finish(),
        }
    }
}

impl ReconnectInterval {
    pub fn exponential(initial: Duration, multiplier: f32, max: Duration) -> Self {
        ReconnectInterval::Exponential {
            initial,
            multiplier,
            max,
        }
    }

    /// Calculate the delay for a given attempt number
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match self {
            ReconnectInterval::Fixed(delay) => *delay,
            ReconnectInterval::Custom(compute) => compute(attempt),
            ReconnectInterval::Exponential {
                initial,
                multiplier,
                max,
            } => {
                let millis = initial.as_millis() as f32 * multiplier.powi(attempt as i32);
                Duration::from_millis(millis as u64).min(*max)
            }
        }
    }
}

impl From<Duration> for ReconnectInterval {
    fn from(delay: Duration) -> Self {
        ReconnectInterval::Fixed(delay)
    }
}

/// Everything a consumer can configure.
///
/// Callbacks are reference counted so a snapshot of the options can be kept
/// by the fan-out while the consumer swaps in a new version.
#[derive(Clone, Default)]
pub struct Options {
    /// Reuse one physical connection per URL across consumers.
    pub share: bool,
    pub protocols: Vec<String>,
    /// Appended to the resolved URL, in order.
    pub query_params: Vec<(String, String)>,
    /// Without a decider a close never triggers a reconnect.
    pub should_reconnect: Option<CloseDecider>,
    pub reconnect_attempts: Option<u32>,
    pub reconnect_interval: Option<ReconnectInterval>,
    pub retry_on_error: bool,
    /// Returning `false` swallows the message for this consumer.
    pub filter: Option<MessageFilter>,
    pub on_open: Option<EventCallback<OpenEvent>>,
    pub on_close: Option<EventCallback<CloseEvent>>,
    pub on_message: Option<EventCallback<MessageEvent>>,
    pub on_error: Option<EventCallback<ErrorEvent>>,
    pub on_reconnect_stop: Option<Rc<dyn Fn(u32)>>,
    pub heartbeat: Option<HeartbeatOptions>,
    /// Reject later `set_options` calls.
    pub enforce_static_options: bool,
}

impl std::fmt::Debug for Options {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Options")
            .field("share", &self.share)
            .field("protocols", &self.protocols)
            .field("query_params", &self.query_params)
            .field("should_reconnect", &self.should_reconnect.is_some())
            .field("reconnect_attempts", &self.reconnect_attempts)
            .field("reconnect_interval", &self.reconnect_interval)
            .field("retry_on_error", &self.retry_on_error)
            .field("filter", &self.filter.is_some())
            .field("heartbeat", &self.heartbeat)
            .field("enforce_static_options", &self.enforce_static_options)
            .finish_non_exhaustive()
    }
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn share(mut self, share: bool) -> Self {
        self.share = share;
        self
    }

    pub fn protocols<I, S>(mut self, protocols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.protocols = protocols.into_iter().map(Into::into).collect();
        self
    }

    pub fn query_param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query_params.push((key.into(), value.to_string()));
        self
    }

    pub fn should_reconnect(mut self, decide: impl Fn(&CloseEvent) -> bool + 'static) -> Self {
        self.should_reconnect = Some(Rc::new(decide));
        self
    }

    /// Reconnect after every close.
    pub fn always_reconnect(self) -> Self {
        self.should_reconnect(|_| true)
    }

    pub fn reconnect_attempts(mut self, attempts: u32) -> Self {
        self.reconnect_attempts = Some(attempts);
        self
    }

    pub fn reconnect_interval(mut self, interval: impl Into<ReconnectInterval>) -> Self {
        self.reconnect_interval = Some(interval.into());
        self
    }

    pub fn retry_on_error(mut self, retry: bool) -> Self {
        self.retry_on_error = retry;
        self
    }

    pub fn filter(mut self, keep: impl Fn(&MessageEvent) -> bool + 'static) -> Self {
        self.filter = Some(Rc::new(keep));
        self
    }

    pub fn on_open(mut self, callback: impl Fn(&OpenEvent) + 'static) -> Self {
        self.on_open = Some(Rc::new(callback));
        self
    }

    pub fn on_close(mut self, callback: impl Fn(&CloseEvent) + 'static) -> Self {
        self.on_close = Some(Rc::new(callback));
        self
    }

    pub fn on_message(mut self, callback: impl Fn(&MessageEvent) + 'static) -> Self {
        self.on_message = Some(Rc::new(callback));
        self
    }

    pub fn on_error(mut self, callback: impl Fn(&ErrorEvent) + 'static) -> Self {
        self.on_error = Some(Rc::new(callback));
        self
    }

    pub fn on_reconnect_stop(mut self, callback: impl Fn(u32) + 'static) -> Self {
        self.on_reconnect_stop = Some(Rc::new(callback));
        self
    }

    pub fn heartbeat(mut self, heartbeat: HeartbeatOptions) -> Self {
        self.heartbeat = Some(heartbeat);
        self
    }

    pub fn enforce_static_options(mut self, enforce: bool) -> Self {
        self.enforce_static_options = enforce;
        self
    }

    pub fn attempt_budget(&self) -> u32 {
        self.reconnect_attempts.unwrap_or(DEFAULT_RECONNECT_LIMIT)
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.reconnect_interval
            .clone()
            .unwrap_or_default()
            .delay_for_attempt(attempt)
    }

    /// Whether a message passes this consumer's filter.
    pub fn accepts(&self, message: &MessageEvent) -> bool {
        self.filter.as_ref().map_or(true, |keep| keep(message))
    }
}

/// Holds the latest `Options` of a consumer.
///
/// Readers take a snapshot with [`OptionsCell::current`]; the consumer replaces
/// the whole value, so a callback in flight keeps the version it started with.
#[derive(Clone, Default)]
pub struct OptionsCell(Rc<RefCell<Rc<Options>>>);

impl OptionsCell {
    pub fn new(options: Options) -> Self {
        Self(Rc::new(RefCell::new(Rc::new(options))))
    }

    pub fn current(&self) -> Rc<Options> {
        self.0.borrow().clone()
    }

    pub fn replace(&self, options: Options) {
        *self.0.borrow_mut() = Rc::new(options);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_budget_and_interval() {
        let options = Options::new();
        assert_eq!(options.attempt_budget(), 20);
        assert_eq!(options.delay_for_attempt(7), Duration::from_millis(5000));
        assert!(options.should_reconnect.is_none());
    }

    #[test]
    fn exponential_backoff_is_capped() {
        let interval = ReconnectInterval::exponential(
            Duration::from_millis(1000),
            2.0,
            Duration::from_millis(5000),
        );
        assert_eq!(interval.delay_for_attempt(0), Duration::from_millis(1000));
        assert_eq!(interval.delay_for_attempt(2), Duration::from_millis(4000));
        assert_eq!(interval.delay_for_attempt(3), Duration::from_millis(5000));
    }

    #[test]
    fn custom_interval_sees_the_attempt_number() {
        let options = Options::new().reconnect_interval(ReconnectInterval::Custom(Rc::new(
            |attempt| Duration::from_millis(100 * (attempt as u64 + 1)),
        )));
        assert_eq!(options.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(options.delay_for_attempt(4), Duration::from_millis(500));
    }

    #[test]
    fn snapshots_survive_replacement() {
        let cell = OptionsCell::new(Options::new().reconnect_attempts(3));
        let before = cell.current();
        cell.replace(Options::new().reconnect_attempts(9));
        assert_eq!(before.attempt_budget(), 3);
        assert_eq!(cell.current().attempt_budget(), 9);
    }

    #[test]
    fn missing_filter_accepts_everything() {
        let message = MessageEvent::new("skip-me");
        assert!(Options::new().accepts(&message));
        let filtered = Options::new().filter(|m| m.text() != Some("skip-me"));
        assert!(!filtered.accepts(&message));
        assert!(filtered.accepts(&MessageEvent::new("keep")));
    }
}
