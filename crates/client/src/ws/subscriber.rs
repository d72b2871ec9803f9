//! The record a consumer registers against a connection.

use std::rc::Rc;

use sockshare_shared::{MessageEvent, ReadyState};
use uuid::Uuid;

use super::options::OptionsCell;
use super::reconnect::ReconnectController;

/// The consumer's own start/reconnect entry point.
pub type RestartFn = Rc<dyn Fn()>;

/// Where the fan-out delivers state for one consumer.
#[derive(Clone)]
pub struct Setters {
    pub set_last_message: Rc<dyn Fn(MessageEvent)>,
    pub set_ready_state: Rc<dyn Fn(ReadyState)>,
}

/// A consumer attached to a connection.
///
/// Identity is the `Rc` allocation: registries compare records with
/// `Rc::ptr_eq`, never by URL or id. The id only labels log lines.
pub struct Subscriber {
    id: Uuid,
    pub setters: Setters,
    pub options: OptionsCell,
    pub reconnect: ReconnectController,
    pub restart: RestartFn,
}

impl Subscriber {
    pub fn new(
        setters: Setters,
        options: OptionsCell,
        reconnect: ReconnectController,
        restart: RestartFn,
    ) -> Rc<Self> {
        Rc::new(Self {
            id: Uuid::new_v4(),
            setters,
            options,
            reconnect,
            restart,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn set_ready_state(&self, state: ReadyState) {
        (self.setters.set_ready_state)(state);
    }

    pub fn set_last_message(&self, message: MessageEvent) {
        (self.setters.set_last_message)(message);
    }
}

impl std::fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.id)
            .field("attempts", &self.reconnect.attempts())
            .finish_non_exhaustive()
    }
}
