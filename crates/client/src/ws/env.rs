use std::rc::Rc;

use super::registry::SocketRegistries;
use super::scheduler::{default_scheduler, Scheduler};
use super::transport::{default_connector, Connector};

/// What a consumer needs from its surroundings: where shared connections
/// live, how to open a physical connection and how to run timers.
///
/// Provide one through Dioxus context to isolate a subtree (or a test) from
/// the thread-local registries.
#[derive(Clone)]
pub struct SocketEnv {
    pub registries: SocketRegistries,
    pub connector: Rc<dyn Connector>,
    pub scheduler: Rc<dyn Scheduler>,
}

impl SocketEnv {
    pub fn new(
        registries: SocketRegistries,
        connector: Rc<dyn Connector>,
        scheduler: Rc<dyn Scheduler>,
    ) -> Self {
        Self {
            registries,
            connector,
            scheduler,
        }
    }

    /// Thread-local registries, the platform WebSocket connector and the
    /// Dioxus scheduler.
    pub fn platform_default() -> Self {
        let scheduler = default_scheduler();
        Self {
            registries: SocketRegistries::global(),
            connector: default_connector(scheduler.clone()),
            scheduler,
        }
    }

    pub fn with_connector(mut self, connector: Rc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }

    pub fn with_registries(mut self, registries: SocketRegistries) -> Self {
        self.registries = registries;
        self
    }
}
