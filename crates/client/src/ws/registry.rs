//! Per-URL stores for shared connections and their subscribers.
//!
//! Both stores are plain storage with cheap clones (`Rc` inside), passed to
//! the factory and fan-out explicitly. Mutation happens synchronously inside
//! event handlers or `create_or_join`, so no locking is involved.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use sockshare_shared::WsError;

use super::subscriber::Subscriber;
use super::transport::SocketHandle;

/// URL -> the one live shared connection for that URL.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    sockets: Rc<RefCell<HashMap<String, SocketHandle>>>,
}

impl ConnectionRegistry {
    pub fn get(&self, url: &str) -> Option<SocketHandle> {
        self.sockets.borrow().get(url).cloned()
    }

    pub fn set(&self, url: &str, socket: SocketHandle) {
        self.sockets.borrow_mut().insert(url.to_string(), socket);
    }

    pub fn delete(&self, url: &str) -> Option<SocketHandle> {
        self.sockets.borrow_mut().remove(url)
    }

    pub fn contains(&self, url: &str) -> bool {
        self.sockets.borrow().contains_key(url)
    }

    pub fn len(&self) -> usize {
        self.sockets.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sockets.borrow().is_empty()
    }

    /// Forget one URL, or everything when `url` is `None`.
    pub fn reset(&self, url: Option<&str>) {
        match url {
            Some(url) => {
                self.sockets.borrow_mut().remove(url);
            }
            None => self.sockets.borrow_mut().clear(),
        }
    }
}

/// URL -> the consumers attached to that URL's shared connection.
///
/// A set is dropped as soon as it becomes empty. Removing a record that is
/// not a member of an existing set is an error.
#[derive(Clone, Default)]
pub struct SubscriberRegistry {
    sets: Rc<RefCell<HashMap<String, Vec<Rc<Subscriber>>>>>,
}

impl SubscriberRegistry {
    /// Returns `false` if the record was already a member.
    pub fn add(&self, url: &str, subscriber: &Rc<Subscriber>) -> bool {
        let mut sets = self.sets.borrow_mut();
        let set = sets.entry(url.to_string()).or_default();
        if set.iter().any(|member| Rc::ptr_eq(member, subscriber)) {
            return false;
        }
        set.push(subscriber.clone());
        true
    }

    pub fn remove(&self, url: &str, subscriber: &Rc<Subscriber>) -> Result<(), WsError> {
        let mut sets = self.sets.borrow_mut();
        let Some(set) = sets.get_mut(url) else {
            return Ok(());
        };
        let Some(index) = set.iter().position(|member| Rc::ptr_eq(member, subscriber)) else {
            return Err(WsError::UnregisteredSubscriber {
                url: url.to_string(),
            });
        };
        set.remove(index);
        if set.is_empty() {
            sets.remove(url);
        }
        Ok(())
    }

    /// Point-in-time copy of the members, in registration order.
    pub fn list(&self, url: &str) -> Vec<Rc<Subscriber>> {
        self.sets.borrow().get(url).cloned().unwrap_or_default()
    }

    pub fn has_any(&self, url: &str) -> bool {
        self.sets.borrow().get(url).is_some_and(|set| !set.is_empty())
    }

    pub fn count(&self, url: &str) -> usize {
        self.sets.borrow().get(url).map_or(0, Vec::len)
    }

    /// No URL has a subscriber set.
    pub fn is_empty(&self) -> bool {
        self.sets.borrow().is_empty()
    }

    pub fn reset(&self, url: Option<&str>) {
        match url {
            Some(url) => {
                self.sets.borrow_mut().remove(url);
            }
            None => self.sets.borrow_mut().clear(),
        }
    }
}

/// The two stores, handed around together.
#[derive(Clone, Default)]
pub struct SocketRegistries {
    pub connections: ConnectionRegistry,
    pub subscribers: SubscriberRegistry,
}

thread_local! {
    static GLOBAL_REGISTRIES: SocketRegistries = SocketRegistries::default();
}

impl SocketRegistries {
    pub fn new() -> Self {
        Self::default()
    }

    /// The default registries for this thread, used when an app does not
    /// provide its own.
    pub fn global() -> Self {
        GLOBAL_REGISTRIES.with(Clone::clone)
    }

    pub fn reset(&self, url: Option<&str>) {
        self.connections.reset(url);
        self.subscribers.reset(url);
    }
}
