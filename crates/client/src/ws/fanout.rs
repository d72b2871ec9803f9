//! Binds the four transport callbacks and forwards each event to the
//! subscribers of a connection.
//!
//! An exclusive binding serves exactly one subscriber. A shared binding reads
//! the subscriber registry on every event, so consumers that join or leave
//! later are picked up without rebinding.

use std::cell::Cell;
use std::rc::{Rc, Weak};

use sockshare_shared::{CloseEvent, ErrorEvent, MessageEvent, OpenEvent, ReadyState};

use super::env::SocketEnv;
use super::factory::Teardown;
use super::heartbeat::Heartbeat;
use super::reconnect::{ReconnectDecision, ReconnectTrigger};
use super::registry::SocketRegistries;
use super::subscriber::Subscriber;
use super::transport::{same_socket, SocketHandle, Transport, TransportHandlers};

fn heartbeat_for(env: &SocketEnv, socket: &SocketHandle, subscriber: &Subscriber) -> Option<Heartbeat> {
    subscriber
        .options
        .current()
        .heartbeat
        .clone()
        .map(|options| Heartbeat::new(socket, options, env.scheduler.clone()))
}

/// Deliver one inbound message to one subscriber.
fn deliver_message(subscriber: &Subscriber, event: &MessageEvent) {
    let options = subscriber.options.current();
    if let Some(on_message) = &options.on_message {
        on_message(event);
    }
    if !options.accepts(event) {
        return;
    }
    subscriber.set_last_message(event.clone());
}

fn deliver_open(subscriber: &Subscriber, event: &OpenEvent) {
    let options = subscriber.options.current();
    if let Some(on_open) = &options.on_open {
        on_open(event);
    }
    subscriber.reconnect.reset();
    subscriber.set_ready_state(ReadyState::Open);
}

fn deliver_close(subscriber: &Subscriber, event: &CloseEvent) {
    let options = subscriber.options.current();
    if let Some(on_close) = &options.on_close {
        on_close(event);
    }
    subscriber.set_ready_state(ReadyState::Closed);
}

fn deliver_error(subscriber: &Subscriber, event: &ErrorEvent) {
    let options = subscriber.options.current();
    if let Some(on_error) = &options.on_error {
        on_error(event);
    }
}

fn evaluate_reconnect(subscriber: &Subscriber, trigger: ReconnectTrigger<'_>) -> ReconnectDecision {
    let options = subscriber.options.current();
    subscriber
        .reconnect
        .evaluate(&options, trigger, subscriber.restart.clone())
}

/// Wire `socket` to a single subscriber.
///
/// The returned teardown cancels a pending retry, detaches the callbacks and
/// closes the socket; a failing close is logged and swallowed.
pub fn bind_exclusive(env: &SocketEnv, socket: &SocketHandle, subscriber: &Rc<Subscriber>) -> Teardown {
    let heartbeat = heartbeat_for(env, socket, subscriber);
    // Cleared by the teardown; a user callback may tear down mid-event.
    let bound = Rc::new(Cell::new(true));

    let on_message = {
        let subscriber = subscriber.clone();
        let heartbeat = heartbeat.clone();
        move |event: MessageEvent| {
            if let Some(heartbeat) = &heartbeat {
                heartbeat.mark_alive();
                if heartbeat.is_pong(&event) {
                    return;
                }
            }
            deliver_message(&subscriber, &event);
        }
    };

    let on_open = {
        let subscriber = subscriber.clone();
        let heartbeat = heartbeat.clone();
        move |event: OpenEvent| {
            if let Some(heartbeat) = &heartbeat {
                heartbeat.start();
            }
            deliver_open(&subscriber, &event);
        }
    };

    let on_close = {
        let subscriber = subscriber.clone();
        let heartbeat = heartbeat.clone();
        let bound = bound.clone();
        move |event: CloseEvent| {
            if let Some(heartbeat) = &heartbeat {
                heartbeat.stop();
            }
            deliver_close(&subscriber, &event);
            if bound.get() {
                evaluate_reconnect(&subscriber, ReconnectTrigger::Close(&event));
            }
        }
    };

    let on_error = {
        let subscriber = subscriber.clone();
        let bound = bound.clone();
        move |event: ErrorEvent| {
            deliver_error(&subscriber, &event);
            if bound.get() {
                evaluate_reconnect(&subscriber, ReconnectTrigger::Error);
            }
        }
    };

    socket.bind(TransportHandlers {
        on_open: Box::new(on_open),
        on_close: Box::new(on_close),
        on_message: Box::new(on_message),
        on_error: Box::new(on_error),
    });

    let socket = socket.clone();
    let subscriber = subscriber.clone();
    Teardown::new(move || {
        bound.set(false);
        subscriber.set_ready_state(ReadyState::Closing);
        subscriber.reconnect.cancel();
        if let Some(heartbeat) = &heartbeat {
            heartbeat.stop();
        }
        socket.unbind();
        if let Err(e) = socket.close() {
            crate::log_warn!("Ignoring close failure for {}: {}", socket.url(), e);
        }
        Ok(())
    })
}

/// Wire a shared `socket` to every subscriber registered for `url`.
///
/// Called once per physical connection. The handlers hold the socket weakly;
/// the connection registry owns it.
pub fn bind_shared(env: &SocketEnv, url: &str, socket: &SocketHandle, heartbeat: Option<Heartbeat>) {
    let registries = env.registries.clone();
    let weak: Weak<dyn Transport> = Rc::downgrade(socket);

    let on_message = {
        let registries = registries.clone();
        let url = url.to_string();
        let heartbeat = heartbeat.clone();
        move |event: MessageEvent| {
            if let Some(heartbeat) = &heartbeat {
                heartbeat.mark_alive();
                if heartbeat.is_pong(&event) {
                    return;
                }
            }
            for subscriber in registries.subscribers.list(&url) {
                deliver_message(&subscriber, &event);
            }
        }
    };

    let on_open = {
        let registries = registries.clone();
        let url = url.to_string();
        let heartbeat = heartbeat.clone();
        move |event: OpenEvent| {
            if let Some(heartbeat) = &heartbeat {
                heartbeat.start();
            }
            for subscriber in registries.subscribers.list(&url) {
                deliver_open(&subscriber, &event);
            }
        }
    };

    let on_close = {
        let registries = registries.clone();
        let url = url.to_string();
        move |event: CloseEvent| {
            if let Some(heartbeat) = &heartbeat {
                heartbeat.stop();
            }
            for subscriber in registries.subscribers.list(&url) {
                deliver_close(&subscriber, &event);
            }
            evict(&registries, &url, &weak);
            for subscriber in registries.subscribers.list(&url) {
                evaluate_reconnect(&subscriber, ReconnectTrigger::Close(&event));
            }
        }
    };

    let on_error = {
        let url = url.to_string();
        move |event: ErrorEvent| {
            for subscriber in registries.subscribers.list(&url) {
                deliver_error(&subscriber, &event);
            }
        }
    };

    socket.bind(TransportHandlers {
        on_open: Box::new(on_open),
        on_close: Box::new(on_close),
        on_message: Box::new(on_message),
        on_error: Box::new(on_error),
    });
}

/// Drop the registry entry for `url` if it still points at this socket.
fn evict(registries: &SocketRegistries, url: &str, socket: &Weak<dyn Transport>) {
    let Some(socket) = socket.upgrade() else {
        return;
    };
    // A newer connection may already have replaced this one.
    if registries
        .connections
        .get(url)
        .is_some_and(|current| same_socket(&current, &socket))
    {
        registries.connections.delete(url);
    }
}
