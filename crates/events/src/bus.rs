//! Event publishing/subscription abstraction (mechanics only).
//!
//! Committed order and catalog events are fanned out to subscribers such as a
//! kitchen display or a cashier dashboard.
//!
//! - **Transport-agnostic**: in-memory channels today, a broker later
//! - **At-least-once delivery**: consumers must be idempotent
//! - **No persistence**: the event store is the source of truth

use std::sync::Arc;
use std::sync::mpsc::Receiver;
use std::time::Duration;

use serde_json::Value as JsonValue;

use crate::envelope::EventEnvelope;

/// A subscription to an event stream.
///
/// Each subscription gets a copy of every message published after it was
/// created (broadcast semantics). Use one subscription per consuming thread.
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self { receiver }
    }

    /// Block until the next message is available.
    pub fn recv(&self) -> Result<M, std::sync::mpsc::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a message without blocking.
    pub fn try_recv(&self) -> Result<M, std::sync::mpsc::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Block for up to `timeout` waiting for a message.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<M, std::sync::mpsc::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Drain everything currently buffered without blocking.
    pub fn drain(&self) -> Vec<M> {
        self.receiver.try_iter().collect()
    }
}

impl Subscription<EventEnvelope<JsonValue>> {
    /// Drain buffered envelopes, keeping those of one `event_type`
    /// (e.g. a kitchen display watching `orders.order.status_changed`).
    pub fn drain_type(&self, event_type: &str) -> Vec<EventEnvelope<JsonValue>> {
        self.receiver
            .try_iter()
            .filter(|env| env.event_type() == event_type)
            .collect()
    }
}

/// Domain-agnostic event bus (pub/sub abstraction).
///
/// Events are **stored first**, then **published**. A failed publish never
/// loses an event: it is still in the store and read models can be rebuilt.
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn publish(&self, message: M) -> Result<(), Self::Error>;

    fn subscribe(&self) -> Subscription<M>;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        (**self).publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }
}
