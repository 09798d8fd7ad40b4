//! Explicit fan-out of gateway events.
//!
//! Every [`Subscription`] owns its slot in the bus and detaches when dropped,
//! so a consumer's lifetime bounds its registration.

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, PoisonError, Weak},
};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

struct Subscribers<E> {
    next_id: u32,
    senders: BTreeMap<u32, UnboundedSender<E>>,
}

pub struct EventBus<E> {
    subscribers: Arc<Mutex<Subscribers<E>>>,
}

impl<E> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self { subscribers: self.subscribers.clone() }
    }
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> EventBus<E> {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Subscribers { next_id: 0, senders: BTreeMap::new() })),
        }
    }

    pub fn subscribe(&self) -> Subscription<E> {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        let id = subscribers.next_id;
        subscribers.next_id = subscribers.next_id.wrapping_add(1);
        subscribers.senders.insert(id, tx);

        Subscription { id, rx, bus: Arc::downgrade(&self.subscribers) }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .senders
            .len()
    }

    pub fn close(&self) {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .senders
            .clear();
    }
}

impl<E: Clone> EventBus<E> {
    pub fn emit(&self, event: E) -> usize {
        let subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);

        subscribers
            .senders
            .values()
            .filter(|tx| tx.send(event.clone()).is_ok())
            .count()
    }
}

pub struct Subscription<E> {
    id: u32,
    rx: UnboundedReceiver<E>,
    bus: Weak<Mutex<Subscribers<E>>>,
}

impl<E> Subscription<E> {
    pub async fn recv(&mut self) -> Option<E> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<E> {
        self.rx.try_recv().ok()
    }
}

impl<E> Drop for Subscription<E> {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .senders
                .remove(&self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fan_out_and_detach() {
        let bus = EventBus::new();
        let mut a = bus.subscribe();
        let b = bus.subscribe();

        assert_eq!(bus.emit("one"), 2);
        drop(b);
        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(bus.emit("two"), 1);

        assert_eq!(a.recv().await, Some("one"));
        assert_eq!(a.recv().await, Some("two"));

        bus.close();
        assert_eq!(a.recv().await, None);
    }
}
