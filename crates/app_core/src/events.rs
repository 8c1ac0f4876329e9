//! Typed event subscriptions
//!
//! Every emitting component owns an [`EventHub`]. Observers call
//! [`EventHub::subscribe`] and drain their [`Subscription`] on the primary
//! thread; [`EventHub::unsubscribe`] detaches them. Events are delivered in
//! emission order per subscriber.

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Receiving end of a subscription
pub struct Subscription<E> {
    id: SubscriptionId,
    rx: Receiver<E>,
}

impl<E> Subscription<E> {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Take every event queued so far
    pub fn drain(&self) -> Vec<E> {
        let mut events = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        events
    }

    pub fn try_next(&self) -> Option<E> {
        self.rx.try_recv().ok()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

struct Subscriber<E> {
    id: SubscriptionId,
    tx: Sender<E>,
}

/// Fan-out point for events of type `E`
pub struct EventHub<E> {
    subscribers: Mutex<Vec<Subscriber<E>>>,
    next_id: AtomicU64,
}

impl<E: Clone> EventHub<E> {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn subscribe(&self) -> Subscription<E> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.lock().push(Subscriber { id, tx });
        Subscription { id, rx }
    }

    /// Detach a subscriber. Events already queued stay in its receiver.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = self.subscribers.lock();
        let before = subs.len();
        subs.retain(|s| s.id != id);
        subs.len() != before
    }

    /// Deliver `event` to every live subscriber; dropped receivers are pruned
    pub fn emit(&self, event: E) {
        let mut subs = self.subscribers.lock();
        subs.retain(|s| s.tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

impl<E: Clone> Default for EventHub<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fan_out_in_order() {
        let hub = EventHub::new();
        let a = hub.subscribe();
        let b = hub.subscribe();

        hub.emit(1);
        hub.emit(2);

        assert_eq!(a.drain(), vec![1, 2]);
        assert_eq!(b.drain(), vec![1, 2]);
        assert!(a.drain().is_empty());
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let hub = EventHub::new();
        let a = hub.subscribe();
        hub.emit("before");
        assert!(hub.unsubscribe(a.id()));
        assert!(!hub.unsubscribe(a.id()));
        hub.emit("after");

        assert_eq!(a.drain(), vec!["before"]);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[test]
    fn test_dropped_subscription_is_pruned() {
        let hub = EventHub::new();
        let a = hub.subscribe();
        drop(hub.subscribe());
        hub.emit(7u8);
        assert_eq!(hub.subscriber_count(), 1);
        assert_eq!(a.try_next(), Some(7));
    }
}
