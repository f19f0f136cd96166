//! Context-change notifications (world or scene transitions).
//!
//! A [`LifecycleEvents`] hub fans every [`ContextChange`] out to the lock-free
//! mailbox of each live [`Subscription`]. Emitting is safe from any thread;
//! subscribers drain their mailbox on their own schedule, which for a
//! [`PoolManager`](crate::PoolManager) is once per tick.

use crossbeam_queue::SegQueue;
use parking_lot::Mutex;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Weak,
};

/// Notification that the active context changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextChange {
    /// The context being left. `None` when it was removed before the change.
    pub previous: Option<String>,
    /// The context being entered.
    pub next: String,
}

impl ContextChange {
    /// Creates a change from `previous` to `next`.
    pub fn new(previous: impl Into<String>, next: impl Into<String>) -> Self {
        ContextChange {
            previous: Some(previous.into()),
            next: next.into(),
        }
    }

    /// Creates a change whose previous context no longer exists.
    pub fn replaced(next: impl Into<String>) -> Self {
        ContextChange {
            previous: None,
            next: next.into(),
        }
    }

    /// Name of the previous context, `"replaced"` if it is gone.
    pub fn previous_name(&self) -> &str {
        self.previous.as_deref().unwrap_or("replaced")
    }
}

type Mailbox = Arc<SegQueue<ContextChange>>;

#[derive(Debug, Default)]
struct Hub {
    next_id: AtomicU64,
    subscribers: Mutex<Vec<(u64, Mailbox)>>,
}

/// A typed source of [`ContextChange`] notifications.
///
/// Cloning yields another handle to the same source.
#[derive(Debug, Clone, Default)]
pub struct LifecycleEvents {
    hub: Arc<Hub>,
}

impl LifecycleEvents {
    /// Creates a source with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new subscriber. It receives every change emitted from now
    /// until the returned [`Subscription`] is dropped.
    pub fn subscribe(&self) -> Subscription {
        let id = self.hub.next_id.fetch_add(1, Ordering::Relaxed);
        let mailbox = Mailbox::default();
        self.hub.subscribers.lock().push((id, mailbox.clone()));
        Subscription {
            id,
            mailbox,
            hub: Arc::downgrade(&self.hub),
        }
    }

    /// Delivers `change` to every subscriber and returns how many received it.
    pub fn emit(&self, change: ContextChange) -> usize {
        let subscribers = self.hub.subscribers.lock();
        for (_, mailbox) in subscribers.iter() {
            mailbox.push(change.clone());
        }
        subscribers.len()
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.hub.subscribers.lock().len()
    }
}

/// A live registration with a [`LifecycleEvents`] source.
///
/// Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    mailbox: Mailbox,
    hub: Weak<Hub>,
}

impl Subscription {
    /// Takes the oldest undelivered change, if any.
    pub fn try_recv(&self) -> Option<ContextChange> {
        self.mailbox.pop()
    }

    /// Takes every undelivered change in emission order.
    pub fn drain(&self) -> Vec<ContextChange> {
        std::iter::from_fn(|| self.mailbox.pop()).collect()
    }

    /// Checks whether the source is still alive.
    pub fn is_connected(&self) -> bool {
        self.hub.strong_count() > 0
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.subscribers.lock().retain(|(id, _)| *id != self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_reaches_every_subscriber() {
        let events = LifecycleEvents::new();
        let a = events.subscribe();
        let b = events.subscribe();
        assert_eq!(events.emit(ContextChange::new("menu", "level-1")), 2);
        assert_eq!(a.try_recv(), Some(ContextChange::new("menu", "level-1")));
        assert_eq!(b.drain(), vec![ContextChange::new("menu", "level-1")]);
        assert_eq!(a.try_recv(), None);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let events = LifecycleEvents::new();
        let a = events.subscribe();
        assert_eq!(events.subscriber_count(), 1);
        drop(a);
        assert_eq!(events.subscriber_count(), 0);
        assert_eq!(events.emit(ContextChange::replaced("level-2")), 0);
    }

    #[test]
    fn test_subscription_outlives_source() {
        let events = LifecycleEvents::new();
        let sub = events.subscribe();
        events.emit(ContextChange::new("a", "b"));
        drop(events);
        assert!(!sub.is_connected());
        assert_eq!(sub.drain().len(), 1);
    }

    #[test]
    fn test_previous_name() {
        assert_eq!(ContextChange::replaced("x").previous_name(), "replaced");
        assert_eq!(ContextChange::new("menu", "x").previous_name(), "menu");
    }

    #[test]
    fn test_emit_from_other_thread() {
        let events = LifecycleEvents::new();
        let sub = events.subscribe();
        let remote = events.clone();
        std::thread::spawn(move || {
            remote.emit(ContextChange::new("a", "b"));
        })
        .join()
        .unwrap();
        assert_eq!(sub.drain().len(), 1);
    }
}
