use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use super::ChangeEvent;
use crate::progression::domain::UserId;

pub type ChangeCallback = Arc<dyn Fn(ChangeEvent) + Send + Sync>;

/// Per-user subscriber registry used by the store implementations.
#[derive(Clone, Default)]
pub struct ChangeFeed {
    inner: Arc<Mutex<FeedInner>>,
}

#[derive(Default)]
struct FeedInner {
    next_id: u64,
    subscribers: Vec<Subscriber>,
}

struct Subscriber {
    id: u64,
    user_id: UserId,
    callback: ChangeCallback,
}

impl ChangeFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, user_id: &UserId, callback: ChangeCallback) -> Subscription {
        let id = {
            let mut guard = self.inner.lock().expect("change feed mutex poisoned");
            let id = guard.next_id;
            guard.next_id += 1;
            guard.subscribers.push(Subscriber {
                id,
                user_id: user_id.clone(),
                callback,
            });
            id
        };

        let feed: Weak<Mutex<FeedInner>> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = feed.upgrade() {
                let mut guard = inner.lock().expect("change feed mutex poisoned");
                guard.subscribers.retain(|subscriber| subscriber.id != id);
            }
        })
    }

    /// Callbacks run after the registry lock is released, so they may subscribe or
    /// unsubscribe freely.
    pub fn publish(&self, event: ChangeEvent) {
        let targets: Vec<ChangeCallback> = {
            let guard = self.inner.lock().expect("change feed mutex poisoned");
            guard
                .subscribers
                .iter()
                .filter(|subscriber| subscriber.user_id == event.record.user_id)
                .map(|subscriber| Arc::clone(&subscriber.callback))
                .collect()
        };

        for callback in targets {
            callback(event.clone());
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner
            .lock()
            .expect("change feed mutex poisoned")
            .subscribers
            .len()
    }
}

impl fmt::Debug for ChangeFeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeFeed")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Handle returned by `on_change`; unsubscribes when dropped.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A subscription with nothing to cancel, for backends without notifications.
    pub fn detached() -> Self {
        Self { cancel: None }
    }

    pub fn unsubscribe(mut self) {
        self.cancel();
    }

    fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}
