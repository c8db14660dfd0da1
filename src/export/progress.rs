//! Export progress reporting.
//!
//! A [`ProgressSignal`] delivers integer percentages to any number of
//! subscribers, in subscription order. An export emits 0 first, 100 last,
//! and non-decreasing values in between.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Handle returned by [`ProgressSignal::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback = Arc<dyn Fn(u8) + Send + Sync>;

/// Multi-subscriber progress observer.
#[derive(Default)]
pub struct ProgressSignal {
    next_id: AtomicU64,
    subscribers: Mutex<Vec<(SubscriptionId, Callback)>>,
}

impl ProgressSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback`; it receives every later emission.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(u8) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push((id, Arc::new(callback)));
        id
    }

    /// Remove a subscriber. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.lock();
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    /// Deliver `percent` (clamped to 100) to every subscriber.
    ///
    /// Callbacks run outside the lock, so they may subscribe or unsubscribe.
    pub fn emit(&self, percent: u8) {
        let percent = percent.min(100);
        let callbacks: Vec<Callback> = self.lock().iter().map(|(_, cb)| cb.clone()).collect();
        for callback in callbacks {
            callback(percent);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(SubscriptionId, Callback)>> {
        // A panicking subscriber must not disable progress for everyone else
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for ProgressSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressSignal")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Percentage reported just before consuming slice `index` of `total`.
#[inline]
pub fn percent_done(index: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((100 * index.min(total)) / total) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder(signal: &ProgressSignal) -> (SubscriptionId, Arc<Mutex<Vec<u8>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let id = signal.subscribe(move |p| sink.lock().unwrap().push(p));
        (id, seen)
    }

    #[test]
    fn test_all_subscribers_receive() {
        let signal = ProgressSignal::new();
        let (_, a) = recorder(&signal);
        let (_, b) = recorder(&signal);

        signal.emit(0);
        signal.emit(50);

        assert_eq!(*a.lock().unwrap(), vec![0, 50]);
        assert_eq!(*b.lock().unwrap(), vec![0, 50]);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let signal = ProgressSignal::new();
        let (id, seen) = recorder(&signal);

        signal.emit(10);
        assert!(signal.unsubscribe(id));
        assert!(!signal.unsubscribe(id));
        signal.emit(20);

        assert_eq!(*seen.lock().unwrap(), vec![10]);
        assert_eq!(signal.subscriber_count(), 0);
    }

    #[test]
    fn test_subscription_order() {
        let signal = ProgressSignal::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            signal.subscribe(move |_| order.lock().unwrap().push(tag));
        }

        signal.emit(1);
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_emit_clamps() {
        let signal = ProgressSignal::new();
        let (_, seen) = recorder(&signal);
        signal.emit(250);
        assert_eq!(*seen.lock().unwrap(), vec![100]);
    }

    #[test]
    fn test_percent_done() {
        assert_eq!(percent_done(0, 10), 0);
        assert_eq!(percent_done(3, 10), 30);
        assert_eq!(percent_done(2, 3), 66);
        assert_eq!(percent_done(10, 10), 100);
        assert_eq!(percent_done(0, 0), 100);
    }
}
