//! Observer registry
//!
//! An ordered set of callback subscribers. Duplicates are permitted and
//! removal is by identity (`Arc::ptr_eq`), mirroring removal-by-value on
//! externally owned callbacks. Observers are invoked with an explicit
//! context argument rather than an implicit binding.

use std::sync::Arc;

use tracing::debug;

use crate::cycle::event::Envelope;

/// A subscribed callback, invoked once per tick with the caller-supplied
/// execution context and the tick envelope.
pub type Observer<C> = Arc<dyn Fn(&C, &Envelope) + Send + Sync>;

/// Wrap a closure as an [`Observer`].
pub fn observer<C, F>(f: F) -> Observer<C>
where
    F: Fn(&C, &Envelope) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Ordered sequence of observers owned by one controller.
pub(crate) struct ObserverSet<C> {
    observers: Vec<Observer<C>>,
}

impl<C> ObserverSet<C> {
    pub(crate) const fn new() -> Self {
        Self {
            observers: Vec::new(),
        }
    }

    /// Append an observer. Registration order is notification order.
    pub(crate) fn add(&mut self, observer: Observer<C>) {
        self.observers.push(observer);
    }

    /// Remove every entry identity-equal to `observer`.
    ///
    /// Returns `true` only when the removal transitioned the set from
    /// non-empty to empty; the caller uses this to fire the
    /// no-observers hook exactly once.
    pub(crate) fn remove(&mut self, observer: &Observer<C>) -> bool {
        let before = self.observers.len();
        if before == 0 {
            return false;
        }
        self.observers.retain(|o| !Arc::ptr_eq(o, observer));
        let removed = before - self.observers.len();
        if removed == 0 {
            return false;
        }
        debug!(removed, remaining = self.observers.len(), "observer removed");
        self.observers.is_empty()
    }

    /// Empty the set unconditionally. Never fires the no-observers hook.
    pub(crate) fn clear(&mut self) {
        self.observers.clear();
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.observers.len()
    }

    /// Clone the current observer list so notification can happen outside
    /// the registry lock (an observer may call back into the controller).
    pub(crate) fn snapshot(&self) -> Vec<Observer<C>> {
        self.observers.clone()
    }
}
