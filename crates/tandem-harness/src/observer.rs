//! Observer lists for simulation notifications.
//!
//! Callbacks are cloned out of the list before being invoked, so a callback
//! may subscribe, unsubscribe or query its source without a borrow conflict.

use std::{
    cell::{Cell, RefCell},
    fmt,
    rc::Rc,
};

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback<T> = Rc<dyn Fn(&T)>;

/// Ordered list of callbacks receiving `&T`.
pub struct Observers<T> {
    next_id: Cell<u64>,
    entries: RefCell<Vec<(SubscriptionId, Callback<T>)>>,
}

impl<T> Observers<T> {
    /// Empty list.
    pub fn new() -> Self {
        Self { next_id: Cell::new(0), entries: RefCell::new(Vec::new()) }
    }

    /// Register a callback.
    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.entries.borrow_mut().push((id, Rc::new(callback)));
        id
    }

    /// Remove a callback. Returns whether it was registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut entries = self.entries.borrow_mut();
        let before = entries.len();
        entries.retain(|(entry, _)| *entry != id);
        entries.len() != before
    }

    /// Invoke every callback in subscription order.
    pub fn notify(&self, value: &T) {
        let callbacks: Vec<Callback<T>> =
            self.entries.borrow().iter().map(|(_, callback)| Rc::clone(callback)).collect();
        for callback in callbacks {
            callback(value);
        }
    }

    /// Number of registered callbacks.
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Whether no callback is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl<T> Default for Observers<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Observers<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observers").field("count", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notify_in_subscription_order() {
        let observers = Observers::<u32>::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        for tag in ["a", "b"] {
            let seen = Rc::clone(&seen);
            observers.subscribe(move |value| seen.borrow_mut().push(format!("{tag}{value}")));
        }
        observers.notify(&1);

        assert_eq!(*seen.borrow(), vec!["a1", "b1"]);
    }

    #[test]
    fn unsubscribe_removes_callback() {
        let observers = Observers::<u32>::new();
        let id = observers.subscribe(|_| {});

        assert!(observers.unsubscribe(id));
        assert!(!observers.unsubscribe(id));
        assert!(observers.is_empty());
    }
}
