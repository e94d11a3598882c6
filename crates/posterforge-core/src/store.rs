//! Observable value shared between editor components.

use crate::events::{EventBus, Subscription};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// A value with subscribe/notify semantics.
///
/// Clones share the same value. Subscribers are notified after every change,
/// with the new value.
pub struct Store<T> {
    value: Rc<RefCell<T>>,
    changes: Rc<EventBus<T>>,
}

impl<T: Clone + PartialEq + 'static> Store<T> {
    pub fn new(value: T) -> Self {
        Self {
            value: Rc::new(RefCell::new(value)),
            changes: Rc::new(EventBus::new()),
        }
    }

    /// Current value.
    pub fn get(&self) -> T {
        self.value.borrow().clone()
    }

    /// Read the current value without cloning it.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.value.borrow())
    }

    pub fn set(&self, value: T) {
        self.update(|v| *v = value);
    }

    /// Mutate the value in place; subscribers hear about it only if it changed.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        let snapshot = {
            let mut value = self.value.borrow_mut();
            let before = value.clone();
            f(&mut value);
            if *value == before {
                return;
            }
            value.clone()
        };
        self.changes.emit(&snapshot);
    }

    pub fn subscribe(&self, listener: impl FnMut(&T) + 'static) -> Subscription {
        self.changes.subscribe(listener)
    }
}

impl<T> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            value: Rc::clone(&self.value),
            changes: Rc::clone(&self.changes),
        }
    }
}

impl<T: Default + Clone + PartialEq + 'static> Default for Store<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for Store<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store").field("value", &self.value.borrow()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_notifies_on_change_only() {
        let store = Store::new(1u32);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let _sub = store.subscribe(move |v| sink.borrow_mut().push(*v));

        store.set(2);
        store.set(2);
        store.update(|v| *v += 1);
        assert_eq!(*seen.borrow(), vec![2, 3]);
        assert_eq!(store.get(), 3);
    }

    #[test]
    fn test_clones_share_value() {
        let store = Store::new(String::from("a"));
        let other = store.clone();
        other.set("b".to_string());
        assert_eq!(store.get(), "b");
        assert_eq!(store.with(|s| s.len()), 1);
    }
}
