//! Single-threaded event bus with scoped subscriptions.
//!
//! Components never receive callbacks that mutate the scene while it is being
//! mutated. Instead they subscribe a [`Mailbox`], and drain it when the session
//! pumps them. Every subscription hands back a [`Subscription`] that removes the
//! listener when disposed or dropped.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};

type Listener<E> = Box<dyn FnMut(&E)>;

struct BusInner<E> {
    next_id: u64,
    listeners: Vec<(u64, Listener<E>)>,
    /// Listeners removed while an emit held them outside the cell.
    removed_during_emit: Vec<u64>,
    emitting: bool,
}

/// Broadcasts events of type `E` to every current subscriber.
pub struct EventBus<E> {
    inner: Rc<RefCell<BusInner<E>>>,
}

impl<E: 'static> EventBus<E> {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(BusInner {
                next_id: 0,
                listeners: Vec::new(),
                removed_during_emit: Vec::new(),
                emitting: false,
            })),
        }
    }

    /// Register a listener. It stays registered until the returned handle is disposed.
    pub fn subscribe(&self, listener: impl FnMut(&E) + 'static) -> Subscription {
        let id = {
            let mut inner = self.inner.borrow_mut();
            let id = inner.next_id;
            inner.next_id += 1;
            inner.listeners.push((id, Box::new(listener)));
            id
        };

        let weak: Weak<RefCell<BusInner<E>>> = Rc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                let mut inner = inner.borrow_mut();
                let before = inner.listeners.len();
                inner.listeners.retain(|(lid, _)| *lid != id);
                if inner.listeners.len() == before && inner.emitting {
                    inner.removed_during_emit.push(id);
                }
            }
        })
    }

    /// Subscribe a queue that collects clones of every event.
    pub fn mailbox(&self) -> (Subscription, Mailbox<E>)
    where
        E: Clone,
    {
        let mailbox = Mailbox::new();
        let sink = mailbox.clone();
        let subscription = self.subscribe(move |event: &E| sink.push(event.clone()));
        (subscription, mailbox)
    }

    /// Deliver `event` to every listener in subscription order.
    ///
    /// Listeners may subscribe or unsubscribe while being called. A nested emit
    /// from inside a listener is dropped.
    pub fn emit(&self, event: &E) {
        let mut listeners = {
            let mut inner = self.inner.borrow_mut();
            if inner.emitting {
                log::warn!("Dropping event emitted from inside a listener");
                return;
            }
            inner.emitting = true;
            std::mem::take(&mut inner.listeners)
        };

        for (_, listener) in listeners.iter_mut() {
            listener(event);
        }

        let mut inner = self.inner.borrow_mut();
        let removed = std::mem::take(&mut inner.removed_during_emit);
        listeners.retain(|(id, _)| !removed.contains(id));
        // Listeners added during the emit go after the existing ones.
        let added = std::mem::take(&mut inner.listeners);
        listeners.extend(added);
        inner.listeners = listeners;
        inner.emitting = false;
    }

    pub fn listener_count(&self) -> usize {
        self.inner.borrow().listeners.len()
    }
}

impl<E: 'static> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.inner.borrow().listeners.len())
            .finish()
    }
}

/// Handle that removes a registration when disposed.
///
/// Dropping the handle disposes it. Disposing twice is a no-op.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    dispose: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub fn new(dispose: impl FnOnce() + 'static) -> Self {
        Self {
            dispose: Some(Box::new(dispose)),
        }
    }

    /// A handle that owns nothing.
    pub fn empty() -> Self {
        Self { dispose: None }
    }

    pub fn dispose(&mut self) {
        if let Some(dispose) = self.dispose.take() {
            dispose();
        }
    }

    pub fn is_active(&self) -> bool {
        self.dispose.is_some()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

/// FIFO of events collected from a bus, drained by its owner.
pub struct Mailbox<E> {
    queue: Rc<RefCell<VecDeque<E>>>,
}

impl<E> Mailbox<E> {
    pub fn new() -> Self {
        Self {
            queue: Rc::new(RefCell::new(VecDeque::new())),
        }
    }

    pub fn push(&self, event: E) {
        self.queue.borrow_mut().push_back(event);
    }

    /// Take every queued event, oldest first.
    pub fn drain(&self) -> Vec<E> {
        self.queue.borrow_mut().drain(..).collect()
    }

    pub fn clear(&self) {
        self.queue.borrow_mut().clear();
    }

    pub fn len(&self) -> usize {
        self.queue.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.borrow().is_empty()
    }
}

impl<E> Clone for Mailbox<E> {
    fn clone(&self) -> Self {
        Self {
            queue: Rc::clone(&self.queue),
        }
    }
}

impl<E> Default for Mailbox<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for Mailbox<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mailbox").field("len", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_subscribe_and_emit() {
        let bus = EventBus::<u32>::new();
        let seen = Rc::new(Cell::new(0));
        let seen_clone = Rc::clone(&seen);
        let _sub = bus.subscribe(move |v| seen_clone.set(seen_clone.get() + *v));

        bus.emit(&3);
        bus.emit(&4);
        assert_eq!(seen.get(), 7);
    }

    #[test]
    fn test_dispose_is_idempotent() {
        let bus = EventBus::<u32>::new();
        let mut sub = bus.subscribe(|_| {});
        assert_eq!(bus.listener_count(), 1);
        sub.dispose();
        sub.dispose();
        assert_eq!(bus.listener_count(), 0);
        assert!(!sub.is_active());
    }

    #[test]
    fn test_drop_unsubscribes() {
        let bus = EventBus::<u32>::new();
        {
            let _sub = bus.subscribe(|_| {});
            assert_eq!(bus.listener_count(), 1);
        }
        assert_eq!(bus.listener_count(), 0);
    }

    #[test]
    fn test_subscription_outlives_bus() {
        let bus = EventBus::<u32>::new();
        let mut sub = bus.subscribe(|_| {});
        drop(bus);
        sub.dispose();
    }

    #[test]
    fn test_mailbox_collects_in_order() {
        let bus = EventBus::<&'static str>::new();
        let (_sub, mailbox) = bus.mailbox();
        bus.emit(&"a");
        bus.emit(&"b");
        assert_eq!(mailbox.len(), 2);
        assert_eq!(mailbox.drain(), vec!["a", "b"]);
        assert!(mailbox.is_empty());
    }

    #[test]
    fn test_unsubscribe_during_emit() {
        let bus = EventBus::<u32>::new();
        let slot: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));
        let calls = Rc::new(Cell::new(0));

        let slot_clone = Rc::clone(&slot);
        let calls_clone = Rc::clone(&calls);
        let sub = bus.subscribe(move |_| {
            calls_clone.set(calls_clone.get() + 1);
            if let Some(mut sub) = slot_clone.borrow_mut().take() {
                sub.dispose();
            }
        });
        *slot.borrow_mut() = Some(sub);

        bus.emit(&1);
        bus.emit(&2);
        assert_eq!(calls.get(), 1);
        assert_eq!(bus.listener_count(), 0);
    }
}
