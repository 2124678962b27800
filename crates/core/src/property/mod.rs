use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

type Callback<T> = Box<dyn FnMut(&T, &T)>;

struct Listeners<T> {
    next_id: u64,
    entries: Vec<(u64, Callback<T>)>,
}

/// Observable value that notifies subscribers synchronously on every `set`.
///
/// Single-threaded: the scheduler loop and the settings layer share it on one
/// thread. Callbacks must not call back into the same property.
pub struct Property<T> {
    value: T,
    listeners: Rc<RefCell<Listeners<T>>>,
}

impl<T: Clone> Property<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            listeners: Rc::new(RefCell::new(Listeners {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }

    pub fn get(&self) -> T {
        self.value.clone()
    }

    /// Replaces the value and invokes every subscriber with `(old, new)`
    /// before returning.
    pub fn set(&mut self, value: T) {
        let old = std::mem::replace(&mut self.value, value);
        let mut listeners = self.listeners.borrow_mut();
        for (_, callback) in listeners.entries.iter_mut() {
            callback(&old, &self.value);
        }
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription<T>
    where
        F: FnMut(&T, &T) + 'static,
    {
        let mut listeners = self.listeners.borrow_mut();
        let id = listeners.next_id;
        listeners.next_id += 1;
        listeners.entries.push((id, Box::new(callback)));
        Subscription {
            id,
            listeners: Rc::downgrade(&self.listeners),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.listeners.borrow().entries.len()
    }
}

impl<T: Clone + Default> Default for Property<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for Property<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("value", &self.value)
            .field("subscribers", &self.listeners.borrow().entries.len())
            .finish()
    }
}

/// Handle returned by [`Property::subscribe`].
///
/// Dropping the handle keeps the callback registered; call
/// [`Subscription::unsubscribe`] to remove it.
#[must_use = "keep the subscription to be able to unsubscribe later"]
pub struct Subscription<T> {
    id: u64,
    listeners: Weak<RefCell<Listeners<T>>>,
}

impl<T> Subscription<T> {
    pub fn unsubscribe(self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners
                .borrow_mut()
                .entries
                .retain(|(id, _)| *id != self.id);
        }
    }
}

impl<T> fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
