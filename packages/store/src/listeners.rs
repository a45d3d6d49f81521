//! A set of listeners with removal handles.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use procfx_runtime::{Listener, Unsubscribe, Value};

#[derive(Default)]
struct Slots {
    next: u64,
    listeners: BTreeMap<u64, Listener>,
}

/// Listeners in registration order.
///
/// `notify` calls the listeners registered when it started; listeners added
/// during a notification see the next one, and listeners removed during a
/// notification may still be called for the current one.
#[derive(Clone, Default)]
pub struct ListenerSet {
    slots: Rc<RefCell<Slots>>,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener`. The returned handle removes it; dropping the
    /// handle keeps it registered.
    pub fn add(&self, listener: Listener) -> Unsubscribe {
        let id = {
            let mut slots = self.slots.borrow_mut();
            slots.next += 1;
            let id = slots.next;
            slots.listeners.insert(id, listener);
            id
        };
        let slots: Weak<RefCell<Slots>> = Rc::downgrade(&self.slots);
        Unsubscribe::new(move || {
            if let Some(slots) = slots.upgrade() {
                slots.borrow_mut().listeners.remove(&id);
            }
        })
    }

    pub fn notify(&self, value: &Value) {
        let snapshot: Vec<Listener> = self.slots.borrow().listeners.values().cloned().collect();
        for listener in snapshot {
            listener(value);
        }
    }

    pub fn len(&self) -> usize {
        self.slots.borrow().listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.borrow().listeners.is_empty()
    }
}
