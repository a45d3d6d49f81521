//! Named-event source.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use procfx_runtime::{Emitter, Listener, Unsubscribe, Value};
use tracing::trace;

use crate::listeners::ListenerSet;

/// An in-memory [`Emitter`] keeping one listener set per event name.
///
/// Events emitted with no listener are dropped.
#[derive(Clone, Default)]
pub struct EventBus {
    events: Rc<RefCell<BTreeMap<String, ListenerSet>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of listeners registered for `event`.
    pub fn listener_count(&self, event: &str) -> usize {
        self.events
            .borrow()
            .get(event)
            .map_or(0, ListenerSet::len)
    }
}

impl Emitter for EventBus {
    fn emit(&self, event: &str, data: Value) {
        let listeners = self.events.borrow().get(event).cloned();
        match listeners {
            Some(listeners) => listeners.notify(&data),
            None => trace!(event, "event emitted with no listeners"),
        }
    }

    fn on(&self, event: &str, listener: Listener) -> Unsubscribe {
        let listeners = self
            .events
            .borrow_mut()
            .entry(event.to_string())
            .or_default()
            .clone();
        listeners.add(listener)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let events = self.events.borrow();
        f.debug_map()
            .entries(events.iter().map(|(name, set)| (name, set.len())))
            .finish()
    }
}
