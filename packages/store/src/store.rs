//! Reducer-driven in-memory state container.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use procfx_runtime::{Io, Listener, Unsubscribe, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::listeners::ListenerSet;

/// Errors raised by [`Store::try_dispatch`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// Actions must be maps.
    #[error("actions must be maps, got {0}")]
    NotAMap(String),

    /// Actions must carry a non-empty string `type`.
    #[error("action has no type")]
    MissingType,

    /// A reducer tried to dispatch while computing the next state.
    #[error("reducers may not dispatch actions")]
    Reentrant,
}

type Reducer = Box<dyn Fn(&Value, &Value) -> Value>;

struct StoreInner {
    state: RefCell<Value>,
    reducer: Reducer,
    reducing: Cell<bool>,
    listeners: ListenerSet,
}

/// An in-memory state container.
///
/// Every dispatched action runs through the reducer to produce the next
/// state, then goes to every subscriber. As the runtime's [`Io`] backend it
/// serves `put_action`, `take_action` and `select`.
///
/// # Example
///
/// ```rust
/// use procfx_runtime::{Io, Value};
/// use procfx_store::Store;
///
/// let store = Store::new(
///     |state, action| match action.action_type() {
///         Some("INCREMENT") => Value::from(state.as_i64().unwrap_or(0) + 1),
///         _ => state.clone(),
///     },
///     Value::from(0),
/// );
///
/// let mut action = Value::map();
/// action.insert("type", Value::from("INCREMENT"));
/// store.dispatch(action);
///
/// assert_eq!(store.state(), Value::from(1));
/// ```
#[derive(Clone)]
pub struct Store {
    inner: Rc<StoreInner>,
}

impl Store {
    /// Create a store with a reducer and initial state.
    pub fn new(reducer: impl Fn(&Value, &Value) -> Value + 'static, initial: Value) -> Self {
        Self {
            inner: Rc::new(StoreInner {
                state: RefCell::new(initial),
                reducer: Box::new(reducer),
                reducing: Cell::new(false),
                listeners: ListenerSet::new(),
            }),
        }
    }

    /// Create a store whose state never changes.
    pub fn with_state(state: Value) -> Self {
        Self::new(|state, _action| state.clone(), state)
    }

    /// Get a copy of the current state.
    pub fn state(&self) -> Value {
        self.inner.state.borrow().clone()
    }

    /// Reduce `action` into the state and notify subscribers.
    ///
    /// Returns the action.
    pub fn try_dispatch(&self, action: Value) -> Result<Value, StoreError> {
        if !action.is_map() {
            return Err(StoreError::NotAMap(action.to_json().to_string()));
        }
        if action.action_type().is_none() {
            return Err(StoreError::MissingType);
        }
        if self.inner.reducing.replace(true) {
            return Err(StoreError::Reentrant);
        }

        let next = {
            let state = self.inner.state.borrow();
            (self.inner.reducer)(&state, &action)
        };
        self.inner.reducing.set(false);
        *self.inner.state.borrow_mut() = next;

        debug!(action_type = ?action.action_type(), "action dispatched");
        self.inner.listeners.notify(&action);
        Ok(action)
    }

    /// Number of subscribed listeners.
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.len()
    }
}

impl Io for Store {
    /// Dispatch `action`; invalid actions are logged and dropped.
    fn dispatch(&self, action: Value) -> Value {
        match self.try_dispatch(action) {
            Ok(action) => action,
            Err(error) => {
                warn!(error = %error, "action rejected");
                Value::Null
            }
        }
    }

    fn subscribe(&self, listener: Listener) -> Unsubscribe {
        self.inner.listeners.add(listener)
    }

    fn get_state(&self) -> Value {
        self.state()
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("state", &*self.inner.state.borrow())
            .field("listeners", &self.inner.listeners.len())
            .finish()
    }
}
