//! Boundary traits for the outside world.
//!
//! The runtime never owns application state, streams or event sources. It
//! talks to them through these traits, which hosts implement (the
//! `procfx-store` crate has in-memory versions of all three).

use std::fmt;
use std::rc::Rc;

use tracing::warn;

use crate::value::Value;

/// Callback registered with an I/O source.
pub type Listener = Rc<dyn Fn(&Value)>;

/// Handle returned by a listener registration; calling it removes the
/// listener. Dropping it without calling leaves the listener registered.
pub struct Unsubscribe(Option<Box<dyn FnOnce()>>);

impl Unsubscribe {
    pub fn new(f: impl FnOnce() + 'static) -> Self {
        Self(Some(Box::new(f)))
    }

    /// A handle that removes nothing.
    pub fn noop() -> Self {
        Self(None)
    }

    pub fn call(mut self) {
        if let Some(f) = self.0.take() {
            f();
        }
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Unsubscribe").field(&self.0.is_some()).finish()
    }
}

/// The action bus and state backend used by `put_action`, `take_action`
/// and `select`.
pub trait Io {
    /// Dispatch an action. The return value is what `put_action` resumes with.
    fn dispatch(&self, action: Value) -> Value;

    /// Register a listener that sees every dispatched action.
    fn subscribe(&self, listener: Listener) -> Unsubscribe;

    fn get_state(&self) -> Value;
}

/// A writable stream that also emits incoming data.
pub trait DataStream {
    fn write(&self, data: Value);

    fn on_data(&self, listener: Listener) -> Unsubscribe;
}

/// A named-event source.
pub trait Emitter {
    fn emit(&self, event: &str, data: Value);

    fn on(&self, event: &str, listener: Listener) -> Unsubscribe;
}

impl fmt::Debug for dyn Io {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Io")
    }
}

impl fmt::Debug for dyn DataStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DataStream")
    }
}

impl fmt::Debug for dyn Emitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Emitter")
    }
}

/// Backend used when the host configures none.
///
/// Dispatches are dropped and state reads return null, with a warning.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoIo;

impl Io for NoIo {
    fn dispatch(&self, action: Value) -> Value {
        warn!(action = %action.to_json(), "no io backend configured; action dropped");
        Value::Null
    }

    fn subscribe(&self, _listener: Listener) -> Unsubscribe {
        Unsubscribe::noop()
    }

    fn get_state(&self) -> Value {
        warn!("no io backend configured; state is null");
        Value::Null
    }
}
