//! In-memory duplex stream.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use procfx_runtime::{DataStream, Listener, Unsubscribe, Value};
use tracing::trace;

use crate::listeners::ListenerSet;

/// An in-memory [`DataStream`].
///
/// The two directions are independent: `write` (what `put_stream` does)
/// appends to an output buffer the host reads with [`MemoryStream::written`],
/// while [`MemoryStream::push`] delivers incoming data to the `on_data`
/// listeners (what `take_stream` waits on). Data pushed while nobody
/// listens is dropped.
#[derive(Clone, Default)]
pub struct MemoryStream {
    written: Rc<RefCell<Vec<Value>>>,
    listeners: ListenerSet,
}

impl MemoryStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver incoming data to the current listeners.
    pub fn push(&self, data: impl Into<Value>) {
        let data = data.into();
        if self.listeners.is_empty() {
            trace!("stream data pushed with no listeners");
        }
        self.listeners.notify(&data);
    }

    /// Everything written so far.
    pub fn written(&self) -> Vec<Value> {
        self.written.borrow().clone()
    }

    /// Drain the output buffer.
    pub fn take_written(&self) -> Vec<Value> {
        std::mem::take(&mut *self.written.borrow_mut())
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl DataStream for MemoryStream {
    fn write(&self, data: Value) {
        self.written.borrow_mut().push(data);
    }

    fn on_data(&self, listener: Listener) -> Unsubscribe {
        self.listeners.add(listener)
    }
}

impl fmt::Debug for MemoryStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStream")
            .field("written", &self.written.borrow().len())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
