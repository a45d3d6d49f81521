//! Single-use completion tokens handed to resolvers.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::warn;

use crate::error::{Result, RuntimeError};
use crate::runtime::{Resumption, Runtime, RuntimeInner};
use crate::task::TaskId;
use crate::value::Value;

type Callback = Box<dyn FnOnce(Result<Value>)>;
type ReleaseHook = Box<dyn FnOnce()>;

enum Sink {
    /// Resume `task` at `step` through the runtime's queue.
    Step {
        runtime: Weak<RuntimeInner>,
        task: TaskId,
        step: u64,
    },
    Callback(RefCell<Option<Callback>>),
}

struct Inner {
    fired: Cell<bool>,
    released: Cell<bool>,
    sink: Sink,
    parent: Option<Completion>,
    on_release: RefCell<Vec<ReleaseHook>>,
}

/// The callback a resolver reports its result through.
///
/// A completion fires at most once: the first `complete` delivers the
/// result, later calls are ignored (and logged, since they indicate a buggy
/// resolver). Clones share that single shot.
///
/// A completion is *abandoned* when nobody is waiting for it any more: it
/// already fired, its parent (for `parallel`/`race` members) is abandoned,
/// or the task it would resume has moved on or been cancelled. Resolvers
/// holding listeners use this to skip dead waiters, and register
/// [`Completion::on_release`] hooks to remove them eagerly.
#[derive(Clone)]
pub struct Completion {
    inner: Rc<Inner>,
}

impl Completion {
    /// A completion that calls `f` with the result.
    pub fn new(f: impl FnOnce(Result<Value>) + 'static) -> Self {
        Self::with_sink(Sink::Callback(RefCell::new(Some(Box::new(f)))), None)
    }

    /// A completion for a sub-effect whose result feeds `f`.
    ///
    /// The new completion is abandoned as soon as `self` is.
    pub fn linked(&self, f: impl FnOnce(Result<Value>) + 'static) -> Self {
        let child = Self::with_sink(
            Sink::Callback(RefCell::new(Some(Box::new(f)))),
            Some(self.clone()),
        );
        let weak: Weak<Inner> = Rc::downgrade(&child.inner);
        self.on_release(move || {
            if let Some(inner) = weak.upgrade() {
                Completion { inner }.release();
            }
        });
        child
    }

    pub(crate) fn step(runtime: Weak<RuntimeInner>, task: TaskId, step: u64) -> Self {
        Self::with_sink(Sink::Step { runtime, task, step }, None)
    }

    fn with_sink(sink: Sink, parent: Option<Completion>) -> Self {
        Self {
            inner: Rc::new(Inner {
                fired: Cell::new(false),
                released: Cell::new(false),
                sink,
                parent,
                on_release: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Deliver the result. Returns false if this completion already fired.
    pub fn complete(&self, result: Result<Value>) -> bool {
        if self.inner.fired.replace(true) {
            warn!("completion invoked more than once; result dropped");
            return false;
        }
        self.release();
        match &self.inner.sink {
            Sink::Step {
                runtime,
                task,
                step,
            } => {
                if let Some(inner) = runtime.upgrade() {
                    Runtime::from_inner(inner).schedule(Resumption {
                        task: *task,
                        step: *step,
                        input: Some(result),
                    });
                }
            }
            Sink::Callback(callback) => {
                let callback = callback.borrow_mut().take();
                if let Some(callback) = callback {
                    callback(result);
                }
            }
        }
        true
    }

    pub fn succeed(&self, value: Value) -> bool {
        self.complete(Ok(value))
    }

    pub fn fail(&self, error: RuntimeError) -> bool {
        self.complete(Err(error))
    }

    /// Whether this completion has fired.
    pub fn is_completed(&self) -> bool {
        self.inner.fired.get()
    }

    /// Run `f` once this completion stops accepting results: when it fires,
    /// when its parent fires or is released, or when the task it would
    /// resume is cancelled. Runs `f` right away if that already happened.
    ///
    /// Resolvers use this to take down listeners and queue entries that a
    /// lost `race` or a cancelled task would otherwise leave behind.
    pub fn on_release(&self, f: impl FnOnce() + 'static) {
        if self.inner.released.get() || self.is_abandoned() {
            f();
            return;
        }
        self.inner.on_release.borrow_mut().push(Box::new(f));
    }

    /// Mark this completion dead and run its release hooks, once.
    pub(crate) fn release(&self) {
        if self.inner.released.replace(true) {
            return;
        }
        let hooks = std::mem::take(&mut *self.inner.on_release.borrow_mut());
        for hook in hooks {
            hook();
        }
    }

    /// Whether a result delivered now would be ignored.
    pub fn is_abandoned(&self) -> bool {
        if self.is_completed() || self.inner.released.get() {
            return true;
        }
        if let Some(parent) = &self.inner.parent {
            if parent.is_abandoned() {
                return true;
            }
        }
        match &self.inner.sink {
            Sink::Step {
                runtime,
                task,
                step,
            } => match runtime.upgrade() {
                Some(inner) => !Runtime::from_inner(inner).is_waiting(*task, *step),
                None => true,
            },
            Sink::Callback(_) => false,
        }
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Completion");
        if let Sink::Step { task, step, .. } = &self.inner.sink {
            debug.field("task", task).field("step", step);
        }
        debug
            .field("fired", &self.inner.fired.get())
            .field("released", &self.inner.released.get())
            .finish()
    }
}
