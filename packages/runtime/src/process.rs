//! Processes and the coroutine machinery that drives them.
//!
//! A process is an async body that talks to the runtime only through
//! [`Co::perform`]. Each `perform` parks one [`Effect`] in a shared slot
//! and suspends; the runtime polls the body by hand, picks the effect out of
//! the slot, resolves it, writes the result back and polls again. The body
//! is never woken by anything else, so it must not await other futures.
//!
//! ```ignore
//! let greeter = process_fn("greeter", |co, args| async move {
//!     let name = co.perform(Effect::select_state()).await?;
//!     co.perform(Effect::put_action(json!({"type": "GREETED", "name": name}))).await?;
//!     Ok(Value::Null)
//! });
//! ```
//!
//! Delegating to a helper is plain `.await` on an async fn that takes the
//! same `Co`; it does not start a new task.

use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context as PollContext, Poll};

use async_trait::async_trait;
use futures::future::LocalBoxFuture;
use futures::task::noop_waker_ref;
use futures::FutureExt;

use crate::effect::Effect;
use crate::error::{Result, RuntimeError};
use crate::task::TaskId;
use crate::value::Value;

/// A suspendable process.
///
/// `run` is called once per task. Every `co.perform(..).await` is a
/// suspension point; returning `Ok` settles the task as done, returning
/// `Err` settles it as errored.
#[async_trait(?Send)]
pub trait Process {
    /// Name used in logs and middleware.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn run(&self, co: Co, args: Vec<Value>) -> Result<Value>;
}

/// Shared handle to a process definition.
#[derive(Clone)]
pub struct ProcessRef(Rc<dyn Process>);

impl ProcessRef {
    pub fn new(process: impl Process + 'static) -> Self {
        Self(Rc::new(process))
    }

    pub fn name(&self) -> &str {
        self.0.name()
    }
}

impl<P: Process + 'static> From<P> for ProcessRef {
    fn from(process: P) -> Self {
        Self::new(process)
    }
}

impl fmt::Debug for ProcessRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ProcessRef").field(&self.name()).finish()
    }
}

/// Build a process from a name and an async closure.
pub fn process_fn<F, Fut>(name: impl Into<String>, body: F) -> ProcessRef
where
    F: Fn(Co, Vec<Value>) -> Fut + 'static,
    Fut: Future<Output = Result<Value>> + 'static,
{
    ProcessRef::new(FnProcess {
        name: name.into(),
        body,
    })
}

struct FnProcess<F> {
    name: String,
    body: F,
}

#[async_trait(?Send)]
impl<F, Fut> Process for FnProcess<F>
where
    F: Fn(Co, Vec<Value>) -> Fut,
    Fut: Future<Output = Result<Value>>,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, co: Co, args: Vec<Value>) -> Result<Value> {
        (self.body)(co, args).await
    }
}

/// The slot a process and the runtime pass effects and results through.
#[derive(Default)]
enum Exchange {
    #[default]
    Idle,
    Yielded(Effect),
    Resumed(Result<Value>),
    /// A second effect was yielded before the first was resumed.
    Conflict,
}

/// A process's connection to the runtime.
#[derive(Clone)]
pub struct Co {
    task: TaskId,
    exchange: Rc<RefCell<Exchange>>,
}

impl Co {
    pub(crate) fn new(task: TaskId) -> Self {
        Self {
            task,
            exchange: Rc::new(RefCell::new(Exchange::Idle)),
        }
    }

    /// Id of the task running this process.
    pub fn task_id(&self) -> TaskId {
        self.task
    }

    /// Yield `effect` and wait for its result.
    ///
    /// A failed effect comes back as `Err`; the process may handle it or
    /// pass it on with `?`.
    pub fn perform(&self, effect: Effect) -> Perform {
        Perform {
            effect: Some(effect),
            exchange: self.exchange.clone(),
        }
    }
}

impl fmt::Debug for Co {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Co").field("task", &self.task).finish()
    }
}

/// Future returned by [`Co::perform`].
#[must_use = "effects do nothing unless awaited"]
pub struct Perform {
    effect: Option<Effect>,
    exchange: Rc<RefCell<Exchange>>,
}

impl Future for Perform {
    type Output = Result<Value>;

    fn poll(self: Pin<&mut Self>, _cx: &mut PollContext<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let mut slot = this.exchange.borrow_mut();

        if let Some(effect) = this.effect.take() {
            *slot = match *slot {
                Exchange::Idle => Exchange::Yielded(effect),
                _ => Exchange::Conflict,
            };
            return Poll::Pending;
        }

        match std::mem::take(&mut *slot) {
            Exchange::Resumed(result) => Poll::Ready(result),
            other => {
                *slot = other;
                Poll::Pending
            }
        }
    }
}

/// What a process did when it was last resumed.
#[derive(Debug)]
pub(crate) enum Step {
    Yield(Effect),
    Return(Value),
    Throw(RuntimeError),
}

/// A process instance suspended between effects.
pub(crate) struct Coroutine {
    exchange: Rc<RefCell<Exchange>>,
    future: LocalBoxFuture<'static, Result<Value>>,
}

impl Coroutine {
    /// Instantiate `process`. Nothing runs until the first `resume`.
    pub(crate) fn new(process: &ProcessRef, co: Co, args: Vec<Value>) -> Self {
        let exchange = co.exchange.clone();
        let process = process.clone();
        let future = async move { process.0.run(co, args).await }.boxed_local();
        Self { exchange, future }
    }

    /// Run the process up to its next suspension point.
    ///
    /// `input` is the result of the previously yielded effect; `None` starts
    /// the process.
    pub(crate) fn resume(&mut self, input: Option<Result<Value>>) -> Step {
        if let Some(input) = input {
            *self.exchange.borrow_mut() = Exchange::Resumed(input);
        }

        let mut cx = PollContext::from_waker(noop_waker_ref());
        match self.future.as_mut().poll(&mut cx) {
            Poll::Ready(Ok(value)) => Step::Return(value),
            Poll::Ready(Err(error)) => Step::Throw(error),
            Poll::Pending => match std::mem::take(&mut *self.exchange.borrow_mut()) {
                Exchange::Yielded(effect) => Step::Yield(effect),
                Exchange::Conflict => Step::Throw(RuntimeError::ConcurrentYield),
                Exchange::Idle | Exchange::Resumed(_) => Step::Throw(RuntimeError::ForeignAwait),
            },
        }
    }
}
