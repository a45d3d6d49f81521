//! The scheduler: starts tasks, drives their coroutines and dispatches the
//! effects they yield.
//!
//! The Runtime is responsible for:
//! - Creating tasks and tracking their fork tree
//! - Resuming each task with the result of its last effect, one step at a time
//! - Settling tasks and cancelling subtrees
//!
//! Everything runs on one thread. Resolvers that finish immediately queue
//! the resumption; the queue is drained in FIFO order before control returns
//! to the host, so a run of non-blocking effects completes in the same turn.
//! Resolvers that wait (timers, async calls) use `tokio::task::spawn_local`,
//! which means a runtime using them must live inside a `tokio::task::LocalSet`.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::future::Future;
use std::rc::Rc;

use tracing::{debug, error, trace};

use crate::completion::Completion;
use crate::context::Context;
use crate::effect::{Effect, EffectKind};
use crate::error::{Result, RuntimeError};
use crate::io::{Io, NoIo};
use crate::middleware::{Middleware, ProcessInfo};
use crate::process::{Co, Coroutine, ProcessRef, Step};
use crate::registry::EffectRegistry;
use crate::task::{FinalCallback, Outcome, Task, TaskCore, TaskId, TaskRecord, TaskTable};
use crate::value::Value;

/// Configuration for the procfx runtime.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Maximum number of live tasks.
    pub max_tasks: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self { max_tasks: 1024 }
    }
}

/// Called when a task without a final callback or waiters fails.
pub type UnhandledErrorHook = Rc<dyn Fn(&Task, &RuntimeError)>;

/// A queued resume of one task step.
pub(crate) struct Resumption {
    pub(crate) task: TaskId,
    pub(crate) step: u64,
    /// `None` starts the task.
    pub(crate) input: Option<Result<Value>>,
}

pub(crate) struct RuntimeInner {
    config: RuntimeConfig,
    registry: EffectRegistry,
    middleware: Vec<Rc<dyn Middleware>>,
    io: Rc<dyn Io>,
    on_unhandled: Option<UnhandledErrorHook>,
    pub(crate) tasks: RefCell<TaskTable>,
    queue: RefCell<VecDeque<Resumption>>,
    draining: Cell<bool>,
}

struct DrainGuard<'a>(&'a Cell<bool>);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// The procfx runtime.
///
/// Cheap to clone; clones drive the same tasks. Tasks and completions only
/// hold weak references back to the runtime, so once the last `Runtime`
/// handle is dropped every pending task is abandoned.
///
/// # Example
///
/// ```ignore
/// let runtime = Runtime::builder()
///     .io(store.clone())
///     .middleware(TracingMiddleware)
///     .build();
///
/// let task = runtime.run(pinger, Context::new(), None, vec![])?;
/// let outcome = task.done().await;
/// ```
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

/// Create a runtime from its three collaborators.
pub fn create_runtime(
    middleware: Vec<Rc<dyn Middleware>>,
    registry: EffectRegistry,
    io: Rc<dyn Io>,
) -> Runtime {
    RuntimeBuilder {
        middleware,
        registry: Some(registry),
        io: Some(io),
        ..RuntimeBuilder::default()
    }
    .build()
}

impl Runtime {
    /// Create a runtime with the built-in resolvers and no I/O backend.
    pub fn new(config: RuntimeConfig) -> Self {
        Self::builder().config(config).build()
    }

    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::default()
    }

    pub(crate) fn from_inner(inner: Rc<RuntimeInner>) -> Self {
        Self { inner }
    }

    /// Start `process` as a new root task.
    ///
    /// The task shares `context` with every task it forks. `final_callback`
    /// runs once with the task's outcome. The first step runs before this
    /// returns, so a process that only yields non-blocking effects may
    /// already be settled.
    pub fn run(
        &self,
        process: ProcessRef,
        context: Context,
        final_callback: Option<FinalCallback>,
        args: Vec<Value>,
    ) -> Result<Task> {
        self.start_task(&process, args, context, None, final_callback)
    }

    /// Start `process` with a fresh context and no final callback.
    pub fn start(&self, process: ProcessRef, args: Vec<Value>) -> Result<Task> {
        self.run(process, Context::new(), None, args)
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &EffectRegistry {
        &self.inner.registry
    }

    pub fn io(&self) -> &dyn Io {
        &*self.inner.io
    }

    /// Number of live tasks.
    pub fn task_count(&self) -> usize {
        self.inner.tasks.borrow().len()
    }

    /// Ids of all live tasks.
    pub fn tasks(&self) -> Vec<TaskId> {
        self.inner.tasks.borrow().ids()
    }

    /// Get a live task's handle by id.
    pub fn get_task(&self, id: TaskId) -> Option<Task> {
        let tasks = self.inner.tasks.borrow();
        let core = tasks.get(id).map(|record| record.core.clone());
        core.map(|core| Task::new(core, Rc::downgrade(&self.inner)))
    }

    fn start_task(
        &self,
        process: &ProcessRef,
        args: Vec<Value>,
        context: Context,
        parent: Option<TaskId>,
        final_callback: Option<FinalCallback>,
    ) -> Result<Task> {
        let task = {
            let mut tasks = self.inner.tasks.borrow_mut();
            if tasks.len() >= self.inner.config.max_tasks {
                return Err(RuntimeError::TaskLimitReached(self.inner.config.max_tasks));
            }
            let id = tasks.next_id();
            let core = Rc::new(TaskCore::new(id, process.name()));
            let coroutine = Coroutine::new(process, Co::new(id), args.clone());
            tasks.insert(TaskRecord::new(
                core.clone(),
                parent,
                coroutine,
                context.clone(),
                final_callback,
            ));
            Task::new(core, Rc::downgrade(&self.inner))
        };
        debug!(task = %task.id(), process = process.name(), parent = ?parent, "task started");

        if !self.inner.middleware.is_empty() {
            let info = ProcessInfo {
                task: task.clone(),
                parent,
                process: process.name().to_string(),
                args,
                context,
            };
            for middleware in &self.inner.middleware {
                middleware.on_start(&info);
            }
        }

        self.schedule(Resumption {
            task: task.id(),
            step: 0,
            input: None,
        });
        Ok(task)
    }

    /// Queue a resumption and drain the queue unless already draining.
    pub(crate) fn schedule(&self, resumption: Resumption) {
        self.inner.queue.borrow_mut().push_back(resumption);
        self.drain();
    }

    fn drain(&self) {
        if self.inner.draining.replace(true) {
            return;
        }
        let _guard = DrainGuard(&self.inner.draining);
        loop {
            let next = self.inner.queue.borrow_mut().pop_front();
            match next {
                Some(resumption) => self.step(resumption),
                None => break,
            }
        }
    }

    /// Whether `task` is live and suspended at `step`.
    pub(crate) fn is_waiting(&self, task: TaskId, step: u64) -> bool {
        match self.inner.tasks.try_borrow() {
            Ok(tasks) => tasks.get(task).is_some_and(|record| record.step == step),
            Err(_) => true,
        }
    }

    fn step(&self, resumption: Resumption) {
        let Resumption { task, step, input } = resumption;
        let coroutine = {
            let mut tasks = self.inner.tasks.borrow_mut();
            match tasks.get_mut(task) {
                Some(record) if record.step == step => {
                    record.pending = None;
                    record.coroutine.take()
                }
                _ => None,
            }
        };
        let Some(mut coroutine) = coroutine else {
            trace!(task = %task, step, "discarding result for a task that moved on");
            return;
        };

        match coroutine.resume(input) {
            Step::Yield(effect) => self.suspend(task, coroutine, effect),
            Step::Return(value) => {
                drop(coroutine);
                self.settle(task, Outcome::Done(value));
            }
            Step::Throw(error) => {
                drop(coroutine);
                self.settle(task, Outcome::Errored(error));
            }
        }
    }

    fn suspend(&self, id: TaskId, coroutine: Coroutine, effect: Effect) {
        let parked = {
            let mut tasks = self.inner.tasks.borrow_mut();
            match tasks.get_mut(id) {
                Some(record) => {
                    record.coroutine = Some(coroutine);
                    record.step += 1;
                    let done = Completion::step(Rc::downgrade(&self.inner), id, record.step);
                    record.pending = Some(done.clone());
                    Ok((record.core.clone(), record.step, done, record.context.clone()))
                }
                None => Err(coroutine),
            }
        };
        let (core, step, done, context) = match parked {
            Ok(parked) => parked,
            // Cancelled while it was running.
            Err(coroutine) => {
                drop(coroutine);
                return;
            }
        };

        trace!(task = %id, step, kind = %effect.kind(), "effect yielded");
        let task = Task::new(core, Rc::downgrade(&self.inner));
        let engine = Engine {
            runtime: self.clone(),
            context,
        };
        engine.resolve_effect(effect, &task, done);
    }

    fn settle(&self, id: TaskId, outcome: Outcome) {
        let Some(record) = self.inner.tasks.borrow_mut().remove_settled(id) else {
            return;
        };
        record.core.settle(outcome.clone());
        debug!(task = %id, outcome = outcome.label(), "task settled");

        let task = Task::new(record.core.clone(), Rc::downgrade(&self.inner));
        let TaskRecord {
            final_callback,
            waiters,
            ..
        } = record;
        let observed = final_callback.is_some() || !waiters.is_empty();

        if let Some(callback) = final_callback {
            callback(outcome.clone());
        }
        for waiter in waiters.into_values() {
            waiter(&outcome);
        }

        if let Outcome::Errored(error) = &outcome {
            if !observed {
                match &self.inner.on_unhandled {
                    Some(hook) => hook(&task, error),
                    None => error!(task = %id, process = task.name(), error = %error, "unhandled task error"),
                }
            }
        }
    }

    /// Cancel `id` and every task attached below it.
    pub(crate) fn cancel_task(&self, id: TaskId) {
        let records = self.inner.tasks.borrow_mut().remove_subtree(id);
        if records.is_empty() {
            return;
        }
        for record in &records {
            record.core.settle(Outcome::Cancelled);
        }
        debug!(task = %id, cancelled = records.len(), "task cancelled");

        for record in records {
            let TaskRecord {
                final_callback,
                waiters,
                coroutine,
                pending,
                ..
            } = record;
            drop(coroutine);
            if let Some(pending) = pending {
                pending.release();
            }
            if let Some(callback) = final_callback {
                callback(Outcome::Cancelled);
            }
            for waiter in waiters.into_values() {
                waiter(&Outcome::Cancelled);
            }
        }
    }
}

/// The runtime as seen by a resolver.
///
/// Carries the yielding task's shared context, so tasks started through it
/// inherit that context.
#[derive(Clone)]
pub struct Engine {
    runtime: Runtime,
    context: Context,
}

impl Engine {
    /// The context shared by the yielding task's tree.
    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Start `process` as a new task sharing this engine's context.
    ///
    /// With `parent` set, the new task is attached to it and cancelled with
    /// it.
    pub fn run(
        &self,
        process: &ProcessRef,
        args: Vec<Value>,
        parent: Option<&Task>,
        final_callback: Option<FinalCallback>,
    ) -> Result<Task> {
        self.runtime.start_task(
            process,
            args,
            self.context.clone(),
            parent.map(Task::id),
            final_callback,
        )
    }

    /// Resolve `effect` on behalf of `task`, reporting through `done`.
    ///
    /// Used by the scheduler for every yielded effect and by combinators
    /// for their members.
    pub fn resolve_effect(&self, effect: Effect, task: &Task, done: Completion) {
        let kind = effect.kind();
        if let EffectKind::Custom(name) = &kind {
            if name.trim().is_empty() {
                done.fail(RuntimeError::MalformedDescriptor(
                    "custom effect without a kind".to_string(),
                ));
                return;
            }
        }

        match self.runtime.inner.registry.get(&kind) {
            Some(resolver) => resolver.resolve(effect, self.runtime.io(), self, task, done),
            None => {
                trace!(task = %task.id(), kind = %kind, "no resolver registered");
                done.fail(RuntimeError::UnknownEffectKind(kind.to_string()));
            }
        }
    }

    /// Run `future` on the current `LocalSet`.
    pub fn spawn_local(&self, future: impl Future<Output = ()> + 'static) {
        tokio::task::spawn_local(future);
    }
}

/// Builder for [`Runtime`].
#[derive(Default)]
pub struct RuntimeBuilder {
    config: RuntimeConfig,
    registry: Option<EffectRegistry>,
    middleware: Vec<Rc<dyn Middleware>>,
    io: Option<Rc<dyn Io>>,
    on_unhandled: Option<UnhandledErrorHook>,
}

impl RuntimeBuilder {
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn max_tasks(mut self, max_tasks: usize) -> Self {
        self.config.max_tasks = max_tasks;
        self
    }

    /// Use `registry` instead of the built-in one.
    pub fn registry(mut self, registry: EffectRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Append a middleware. Middleware runs in the order it was added.
    pub fn middleware(mut self, middleware: impl Middleware + 'static) -> Self {
        self.middleware.push(Rc::new(middleware));
        self
    }

    pub fn io(mut self, io: impl Io + 'static) -> Self {
        self.io = Some(Rc::new(io));
        self
    }

    /// Handle errors of tasks nobody observes (no final callback, no
    /// `join`, no `done()`). Without a hook they are logged at `error`.
    pub fn on_unhandled_error(mut self, hook: impl Fn(&Task, &RuntimeError) + 'static) -> Self {
        self.on_unhandled = Some(Rc::new(hook));
        self
    }

    pub fn build(self) -> Runtime {
        Runtime {
            inner: Rc::new(RuntimeInner {
                config: self.config,
                registry: self.registry.unwrap_or_else(EffectRegistry::builtin),
                middleware: self.middleware,
                io: self.io.unwrap_or_else(|| Rc::new(NoIo)),
                on_unhandled: self.on_unhandled,
                tasks: RefCell::new(TaskTable::default()),
                queue: RefCell::new(VecDeque::new()),
                draining: Cell::new(false),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::process_fn;
    use collection_literals::btree;

    fn recorded() -> (Rc<RefCell<Vec<Outcome>>>, FinalCallback) {
        let outcomes = Rc::new(RefCell::new(Vec::new()));
        let sink = outcomes.clone();
        (outcomes, Box::new(move |o| sink.borrow_mut().push(o)))
    }

    #[test]
    fn runtime_config_default() {
        let config = RuntimeConfig::default();
        assert_eq!(config.max_tasks, 1024);
    }

    #[test]
    fn runtime_new() {
        let runtime = Runtime::new(RuntimeConfig::default());
        assert_eq!(runtime.task_count(), 0);
        assert_eq!(runtime.registry().len(), EffectKind::builtin().len());
    }

    #[test]
    fn returning_process_settles_done() {
        let runtime = Runtime::new(RuntimeConfig::default());
        let (outcomes, callback) = recorded();
        let process = process_fn("answer", |_co, _args| async { Ok(Value::from(42)) });

        let task = runtime
            .run(process, Context::new(), Some(callback), Vec::new())
            .unwrap();

        assert_eq!(*outcomes.borrow(), vec![Outcome::Done(Value::from(42))]);
        assert_eq!(task.outcome(), Some(Outcome::Done(Value::from(42))));
        assert_eq!(runtime.task_count(), 0);
    }

    #[test]
    fn errors_reach_the_final_callback() {
        let runtime = Runtime::new(RuntimeConfig::default());
        let (outcomes, callback) = recorded();
        let process = process_fn("failing", |_co, _args| async {
            Err(RuntimeError::process("no thanks"))
        });

        runtime
            .run(process, Context::new(), Some(callback), Vec::new())
            .unwrap();

        assert_eq!(
            *outcomes.borrow(),
            vec![Outcome::Errored(RuntimeError::process("no thanks"))]
        );
    }

    #[test]
    fn unknown_kind_is_injected_as_error() {
        let runtime = Runtime::builder().registry(EffectRegistry::new()).build();
        let (outcomes, callback) = recorded();
        let process = process_fn("caller", |co, _args| async move {
            match co.perform(Effect::cancelled()).await {
                Err(RuntimeError::UnknownEffectKind(kind)) => Ok(Value::from(kind)),
                other => other,
            }
        });

        runtime
            .run(process, Context::new(), Some(callback), Vec::new())
            .unwrap();

        assert_eq!(*outcomes.borrow(), vec![Outcome::Done(Value::from("cancelled"))]);
    }

    #[test]
    fn blank_custom_kind_is_malformed() {
        let runtime = Runtime::new(RuntimeConfig::default());
        let process = process_fn("blank", |co, _args| async move {
            co.perform(Effect::custom("  ", Value::Null)).await
        });

        let task = runtime.start(process, Vec::new()).unwrap();
        assert!(matches!(
            task.outcome(),
            Some(Outcome::Errored(RuntimeError::MalformedDescriptor(_)))
        ));
    }

    #[test]
    fn context_is_shared_and_middleware_runs_first() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let runtime = Runtime::builder()
            .middleware(move |info: &ProcessInfo| {
                sink.borrow_mut().push(info.process.clone());
                info.context.set("started_by", info.process.clone());
            })
            .build();
        let process = process_fn("reader", |co, _args| async move {
            co.perform(Effect::get_context()).await
        });

        let task = runtime.start(process, Vec::new()).unwrap();

        assert_eq!(*seen.borrow(), vec!["reader".to_string()]);
        assert_eq!(
            task.outcome(),
            Some(Outcome::Done(Value::Map(btree! {
                "started_by".to_string() => Value::from("reader"),
            })))
        );
    }

    #[test]
    fn task_limit() {
        let runtime = Runtime::builder().max_tasks(1).build();
        let channel = crate::channel::Channel::new();
        let waiting = channel.clone();
        let process = process_fn("waiter", move |co, _args| {
            let channel = waiting.clone();
            async move { co.perform(Effect::take_channel(&channel)).await }
        });

        let first = runtime.start(process.clone(), Vec::new()).unwrap();
        assert_eq!(
            runtime.start(process.clone(), Vec::new()).unwrap_err(),
            RuntimeError::TaskLimitReached(1)
        );

        channel.put(Value::from("go"));
        assert_eq!(first.outcome(), Some(Outcome::Done(Value::from("go"))));
        assert!(runtime.start(process, Vec::new()).is_ok());
    }

    #[test]
    fn unhandled_errors_go_to_the_hook() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let runtime = Runtime::builder()
            .on_unhandled_error(move |task, error| {
                sink.borrow_mut().push((task.name().to_string(), error.clone()))
            })
            .build();
        let process = process_fn("orphan", |_co, _args| async {
            Err(RuntimeError::process("lost"))
        });

        runtime.start(process, Vec::new()).unwrap();

        assert_eq!(
            *seen.borrow(),
            vec![("orphan".to_string(), RuntimeError::process("lost"))]
        );
    }

    #[test]
    fn get_task_and_cancel_from_host() {
        let runtime = Runtime::new(RuntimeConfig::default());
        let channel = crate::channel::Channel::new();
        let process = process_fn("blocked", move |co, _args| {
            let channel = channel.clone();
            async move { co.perform(Effect::take_channel(&channel)).await }
        });

        let task = runtime.start(process, Vec::new()).unwrap();
        assert_eq!(runtime.tasks(), vec![task.id()]);
        let handle = runtime.get_task(task.id()).unwrap();
        assert_eq!(handle, task);

        handle.cancel();
        assert!(task.is_cancelled());
        assert!(runtime.get_task(task.id()).is_none());
    }
}
