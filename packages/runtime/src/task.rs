//! Task types for the procfx runtime.
//!
//! A Task is one running instance of a process. The runtime keeps every live
//! task in a [`TaskTable`] arena keyed by [`TaskId`]; the public [`Task`]
//! handle only shares the task's identity and state cell, so handles can be
//! passed around as values (they are what `fork` resumes with) without
//! keeping the task's coroutine alive.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::rc::{Rc, Weak};

use tokio::sync::oneshot;

use crate::completion::Completion;
use crate::context::Context;
use crate::error::RuntimeError;
use crate::process::Coroutine;
use crate::runtime::{Runtime, RuntimeInner};
use crate::value::Value;

/// Unique identifier for a Task.
///
/// Ids are handed out sequentially by the owning runtime, so two runs of the
/// same program assign the same ids in the same order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    /// Create a TaskId from its raw number.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw number.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How a task finished.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The process returned a value.
    Done(Value),
    /// The process failed with an error it did not handle.
    Errored(RuntimeError),
    /// The task, or one of its ancestors, was cancelled.
    Cancelled,
}

impl Outcome {
    pub fn is_done(&self) -> bool {
        matches!(self, Outcome::Done(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Outcome::Cancelled)
    }

    /// The returned value, if the task finished normally.
    pub fn value(&self) -> Option<&Value> {
        match self {
            Outcome::Done(value) => Some(value),
            _ => None,
        }
    }

    /// The error, if the task failed.
    pub fn error(&self) -> Option<&RuntimeError> {
        match self {
            Outcome::Errored(error) => Some(error),
            _ => None,
        }
    }

    pub(crate) fn label(&self) -> &'static str {
        match self {
            Outcome::Done(_) => "done",
            Outcome::Errored(_) => "errored",
            Outcome::Cancelled => "cancelled",
        }
    }
}

/// Lifecycle state of a Task.
///
/// A task starts `Running` and moves to exactly one of the other states.
/// Transitions are one-way.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum TaskState {
    #[default]
    Running,
    Done(Value),
    Errored(RuntimeError),
    Cancelled,
}

impl TaskState {
    /// The outcome, once the task has settled.
    pub fn outcome(&self) -> Option<Outcome> {
        match self {
            TaskState::Running => None,
            TaskState::Done(value) => Some(Outcome::Done(value.clone())),
            TaskState::Errored(error) => Some(Outcome::Errored(error.clone())),
            TaskState::Cancelled => Some(Outcome::Cancelled),
        }
    }
}

impl From<Outcome> for TaskState {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Done(value) => TaskState::Done(value),
            Outcome::Errored(error) => TaskState::Errored(error),
            Outcome::Cancelled => TaskState::Cancelled,
        }
    }
}

/// Identity and state shared between a task's record and its handles.
pub(crate) struct TaskCore {
    id: TaskId,
    name: String,
    state: RefCell<TaskState>,
}

impl TaskCore {
    pub(crate) fn new(id: TaskId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            state: RefCell::new(TaskState::Running),
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        matches!(*self.state.borrow(), TaskState::Running)
    }

    /// Move out of `Running`. Returns false if the task had already settled.
    pub(crate) fn settle(&self, outcome: Outcome) -> bool {
        let mut state = self.state.borrow_mut();
        if !matches!(*state, TaskState::Running) {
            return false;
        }
        *state = outcome.into();
        true
    }
}

/// Handle to a task.
///
/// Handles are cheap to clone and compare equal when they refer to the same
/// task. A handle outliving its runtime still reports the last known state;
/// `cancel` and `done` on such a handle do nothing useful.
#[derive(Clone)]
pub struct Task {
    core: Rc<TaskCore>,
    runtime: Weak<RuntimeInner>,
}

impl Task {
    pub(crate) fn new(core: Rc<TaskCore>, runtime: Weak<RuntimeInner>) -> Self {
        Self { core, runtime }
    }

    /// The task's unique identifier.
    pub fn id(&self) -> TaskId {
        self.core.id
    }

    /// Name of the process this task runs.
    pub fn name(&self) -> &str {
        &self.core.name
    }

    /// Get a snapshot of the task's current state.
    pub fn state(&self) -> TaskState {
        self.core.state.borrow().clone()
    }

    pub fn is_running(&self) -> bool {
        self.core.is_running()
    }

    /// Whether the task has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(*self.core.state.borrow(), TaskState::Cancelled)
    }

    /// How the task finished, or `None` while it is still running.
    pub fn outcome(&self) -> Option<Outcome> {
        self.core.state.borrow().outcome()
    }

    /// Cancel this task and every fork attached below it.
    ///
    /// Cancelling a settled task is a no-op. Spawned tasks are never
    /// attached, so they survive the cancellation of whoever spawned them.
    pub fn cancel(&self) {
        if let Some(inner) = self.runtime.upgrade() {
            Runtime::from_inner(inner).cancel_task(self.id());
        } else {
            self.core.settle(Outcome::Cancelled);
        }
    }

    /// Completion signal: resolves once with the task's outcome.
    ///
    /// If the runtime is dropped before the task settles the signal resolves
    /// with [`RuntimeError::RuntimeDropped`].
    pub fn done(&self) -> impl Future<Output = Outcome> + 'static {
        let (tx, rx) = oneshot::channel();
        self.on_settled(move |outcome| {
            let _ = tx.send(outcome.clone());
        });
        async move {
            rx.await
                .unwrap_or(Outcome::Errored(RuntimeError::RuntimeDropped))
        }
    }

    /// Attach `child` to this task's fork tree.
    ///
    /// An attached child is cancelled together with this task. Returns false
    /// if either task has already settled, or if attaching would create a
    /// cycle.
    pub fn attach_fork(&self, child: &Task) -> bool {
        let Some(inner) = self.runtime.upgrade() else {
            return false;
        };
        let attached = inner.tasks.borrow_mut().attach(self.id(), child.id());
        attached
    }

    /// The task this one is attached to, if any.
    pub fn parent(&self) -> Option<TaskId> {
        let inner = self.runtime.upgrade()?;
        let parent = inner.tasks.borrow().get(self.id()).and_then(|record| record.parent);
        parent
    }

    /// Live forks attached to this task, oldest first.
    pub fn children(&self) -> Vec<TaskId> {
        let Some(inner) = self.runtime.upgrade() else {
            return Vec::new();
        };
        let children = inner
            .tasks
            .borrow()
            .get(self.id())
            .map(|record| record.children.clone())
            .unwrap_or_default();
        children
    }

    /// Run `f` once the task settles, or right away if it already has.
    ///
    /// Returns the key of the registered waiter, if `f` was not run.
    pub(crate) fn on_settled(&self, f: impl FnOnce(&Outcome) + 'static) -> Option<u64> {
        if let Some(outcome) = self.outcome() {
            f(&outcome);
            return None;
        }
        let inner = self.runtime.upgrade()?;
        let mut tasks = inner.tasks.borrow_mut();
        let record = tasks.get_mut(self.id())?;
        let key = record.next_waiter;
        record.next_waiter += 1;
        record.waiters.insert(key, Box::new(f));
        Some(key)
    }

    /// Drop a waiter registered through [`Task::on_settled`].
    pub(crate) fn remove_waiter(&self, key: u64) {
        let Some(inner) = self.runtime.upgrade() else {
            return;
        };
        if let Ok(mut tasks) = inner.tasks.try_borrow_mut() {
            if let Some(record) = tasks.get_mut(self.id()) {
                record.waiters.remove(&key);
            }
        };
    }

    /// Number of joiners and `done` signals waiting for this task to settle.
    pub fn waiter_count(&self) -> usize {
        let Some(inner) = self.runtime.upgrade() else {
            return 0;
        };
        let count = inner
            .tasks
            .borrow()
            .get(self.id())
            .map_or(0, |record| record.waiters.len());
        count
    }
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.core, &other.core)
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.core.id)
            .field("name", &self.core.name)
            .field("state", &*self.core.state.borrow())
            .finish()
    }
}

/// Callback invoked with a task's outcome when it settles.
pub type FinalCallback = Box<dyn FnOnce(Outcome)>;

pub(crate) type Waiter = Box<dyn FnOnce(&Outcome)>;

/// Everything the runtime owns for one live task.
pub(crate) struct TaskRecord {
    pub(crate) core: Rc<TaskCore>,
    pub(crate) parent: Option<TaskId>,
    pub(crate) children: Vec<TaskId>,
    /// `None` while the coroutine is being resumed.
    pub(crate) coroutine: Option<Coroutine>,
    pub(crate) context: Context,
    /// Incremented on every yield; completions carry the step they belong to.
    pub(crate) step: u64,
    /// Completion for the effect the task is suspended on.
    pub(crate) pending: Option<Completion>,
    pub(crate) final_callback: Option<FinalCallback>,
    pub(crate) waiters: BTreeMap<u64, Waiter>,
    pub(crate) next_waiter: u64,
}

impl TaskRecord {
    pub(crate) fn new(
        core: Rc<TaskCore>,
        parent: Option<TaskId>,
        coroutine: Coroutine,
        context: Context,
        final_callback: Option<FinalCallback>,
    ) -> Self {
        Self {
            core,
            parent,
            children: Vec::new(),
            coroutine: Some(coroutine),
            context,
            step: 0,
            pending: None,
            final_callback,
            waiters: BTreeMap::new(),
            next_waiter: 0,
        }
    }
}

/// Arena of live tasks and their fork tree.
///
/// Settled tasks are removed from the table. A task's `children` list holds
/// only live, attached forks; every child's `parent` points back at the
/// list that contains it.
#[derive(Default)]
pub(crate) struct TaskTable {
    records: BTreeMap<TaskId, TaskRecord>,
    next_id: u64,
}

impl TaskTable {
    pub(crate) fn next_id(&mut self) -> TaskId {
        self.next_id += 1;
        TaskId(self.next_id)
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    pub(crate) fn ids(&self) -> Vec<TaskId> {
        self.records.keys().copied().collect()
    }

    pub(crate) fn get(&self, id: TaskId) -> Option<&TaskRecord> {
        self.records.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: TaskId) -> Option<&mut TaskRecord> {
        self.records.get_mut(&id)
    }

    /// Insert a new record, linking it under its parent if the parent is live.
    pub(crate) fn insert(&mut self, mut record: TaskRecord) {
        let id = record.core.id;
        match record.parent.and_then(|parent| self.records.get_mut(&parent)) {
            Some(parent) => parent.children.push(id),
            None => record.parent = None,
        }
        self.records.insert(id, record);
    }

    /// Move `child` under `parent`. Refuses unknown tasks and cycles.
    pub(crate) fn attach(&mut self, parent: TaskId, child: TaskId) -> bool {
        if parent == child
            || !self.records.contains_key(&parent)
            || !self.records.contains_key(&child)
        {
            return false;
        }
        // `parent` must not already sit below `child`.
        let mut cursor = Some(parent);
        while let Some(id) = cursor {
            if id == child {
                return false;
            }
            cursor = self.records.get(&id).and_then(|record| record.parent);
        }

        self.unlink(child);
        if let Some(record) = self.records.get_mut(&child) {
            record.parent = Some(parent);
        }
        if let Some(record) = self.records.get_mut(&parent) {
            record.children.push(child);
        }
        true
    }

    /// Remove a task that finished on its own.
    ///
    /// Its live children are released: they keep running as roots.
    pub(crate) fn remove_settled(&mut self, id: TaskId) -> Option<TaskRecord> {
        self.unlink(id);
        let record = self.records.remove(&id)?;
        for child in &record.children {
            if let Some(child) = self.records.get_mut(child) {
                child.parent = None;
            }
        }
        Some(record)
    }

    /// Remove a task and every task attached below it, root first.
    pub(crate) fn remove_subtree(&mut self, id: TaskId) -> Vec<TaskRecord> {
        self.unlink(id);
        let mut removed = Vec::new();
        let mut pending = vec![id];
        while let Some(next) = pending.pop() {
            if let Some(record) = self.records.remove(&next) {
                pending.extend(record.children.iter().rev().copied());
                removed.push(record);
            }
        }
        removed
    }

    fn unlink(&mut self, id: TaskId) {
        let parent = self.records.get_mut(&id).and_then(|record| record.parent.take());
        if let Some(parent) = parent.and_then(|parent| self.records.get_mut(&parent)) {
            parent.children.retain(|child| *child != id);
        }
    }
}
