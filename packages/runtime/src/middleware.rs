//! Middleware: hooks that observe every process start.

use tracing::info;

use crate::context::Context;
use crate::task::{Task, TaskId};
use crate::value::Value;

/// What a middleware sees when a task starts.
#[derive(Debug, Clone)]
pub struct ProcessInfo {
    pub task: Task,
    /// The task the new one is attached to, if any.
    pub parent: Option<TaskId>,
    pub process: String,
    pub args: Vec<Value>,
    pub context: Context,
}

/// A hook run once per task start, before the task's first step.
///
/// Middleware observes; it cannot change what the process yields. It may
/// write to the shared context.
pub trait Middleware {
    fn on_start(&self, info: &ProcessInfo);
}

impl<F> Middleware for F
where
    F: Fn(&ProcessInfo),
{
    fn on_start(&self, info: &ProcessInfo) {
        self(info)
    }
}

/// Logs every process start at `info` level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMiddleware;

impl Middleware for TracingMiddleware {
    fn on_start(&self, info: &ProcessInfo) {
        let args = serde_json::to_string(&info.args).unwrap_or_default();
        info!(
            task = %info.task.id(),
            parent = ?info.parent,
            process = %info.process,
            args = %args,
            "process started"
        );
    }
}
