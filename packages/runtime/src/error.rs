//! Error types for the procfx runtime.

use thiserror::Error;

use crate::task::TaskId;

/// Errors that can occur while resolving effects or driving processes.
///
/// Errors are values: they are injected back into the yielding process at
/// its suspension point, carried inside `safe_call` results, and reported
/// through a task's completion signal. For that reason the type is cheap to
/// clone and comparable.
///
/// Cancellation is not an error. A cancelled task settles with
/// [`Outcome::Cancelled`](crate::Outcome::Cancelled) instead.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    /// A resolver's side effect failed (function call, I/O, child process).
    #[error("effect failed: {message}")]
    EffectFailed { message: String },

    /// A process body gave up with its own error.
    #[error("process failed: {message}")]
    ProcessFailed { message: String },

    /// A yielded descriptor has no registered resolver.
    #[error("unknown effect kind: {0}")]
    UnknownEffectKind(String),

    /// A yielded descriptor has no usable discriminant, or reached a
    /// resolver registered for a different kind.
    #[error("malformed effect descriptor: {0}")]
    MalformedDescriptor(String),

    /// The process suspended on a future that is not an effect.
    #[error("process suspended without yielding an effect")]
    ForeignAwait,

    /// The process polled two effects at once instead of awaiting them in turn.
    #[error("process yielded more than one effect in a single step")]
    ConcurrentYield,

    /// A task tried to join itself.
    #[error("task {0} cannot join itself")]
    SelfJoin(TaskId),

    /// The configured task limit was reached.
    #[error("maximum tasks reached: {0}")]
    TaskLimitReached(usize),

    /// The runtime owning a task was dropped before the task settled.
    #[error("runtime dropped")]
    RuntimeDropped,
}

impl RuntimeError {
    /// Build an [`RuntimeError::EffectFailed`] from a message.
    pub fn effect(message: impl Into<String>) -> Self {
        RuntimeError::EffectFailed {
            message: message.into(),
        }
    }

    /// Build a [`RuntimeError::ProcessFailed`] from a message.
    pub fn process(message: impl Into<String>) -> Self {
        RuntimeError::ProcessFailed {
            message: message.into(),
        }
    }
}

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;
