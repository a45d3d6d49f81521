//! # procfx Runtime
//!
//! An effect-driven process runtime. Processes are async bodies that never
//! do anything themselves: they *describe* what they want done by yielding
//! [`Effect`] descriptors, and the runtime carries the effects out and feeds
//! the results back in.
//!
//! ## Core Concepts
//!
//! ### Processes and Effects
//!
//! A **process** implements [`Process`] (or is built with [`process_fn`]).
//! It receives a [`Co`] handle and yields effects through
//! `co.perform(effect).await`:
//!
//! ```ignore
//! let pinger = process_fn("pinger", |co, _args| async move {
//!     loop {
//!         co.perform(Effect::put_action(json!({"type": "PING"}))).await?;
//!         co.perform(Effect::take_action("PONG")).await?;
//!         co.perform(Effect::delay(Duration::from_secs(1), Value::Null)).await?;
//!     }
//! });
//! ```
//!
//! Because effects are plain data, a process can be tested by stepping it
//! and inspecting what it yields, without any I/O.
//!
//! ### Tasks
//!
//! Every running process is a [`Task`]. `fork` and `call_proc` start tasks
//! *attached* to the current one: cancelling a task cancels its whole
//! attached subtree. `spawn` starts a detached task that nothing cancels
//! implicitly. All tasks started from one root share the same [`Context`].
//!
//! ### Resolvers and the Registry
//!
//! The [`EffectRegistry`] maps each [`EffectKind`] to a [`Resolver`]. The
//! built-in registry covers function calls, timers, task control,
//! `parallel`/`race`, actions, streams, events, channels and the context;
//! hosts can register resolvers for their own `Effect::Custom` kinds.
//!
//! ### The I/O Boundary
//!
//! Application state, streams and event sources live outside the runtime
//! behind the [`Io`], [`DataStream`] and [`Emitter`] traits.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                           Runtime                            │
//! │                                                              │
//! │   run queue ──► step(task) ──► coroutine.resume(result)       │
//! │        ▲                              │                       │
//! │        │                        yields Effect                 │
//! │        │                              ▼                       │
//! │   Completion ◄── Resolver ◄── EffectRegistry[effect.kind()]   │
//! │        │            │                                         │
//! │        │            ├── Engine (context, run, resolve_effect) │
//! │        │            └── Io / DataStream / Emitter / Channel   │
//! │                                                              │
//! │   TaskTable: TaskId ──► record (coroutine, children, step)    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Threading
//!
//! The runtime is single-threaded (`Rc`, not `Arc`). Effects that wait on
//! time or on futures are driven by `tokio::task::spawn_local`, so a
//! runtime that uses `delay` or async `call` must run inside a
//! `tokio::task::LocalSet` on a current-thread tokio runtime.

pub mod channel;
pub mod completion;
pub mod context;
pub mod effect;
pub mod error;
pub mod io;
pub mod middleware;
pub mod process;
pub mod registry;
mod resolvers;
pub mod runtime;
pub mod task;
pub mod value;

pub use channel::Channel;
pub use completion::Completion;
pub use context::Context;
pub use effect::{ActionPattern, CpsFunction, Effect, EffectKind, EffectSet, Function, Selector};
pub use error::{Result, RuntimeError};
pub use io::{DataStream, Emitter, Io, Listener, NoIo, Unsubscribe};
pub use middleware::{Middleware, ProcessInfo, TracingMiddleware};
pub use process::{process_fn, Co, Perform, Process, ProcessRef};
pub use registry::{EffectRegistry, Resolver};
pub use runtime::{
    create_runtime, Engine, Runtime, RuntimeBuilder, RuntimeConfig, UnhandledErrorHook,
};
pub use task::{FinalCallback, Outcome, Task, TaskId, TaskState};
pub use value::Value;
