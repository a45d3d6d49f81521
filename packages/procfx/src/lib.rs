//! procfx: an effect-driven process runtime.
//!
//! Processes are async bodies that describe their side effects as data.
//! They yield [`Effect`] descriptors, and the [`Runtime`] performs them and
//! resumes the process with the result. Task trees, cancellation, `race`
//! and `parallel`, channels and the I/O boundary all live in
//! [`procfx_runtime`]; [`procfx_store`] provides in-memory backends for that
//! boundary.
//!
//! ```ignore
//! use procfx::prelude::*;
//! use serde_json::json;
//!
//! let store = Store::with_state(Value::map());
//! let runtime = Runtime::builder()
//!     .io(store.clone())
//!     .middleware(TracingMiddleware)
//!     .build();
//!
//! let greeter = process_fn("greeter", |co, _args| async move {
//!     let action = co.perform(Effect::take_action("HELLO")).await?;
//!     co.perform(Effect::put_action(json!({"type": "WORLD", "to": action}))).await
//! });
//! runtime.start(greeter, Vec::new())?;
//!
//! store.dispatch(json!({"type": "HELLO"}).into());
//! ```

pub use procfx_runtime::*;
pub use procfx_store::{EventBus, ListenerSet, MemoryStream, Store, StoreError};

pub use procfx_store as store;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use procfx::prelude::*;
/// ```
pub mod prelude {
    // Processes and effects
    pub use procfx_runtime::{process_fn, Co, Effect, EffectSet, Process, ProcessRef};
    pub use procfx_runtime::{CpsFunction, Function, Selector};

    // Runtime and tasks
    pub use procfx_runtime::{Context, Outcome, Runtime, RuntimeConfig, Task, TaskId};
    pub use procfx_runtime::{Middleware, ProcessInfo, TracingMiddleware};

    // Data and errors
    pub use procfx_runtime::{Channel, Result, RuntimeError, Value};

    // I/O boundary and backends
    pub use procfx_runtime::{DataStream, Emitter, Io};
    pub use procfx_store::{EventBus, MemoryStream, Store};
}
