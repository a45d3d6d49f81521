//! In-memory I/O backends for the procfx runtime.
//!
//! - [`Store`]: a reducer-driven state container implementing [`Io`]
//! - [`EventBus`]: named events implementing [`Emitter`]
//! - [`MemoryStream`]: a data stream implementing [`DataStream`]
//!
//! All three are cheap, shared handles: clone one into the runtime builder
//! or an effect and keep another to drive it from the host.
//!
//! [`Io`]: procfx_runtime::Io
//! [`Emitter`]: procfx_runtime::Emitter
//! [`DataStream`]: procfx_runtime::DataStream

pub mod event_bus;
pub mod listeners;
pub mod store;
pub mod stream;

pub use event_bus::EventBus;
pub use listeners::ListenerSet;
pub use store::{Store, StoreError};
pub use stream::MemoryStream;
