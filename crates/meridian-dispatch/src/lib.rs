//! Background task dispatch for per-tile decode work.
//!
//! A [`TaskDispatcher`] owns a pool of isolated compute units running on
//! dedicated threads. Callers schedule tasks without blocking, receive a
//! [`TaskHandle`] per admitted task, and may subscribe to a broadcast of
//! every task completion. Admission is capped by a maximum number of active
//! tasks; excess requests are rejected rather than queued.

mod capabilities;
mod compute;
mod dispatcher;
mod error;
mod message;
mod pool;

pub use capabilities::{Capabilities, probe_transfer_support};
pub use compute::{ComputeEntry, ComputeModule, FnEntry};
pub use dispatcher::{
    ComputeModuleOptions, DispatcherOptions, ModuleSource, TaskDispatcher, TaskHandle,
};
pub use error::DispatchError;
pub use pool::TaskCompleted;
pub use message::{ModuleConfig, RemoteError, TaskEnvelope, TaskRequest, TaskResponse, Transferable};
