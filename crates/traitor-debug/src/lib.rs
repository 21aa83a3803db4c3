//! `traitor-debug` — on-demand job runs streamed to a single caller.
//!
//! [`DebugBroker::start_session`] reads the job's current script, starts a run
//! on the shared [`ScriptExecutor`](traitor_executor::ScriptExecutor) and
//! returns a [`DebugSession`] that yields the run's events in order. Dropping
//! the session cancels the run, and deleting the job cancels every session
//! bound to it.

pub mod broker;
pub mod error;
pub mod registry;
pub mod types;

pub use broker::{DebugBroker, DebugSession};
pub use error::{DebugError, Result};
pub use registry::SessionRegistry;
pub use types::SessionId;
