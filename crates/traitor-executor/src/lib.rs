//! traitor-executor — isolated script execution with live output.
//!
//! A [`ScriptExecutor`] turns a script body into a [`RunHandle`]: an ordered
//! stream of [`RunEvent::Output`] chunks closed by exactly one
//! [`RunEvent::Finished`]. The bundled [`ProcessExecutor`] runs every script
//! in its own child process, so a crashing or looping script can only take
//! down that process.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use tokio_util::sync::CancellationToken;
//! use traitor_executor::{ExecOptions, ProcessExecutor, ScriptExecutor};
//!
//! #[tokio::main]
//! async fn main() {
//!     let executor = ProcessExecutor::new(ExecOptions::default());
//!     let handle = executor
//!         .start("echo hello", CancellationToken::new())
//!         .await
//!         .unwrap();
//!     let (chunks, outcome) = handle.collect().await;
//!     println!("{} lines, {:?}", chunks.len(), outcome.status);
//! }
//! ```

pub mod error;
pub mod executor;
pub mod process;
pub mod truncate;
pub mod types;

pub use error::{ExecError, Result};
pub use executor::{RunHandle, ScriptExecutor};
pub use process::ProcessExecutor;
pub use types::{
    ExecOptions, OutputChunk, OutputStream, RunEvent, RunId, RunOutcome, RunStatus,
};
