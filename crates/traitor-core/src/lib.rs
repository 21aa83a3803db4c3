//! `traitor-core` — configuration and shared error types for the Traitor
//! job scheduler workspace.

pub mod config;
pub mod error;

pub use config::TraitorConfig;
pub use error::{CoreError, Result};
