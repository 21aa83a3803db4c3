//! `traitor-scheduler` — job persistence, cron evaluation and dispatch.
//!
//! # Overview
//!
//! Jobs live in a SQLite `jobs` table behind [`store::JobStore`]. The
//! [`engine::Scheduler`] ticks once per configured interval, re-reads every
//! enabled job under its per-job lock and hands due jobs to a
//! [`traitor_executor::ScriptExecutor`]. In-flight runs are tracked in the
//! [`arena::RunArena`], which is also what stops a job from overlapping itself.
//!
//! # Job kinds
//!
//! | Kind     | Fires                                                    |
//! |----------|----------------------------------------------------------|
//! | `timing` | On every match of a 6-field cron expression (seconds first) |
//! | `delay`  | Once, at `execAt`                                        |

pub mod arena;
pub mod cron;
pub mod db;
pub mod engine;
pub mod error;
pub mod schedule;
pub mod store;
pub mod types;

pub use arena::{RunArena, RunRecord};
pub use cron::{next_matches, CronError, CronExpr};
pub use engine::Scheduler;
pub use error::{Result, SchedulerError};
pub use store::{JobListener, JobStore};
pub use types::{ExecType, Job, JobDraft, JobPatch, JobState, RunInfo, RunOrigin};
