use std::sync::{Arc, PoisonError};
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Offset, Utc};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use traitor_core::config::SchedulerConfig;
use traitor_executor::{ExecError, RunEvent, RunOutcome, RunStatus, ScriptExecutor};

use crate::{
    arena::{RunArena, RunRecord},
    error::Result,
    schedule::due_fire_time,
    store::JobStore,
    types::{Job, RunInfo},
};

/// Ticks periodically and dispatches due jobs to the executor, at most one
/// in-flight run per job.
pub struct Scheduler {
    store: Arc<JobStore>,
    executor: Arc<dyn ScriptExecutor>,
    arena: Arc<RunArena>,
    tick_interval: Duration,
    offset: FixedOffset,
}

impl Scheduler {
    /// Build a scheduler and subscribe its run arena to job deletions.
    pub fn new(
        store: Arc<JobStore>,
        executor: Arc<dyn ScriptExecutor>,
        config: &SchedulerConfig,
    ) -> Arc<Self> {
        let offset = FixedOffset::east_opt(config.utc_offset_minutes.saturating_mul(60))
            .unwrap_or_else(|| {
                warn!(
                    utc_offset_minutes = config.utc_offset_minutes,
                    "utc offset out of range, using UTC"
                );
                Utc.fix()
            });

        let arena = Arc::new(RunArena::new());
        store.subscribe(arena.clone());

        Arc::new(Self {
            store,
            executor,
            arena,
            tick_interval: Duration::from_millis(config.tick_interval_ms.max(10)),
            offset,
        })
    }

    /// Offset used to evaluate cron expressions.
    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn is_dispatched(&self, job_id: &str) -> bool {
        self.arena.is_dispatched(job_id)
    }

    pub fn active_runs(&self) -> Vec<RunInfo> {
        self.arena.snapshot()
    }

    /// Main loop. Ticks until `shutdown` broadcasts `true`, then cancels every
    /// in-flight run.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(
            tick_ms = self.tick_interval.as_millis() as u64,
            offset = %self.offset,
            "scheduler started"
        );

        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let fired = self.tick();
                    if !fired.is_empty() {
                        debug!(count = fired.len(), "jobs dispatched");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        let cancelled = self.arena.cancel_all();
        info!(cancelled, "scheduler shutting down");
    }

    /// Run one tick at the current time. Returns the ids dispatched.
    pub fn tick(&self) -> Vec<String> {
        self.tick_at(Utc::now())
    }

    /// Run one tick as if the clock read `now`.
    ///
    /// Must be called from within a Tokio runtime: runs are spawned as tasks.
    pub fn tick_at(&self, now: DateTime<Utc>) -> Vec<String> {
        let jobs = match self.store.list_enabled() {
            Ok(jobs) => jobs,
            Err(e) => {
                error!("scheduler tick could not list jobs: {e}");
                return Vec::new();
            }
        };

        let mut fired = Vec::new();
        for job in jobs {
            match self.try_dispatch(&job.id, now) {
                Ok(true) => fired.push(job.id),
                Ok(false) => {}
                Err(e) => error!(job_id = %job.id, "dispatch failed: {e}"),
            }
        }
        fired
    }

    // --- private helpers ---------------------------------------------------

    /// Re-check `job_id` under its lock and dispatch it if due.
    fn try_dispatch(&self, job_id: &str, now: DateTime<Utc>) -> Result<bool> {
        let lock = self.store.job_lock(job_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        // The listing may be stale: the job can have been deleted, disabled
        // or edited since.
        let Some(job) = self.store.find(job_id)? else {
            return Ok(false);
        };
        if !job.is_enabled() || self.arena.is_dispatched(job_id) {
            return Ok(false);
        }

        let fire_time = match due_fire_time(&job, now, self.offset) {
            Ok(Some(t)) => t,
            Ok(None) => return Ok(false),
            Err(e) => {
                warn!(job_id = %job_id, cron = ?job.cron, "skipping job with invalid cron: {e}");
                return Ok(false);
            }
        };

        let Some(record) = self.arena.try_claim(job_id, fire_time) else {
            return Ok(false);
        };
        if let Err(e) = self.store.record_exec(job_id, now) {
            self.arena.release(job_id, &record.run_id);
            return Err(e);
        }

        info!(
            job_id = %job_id,
            run_id = %record.run_id,
            fire_time = %fire_time,
            "dispatching job"
        );
        self.spawn_run(record, job);
        Ok(true)
    }

    fn spawn_run(&self, record: RunRecord, job: Job) {
        let executor = Arc::clone(&self.executor);
        let arena = Arc::clone(&self.arena);

        tokio::spawn(async move {
            let outcome = match executor.start(&job.script, record.cancel.clone()).await {
                Ok(mut handle) => loop {
                    match handle.next_event().await {
                        Some(RunEvent::Output(chunk)) => debug!(
                            job_id = %record.job_id,
                            run_id = %record.run_id,
                            seq = chunk.seq,
                            stream = chunk.stream.as_str(),
                            "{}",
                            chunk.text
                        ),
                        Some(RunEvent::Finished(outcome)) => break outcome,
                        None => break RunOutcome::failed("run ended without a result", None, 0),
                    }
                },
                Err(ExecError::Cancelled) => RunOutcome::cancelled(0),
                Err(e) => RunOutcome::failed(e.to_string(), None, 0),
            };

            match outcome.status {
                RunStatus::Succeeded => info!(
                    job_id = %record.job_id,
                    run_id = %record.run_id,
                    duration_ms = outcome.duration_ms,
                    "job run succeeded"
                ),
                RunStatus::Cancelled => info!(
                    job_id = %record.job_id,
                    run_id = %record.run_id,
                    "job run cancelled"
                ),
                _ => warn!(
                    job_id = %record.job_id,
                    run_id = %record.run_id,
                    fire_time = %record.fire_time,
                    exit_code = ?outcome.exit_code,
                    timed_out = outcome.timed_out,
                    "job run failed: {}",
                    outcome.message.as_deref().unwrap_or("unknown error")
                ),
            }

            arena.release(&record.job_id, &record.run_id);
        });
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
