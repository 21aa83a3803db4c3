//! In-flight scheduler runs, keyed by job id.
//!
//! An entry is the job's "dispatched" flag: it is inserted before the run
//! starts and removed only once the run has reported a terminal status.

use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use tokio_util::sync::CancellationToken;
use tracing::info;
use traitor_executor::RunStatus;
use uuid::Uuid;

use crate::{
    store::JobListener,
    types::{RunInfo, RunOrigin},
};

/// One dispatched run.
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub run_id: String,
    pub job_id: String,
    pub started_at: DateTime<Utc>,
    /// The schedule instant this run covers.
    pub fire_time: DateTime<Utc>,
    pub cancel: CancellationToken,
}

#[derive(Default)]
pub struct RunArena {
    runs: DashMap<String, RunRecord>,
}

impl RunArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `job_id` dispatched. Returns `None` if a run is already in flight.
    pub fn try_claim(&self, job_id: &str, fire_time: DateTime<Utc>) -> Option<RunRecord> {
        match self.runs.entry(job_id.to_string()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                let record = RunRecord {
                    run_id: Uuid::new_v4().to_string(),
                    job_id: job_id.to_string(),
                    started_at: Utc::now(),
                    fire_time,
                    cancel: CancellationToken::new(),
                };
                slot.insert(record.clone());
                Some(record)
            }
        }
    }

    /// Clear the dispatched flag, but only if it still belongs to `run_id`.
    pub fn release(&self, job_id: &str, run_id: &str) -> bool {
        self.runs
            .remove_if(job_id, |_, record| record.run_id == run_id)
            .is_some()
    }

    pub fn is_dispatched(&self, job_id: &str) -> bool {
        self.runs.contains_key(job_id)
    }

    /// Request cancellation of the job's in-flight run. The entry stays until
    /// the run reports back.
    pub fn cancel(&self, job_id: &str) -> bool {
        match self.runs.get(job_id) {
            Some(record) => {
                record.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every in-flight run; returns how many were signalled.
    pub fn cancel_all(&self) -> usize {
        let mut n = 0;
        for record in self.runs.iter() {
            record.cancel.cancel();
            n += 1;
        }
        n
    }

    pub fn snapshot(&self) -> Vec<RunInfo> {
        let mut runs: Vec<RunInfo> = self
            .runs
            .iter()
            .map(|r| RunInfo {
                run_id: r.run_id.clone(),
                job_id: r.job_id.clone(),
                origin: RunOrigin::Scheduler,
                started_at: r.started_at,
                status: RunStatus::Running,
                fire_time: Some(r.fire_time),
            })
            .collect();
        runs.sort_by_key(|r| r.started_at);
        runs
    }
}

impl JobListener for RunArena {
    fn job_deleted(&self, job_id: &str) {
        if self.cancel(job_id) {
            info!(job_id = %job_id, "job deleted, cancelling in-flight run");
        }
    }
}
