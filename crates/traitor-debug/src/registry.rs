use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use tokio_util::sync::CancellationToken;
use tracing::info;
use traitor_executor::RunStatus;
use traitor_scheduler::{JobListener, RunInfo, RunOrigin};

use crate::{
    error::{DebugError, Result},
    types::SessionId,
};

struct SessionEntry {
    job_id: String,
    caller: String,
    run_id: Option<String>,
    started_at: DateTime<Utc>,
    cancel: CancellationToken,
}

/// Live debug sessions, independent of the scheduler's run arena.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<SessionId, SessionEntry>,
    /// `(caller, job_id)` → session, enforcing one session per pair.
    owners: DashMap<(String, String), SessionId>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        job_id: &str,
        caller: &str,
        cancel: CancellationToken,
    ) -> Result<SessionId> {
        match self.owners.entry((caller.to_string(), job_id.to_string())) {
            Entry::Occupied(_) => Err(DebugError::SessionActive {
                job_id: job_id.to_string(),
            }),
            Entry::Vacant(slot) => {
                let id = SessionId::new();
                self.sessions.insert(
                    id.clone(),
                    SessionEntry {
                        job_id: job_id.to_string(),
                        caller: caller.to_string(),
                        run_id: None,
                        started_at: Utc::now(),
                        cancel,
                    },
                );
                slot.insert(id.clone());
                Ok(id)
            }
        }
    }

    pub fn set_run_id(&self, id: &SessionId, run_id: &str) {
        if let Some(mut entry) = self.sessions.get_mut(id) {
            entry.run_id = Some(run_id.to_string());
        }
    }

    pub fn remove(&self, id: &SessionId) {
        if let Some((_, entry)) = self.sessions.remove(id) {
            self.owners
                .remove_if(&(entry.caller, entry.job_id), |_, owner| owner == id);
        }
    }

    /// Cancel every session bound to `job_id`; returns how many.
    pub fn cancel_job(&self, job_id: &str) -> usize {
        let mut n = 0;
        for entry in self.sessions.iter().filter(|e| e.job_id == job_id) {
            entry.cancel.cancel();
            n += 1;
        }
        n
    }

    pub fn cancel_all(&self) -> usize {
        let mut n = 0;
        for entry in self.sessions.iter() {
            entry.cancel.cancel();
            n += 1;
        }
        n
    }

    pub fn snapshot(&self) -> Vec<RunInfo> {
        let mut runs: Vec<RunInfo> = self
            .sessions
            .iter()
            .map(|e| RunInfo {
                run_id: e.run_id.clone().unwrap_or_else(|| e.key().to_string()),
                job_id: e.job_id.clone(),
                origin: RunOrigin::Debug,
                started_at: e.started_at,
                status: RunStatus::Running,
                fire_time: None,
            })
            .collect();
        runs.sort_by_key(|r| r.started_at);
        runs
    }
}

impl JobListener for SessionRegistry {
    fn job_deleted(&self, job_id: &str) {
        let n = self.cancel_job(job_id);
        if n > 0 {
            info!(job_id = %job_id, sessions = n, "job deleted, cancelling debug sessions");
        }
    }
}
