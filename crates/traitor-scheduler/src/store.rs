use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    cron::{CronError, CronExpr},
    db::init_db,
    error::{Result, SchedulerError},
    types::{ExecType, Job, JobDraft, JobPatch, JobState},
};

/// Notified when jobs disappear from the store.
///
/// Callbacks run synchronously inside [`JobStore::delete`] while the job's
/// lock is held, so they must not call back into the store for that job.
pub trait JobListener: Send + Sync {
    fn job_deleted(&self, job_id: &str);
}

/// Durable CRUD repository for jobs.
///
/// Every mutation of one job id, and the scheduler's due check for it, is
/// serialised through a per-job mutex ([`JobStore::job_lock`]). Lock order is
/// always job lock, then connection lock.
pub struct JobStore {
    conn: Mutex<Connection>,
    locks: DashMap<String, Arc<Mutex<()>>>,
    listeners: RwLock<Vec<Arc<dyn JobListener>>>,
}

const SELECT_COLUMNS: &str = "SELECT id, name, description, exec_type, cron, exec_at, script,
        state, last_exec_time, created_at, updated_at FROM jobs";

impl JobStore {
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            locks: DashMap::new(),
            listeners: RwLock::new(Vec::new()),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::new(Connection::open_in_memory()?)
    }

    /// Register a listener for job deletions.
    pub fn subscribe(&self, listener: Arc<dyn JobListener>) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    /// The mutex guarding all writes to `id`.
    pub fn job_lock(&self, id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    // --- writes ------------------------------------------------------------

    pub fn create(&self, draft: JobDraft) -> Result<Job> {
        let now = Utc::now();
        let job = Job {
            id: Uuid::new_v4().to_string(),
            name: draft.name.trim().to_string(),
            description: draft.description,
            exec_type: draft.exec_type,
            cron: draft.cron.map(|c| c.trim().to_string()),
            exec_at: draft.exec_at,
            script: draft.script,
            state: draft.state,
            last_exec_time: None,
            created_at: now,
            updated_at: now,
        };
        validate(&job)?;

        let lock = self.job_lock(&job.id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.conn()
            .execute(
                "INSERT INTO jobs
                 (id, name, description, exec_type, cron, exec_at, script,
                  state, last_exec_time, created_at, updated_at)
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8,NULL,?9,?9)",
                params![
                    job.id,
                    job.name,
                    job.description,
                    job.exec_type.to_string(),
                    job.cron,
                    job.exec_at.map(|t| t.to_rfc3339()),
                    job.script,
                    job.state.to_string(),
                    now.to_rfc3339(),
                ],
            )?;

        info!(job_id = %job.id, name = %job.name, exec_type = %job.exec_type, "job created");
        Ok(job)
    }

    /// Apply `patch` to the job. The merged job is validated, then passed to
    /// `check` while the job lock is still held, before anything is written.
    pub fn update(
        &self,
        id: &str,
        patch: JobPatch,
        check: impl FnOnce(&Job) -> Result<()>,
    ) -> Result<Job> {
        self.with_lock(id, |conn| {
            let mut job = load(conn, id)?.ok_or_else(|| SchedulerError::not_found(id))?;
            patch.apply(&mut job);
            job.name = job.name.trim().to_string();
            job.cron = job.cron.map(|c| c.trim().to_string());
            job.updated_at = Utc::now();
            validate(&job)?;
            check(&job)?;

            conn.execute(
                "UPDATE jobs SET name=?1, description=?2, exec_type=?3, cron=?4,
                  exec_at=?5, script=?6, updated_at=?7
                 WHERE id=?8",
                params![
                    job.name,
                    job.description,
                    job.exec_type.to_string(),
                    job.cron,
                    job.exec_at.map(|t| t.to_rfc3339()),
                    job.script,
                    job.updated_at.to_rfc3339(),
                    id,
                ],
            )?;
            info!(job_id = %id, "job updated");
            Ok(job)
        })
    }

    /// Enable or disable a job. Enabling re-validates its schedule.
    pub fn set_state(&self, id: &str, state: JobState) -> Result<Job> {
        self.with_lock(id, |conn| {
            let mut job = load(conn, id)?.ok_or_else(|| SchedulerError::not_found(id))?;
            if state == JobState::Enabled {
                validate(&job)?;
            }
            job.state = state;
            job.updated_at = Utc::now();
            conn.execute(
                "UPDATE jobs SET state=?1, updated_at=?2 WHERE id=?3",
                params![state.to_string(), job.updated_at.to_rfc3339(), id],
            )?;
            info!(job_id = %id, %state, "job state changed");
            Ok(job)
        })
    }

    pub fn script(&self, id: &str) -> Result<String> {
        self.conn()
            .query_row("SELECT script FROM jobs WHERE id = ?1", [id], |r| r.get(0))
            .optional()?
            .ok_or_else(|| SchedulerError::not_found(id))
    }

    /// Replace the script body without touching scheduling fields.
    pub fn update_script(&self, id: &str, script: &str) -> Result<()> {
        self.with_lock(id, |conn| {
            let n = conn.execute(
                "UPDATE jobs SET script=?1, updated_at=?2 WHERE id=?3",
                params![script, Utc::now().to_rfc3339(), id],
            )?;
            if n == 0 {
                return Err(SchedulerError::not_found(id));
            }
            info!(job_id = %id, bytes = script.len(), "job script updated");
            Ok(())
        })
    }

    /// Remove a job and notify listeners while its lock is still held, so
    /// no dispatch or debug start can slip in between.
    pub fn delete(&self, id: &str) -> Result<()> {
        let result = {
            let lock = self.job_lock(id);
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            let n = self.conn().execute("DELETE FROM jobs WHERE id = ?1", [id])?;
            if n == 0 {
                Err(SchedulerError::not_found(id))
            } else {
                let listeners = self
                    .listeners
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone();
                for listener in &listeners {
                    listener.job_deleted(id);
                }
                info!(job_id = %id, "job deleted");
                Ok(())
            }
        };
        self.prune_lock(id);
        result
    }

    /// Stamp the start of a scheduler dispatch.
    ///
    /// Callers must hold [`JobStore::job_lock`] for `id`.
    pub fn record_exec(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        let n = self.conn().execute(
            "UPDATE jobs SET last_exec_time=?1 WHERE id=?2",
            params![at.to_rfc3339(), id],
        )?;
        if n == 0 {
            return Err(SchedulerError::not_found(id));
        }
        Ok(())
    }

    // --- reads -------------------------------------------------------------

    pub fn get(&self, id: &str) -> Result<Job> {
        self.find(id)?.ok_or_else(|| SchedulerError::not_found(id))
    }

    pub fn find(&self, id: &str) -> Result<Option<Job>> {
        load(&self.conn(), id)
    }

    /// All jobs ordered by creation time.
    pub fn list(&self) -> Result<Vec<Job>> {
        self.query_jobs(&format!("{SELECT_COLUMNS} ORDER BY created_at, id"))
    }

    pub fn list_enabled(&self) -> Result<Vec<Job>> {
        self.query_jobs(&format!(
            "{SELECT_COLUMNS} WHERE state = 'enabled' ORDER BY created_at, id"
        ))
    }

    // --- private helpers ---------------------------------------------------

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_lock<T>(&self, id: &str, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let result = {
            let lock = self.job_lock(id);
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            let conn = self.conn();
            f(&conn)
        };
        if matches!(result, Err(SchedulerError::JobNotFound { .. })) {
            self.prune_lock(id);
        }
        result
    }

    /// Drop the lock entry for a job that no longer exists, unless someone
    /// is still holding or waiting on it.
    fn prune_lock(&self, id: &str) {
        self.locks
            .remove_if(id, |_, lock| Arc::strong_count(lock) == 1);
    }

    fn query_jobs(&self, sql: &str) -> Result<Vec<Job>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map([], JobRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let id = row.id.clone();
                match row.into_job() {
                    Ok(job) => Some(job),
                    Err(e) => {
                        warn!(job_id = %id, "skipping undecodable job row: {e}");
                        None
                    }
                }
            })
            .collect())
    }

    #[cfg(test)]
    pub(crate) fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> T) -> T {
        f(&self.conn())
    }
}

fn load(conn: &Connection, id: &str) -> Result<Option<Job>> {
    let row = conn
        .query_row(
            &format!("{SELECT_COLUMNS} WHERE id = ?1"),
            [id],
            JobRow::from_row,
        )
        .optional()?;
    match row {
        Some(row) => row.into_job().map(Some).map_err(SchedulerError::Corrupt),
        None => Ok(None),
    }
}

/// Checks shared by every write path.
fn validate(job: &Job) -> Result<()> {
    if job.name.trim().is_empty() {
        return Err(SchedulerError::Validation("name must not be empty".into()));
    }
    match job.exec_type {
        ExecType::Timing => {
            let expr = job.cron.as_deref().ok_or(CronError::Empty)?;
            CronExpr::parse(expr)?;
        }
        ExecType::Delay => {
            if job.exec_at.is_none() {
                return Err(SchedulerError::Validation(
                    "delay jobs require execAt".into(),
                ));
            }
        }
    }
    Ok(())
}

/// Raw column values, decoded into a [`Job`] outside the rusqlite closure.
struct JobRow {
    id: String,
    name: String,
    description: String,
    exec_type: String,
    cron: Option<String>,
    exec_at: Option<String>,
    script: String,
    state: String,
    last_exec_time: Option<String>,
    created_at: String,
    updated_at: String,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            exec_type: row.get(3)?,
            cron: row.get(4)?,
            exec_at: row.get(5)?,
            script: row.get(6)?,
            state: row.get(7)?,
            last_exec_time: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }

    fn into_job(self) -> std::result::Result<Job, String> {
        Ok(Job {
            exec_type: self.exec_type.parse()?,
            state: self.state.parse()?,
            exec_at: self.exec_at.as_deref().map(parse_ts).transpose()?,
            last_exec_time: self.last_exec_time.as_deref().map(parse_ts).transpose()?,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
            id: self.id,
            name: self.name,
            description: self.description,
            cron: self.cron,
            script: self.script,
        })
    }
}

fn parse_ts(s: &str) -> std::result::Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("bad timestamp {s:?}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn store() -> JobStore {
        JobStore::open_in_memory().unwrap()
    }

    fn timing(name: &str) -> JobDraft {
        JobDraft::timing(name, "0 */5 * * * *", "echo hi")
    }

    #[test]
    fn create_then_get() {
        let s = store();
        let job = s.create(timing("  backup  ")).unwrap();
        assert_eq!(job.name, "backup");
        assert_eq!(job.state, JobState::Disabled);

        let fetched = s.get(&job.id).unwrap();
        assert_eq!(fetched.id, job.id);
        assert_eq!(fetched.cron.as_deref(), Some("0 */5 * * * *"));
        assert_eq!(fetched.script, "echo hi");
        assert!(fetched.last_exec_time.is_none());
    }

    #[test]
    fn invalid_cron_is_not_persisted() {
        let s = store();
        let err = s
            .create(JobDraft::timing("bad", "every minute", "true"))
            .unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidCron(_)));
        assert!(s.list().unwrap().is_empty());
    }

    #[test]
    fn timing_without_cron_is_invalid_cron() {
        let s = store();
        let mut draft = timing("x");
        draft.cron = None;
        assert!(matches!(
            s.create(draft).unwrap_err(),
            SchedulerError::InvalidCron(CronError::Empty)
        ));
    }

    #[test]
    fn delay_requires_exec_at_and_name() {
        let s = store();
        let mut draft = JobDraft::delay("once", Utc::now(), "true");
        draft.exec_at = None;
        assert!(matches!(
            s.create(draft).unwrap_err(),
            SchedulerError::Validation(_)
        ));
        assert!(matches!(
            s.create(JobDraft::delay("   ", Utc::now(), "true"))
                .unwrap_err(),
            SchedulerError::Validation(_)
        ));
    }

    #[test]
    fn update_with_invalid_cron_leaves_job_unchanged() {
        let s = store();
        let job = s.create(timing("a")).unwrap();
        let err = s
            .update(
                &job.id,
                JobPatch {
                    cron: Some("* * *".into()),
                    name: Some("renamed".into()),
                    ..JobPatch::default()
                },
                |_| Ok(()),
            )
            .unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidCron(_)));

        let after = s.get(&job.id).unwrap();
        assert_eq!(after.name, "a");
        assert_eq!(after.cron.as_deref(), Some("0 */5 * * * *"));
    }

    #[test]
    fn rejected_update_check_leaves_job_unchanged() {
        let s = store();
        let job = s.create(timing("a")).unwrap();
        let err = s
            .update(
                &job.id,
                JobPatch {
                    name: Some("renamed".into()),
                    ..JobPatch::default()
                },
                |merged| {
                    assert_eq!(merged.name, "renamed");
                    Err(SchedulerError::Validation("not now".into()))
                },
            )
            .unwrap_err();
        assert!(matches!(err, SchedulerError::Validation(_)));
        assert_eq!(s.get(&job.id).unwrap().name, "a");
    }

    #[test]
    fn update_keeps_state_and_last_exec() {
        let s = store();
        let job = s.create(timing("a").enabled()).unwrap();
        let at = Utc::now();
        s.record_exec(&job.id, at).unwrap();

        let updated = s
            .update(
                &job.id,
                JobPatch {
                    description: Some("nightly".into()),
                    ..JobPatch::default()
                },
                |_| Ok(()),
            )
            .unwrap();
        assert_eq!(updated.state, JobState::Enabled);
        assert_eq!(updated.description, "nightly");
        assert_eq!(
            updated.last_exec_time.map(|t| t.timestamp()),
            Some(at.timestamp())
        );
    }

    #[test]
    fn missing_ids_are_not_found() {
        let s = store();
        assert!(matches!(
            s.get("nope").unwrap_err(),
            SchedulerError::JobNotFound { .. }
        ));
        assert!(s.find("nope").unwrap().is_none());
        assert!(matches!(
            s.update("nope", JobPatch::default(), |_| Ok(())).unwrap_err(),
            SchedulerError::JobNotFound { .. }
        ));
        assert!(matches!(
            s.set_state("nope", JobState::Enabled).unwrap_err(),
            SchedulerError::JobNotFound { .. }
        ));
        assert!(matches!(
            s.script("nope").unwrap_err(),
            SchedulerError::JobNotFound { .. }
        ));
        assert!(matches!(
            s.update_script("nope", "x").unwrap_err(),
            SchedulerError::JobNotFound { .. }
        ));
        assert!(matches!(
            s.delete("nope").unwrap_err(),
            SchedulerError::JobNotFound { .. }
        ));
        assert!(s.locks.is_empty());
    }

    #[test]
    fn script_round_trip_leaves_schedule_alone() {
        let s = store();
        let job = s.create(timing("a")).unwrap();
        s.update_script(&job.id, "echo one\necho two").unwrap();
        assert_eq!(s.script(&job.id).unwrap(), "echo one\necho two");
        assert_eq!(s.get(&job.id).unwrap().cron, job.cron);
    }

    #[test]
    fn set_state_filters_list_enabled() {
        let s = store();
        let a = s.create(timing("a")).unwrap();
        let _b = s.create(timing("b")).unwrap();
        assert!(s.list_enabled().unwrap().is_empty());

        s.set_state(&a.id, JobState::Enabled).unwrap();
        let enabled = s.list_enabled().unwrap();
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].id, a.id);
        assert_eq!(s.list().unwrap().len(), 2);
    }

    #[test]
    fn delete_notifies_listeners() {
        struct Counter(AtomicUsize);
        impl JobListener for Counter {
            fn job_deleted(&self, _job_id: &str) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let s = store();
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        s.subscribe(counter.clone());

        let job = s.create(timing("a")).unwrap();
        s.delete(&job.id).unwrap();
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
        assert!(s.find(&job.id).unwrap().is_none());
        assert!(!s.locks.contains_key(&job.id));

        // A second delete finds nothing and notifies no one.
        assert!(s.delete(&job.id).is_err());
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn undecodable_rows_are_skipped() {
        let s = store();
        let good = s.create(timing("good")).unwrap();
        s.with_conn(|conn| {
            conn.execute(
                "INSERT INTO jobs (id, name, exec_type, state, created_at, updated_at)
                 VALUES ('broken', 'b', 'weekly', 'enabled', 'x', 'x')",
                [],
            )
            .unwrap();
        });

        let jobs = s.list().unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, good.id);
        assert!(matches!(
            s.get("broken").unwrap_err(),
            SchedulerError::Corrupt(_)
        ));
    }

    #[test]
    fn jobs_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.db");

        let id = {
            let s = JobStore::new(crate::db::open(&path).unwrap()).unwrap();
            s.create(timing("durable").enabled()).unwrap().id
        };

        let s = JobStore::new(crate::db::open(&path).unwrap()).unwrap();
        let job = s.get(&id).unwrap();
        assert_eq!(job.name, "durable");
        assert_eq!(job.state, JobState::Enabled);
    }
}
