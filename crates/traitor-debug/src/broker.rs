use std::sync::{Arc, PoisonError};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use traitor_executor::{RunEvent, RunHandle, ScriptExecutor};
use traitor_scheduler::{JobStore, RunInfo};

use crate::{error::Result, registry::SessionRegistry, types::SessionId};

/// Starts debug runs and tracks them until their sessions are dropped.
pub struct DebugBroker {
    store: Arc<JobStore>,
    executor: Arc<dyn ScriptExecutor>,
    registry: Arc<SessionRegistry>,
}

impl DebugBroker {
    /// Build a broker and subscribe its registry to job deletions.
    pub fn new(store: Arc<JobStore>, executor: Arc<dyn ScriptExecutor>) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        store.subscribe(registry.clone());
        Self {
            store,
            executor,
            registry,
        }
    }

    pub fn active_sessions(&self) -> Vec<RunInfo> {
        self.registry.snapshot()
    }

    /// Cancel every live session, e.g. on shutdown.
    pub fn cancel_all(&self) -> usize {
        self.registry.cancel_all()
    }

    /// Start a debug run of `job_id` on behalf of `caller`.
    ///
    /// The script is read and the session registered under the job's lock,
    /// so a concurrent delete either happens first (the job is not found) or
    /// cancels this session.
    ///
    /// If the executor fails, or this future is dropped before the run has
    /// started, the registration is undone.
    pub async fn start_session(&self, job_id: &str, caller: &str) -> Result<DebugSession> {
        let cancel = CancellationToken::new();

        let (pending, script) = {
            let lock = self.store.job_lock(job_id);
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            let script = self.store.script(job_id)?;
            let id = self.registry.register(job_id, caller, cancel.clone())?;
            (Registration::new(&self.registry, id, cancel.clone()), script)
        };

        let handle = self.executor.start(&script, cancel.clone()).await?;
        let id = pending.keep();
        self.registry.set_run_id(&id, handle.id.as_str());

        info!(
            session_id = %id,
            job_id = %job_id,
            run_id = %handle.id,
            "debug session started"
        );

        Ok(DebugSession {
            id,
            job_id: job_id.to_string(),
            handle,
            cancel,
            registry: Arc::clone(&self.registry),
        })
    }
}

/// A registered session whose run has not started yet.
struct Registration<'a> {
    registry: &'a SessionRegistry,
    id: SessionId,
    cancel: CancellationToken,
    armed: bool,
}

impl<'a> Registration<'a> {
    fn new(registry: &'a SessionRegistry, id: SessionId, cancel: CancellationToken) -> Self {
        Self {
            registry,
            id,
            cancel,
            armed: true,
        }
    }

    /// The run is up; ownership of the entry moves to the session.
    fn keep(mut self) -> SessionId {
        self.armed = false;
        self.id.clone()
    }
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.cancel.cancel();
            self.registry.remove(&self.id);
            debug!(session_id = %self.id, "debug session abandoned before start");
        }
    }
}

/// A running debug execution owned by one caller.
///
/// Dropping the session cancels the run and unregisters it.
pub struct DebugSession {
    id: SessionId,
    job_id: String,
    handle: RunHandle,
    cancel: CancellationToken,
    registry: Arc<SessionRegistry>,
}

impl DebugSession {
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn run_id(&self) -> &str {
        self.handle.id.as_str()
    }

    /// Next event of the run; `None` after the `Finished` event.
    pub async fn next_event(&mut self) -> Option<RunEvent> {
        self.handle.next_event().await
    }
}

impl Drop for DebugSession {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.registry.remove(&self.id);
        debug!(session_id = %self.id, job_id = %self.job_id, "debug session closed");
    }
}
