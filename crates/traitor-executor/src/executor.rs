//! The `ScriptExecutor` capability and the handle returned for each run.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    error::Result,
    types::{OutputChunk, RunEvent, RunId, RunOutcome},
};

/// Runs a script body to completion or cancellation.
///
/// Implementations must:
/// - emit output in production order, then exactly one `Finished` event;
/// - enforce a per-run deadline and report it as a failed outcome;
/// - honour `cancel` and release every resource within a bounded grace
///   period, forcing termination if the script does not yield.
///
/// The scheduler and the debug broker only see this trait, so the sandboxing
/// technology behind it can be swapped freely.
#[async_trait]
pub trait ScriptExecutor: Send + Sync {
    /// Start `script` and return immediately with a handle to its events.
    async fn start(&self, script: &str, cancel: CancellationToken) -> Result<RunHandle>;
}

/// Receiving side of one run.
///
/// Dropping the handle does not stop the run; trigger the cancel token for
/// that. Output produced after the handle is gone is discarded.
pub struct RunHandle {
    pub id: RunId,
    events: mpsc::Receiver<RunEvent>,
    finished: bool,
}

impl RunHandle {
    pub fn new(id: RunId, events: mpsc::Receiver<RunEvent>) -> Self {
        Self {
            id,
            events,
            finished: false,
        }
    }

    /// Next event, or `None` once the `Finished` event has been delivered.
    ///
    /// A producer that disappears without a terminal event is reported as a
    /// failed run, so callers always observe exactly one `Finished`.
    pub async fn next_event(&mut self) -> Option<RunEvent> {
        if self.finished {
            return None;
        }
        match self.events.recv().await {
            Some(RunEvent::Finished(outcome)) => {
                self.finished = true;
                Some(RunEvent::Finished(outcome))
            }
            Some(event) => Some(event),
            None => {
                self.finished = true;
                Some(RunEvent::Finished(RunOutcome::failed(
                    "run ended without a result",
                    None,
                    0,
                )))
            }
        }
    }

    /// Drain the run and return its outcome, discarding output.
    pub async fn wait(mut self) -> RunOutcome {
        loop {
            if let Some(RunEvent::Finished(outcome)) = self.next_event().await {
                return outcome;
            }
        }
    }

    /// Drain the run, returning every chunk and the outcome.
    pub async fn collect(mut self) -> (Vec<OutputChunk>, RunOutcome) {
        let mut chunks = Vec::new();
        loop {
            match self.next_event().await {
                Some(RunEvent::Output(chunk)) => chunks.push(chunk),
                Some(RunEvent::Finished(outcome)) => return (chunks, outcome),
                // next_event always yields Finished before None.
                None => return (chunks, RunOutcome::failed("run ended without a result", None, 0)),
            }
        }
    }
}
