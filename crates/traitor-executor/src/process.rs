//! `ProcessExecutor` — runs each script in its own child process.
//!
//! The child is started as `<interpreter> <args...> <script>` in a fresh
//! process group, so timeout and cancellation can take down everything the
//! script spawned, not just the interpreter.

use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command as AsyncCommand};
use tokio::sync::mpsc;
use tokio::time::Instant as TokioInstant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    error::{ExecError, Result},
    executor::{RunHandle, ScriptExecutor},
    truncate::LineBuffer,
    types::{ExecOptions, OutputChunk, OutputStream, RunEvent, RunId, RunOutcome},
};

/// How long to keep reading after the interpreter exits, for output that is
/// still in flight.
const EXIT_DRAIN: Duration = Duration::from_millis(500);

/// Executes scripts through an external interpreter.
pub struct ProcessExecutor {
    options: ExecOptions,
}

impl ProcessExecutor {
    pub fn new(options: ExecOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ExecOptions {
        &self.options
    }

    fn spawn(&self, script: &str) -> Result<Child> {
        let mut cmd = AsyncCommand::new(&self.options.interpreter);
        cmd.args(&self.options.args)
            .arg(script)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        cmd.spawn()
            .map_err(|e| ExecError::Spawn(format!("{}: {e}", self.options.interpreter)))
    }
}

impl Default for ProcessExecutor {
    fn default() -> Self {
        Self::new(ExecOptions::default())
    }
}

#[async_trait]
impl ScriptExecutor for ProcessExecutor {
    async fn start(&self, script: &str, cancel: CancellationToken) -> Result<RunHandle> {
        if cancel.is_cancelled() {
            return Err(ExecError::Cancelled);
        }

        let child = self.spawn(script)?;
        let id = RunId::new();
        let (tx, rx) = mpsc::channel(self.options.channel_capacity.max(1));

        debug!(run_id = %id, pid = ?child.id(), "script process spawned");

        let options = self.options.clone();
        let run_id = id.clone();
        tokio::spawn(async move {
            let outcome = supervise(&run_id, child, &tx, &cancel, &options).await;
            info!(
                run_id = %run_id,
                status = %outcome.status,
                duration_ms = outcome.duration_ms,
                "script run finished"
            );
            // Receiver may already be gone; the outcome is still logged above.
            let _ = tx.send(RunEvent::Finished(outcome)).await;
        });

        Ok(RunHandle::new(id, rx))
    }
}

/// Numbers chunks and forwards them to the run's consumer.
struct Emitter<'a> {
    tx: &'a mpsc::Sender<RunEvent>,
    seq: u64,
}

impl Emitter<'_> {
    async fn emit(&mut self, stream: OutputStream, text: &str) {
        self.seq += 1;
        let chunk = OutputChunk {
            seq: self.seq,
            stream,
            text: text.to_string(),
        };
        // A closed receiver only means nobody is listening any more.
        let _ = self.tx.send(RunEvent::Output(chunk)).await;
    }
}

/// Drive `child` until it exits, times out or is cancelled.
///
/// The run ends when the interpreter exits. Anything it left running in its
/// process group is killed then, so a background job holding the pipes open
/// cannot stretch the run out to its deadline.
async fn supervise(
    run_id: &RunId,
    mut child: Child,
    tx: &mpsc::Sender<RunEvent>,
    cancel: &CancellationToken,
    options: &ExecOptions,
) -> RunOutcome {
    let started = Instant::now();
    // `Child::id` goes away once the child is reaped; the group outlives it.
    let pid = child.id();
    let mut emitter = Emitter { tx, seq: 0 };

    let (line_tx, mut line_rx) = mpsc::channel::<(OutputStream, String)>(options.channel_capacity.max(1));
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(pump(stdout, OutputStream::Stdout, options.max_line_chars, line_tx.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(pump(stderr, OutputStream::Stderr, options.max_line_chars, line_tx.clone()));
    }
    drop(line_tx);

    let deadline = tokio::time::sleep(options.timeout);
    tokio::pin!(deadline);
    let drain = tokio::time::sleep(options.timeout);
    tokio::pin!(drain);
    let mut pipes_open = true;
    let mut exited: Option<std::io::Result<ExitStatus>> = None;

    loop {
        if !pipes_open {
            if let Some(status) = exited.take() {
                return finish(status, &mut emitter, started).await;
            }
        }

        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                info!(run_id = %run_id, "cancellation requested, terminating script");
                terminate(&mut child, pid, options.grace_period).await;
                emitter.emit(OutputStream::System, "run cancelled").await;
                return RunOutcome::cancelled(elapsed_ms(started));
            }

            _ = &mut deadline => {
                warn!(run_id = %run_id, timeout = ?options.timeout, "script exceeded its deadline");
                force_kill(&mut child, pid).await;
                let message = format!("execution timed out after {}", human_duration(options.timeout));
                emitter.emit(OutputStream::System, &message).await;
                return RunOutcome::timed_out(message, elapsed_ms(started));
            }

            line = line_rx.recv(), if pipes_open => match line {
                Some((stream, text)) => {
                    // A slow consumer must not hold off cancellation or the
                    // deadline; the outer loop handles both on the next pass.
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {}
                        _ = &mut deadline => {}
                        _ = emitter.emit(stream, &text) => {}
                    }
                }
                None => pipes_open = false,
            },

            status = child.wait(), if exited.is_none() => {
                debug!(run_id = %run_id, "interpreter exited, reaping its process group");
                #[cfg(unix)]
                signal_group(pid, libc::SIGKILL);
                drain.as_mut().reset(TokioInstant::now() + EXIT_DRAIN);
                exited = Some(status);
            }

            _ = &mut drain, if exited.is_some() && pipes_open => {
                warn!(run_id = %run_id, "output pipes still open after exit, dropping the rest");
                pipes_open = false;
            }
        }
    }
}

async fn finish(
    status: std::io::Result<ExitStatus>,
    emitter: &mut Emitter<'_>,
    started: Instant,
) -> RunOutcome {
    let elapsed = elapsed_ms(started);
    match status {
        Ok(status) if status.success() => RunOutcome::succeeded(elapsed),
        Ok(status) => {
            let message = describe_exit(status);
            emitter.emit(OutputStream::System, &message).await;
            RunOutcome::failed(message, status.code(), elapsed)
        }
        Err(e) => {
            let message = format!("wait failed: {e}");
            emitter.emit(OutputStream::System, &message).await;
            RunOutcome::failed(message, None, elapsed)
        }
    }
}

/// Forward lines from one pipe until EOF or until nobody listens.
///
/// Reads block by block into a [`LineBuffer`], so an endless line without a
/// newline is truncated as it streams in instead of being held whole.
async fn pump<R>(
    reader: R,
    stream: OutputStream,
    max_line_chars: usize,
    tx: mpsc::Sender<(OutputStream, String)>,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut line = LineBuffer::new(max_line_chars);
    loop {
        let block = match reader.fill_buf().await {
            Ok(block) => block,
            Err(e) => {
                debug!(stream = stream.as_str(), "pipe read failed: {e}");
                break;
            }
        };
        if block.is_empty() {
            if !line.is_empty() {
                let _ = tx.send((stream, line.take())).await;
            }
            break;
        }

        let (used, complete) = match block.iter().position(|&b| b == b'\n') {
            Some(i) => {
                line.push(&block[..i]);
                (i + 1, true)
            }
            None => {
                line.push(block);
                (block.len(), false)
            }
        };
        reader.consume(used);

        if complete && tx.send((stream, line.take())).await.is_err() {
            break;
        }
    }
}

/// SIGTERM the process group, then SIGKILL once `grace` has passed.
async fn terminate(child: &mut Child, pid: Option<u32>, grace: Duration) {
    #[cfg(unix)]
    signal_group(pid, libc::SIGTERM);
    #[cfg(not(unix))]
    let _ = child.start_kill();

    if tokio::time::timeout(grace, child.wait()).await.is_err() {
        warn!(pid = ?pid, "script ignored SIGTERM, forcing kill");
        force_kill(child, pid).await;
    } else {
        // The interpreter is gone; make sure nothing it spawned survives.
        #[cfg(unix)]
        signal_group(pid, libc::SIGKILL);
    }
}

#[cfg_attr(not(unix), allow(unused_variables))]
async fn force_kill(child: &mut Child, pid: Option<u32>) {
    #[cfg(unix)]
    signal_group(pid, libc::SIGKILL);
    let _ = child.start_kill();
    let _ = child.wait().await;
}

/// Send `signal` to the script's whole process group.
#[cfg(unix)]
fn signal_group(pid: Option<u32>, signal: libc::c_int) {
    if let Some(pid) = pid {
        // Safety: the child was spawned with process_group(0), so its pid is
        // also the id of a group that only contains the script's processes.
        unsafe {
            libc::kill(-(pid as libc::pid_t), signal);
        }
    }
}

fn describe_exit(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("process exited with status {code}"),
        None => {
            #[cfg(unix)]
            {
                use std::os::unix::process::ExitStatusExt;
                if let Some(sig) = status.signal() {
                    return format!("process killed by signal {sig}");
                }
            }
            "process terminated abnormally".to_string()
        }
    }
}

fn human_duration(d: Duration) -> String {
    if d.subsec_millis() == 0 {
        format!("{}s", d.as_secs())
    } else {
        format!("{}ms", d.as_millis())
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
