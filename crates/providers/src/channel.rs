//! Ordered request/response channel over a child process's standard streams.
//!
//! Each request is one line on stdin and is answered by exactly one line on
//! stdout, in order. A one-time readiness marker arrives on stderr.

use crate::kind::ScorerCommand;
use crate::ScorerError;
use std::collections::VecDeque;
use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::{oneshot, watch, Mutex as AsyncMutex};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Readiness {
    Pending,
    Ready,
    Failed(String),
}

type Waiter = oneshot::Sender<Result<String, ScorerError>>;

#[derive(Default)]
struct Pending {
    closed: bool,
    waiters: VecDeque<Waiter>,
}

type SharedPending = Arc<Mutex<Pending>>;

fn lock(pending: &SharedPending) -> MutexGuard<'_, Pending> {
    pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Marks the channel closed and rejects every queued waiter.
fn fail_all(pending: &SharedPending) {
    let drained = {
        let mut guard = lock(pending);
        guard.closed = true;
        std::mem::take(&mut guard.waiters)
    };
    for waiter in drained {
        let _ = waiter.send(Err(ScorerError::ClosedPrematurely));
    }
}

fn mark_failed(ready: &watch::Sender<Readiness>, reason: &str) {
    ready.send_if_modified(|state| {
        if *state == Readiness::Pending {
            *state = Readiness::Failed(reason.to_string());
            true
        } else {
            false
        }
    });
}

pub struct LineChannel {
    label: String,
    stdin: AsyncMutex<Option<ChildStdin>>,
    pending: SharedPending,
    ready: Arc<watch::Sender<Readiness>>,
    kill: Mutex<Option<oneshot::Sender<()>>>,
}

impl LineChannel {
    /// Starts the process and its reader tasks. Does not wait for readiness.
    pub fn spawn(
        label: &str,
        command: &ScorerCommand,
        ready_marker: &str,
        working_dir: Option<&Path>,
    ) -> Result<Arc<Self>, ScorerError> {
        info!(scorer = label, program = %command.program, args = ?command.args, "spawning scorer");
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env("PYTHONUNBUFFERED", "1")
            .kill_on_drop(true);
        if let Some(dir) = working_dir {
            cmd.current_dir(dir);
        }
        let mut child = cmd.spawn().map_err(|source| ScorerError::Spawn {
            program: command.program.clone(),
            source,
        })?;

        let (stdin, stdout, stderr) = match (
            child.stdin.take(),
            child.stdout.take(),
            child.stderr.take(),
        ) {
            (Some(i), Some(o), Some(e)) => (i, o, e),
            _ => return Err(ScorerError::NotAttached),
        };

        let (ready_tx, _) = watch::channel(Readiness::Pending);
        let ready = Arc::new(ready_tx);
        let pending: SharedPending = Arc::default();
        let (kill_tx, kill_rx) = oneshot::channel();

        tokio::spawn(read_responses(label.to_string(), stdout, pending.clone()));
        tokio::spawn(read_diagnostics(
            label.to_string(),
            stderr,
            ready_marker.to_string(),
            ready.clone(),
        ));
        tokio::spawn(supervise(
            label.to_string(),
            child,
            kill_rx,
            pending.clone(),
            ready.clone(),
        ));

        Ok(Arc::new(Self {
            label: label.to_string(),
            stdin: AsyncMutex::new(Some(stdin)),
            pending,
            ready,
            kill: Mutex::new(Some(kill_tx)),
        }))
    }

    /// Resolves once the readiness marker was seen. All callers share the
    /// same signal; an exit or `terminate` before readiness fails them all.
    pub async fn wait_ready(&self, timeout: Duration) -> Result<(), ScorerError> {
        let mut rx = self.ready.subscribe();
        let waited =
            tokio::time::timeout(timeout, rx.wait_for(|r| *r != Readiness::Pending)).await;
        let state = match waited {
            Err(_) => return Err(ScorerError::ReadyTimeout(timeout)),
            Ok(Err(_)) => return Err(ScorerError::ExitedBeforeReady("channel dropped".into())),
            Ok(Ok(state)) => (*state).clone(),
        };
        match state {
            Readiness::Ready => Ok(()),
            Readiness::Failed(reason) => Err(ScorerError::ExitedBeforeReady(reason)),
            Readiness::Pending => Err(ScorerError::NotAttached),
        }
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.pending).closed
    }

    /// Sends one request line and waits for its response line.
    pub async fn request(&self, payload: &str) -> Result<String, ScorerError> {
        if payload.contains(['\n', '\r']) {
            return Err(ScorerError::InvalidRequest(payload.to_string()));
        }
        let mut stdin_guard = self.stdin.lock().await;
        let stdin = stdin_guard.as_mut().ok_or(ScorerError::NotAttached)?;

        // Queue before writing so the response can never outrun its waiter;
        // holding the stdin lock keeps queue order equal to write order.
        let rx = {
            let mut pending = lock(&self.pending);
            if pending.closed {
                return Err(ScorerError::ClosedPrematurely);
            }
            let (tx, rx) = oneshot::channel();
            pending.waiters.push_back(tx);
            rx
        };

        let line = format!("{}\n", payload);
        let written = match stdin.write_all(line.as_bytes()).await {
            Ok(()) => stdin.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            warn!(scorer = %self.label, "write to scorer failed: {}", e);
            stdin_guard.take();
            drop(stdin_guard);
            self.terminate();
            return Err(ScorerError::Io(e));
        }
        drop(stdin_guard);

        rx.await.unwrap_or(Err(ScorerError::ClosedPrematurely))
    }

    /// Kills the process and rejects queued requests.
    pub fn terminate(&self) {
        let kill = self
            .kill
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(kill) = kill {
            debug!(scorer = %self.label, "terminating scorer");
            let _ = kill.send(());
        }
        mark_failed(&self.ready, "terminated");
        fail_all(&self.pending);
    }
}

impl Drop for LineChannel {
    fn drop(&mut self) {
        self.terminate();
    }
}

/// Reads one `\n`-terminated line, decoding invalid UTF-8 lossily so a stray
/// byte from the child never ends the stream. Returns `None` at EOF.
async fn next_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    if reader.read_until(b'\n', buf).await? == 0 {
        return Ok(None);
    }
    let line = String::from_utf8_lossy(buf);
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}

async fn read_responses(label: String, stdout: ChildStdout, pending: SharedPending) {
    let mut reader = BufReader::new(stdout);
    let mut buf = Vec::new();
    loop {
        match next_line(&mut reader, &mut buf).await {
            Ok(Some(line)) => {
                let waiter = lock(&pending).waiters.pop_front();
                match waiter {
                    Some(waiter) => {
                        let _ = waiter.send(Ok(line));
                    }
                    None => warn!(scorer = %label, "unsolicited scorer output: {}", line),
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(scorer = %label, "failed reading scorer output: {}", e);
                break;
            }
        }
    }
    fail_all(&pending);
}

/// Drains stderr for the life of the process so the child never blocks or
/// dies on a full or closed pipe.
async fn read_diagnostics(
    label: String,
    stderr: ChildStderr,
    marker: String,
    ready: Arc<watch::Sender<Readiness>>,
) {
    let mut reader = BufReader::new(stderr);
    let mut buf = Vec::new();
    loop {
        let line = match next_line(&mut reader, &mut buf).await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                debug!(scorer = %label, "failed reading scorer diagnostics: {}", e);
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        info!(scorer = %label, "{}", line);
        if line.contains(&marker) {
            ready.send_if_modified(|state| {
                if *state == Readiness::Pending {
                    *state = Readiness::Ready;
                    true
                } else {
                    false
                }
            });
        }
    }
}

async fn supervise(
    label: String,
    mut child: Child,
    kill: oneshot::Receiver<()>,
    pending: SharedPending,
    ready: Arc<watch::Sender<Readiness>>,
) {
    let (status, killed) = tokio::select! {
        status = child.wait() => (status, false),
        _ = kill => {
            if let Err(e) = child.start_kill() {
                debug!(scorer = %label, "kill failed: {}", e);
            }
            (child.wait().await, true)
        }
    };
    let reason = match &status {
        Ok(status) => format!("process exited with {}", status),
        Err(e) => format!("failed to wait for process: {}", e),
    };
    mark_failed(&ready, &reason);
    if killed {
        info!(scorer = %label, "scorer stopped");
        fail_all(&pending);
    } else {
        // Waiters are drained by the stdout reader at EOF, after any lines
        // the process wrote before exiting have been delivered.
        warn!(scorer = %label, "{}", reason);
    }
}
