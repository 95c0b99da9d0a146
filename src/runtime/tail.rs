use super::{validate_container_id, ContainerRuntime, RuntimeError};
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// What to tail and from where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailRequest {
    pub container_id: String,
    pub since: Option<String>,
    pub tail: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TailEvent {
    /// One line of output, without its trailing newline
    Chunk { stream: OutputStream, text: String },
    /// The process is gone; no further events follow
    Exit { success: bool, description: String },
}

/// Handle to a running tail.
///
/// Events arrive on `events` in emission order per output channel. Dropping
/// the receiver or calling `terminate` asks the process to exit; neither waits
/// for it to do so.
#[derive(Debug)]
pub struct TailHandle {
    container_id: String,
    events: mpsc::Receiver<TailEvent>,
    cancel: CancellationToken,
}

impl TailHandle {
    pub fn new(
        container_id: impl Into<String>,
        events: mpsc::Receiver<TailEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            container_id: container_id.into(),
            events,
            cancel,
        }
    }

    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    pub async fn next_event(&mut self) -> Option<TailEvent> {
        self.events.recv().await
    }

    pub fn terminate(&self) {
        self.cancel.cancel();
    }

    /// Token that terminates this tail when cancelled.
    pub fn terminator(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

/// Something that can start live tails. The session registry only talks to
/// this seam, so it never needs a real container runtime under test.
pub trait LogSource: Send + Sync {
    fn spawn_tail(&self, request: &TailRequest) -> Result<TailHandle, RuntimeError>;
}

pub fn tail_args(request: &TailRequest) -> Vec<String> {
    let mut args = vec![
        "logs".to_string(),
        "--follow".to_string(),
        "--tail".to_string(),
        request.tail.to_string(),
    ];
    if let Some(since) = &request.since {
        args.push("--since".to_string());
        args.push(since.clone());
    }
    args.push(request.container_id.clone());
    args
}

pub fn spawn_tail_process(
    runtime: ContainerRuntime,
    request: &TailRequest,
) -> Result<TailHandle, RuntimeError> {
    validate_container_id(&request.container_id)?;

    let mut command = Command::new(runtime.binary());
    command.args(tail_args(request));

    spawn_command(command, runtime.binary(), &request.container_id)
}

/// Spawn `command` with piped output and supervise it until it exits.
pub fn spawn_command(
    mut command: Command,
    binary: &'static str,
    container_id: &str,
) -> Result<TailHandle, RuntimeError> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command
        .spawn()
        .map_err(|source| RuntimeError::Spawn { binary, source })?;

    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let cancel = CancellationToken::new();

    let stdout = child.stdout.take().map(|out| {
        tokio::spawn(pump(out, OutputStream::Stdout, tx.clone()))
    });
    let stderr = child.stderr.take().map(|err| {
        tokio::spawn(pump(err, OutputStream::Stderr, tx.clone()))
    });

    debug!(container_id = %container_id, pid = ?child.id(), "Tail process spawned");

    tokio::spawn(supervise(
        child,
        stdout,
        stderr,
        tx,
        cancel.clone(),
        container_id.to_string(),
    ));

    Ok(TailHandle::new(container_id, rx, cancel))
}

async fn pump<R: AsyncRead + Unpin>(
    reader: R,
    stream: OutputStream,
    events: mpsc::Sender<TailEvent>,
) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&buf)
                    .trim_end_matches(['\n', '\r'])
                    .to_string();
                if events.send(TailEvent::Chunk { stream, text }).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!(stream = ?stream, error = %e, "Failed to read tail output");
                break;
            }
        }
    }
}

async fn supervise(
    mut child: Child,
    stdout: Option<tokio::task::JoinHandle<()>>,
    stderr: Option<tokio::task::JoinHandle<()>>,
    events: mpsc::Sender<TailEvent>,
    cancel: CancellationToken,
    container_id: String,
) {
    let exited = tokio::select! {
        status = child.wait() => Some(status),
        _ = cancel.cancelled() => None,
        _ = events.closed() => None,
    };

    let killed = exited.is_none();
    let status = match exited {
        Some(status) => status,
        None => {
            kill(&mut child, &container_id);
            child.wait().await
        }
    };

    // Let both readers drain so the exit event is the last thing delivered
    for reader in [stdout, stderr].into_iter().flatten() {
        let _ = reader.await;
    }

    let (success, description) = match status {
        Ok(status) => (status.success(), describe_exit(status, killed)),
        Err(e) => (false, format!("Failed to wait for log process: {}", e)),
    };

    debug!(container_id = %container_id, success, description = %description, "Tail process exited");

    let _ = events.send(TailEvent::Exit { success, description }).await;
}

fn kill(child: &mut Child, container_id: &str) {
    if let Err(e) = child.start_kill() {
        debug!(container_id = %container_id, error = %e, "Tail process already gone");
    }
}

fn describe_exit(status: ExitStatus, killed: bool) -> String {
    if killed {
        return "Log stream stopped".to_string();
    }
    match status.code() {
        Some(0) => "Log stream ended".to_string(),
        Some(code) => format!("Log process exited with code {}", code),
        None => "Log process terminated by signal".to_string(),
    }
}
