//! Streaming remote command execution
//!
//! [`CommandExecutor`] runs one command in a fresh remote session and relays
//! its stdout line by line through an [`ExecutionStream`]. The executor only
//! sees the [`SessionOpener`] / [`RemoteProcess`] seams; the SSH binding
//! lives in `ssh::process`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::ExecError;
use crate::stream::{self, ExecutionStream, OutputSink};

/// How long a killed process gets to close its channel
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(2);

/// Longest stdout line kept before it is split
const MAX_LINE_LEN: usize = 64 * 1024;

/// Stderr kept for the failure message; the rest is counted and dropped
const MAX_STDERR_CAPTURE: usize = 64 * 1024;

/// Something the remote side reported for a running command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    Stdout(Vec<u8>),
    Stderr(Vec<u8>),
    ExitStatus(u32),
    ExitSignal(String),
}

/// One remote command session
pub trait RemoteProcess: Send + Sized + 'static {
    /// Start `command` in this session.
    fn start(&mut self, command: &str) -> impl Future<Output = Result<(), ExecError>> + Send;

    /// Next event, or `None` once the session has closed.
    fn next_event(
        &mut self,
    ) -> impl Future<Output = Option<Result<ProcessEvent, ExecError>>> + Send;

    /// Ask the remote side to kill the process.
    fn kill(&mut self) -> impl Future<Output = Result<(), ExecError>> + Send;

    /// Release the session.
    fn close(self) -> impl Future<Output = ()> + Send;
}

/// Opens command sessions on an established connection
pub trait SessionOpener: Send + Sync + 'static {
    type Process: RemoteProcess;

    fn open_session(&self) -> impl Future<Output = Result<Self::Process, ExecError>> + Send;
}

/// Lifecycle of one execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecState {
    Idle,
    SessionOpen,
    Running,
    Completed,
    Failed,
    Cancelled,
    Closed,
}

struct Transitions<'a> {
    command: &'a str,
    state: ExecState,
}

impl<'a> Transitions<'a> {
    fn new(command: &'a str) -> Self {
        Self {
            command,
            state: ExecState::Idle,
        }
    }

    fn to(&mut self, next: ExecState) {
        tracing::debug!(command = %self.command, from = ?self.state, to = ?next, "exec state");
        self.state = next;
    }
}

/// Runs commands through sessions obtained from `O`
pub struct CommandExecutor<O> {
    opener: Arc<O>,
    kill_grace: Duration,
}

impl<O> Clone for CommandExecutor<O> {
    fn clone(&self) -> Self {
        Self {
            opener: self.opener.clone(),
            kill_grace: self.kill_grace,
        }
    }
}

impl<O: SessionOpener> CommandExecutor<O> {
    pub fn new(opener: Arc<O>) -> Self {
        Self {
            opener,
            kill_grace: DEFAULT_KILL_GRACE,
        }
    }

    pub fn with_kill_grace(mut self, kill_grace: Duration) -> Self {
        self.kill_grace = kill_grace;
        self
    }

    /// Run `command` and stream its output.
    ///
    /// The first line is the command itself. The stream closes when the
    /// command finishes, fails, or `cancel` fires.
    pub fn execute(&self, command: &str, cancel: CancellationToken) -> ExecutionStream {
        let (sink, stream) = stream::channel();
        let opener = self.opener.clone();
        let command = command.to_string();
        let kill_grace = self.kill_grace;

        tokio::spawn(async move {
            let result = drive(opener.as_ref(), &command, &sink, &cancel, kill_grace).await;
            if let Err(e) = &result {
                tracing::debug!("Command '{}' ended with error: {}", command, e);
            }
            sink.finish(result);
        });

        stream
    }

    /// Run several commands as one `&&` chain.
    pub fn execs<S: AsRef<str>>(&self, commands: &[S], cancel: CancellationToken) -> ExecutionStream {
        self.execute(&join_commands(commands), cancel)
    }
}

pub(crate) fn join_commands<S: AsRef<str>>(commands: &[S]) -> String {
    commands
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(" && ")
}

async fn drive<O: SessionOpener>(
    opener: &O,
    command: &str,
    sink: &OutputSink<ExecError>,
    cancel: &CancellationToken,
    kill_grace: Duration,
) -> Result<(), ExecError> {
    let mut state = Transitions::new(command);

    let opened = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ExecError::Cancelled),
        opened = opener.open_session() => opened,
    };
    let mut process = match opened {
        Ok(process) => process,
        Err(e) => {
            state.to(if matches!(e, ExecError::Cancelled) {
                ExecState::Cancelled
            } else {
                ExecState::Failed
            });
            return Err(e);
        }
    };
    state.to(ExecState::SessionOpen);

    let result = run(&mut process, command, sink, cancel, kill_grace, &mut state).await;
    state.to(match &result {
        Ok(()) => ExecState::Completed,
        Err(ExecError::Cancelled) => ExecState::Cancelled,
        Err(_) => ExecState::Failed,
    });

    process.close().await;
    state.to(ExecState::Closed);
    result
}

enum Exit {
    Status(u32),
    Signal(String),
}

enum Step {
    Cancelled,
    Event(Option<Result<ProcessEvent, ExecError>>),
}

async fn run<P: RemoteProcess>(
    process: &mut P,
    command: &str,
    sink: &OutputSink<ExecError>,
    cancel: &CancellationToken,
    kill_grace: Duration,
    state: &mut Transitions<'_>,
) -> Result<(), ExecError> {
    sink.send_until(format!("{}\n", command), cancel).await;

    if cancel.is_cancelled() {
        return Err(ExecError::Cancelled);
    }
    process.start(command).await?;
    state.to(ExecState::Running);

    let mut stdout = LineBuffer::default();
    let mut stderr = StderrCapture::default();
    let mut exit = None;
    let mut read_error = None;

    loop {
        let step = tokio::select! {
            biased;
            _ = cancel.cancelled() => Step::Cancelled,
            event = process.next_event() => Step::Event(event),
        };

        match step {
            Step::Cancelled => {
                kill_and_drain(process, kill_grace).await;
                return Err(ExecError::Cancelled);
            }
            Step::Event(None) => break,
            Step::Event(Some(Err(e))) => {
                read_error = Some(e);
                break;
            }
            Step::Event(Some(Ok(event))) => match event {
                ProcessEvent::Stdout(bytes) => {
                    for line in stdout.push(&bytes) {
                        if !sink.send_until(line, cancel).await && cancel.is_cancelled() {
                            kill_and_drain(process, kill_grace).await;
                            return Err(ExecError::Cancelled);
                        }
                    }
                }
                ProcessEvent::Stderr(bytes) => stderr.push(&bytes),
                ProcessEvent::ExitStatus(code) => exit = Some(Exit::Status(code)),
                ProcessEvent::ExitSignal(signal) => exit = Some(Exit::Signal(signal)),
            },
        }
    }

    if let Some(rest) = stdout.finish() {
        sink.send_until(rest, cancel).await;
    }

    if let Some(e) = read_error {
        return Err(e);
    }
    if let Some(text) = stderr.finish() {
        return Err(ExecError::Stderr(text));
    }
    match exit {
        Some(Exit::Status(0)) => Ok(()),
        Some(Exit::Status(code)) => Err(ExecError::ExitStatus(code)),
        Some(Exit::Signal(signal)) => Err(ExecError::Signal(signal)),
        None => Err(ExecError::NoExitStatus),
    }
}

async fn kill_and_drain<P: RemoteProcess>(process: &mut P, grace: Duration) {
    if let Err(e) = process.kill().await {
        tracing::warn!("Failed to signal remote process: {}", e);
    }

    let drained = tokio::time::timeout(grace, async {
        while let Some(event) = process.next_event().await {
            if event.is_err() {
                break;
            }
        }
    })
    .await;

    if drained.is_err() {
        tracing::warn!("Remote process still running {:?} after KILL; closing session", grace);
    }
}

/// Splits a byte stream into `\n` terminated lines
///
/// Lines longer than [`MAX_LINE_LEN`] are cut on a UTF-8 boundary and
/// emitted in pieces, each completed with a newline.
#[derive(Default)]
struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut lines = Vec::new();
        loop {
            if let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
                if pos < MAX_LINE_LEN {
                    let line: Vec<u8> = self.pending.drain(..=pos).collect();
                    lines.push(String::from_utf8_lossy(&line).into_owned());
                    continue;
                }
            } else if self.pending.len() < MAX_LINE_LEN {
                break;
            }

            let cut = char_boundary(&self.pending, MAX_LINE_LEN);
            let mut line = String::from_utf8_lossy(&self.pending[..cut]).into_owned();
            line.push('\n');
            self.pending.drain(..cut);
            lines.push(line);
        }
        lines
    }

    /// Unterminated tail, completed with a newline
    fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let mut line = String::from_utf8_lossy(&self.pending).into_owned();
        line.push('\n');
        self.pending.clear();
        Some(line)
    }
}

/// Largest cut at or below `limit` that does not split a UTF-8 sequence.
fn char_boundary(bytes: &[u8], limit: usize) -> usize {
    let mut cut = limit.min(bytes.len());
    while cut > 0 && cut < bytes.len() && bytes[cut] & 0xC0 == 0x80 {
        cut -= 1;
    }
    if cut == 0 { limit.min(bytes.len()) } else { cut }
}

/// First [`MAX_STDERR_CAPTURE`] bytes of stderr
#[derive(Default)]
struct StderrCapture {
    kept: Vec<u8>,
    dropped: usize,
}

impl StderrCapture {
    fn push(&mut self, bytes: &[u8]) {
        let room = MAX_STDERR_CAPTURE.saturating_sub(self.kept.len());
        let take = room.min(bytes.len());
        self.kept.extend_from_slice(&bytes[..take]);
        self.dropped += bytes.len() - take;
    }

    /// Trimmed text, or `None` if nothing was written to stderr.
    fn finish(self) -> Option<String> {
        if self.kept.is_empty() && self.dropped == 0 {
            return None;
        }
        if self.dropped > 0 {
            tracing::debug!("Dropped {} bytes of stderr beyond the capture limit", self.dropped);
        }
        Some(String::from_utf8_lossy(&self.kept).trim().to_string())
    }
}
