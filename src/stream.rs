//! Ordered, finite, single-consumer line streams.
//!
//! A producer task owns an [`OutputSink`] and the caller owns the matching
//! [`OutputStream`]. Lines arrive in the order they were sent. The stream
//! closes exactly once: when the sink is finished, or when it is dropped
//! (for example if the producer panics).
//!
//! The terminal result can only be read through [`OutputStream::outcome`],
//! which drains the stream first. The producer sends the result before it
//! releases the line channel, so a closed stream always has its result
//! available. A stream that closes without the success sentinel as its last
//! line means the run failed.

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// Marker emitted as the final line of a fully successful deployment.
pub const SUCCESS_SENTINEL: &str = "successful execution, exit 0\n";

/// Separator emitted between per-host sections.
pub const SEPARATOR: &str = "\n\n";

const STREAM_CAPACITY: usize = 256;

/// Errors that can stand in for a producer that vanished without reporting.
pub trait AbortedError {
    fn aborted() -> Self;
}

impl AbortedError for crate::error::ExecError {
    fn aborted() -> Self {
        crate::error::ExecError::Aborted
    }
}

impl AbortedError for crate::error::DeployError {
    fn aborted() -> Self {
        crate::error::DeployError::Aborted
    }
}

/// Create a connected sink/stream pair.
pub fn channel<E>() -> (OutputSink<E>, OutputStream<E>) {
    let (line_tx, line_rx) = mpsc::channel(STREAM_CAPACITY);
    let (outcome_tx, outcome_rx) = oneshot::channel();
    (
        OutputSink {
            lines: line_tx,
            outcome: outcome_tx,
        },
        OutputStream {
            lines: line_rx,
            outcome: outcome_rx,
        },
    )
}

/// Producer half of a line stream
pub struct OutputSink<E> {
    lines: mpsc::Sender<String>,
    outcome: oneshot::Sender<Result<(), E>>,
}

impl<E> std::fmt::Debug for OutputSink<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputSink")
            .field("closed", &self.lines.is_closed())
            .finish()
    }
}

impl<E> OutputSink<E> {
    /// Push one line. Returns `false` once the consumer has gone away.
    pub async fn send(&self, line: impl Into<String>) -> bool {
        self.lines.send(line.into()).await.is_ok()
    }

    /// Push one line unless `cancel` fires while waiting for room.
    ///
    /// Returns `false` when the line was dropped, either because of `cancel`
    /// or because the consumer is gone.
    pub async fn send_until(&self, line: impl Into<String>, cancel: &CancellationToken) -> bool {
        let line = line.into();
        tokio::select! {
            biased;
            sent = self.lines.send(line) => sent.is_ok(),
            _ = cancel.cancelled() => false,
        }
    }

    /// Push one line only if the channel has room right now.
    pub fn try_send(&self, line: impl Into<String>) -> bool {
        self.lines.try_send(line.into()).is_ok()
    }

    /// Whether the consumer dropped its stream.
    pub fn is_closed(&self) -> bool {
        self.lines.is_closed()
    }

    /// Record the terminal result and close the stream.
    ///
    /// Consumes the sink, so a stream can only be finished once.
    pub fn finish(self, result: Result<(), E>) {
        let OutputSink { lines, outcome } = self;
        // The consumer may already be gone; nothing left to deliver then.
        let _ = outcome.send(result);
        drop(lines);
    }
}

/// Consumer half of a line stream
pub struct OutputStream<E> {
    lines: mpsc::Receiver<String>,
    outcome: oneshot::Receiver<Result<(), E>>,
}

impl<E> std::fmt::Debug for OutputStream<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputStream").finish_non_exhaustive()
    }
}

impl<E: AbortedError> OutputStream<E> {
    /// Next line, or `None` once the stream has closed.
    pub async fn next_line(&mut self) -> Option<String> {
        self.lines.recv().await
    }

    /// Drain any remaining lines and return the terminal result.
    pub async fn outcome(mut self) -> Result<(), E> {
        while self.lines.recv().await.is_some() {}
        self.outcome.await.unwrap_or_else(|_| Err(E::aborted()))
    }

    /// Collect every line and the terminal result.
    pub async fn collect(mut self) -> (Vec<String>, Result<(), E>) {
        let mut lines = Vec::new();
        while let Some(line) = self.lines.recv().await {
            lines.push(line);
        }
        let result = self.outcome.await.unwrap_or_else(|_| Err(E::aborted()));
        (lines, result)
    }
}

/// Output stream of a single remote command
pub type ExecutionStream = OutputStream<crate::error::ExecError>;

/// Merged output stream of a multi-host deployment
pub type DeploymentStream = OutputStream<crate::error::DeployError>;
