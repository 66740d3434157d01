//! Seams between orchestration and the transport

use std::future::Future;
use std::path::Path;

use tokio_util::sync::CancellationToken;

use crate::config::RemoteTarget;
use crate::error::{ConnectError, UploadError};
use crate::exec::join_commands;
use crate::stream::ExecutionStream;

/// Establishes authenticated connections to targets
pub trait Connector: Send + Sync + 'static {
    type Host: RemoteHost;

    fn connect(
        &self,
        target: &RemoteTarget,
    ) -> impl Future<Output = Result<Self::Host, ConnectError>> + Send;
}

/// An open connection to one target
pub trait RemoteHost: Send + 'static {
    /// Upload a local file into `remote_dir`, returning the bytes written.
    fn upload_file(
        &mut self,
        local_path: &Path,
        remote_dir: &str,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<u64, UploadError>> + Send;

    /// Upload in-memory content as `remote_dir/name`.
    fn upload_buffer(
        &mut self,
        name: &str,
        content: &[u8],
        remote_dir: &str,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<u64, UploadError>> + Send;

    /// Run one command in a new session.
    fn execute(&self, command: &str, cancel: CancellationToken) -> ExecutionStream;

    /// Run several commands as one `&&` chain.
    fn execs<S: AsRef<str>>(&self, commands: &[S], cancel: CancellationToken) -> ExecutionStream {
        self.execute(&join_commands(commands), cancel)
    }

    /// Release the transfer sub-channel and the connection. Idempotent.
    fn close(&mut self) -> impl Future<Output = ()> + Send;
}
