use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use russh::Disconnect;
use russh::client::Handle;
use russh_sftp::client::SftpSession;
use tokio_util::sync::CancellationToken;

use crate::config::RemoteTarget;
use crate::error::UploadError;
use crate::exec::CommandExecutor;
use crate::remote::RemoteHost;
use crate::security_log;
use crate::sftp::transfer;
use crate::stream::ExecutionStream;

use super::handler::ClientHandler;
use super::process::SshSessionOpener;

/// An authenticated SSH connection to one target.
///
/// The SFTP sub-channel is opened on first upload and reused afterwards.
pub struct SshConnection {
    target: RemoteTarget,
    handle: Arc<Handle<ClientHandler>>,
    executor: CommandExecutor<SshSessionOpener>,
    sftp: Option<SftpSession>,
    closed: bool,
}

impl std::fmt::Debug for SshConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshConnection")
            .field("target", &self.target)
            .field("sftp_open", &self.sftp.is_some())
            .field("closed", &self.closed)
            .finish()
    }
}

impl SshConnection {
    pub(crate) fn new(
        target: RemoteTarget,
        handle: Handle<ClientHandler>,
        kill_grace: Duration,
    ) -> Self {
        let handle = Arc::new(handle);
        let executor = CommandExecutor::new(Arc::new(SshSessionOpener::new(handle.clone())))
            .with_kill_grace(kill_grace);
        Self {
            target,
            handle,
            executor,
            sftp: None,
            closed: false,
        }
    }

    pub fn target(&self) -> &RemoteTarget {
        &self.target
    }

    /// The SFTP session, opening it if needed.
    pub async fn transfer(&mut self) -> Result<&SftpSession, UploadError> {
        if self.closed {
            return Err(UploadError::Session("connection already closed".to_string()));
        }
        let sftp = match self.sftp.take() {
            Some(sftp) => sftp,
            None => self.open_sftp().await?,
        };
        Ok(self.sftp.insert(sftp))
    }

    async fn open_sftp(&self) -> Result<SftpSession, UploadError> {
        let channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| UploadError::Session(format!("Failed to open channel: {}", e)))?;

        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(|e| UploadError::Session(format!("Failed to request SFTP subsystem: {}", e)))?;

        let sftp = SftpSession::new(channel.into_stream())
            .await
            .map_err(|e| UploadError::Session(format!("Failed to initialize SFTP session: {}", e)))?;

        security_log::log_sftp_open(&self.target.host, self.target.port);
        Ok(sftp)
    }

    /// Close the SFTP client, then the SSH session.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if let Some(sftp) = self.sftp.take() {
            if let Err(e) = sftp.close().await {
                tracing::debug!("SFTP close failed for {}: {}", self.target.host, e);
            }
        }
        if let Err(e) = self
            .handle
            .disconnect(Disconnect::ByApplication, "", "English")
            .await
        {
            tracing::debug!("Disconnect failed for {}: {}", self.target.host, e);
        }
        tracing::debug!("Closed connection to {}", self.target);
    }
}

impl RemoteHost for SshConnection {
    async fn upload_file(
        &mut self,
        local_path: &Path,
        remote_dir: &str,
        cancel: &CancellationToken,
    ) -> Result<u64, UploadError> {
        let sftp = self.transfer().await?;
        transfer::upload_file(sftp, local_path, remote_dir, cancel).await
    }

    async fn upload_buffer(
        &mut self,
        name: &str,
        content: &[u8],
        remote_dir: &str,
        cancel: &CancellationToken,
    ) -> Result<u64, UploadError> {
        let sftp = self.transfer().await?;
        transfer::upload_buffer(sftp, name, content, remote_dir, cancel).await
    }

    fn execute(&self, command: &str, cancel: CancellationToken) -> ExecutionStream {
        self.executor.execute(command, cancel)
    }

    async fn close(&mut self) {
        SshConnection::close(self).await
    }
}
