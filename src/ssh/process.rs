//! Command sessions on an SSH connection

use std::sync::Arc;

use russh::client::{Handle, Msg};
use russh::{Channel, ChannelMsg, Sig};

use crate::error::ExecError;
use crate::exec::{ProcessEvent, RemoteProcess, SessionOpener};

use super::handler::ClientHandler;

/// SSH extended data type for stderr
const SSH_EXTENDED_DATA_STDERR: u32 = 1;

/// Opens one `session` channel per command on a shared connection
pub struct SshSessionOpener {
    handle: Arc<Handle<ClientHandler>>,
}

impl SshSessionOpener {
    pub fn new(handle: Arc<Handle<ClientHandler>>) -> Self {
        Self { handle }
    }
}

impl SessionOpener for SshSessionOpener {
    type Process = SshProcess;

    async fn open_session(&self) -> Result<SshProcess, ExecError> {
        let channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| ExecError::Session(format!("Failed to open channel: {}", e)))?;
        Ok(SshProcess { channel })
    }
}

/// A remote command running in one SSH channel
pub struct SshProcess {
    channel: Channel<Msg>,
}

impl RemoteProcess for SshProcess {
    async fn start(&mut self, command: &str) -> Result<(), ExecError> {
        self.channel
            .exec(true, command)
            .await
            .map_err(|e| ExecError::Start(e.to_string()))
    }

    async fn next_event(&mut self) -> Option<Result<ProcessEvent, ExecError>> {
        loop {
            let event = match self.channel.wait().await? {
                ChannelMsg::Data { data } => ProcessEvent::Stdout(data.to_vec()),
                ChannelMsg::ExtendedData { data, ext } if ext == SSH_EXTENDED_DATA_STDERR => {
                    ProcessEvent::Stderr(data.to_vec())
                }
                ChannelMsg::ExitStatus { exit_status } => ProcessEvent::ExitStatus(exit_status),
                ChannelMsg::ExitSignal { signal_name, .. } => {
                    ProcessEvent::ExitSignal(format!("{:?}", signal_name))
                }
                ChannelMsg::Failure => {
                    return Some(Err(ExecError::Start(
                        "server refused the exec request".to_string(),
                    )));
                }
                ChannelMsg::Close => return None,
                // Eof may still be followed by the exit status
                _ => continue,
            };
            return Some(Ok(event));
        }
    }

    async fn kill(&mut self) -> Result<(), ExecError> {
        self.channel
            .signal(Sig::KILL)
            .await
            .map_err(|e| ExecError::Session(format!("Failed to send KILL: {}", e)))
    }

    async fn close(self) {
        if let Err(e) = self.channel.close().await {
            tracing::debug!("Channel close failed: {}", e);
        }
    }
}
