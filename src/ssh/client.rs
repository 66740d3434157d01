use std::sync::Arc;
use std::time::Duration;

use russh::client::{self, Config};
use secrecy::ExposeSecret;
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::config::{RemoteTarget, Settings};
use crate::error::{ConfigError, ConnectError};
use crate::exec::DEFAULT_KILL_GRACE;
use crate::remote::Connector;
use crate::security_log;

use super::auth::ResolvedAuth;
use super::connection::SshConnection;
use super::handler::{ClientHandler, HostKeyPolicy};

/// Dials targets and hands out authenticated [`SshConnection`]s
#[derive(Clone)]
pub struct SshClient {
    config: Arc<Config>,
    connect_timeout: Duration,
    host_key_policy: HostKeyPolicy,
    kill_grace: Duration,
}

impl SshClient {
    pub fn new(
        connect_timeout: Duration,
        keepalive_interval: Option<Duration>,
        host_key_policy: HostKeyPolicy,
    ) -> Self {
        let config = Config {
            inactivity_timeout: Some(Duration::from_secs(3600)),
            keepalive_interval,
            keepalive_max: 3,
            ..Default::default()
        };

        Self {
            config: Arc::new(config),
            connect_timeout,
            host_key_policy,
            kill_grace: DEFAULT_KILL_GRACE,
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        Ok(Self::new(
            settings.connect_timeout(),
            settings.keepalive_interval(),
            settings.host_key.policy()?,
        ))
    }

    pub fn host_key_policy(&self) -> &HostKeyPolicy {
        &self.host_key_policy
    }

    /// Dial, verify the host key and authenticate.
    pub async fn connect(&self, target: &RemoteTarget) -> Result<SshConnection, ConnectError> {
        let addr = target.addr();
        tracing::debug!("Connecting to {}", target);

        let stream = timeout(self.connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| ConnectError::Timeout(addr.clone()))?
            .map_err(|e| ConnectError::Dial {
                host: target.host.clone(),
                port: target.port,
                reason: e.to_string(),
            })?;

        let handle = timeout(self.connect_timeout, self.establish(target, stream))
            .await
            .map_err(|_| ConnectError::Timeout(addr))??;

        tracing::info!("Connected to {}", target);
        Ok(SshConnection::new(target.clone(), handle, self.kill_grace))
    }

    /// Connect and immediately close, reporting only whether it worked.
    pub async fn check_connect(&self, target: &RemoteTarget) -> Result<(), ConnectError> {
        let mut connection = self.connect(target).await?;
        connection.close().await;
        Ok(())
    }

    async fn establish(
        &self,
        target: &RemoteTarget,
        stream: TcpStream,
    ) -> Result<client::Handle<ClientHandler>, ConnectError> {
        let handler = ClientHandler::new(
            target.host.clone(),
            target.port,
            self.host_key_policy.clone(),
        );

        let mut handle = client::connect_stream(self.config.clone(), stream, handler)
            .await
            .map_err(|e| match e {
                ConnectError::HostKey(_) => e,
                other => ConnectError::Handshake {
                    host: target.host.clone(),
                    port: target.port,
                    reason: other.to_string(),
                },
            })?;

        let auth = ResolvedAuth::resolve(&target.credential).await?;
        authenticate(&mut handle, target, auth).await?;
        Ok(handle)
    }
}

async fn authenticate(
    handle: &mut client::Handle<ClientHandler>,
    target: &RemoteTarget,
    auth: ResolvedAuth,
) -> Result<(), ConnectError> {
    security_log::log_auth_attempt(target);

    let result = match auth {
        ResolvedAuth::Password(password) => {
            handle
                .authenticate_password(target.user.as_str(), password.expose_secret())
                .await
        }
        ResolvedAuth::PublicKey(key) => {
            handle
                .authenticate_publickey(target.user.as_str(), key)
                .await
        }
    };

    match result {
        Ok(outcome) if outcome.success() => {
            security_log::log_auth_success(target);
            Ok(())
        }
        Ok(_) => {
            let reason = format!("{} rejected by server", target.credential.method_name());
            security_log::log_auth_failure(target, &reason);
            Err(ConnectError::Auth(format!("{}: {}", target, reason)))
        }
        Err(e) => {
            let reason = e.to_string();
            security_log::log_auth_failure(target, &reason);
            Err(ConnectError::Auth(reason))
        }
    }
}

impl Connector for SshClient {
    type Host = SshConnection;

    async fn connect(&self, target: &RemoteTarget) -> Result<SshConnection, ConnectError> {
        SshClient::connect(self, target).await
    }
}
