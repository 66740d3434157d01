use std::future::Future;
use std::path::PathBuf;

use russh::client::Handler;
use russh::keys::PublicKey;

use crate::error::ConnectError;
use crate::security_log;

use super::known_hosts::{self, HostKeyStatus};

/// How a server's host key is verified during the handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostKeyPolicy {
    /// Key must be listed for the host in this `known_hosts` file
    KnownHosts(PathBuf),
    /// Key must have this SHA-256 fingerprint (`SHA256:...`)
    Fingerprint(String),
    /// Accept every key; logged as a security warning on each connection
    AcceptAny,
}

impl HostKeyPolicy {
    fn name(&self) -> &'static str {
        match self {
            HostKeyPolicy::KnownHosts(_) => "known_hosts",
            HostKeyPolicy::Fingerprint(_) => "fingerprint",
            HostKeyPolicy::AcceptAny => "accept_any",
        }
    }

    /// Decide whether `key` presented by `host:port` is acceptable.
    pub(crate) async fn verify(
        &self,
        host: &str,
        port: u16,
        key: &PublicKey,
    ) -> Result<(), ConnectError> {
        let fingerprint = known_hosts::fingerprint(key);

        let rejection = match self {
            HostKeyPolicy::AcceptAny => {
                security_log::log_host_key_unverified(host, port, &fingerprint);
                return Ok(());
            }
            HostKeyPolicy::Fingerprint(pinned) => {
                if strip_prefix(pinned) == strip_prefix(&fingerprint) {
                    None
                } else {
                    Some(format!("fingerprint does not match pinned {}", pinned))
                }
            }
            HostKeyPolicy::KnownHosts(path) => {
                let status = tokio::task::spawn_blocking({
                    let path = path.clone();
                    let host = host.to_string();
                    let key = key.clone();
                    move || known_hosts::lookup(&path, &host, port, &key)
                })
                .await
                .map_err(|e| ConnectError::HostKey(format!("Host key check failed: {}", e)))??;

                match status {
                    HostKeyStatus::Known => None,
                    HostKeyStatus::Unknown => Some(format!(
                        "{} is not listed in {}",
                        host,
                        path.display()
                    )),
                    HostKeyStatus::Changed { expected } => Some(format!(
                        "HOST KEY CHANGED, expected {}",
                        expected
                    )),
                    HostKeyStatus::Revoked => Some("host key has been revoked".to_string()),
                }
            }
        };

        match rejection {
            None => {
                security_log::log_host_key_verified(host, port, &fingerprint, self.name());
                Ok(())
            }
            Some(reason) => {
                security_log::log_host_key_rejected(host, port, &fingerprint, &reason);
                Err(ConnectError::HostKey(format!(
                    "{}:{} presented {}: {}",
                    host, port, fingerprint, reason
                )))
            }
        }
    }
}

fn strip_prefix(fingerprint: &str) -> &str {
    let fingerprint = fingerprint.trim();
    fingerprint.strip_prefix("SHA256:").unwrap_or(fingerprint)
}

/// russh client handler; only host key verification is customised
pub struct ClientHandler {
    host: String,
    port: u16,
    policy: HostKeyPolicy,
}

impl ClientHandler {
    pub fn new(host: String, port: u16, policy: HostKeyPolicy) -> Self {
        Self { host, port, policy }
    }
}

impl Handler for ClientHandler {
    type Error = ConnectError;

    fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> impl Future<Output = Result<bool, Self::Error>> + Send {
        let host = self.host.clone();
        let port = self.port;
        let policy = self.policy.clone();
        let key = server_public_key.clone();

        async move {
            policy.verify(&host, port, &key).await?;
            tracing::debug!("Host key accepted for {}:{}", host, port);
            Ok(true)
        }
    }
}
