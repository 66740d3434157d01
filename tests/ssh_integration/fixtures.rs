//! SSH server fixtures configured from the environment

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use tempfile::TempDir;
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};

use sshdeploy::config::{Credential, RemoteTarget};
use sshdeploy::ssh::{HostKeyPolicy, SshClient};

/// Configuration for the test SSH server
#[derive(Debug, Clone)]
pub struct TestSshServer {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub private_key_path: Option<PathBuf>,
    pub key_passphrase: Option<String>,
}

impl TestSshServer {
    /// `None` unless `SSHDEPLOY_TEST_HOST` is set.
    pub fn from_env() -> Option<Self> {
        let host = std::env::var("SSHDEPLOY_TEST_HOST").ok()?;
        let var = |name: &str, default: &str| {
            std::env::var(name).unwrap_or_else(|_| default.to_string())
        };

        Some(Self {
            host,
            port: var("SSHDEPLOY_TEST_PORT", "2222").parse().unwrap_or(2222),
            username: var("SSHDEPLOY_TEST_USER", "testuser"),
            password: var("SSHDEPLOY_TEST_PASSWORD", "testpass123"),
            private_key_path: std::env::var("SSHDEPLOY_TEST_KEY").ok().map(PathBuf::from),
            key_passphrase: std::env::var("SSHDEPLOY_TEST_KEY_PASSPHRASE").ok(),
        })
    }
}

/// Check if a test server is configured
pub fn is_server_configured() -> bool {
    std::env::var_os("SSHDEPLOY_TEST_HOST").is_some()
}

/// Wait for SSH server to be ready
pub async fn wait_for_ssh_ready(host: &str, port: u16) -> Result<(), String> {
    let addr = format!("{}:{}", host, port);
    let max_attempts = 30;

    for attempt in 1..=max_attempts {
        match timeout(Duration::from_secs(2), TcpStream::connect(&addr)).await {
            Ok(Ok(_)) => return Ok(()),
            _ => {
                if attempt == max_attempts {
                    return Err(format!(
                        "SSH server not ready after {} attempts",
                        max_attempts
                    ));
                }
                sleep(Duration::from_millis(200)).await;
            }
        }
    }

    Err("SSH server not ready".to_string())
}

/// Test environment with an isolated known_hosts file and local workspace
pub struct SshTestEnvironment {
    pub server: TestSshServer,
    pub workspace: TempDir,
    pub known_hosts_path: PathBuf,
}

impl SshTestEnvironment {
    pub async fn new() -> Result<Self, String> {
        let server = TestSshServer::from_env().ok_or("SSHDEPLOY_TEST_HOST not set")?;
        wait_for_ssh_ready(&server.host, server.port).await?;

        let workspace = TempDir::new().map_err(|e| format!("Failed to create temp dir: {}", e))?;
        let known_hosts_path = workspace.path().join("known_hosts");

        Ok(Self {
            server,
            workspace,
            known_hosts_path,
        })
    }

    pub fn password_target(&self) -> RemoteTarget {
        RemoteTarget::with_password(
            &self.server.host,
            self.server.port,
            &self.server.username,
            &self.server.password,
        )
    }

    pub fn key_target(&self) -> Option<RemoteTarget> {
        let path = self.server.private_key_path.clone()?;
        Some(RemoteTarget {
            host: self.server.host.clone(),
            port: self.server.port,
            user: self.server.username.clone(),
            credential: Credential::KeyFile {
                path,
                passphrase: self.server.key_passphrase.clone().map(SecretString::from),
            },
        })
    }

    /// Client that does not verify host keys
    pub fn trusting_client(&self) -> SshClient {
        SshClient::new(Duration::from_secs(10), None, HostKeyPolicy::AcceptAny)
    }

    /// Client that only trusts the isolated known_hosts file
    pub fn strict_client(&self) -> SshClient {
        SshClient::new(
            Duration::from_secs(10),
            None,
            HostKeyPolicy::KnownHosts(self.known_hosts_path.clone()),
        )
    }

    /// Unique remote directory for one test
    pub fn remote_dir(&self, name: &str) -> String {
        format!("/tmp/sshdeploy-test-{}-{}", name, std::process::id())
    }
}

/// Macro to skip tests when no SSH server is configured
#[macro_export]
macro_rules! skip_if_no_server {
    () => {
        if !super::fixtures::is_server_configured() {
            eprintln!("Skipping test: SSHDEPLOY_TEST_HOST not set");
            return;
        }
    };
}
