//! Remote targets and the JSON servers list they are loaded from
//!
//! ```json
//! [
//!   { "host": "192.168.1.11", "port": 22, "user": "root", "password": "1234" },
//!   { "host": "db-2", "user": "deploy", "key_path": "~/.ssh/id_ed25519" }
//! ]
//! ```

use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::Deserialize;

use crate::error::ConfigError;
use crate::validation;

/// Credential used to authenticate against one target
#[derive(Clone)]
pub enum Credential {
    Password(SecretString),
    /// In-memory private key (PEM / OpenSSH format)
    Key {
        pem: SecretString,
        passphrase: Option<SecretString>,
    },
    /// Private key read from disk at connect time
    KeyFile {
        path: PathBuf,
        passphrase: Option<SecretString>,
    },
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::Password(_) => f.debug_tuple("Password").field(&"[REDACTED]").finish(),
            Credential::Key { .. } => f.debug_tuple("Key").field(&"[KEY]").finish(),
            Credential::KeyFile { path, .. } => f.debug_tuple("KeyFile").field(path).finish(),
        }
    }
}

impl Credential {
    /// Method name as reported in security logs
    pub fn method_name(&self) -> &'static str {
        match self {
            Credential::Password(_) => "password",
            Credential::Key { .. } | Credential::KeyFile { .. } => "publickey",
        }
    }
}

/// One destination host
#[derive(Debug, Clone)]
pub struct RemoteTarget {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub credential: Credential,
}

impl std::fmt::Display for RemoteTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "host={}, port={}, user={}", self.host, self.port, self.user)
    }
}

impl RemoteTarget {
    pub fn with_password(host: &str, port: u16, user: &str, password: &str) -> Self {
        Self {
            host: host.to_string(),
            port,
            user: user.to_string(),
            credential: Credential::Password(SecretString::from(password.to_string())),
        }
    }

    /// Check host, port and user syntax.
    pub fn validate(&self) -> Result<(), validation::ValidationError> {
        validation::validate_hostname(&self.host)?;
        if self.port == 0 {
            return Err(validation::ValidationError {
                field: "port".to_string(),
                message: "Port must be between 1 and 65535".to_string(),
            });
        }
        validation::validate_username(&self.user)?;
        Ok(())
    }

    /// `host:port` address used for dialing
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn default_port() -> u16 {
    22
}

/// Raw servers-list entry; secrets are moved into `SecretString` right away
#[derive(Deserialize)]
struct TargetEntry {
    host: String,
    #[serde(default = "default_port")]
    port: u16,
    user: String,
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    key_path: Option<String>,
    #[serde(default)]
    passphrase: Option<String>,
}

impl TargetEntry {
    fn into_target(self, index: usize) -> Result<RemoteTarget, ConfigError> {
        let passphrase = self.passphrase.map(SecretString::from);
        let credential = match (self.password, self.key_path) {
            (_, Some(key_path)) => Credential::KeyFile {
                path: super::paths::expand_tilde(&key_path),
                passphrase,
            },
            (Some(password), None) => Credential::Password(SecretString::from(password)),
            (None, None) => {
                return Err(ConfigError::InvalidTarget {
                    index,
                    reason: format!("{} has neither password nor key_path", self.host),
                });
            }
        };

        let target = RemoteTarget {
            host: self.host.trim().to_string(),
            port: self.port,
            user: self.user.trim().to_string(),
            credential,
        };
        target
            .validate()
            .map_err(|e| ConfigError::InvalidTarget {
                index,
                reason: e.to_string(),
            })?;
        Ok(target)
    }
}

/// Parse a JSON servers list.
pub fn parse_targets(content: &str, origin: &Path) -> Result<Vec<RemoteTarget>, ConfigError> {
    let entries: Vec<TargetEntry> =
        serde_json::from_str(content).map_err(|e| ConfigError::ParseTargets {
            path: origin.to_path_buf(),
            source: e,
        })?;

    if entries.is_empty() {
        return Err(ConfigError::NoTargets(origin.to_path_buf()));
    }

    entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| entry.into_target(index))
        .collect()
}

/// Load a JSON servers list from disk.
pub fn load_targets(path: &Path) -> Result<Vec<RemoteTarget>, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;
    let targets = parse_targets(&content, path)?;
    tracing::debug!("Loaded {} targets from {}", targets.len(), path.display());
    Ok(targets)
}
