use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::checksum::DigestAlgorithm;
use crate::error::ConfigError;
use crate::ssh::HostKeyPolicy;

/// Default remote directory receiving uploaded artifacts
pub const DEFAULT_UPLOAD_DIR: &str = "/tmp/upload";

/// Tool-wide settings stored in settings.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_run_timeout")]
    pub run_timeout_secs: u64,
    #[serde(default = "default_keepalive")]
    pub keepalive_interval_secs: u64,
    #[serde(default = "default_upload_dir")]
    pub upload_dir: String,
    #[serde(default)]
    pub checksum: DigestAlgorithm,
    #[serde(default)]
    pub host_key: HostKeySettings,
}

fn default_connect_timeout() -> u64 {
    15
}

fn default_run_timeout() -> u64 {
    300
}

fn default_keepalive() -> u64 {
    60
}

fn default_upload_dir() -> String {
    DEFAULT_UPLOAD_DIR.to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            run_timeout_secs: default_run_timeout(),
            keepalive_interval_secs: default_keepalive(),
            upload_dir: default_upload_dir(),
            checksum: DigestAlgorithm::default(),
            host_key: HostKeySettings::default(),
        }
    }
}

impl Settings {
    /// Load from the default settings file; a missing file yields defaults.
    pub fn load() -> Result<Self, ConfigError> {
        match super::paths::settings_file() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load from an explicit path; a missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        tracing::debug!("Loading settings from: {:?}", path);

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;

        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let settings: Settings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.connect_timeout_secs == 0 {
            return Err(ConfigError::InvalidSetting(
                "connect_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.run_timeout_secs == 0 {
            return Err(ConfigError::InvalidSetting(
                "run_timeout_secs must be greater than zero".to_string(),
            ));
        }
        self.host_key.policy()?;
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }

    /// Keepalive interval, `None` when disabled with 0
    pub fn keepalive_interval(&self) -> Option<Duration> {
        if self.keepalive_interval_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.keepalive_interval_secs))
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum HostKeyMode {
    #[default]
    KnownHosts,
    Fingerprint,
    AcceptAny,
}

/// Host key verification settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HostKeySettings {
    #[serde(default)]
    pub policy: HostKeyMode,
    /// known_hosts file to check against (defaults to ~/.ssh/known_hosts)
    #[serde(default)]
    pub known_hosts_path: Option<String>,
    /// Pinned `SHA256:...` fingerprint for the fingerprint policy
    #[serde(default)]
    pub fingerprint: Option<String>,
}

impl HostKeySettings {
    /// Resolve into a concrete verification policy.
    pub fn policy(&self) -> Result<HostKeyPolicy, ConfigError> {
        match self.policy {
            HostKeyMode::KnownHosts => {
                let path = match &self.known_hosts_path {
                    Some(p) => super::paths::expand_tilde(p),
                    None => super::paths::ssh_known_hosts_file().ok_or_else(|| {
                        ConfigError::InvalidSetting(
                            "Could not determine known_hosts path".to_string(),
                        )
                    })?,
                };
                Ok(HostKeyPolicy::KnownHosts(path))
            }
            HostKeyMode::Fingerprint => self
                .fingerprint
                .clone()
                .map(HostKeyPolicy::Fingerprint)
                .ok_or_else(|| {
                    ConfigError::InvalidSetting(
                        "host_key.fingerprint is required for the fingerprint policy".to_string(),
                    )
                }),
            HostKeyMode::AcceptAny => Ok(HostKeyPolicy::AcceptAny),
        }
    }

    /// Explicit known_hosts file, overriding the configured one
    pub fn with_known_hosts(path: PathBuf) -> Self {
        Self {
            policy: HostKeyMode::KnownHosts,
            known_hosts_path: Some(path.to_string_lossy().into_owned()),
            fingerprint: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let settings = Settings::parse("").unwrap();
        assert_eq!(settings.connect_timeout(), Duration::from_secs(15));
        assert_eq!(settings.run_timeout(), Duration::from_secs(300));
        assert_eq!(settings.upload_dir, "/tmp/upload");
        assert_eq!(settings.checksum, DigestAlgorithm::Md5);
        assert_eq!(settings.host_key.policy, HostKeyMode::KnownHosts);
    }

    #[test]
    fn parses_all_fields() {
        let settings = Settings::parse(
            r#"
            connect_timeout_secs = 5
            run_timeout_secs = 60
            keepalive_interval_secs = 0
            upload_dir = "/opt/stage"
            checksum = "sha256"

            [host_key]
            policy = "fingerprint"
            fingerprint = "SHA256:abc"
            "#,
        )
        .unwrap();

        assert_eq!(settings.connect_timeout(), Duration::from_secs(5));
        assert_eq!(settings.keepalive_interval(), None);
        assert_eq!(settings.upload_dir, "/opt/stage");
        assert_eq!(settings.checksum, DigestAlgorithm::Sha256);
        assert!(matches!(
            settings.host_key.policy().unwrap(),
            HostKeyPolicy::Fingerprint(ref f) if f == "SHA256:abc"
        ));
    }

    #[test]
    fn fingerprint_policy_requires_fingerprint() {
        let result = Settings::parse("[host_key]\npolicy = \"fingerprint\"\n");
        assert!(matches!(result, Err(ConfigError::InvalidSetting(_))));
    }

    #[test]
    fn zero_connect_timeout_is_rejected() {
        let result = Settings::parse("connect_timeout_secs = 0\n");
        assert!(matches!(result, Err(ConfigError::InvalidSetting(_))));
    }

    #[test]
    fn accept_any_must_be_explicit() {
        let settings = Settings::parse("[host_key]\npolicy = \"accept_any\"\n").unwrap();
        assert!(matches!(
            settings.host_key.policy().unwrap(),
            HostKeyPolicy::AcceptAny
        ));
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load_from(&dir.path().join("settings.toml")).unwrap();
        assert_eq!(settings.upload_dir, DEFAULT_UPLOAD_DIR);
    }

    #[test]
    fn known_hosts_override_path() {
        let settings = HostKeySettings::with_known_hosts(PathBuf::from("/etc/ssh/known"));
        assert!(matches!(
            settings.policy().unwrap(),
            HostKeyPolicy::KnownHosts(ref p) if p == Path::new("/etc/ssh/known")
        ));
    }
}
