//! Input validation for targets and remote paths.
//!
//! Hostnames and usernames are checked before dialing. The upload directory
//! and artifact names are interpolated into the remote `bash` command line,
//! so they are restricted to characters that need no shell quoting.

use std::net::IpAddr;

use regex::Regex;
use std::sync::LazyLock;

/// Validation error with field context.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

static DNS_LABEL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?$").unwrap());

static USERNAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_.-]{0,31}$").unwrap());

static SHELL_SAFE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._+@%=:,-]+$").unwrap());

/// Validate a hostname (IPv4, IPv6 or RFC 1123 DNS name).
pub fn validate_hostname(hostname: &str) -> Result<(), ValidationError> {
    let hostname = hostname.trim();

    if hostname.is_empty() {
        return Err(ValidationError::new("host", "Host is required"));
    }
    if hostname.len() > 253 {
        return Err(ValidationError::new(
            "host",
            "Host exceeds maximum length of 253 characters",
        ));
    }
    if hostname.parse::<IpAddr>().is_ok() {
        return Ok(());
    }

    match hostname
        .split('.')
        .find(|label| !DNS_LABEL_REGEX.is_match(label))
    {
        Some(label) => Err(ValidationError::new(
            "host",
            format!(
                "Invalid hostname label '{}': must be 1-63 alphanumeric characters or inner hyphens",
                label
            ),
        )),
        None => Ok(()),
    }
}

/// Validate the login name. Unlike interactive clients there is no local
/// user to fall back on, so it is required.
pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    let username = username.trim();

    if username.is_empty() {
        return Err(ValidationError::new("user", "User is required"));
    }
    if !USERNAME_REGEX.is_match(username) {
        return Err(ValidationError::new(
            "user",
            "User must start with a letter or underscore and contain at most 32 of [A-Za-z0-9_.-]",
        ));
    }
    Ok(())
}

/// Validate the remote upload directory: absolute, shell-safe components.
pub fn validate_remote_dir(dir: &str) -> Result<(), ValidationError> {
    if !dir.starts_with('/') {
        return Err(ValidationError::new(
            "upload_dir",
            format!("'{}' must be an absolute path", dir),
        ));
    }

    for component in dir.split('/').filter(|c| !c.is_empty()) {
        if component == ".." {
            return Err(ValidationError::new(
                "upload_dir",
                "Parent directory references are not allowed",
            ));
        }
        if !SHELL_SAFE_REGEX.is_match(component) {
            return Err(ValidationError::new(
                "upload_dir",
                format!("'{}' contains characters that need shell quoting", component),
            ));
        }
    }
    Ok(())
}

/// Validate an artifact base name that will appear on the remote command line.
pub fn validate_artifact_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() || name == "." || name == ".." {
        return Err(ValidationError::new("file", "File name is required"));
    }
    if !SHELL_SAFE_REGEX.is_match(name) {
        return Err(ValidationError::new(
            "file",
            format!("'{}' contains characters that need shell quoting", name),
        ));
    }
    Ok(())
}
