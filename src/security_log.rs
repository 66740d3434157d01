//! Security event logging for audit trails.
//!
//! All security events are logged with `target: "security"` so they can be
//! filtered separately, e.g. `RUST_LOG=security=info`.

use tracing::{info, warn};

use crate::config::RemoteTarget;

/// Log an SSH authentication attempt.
pub fn log_auth_attempt(target: &RemoteTarget) {
    info!(
        target: "security",
        event = "auth_attempt",
        host = %target.host,
        port = target.port,
        username = %target.user,
        method = %target.credential.method_name(),
        "SSH authentication attempt"
    );
}

/// Log a successful SSH authentication.
pub fn log_auth_success(target: &RemoteTarget) {
    info!(
        target: "security",
        event = "auth_success",
        host = %target.host,
        port = target.port,
        username = %target.user,
        method = %target.credential.method_name(),
        "SSH authentication succeeded"
    );
}

/// Log a failed SSH authentication attempt.
pub fn log_auth_failure(target: &RemoteTarget, reason: &str) {
    warn!(
        target: "security",
        event = "auth_failure",
        host = %target.host,
        port = target.port,
        username = %target.user,
        method = %target.credential.method_name(),
        reason = %reason,
        "SSH authentication failed"
    );
}

/// Log the opening of an SFTP sub-channel on an existing connection.
pub fn log_sftp_open(host: &str, port: u16) {
    info!(
        target: "security",
        event = "sftp_open",
        host = %host,
        port = port,
        "SFTP subsystem opened"
    );
}

/// Log a host key that passed verification.
pub fn log_host_key_verified(host: &str, port: u16, fingerprint: &str, policy: &str) {
    info!(
        target: "security",
        event = "host_key_verified",
        host = %host,
        port = port,
        fingerprint = %fingerprint,
        policy = %policy,
        "Host key verified"
    );
}

/// Log a host key accepted without verification.
pub fn log_host_key_unverified(host: &str, port: u16, fingerprint: &str) {
    warn!(
        target: "security",
        event = "host_key_unverified",
        host = %host,
        port = port,
        fingerprint = %fingerprint,
        "Host key accepted WITHOUT verification (accept-any policy)"
    );
}

/// Log a rejected host key.
pub fn log_host_key_rejected(host: &str, port: u16, fingerprint: &str, reason: &str) {
    warn!(
        target: "security",
        event = "host_key_rejected",
        host = %host,
        port = port,
        fingerprint = %fingerprint,
        reason = %reason,
        "Host key rejected"
    );
}
