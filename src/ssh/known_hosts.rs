//! Read-only OpenSSH `known_hosts` lookup
//!
//! Deployment runs are unattended, so keys are never learned here: a host
//! must already be present in the file to pass verification.

use std::borrow::Cow;
use std::path::Path;

use russh::keys::{self, HashAlg, PublicKey};

use crate::error::ConnectError;

mod matchers;

/// Outcome of looking a server key up in `known_hosts`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostKeyStatus {
    /// A plain entry for this host carries exactly this key
    Known,
    /// No usable entry for this host
    Unknown,
    /// The host is listed with a different key of the same algorithm
    Changed { expected: String },
    /// The key is listed under `@revoked`
    Revoked,
}

/// SHA-256 fingerprint in OpenSSH notation (`SHA256:...`)
pub fn fingerprint(key: &PublicKey) -> String {
    key.fingerprint(HashAlg::Sha256).to_string()
}

enum Marker {
    None,
    Revoked,
    Other,
}

struct Entry<'a> {
    marker: Marker,
    hosts: &'a str,
    key_data: &'a str,
}

fn parse_line(line: &str) -> Option<Entry<'_>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let (marker, rest) = match line.strip_prefix('@') {
        Some(marked) => {
            let (name, rest) = marked.split_once(char::is_whitespace)?;
            let marker = if name == "revoked" {
                Marker::Revoked
            } else {
                Marker::Other
            };
            (marker, rest.trim_start())
        }
        None => (Marker::None, line),
    };

    let mut fields = rest.split_whitespace();
    let hosts = fields.next()?;
    let _key_type = fields.next()?;
    let key_data = fields.next()?;
    Some(Entry {
        marker,
        hosts,
        key_data,
    })
}

/// Look `key` up for `host:port` in the file at `path`.
///
/// A missing file is treated as empty.
pub fn lookup(
    path: &Path,
    host: &str,
    port: u16,
    key: &PublicKey,
) -> Result<HostKeyStatus, ConnectError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HostKeyStatus::Unknown),
        Err(e) => {
            return Err(ConnectError::HostKey(format!(
                "Failed to read known_hosts {}: {}",
                path.display(),
                e
            )));
        }
    };
    Ok(lookup_in(&content, host, port, key))
}

fn lookup_in(content: &str, host: &str, port: u16, key: &PublicKey) -> HostKeyStatus {
    let host_port = if port == 22 {
        Cow::Borrowed(host)
    } else {
        Cow::Owned(format!("[{}]:{}", host, port))
    };

    let mut listed = Vec::new();
    for (number, entry) in content
        .lines()
        .enumerate()
        .filter_map(|(i, line)| parse_line(line).map(|e| (i + 1, e)))
    {
        if !matchers::host_field_matches(entry.hosts, host, &host_port) {
            continue;
        }
        let stored = match keys::parse_public_key_base64(entry.key_data) {
            Ok(stored) => stored,
            Err(e) => {
                tracing::debug!("Skipping unparsable known_hosts key on line {}: {}", number, e);
                continue;
            }
        };
        match entry.marker {
            Marker::Revoked if &stored == key => return HostKeyStatus::Revoked,
            Marker::None => listed.push(stored),
            _ => {}
        }
    }

    if listed.iter().any(|stored| stored == key) {
        return HostKeyStatus::Known;
    }
    match listed
        .iter()
        .find(|stored| stored.algorithm() == key.algorithm())
    {
        Some(stored) => HostKeyStatus::Changed {
            expected: fingerprint(stored),
        },
        None => HostKeyStatus::Unknown,
    }
}
