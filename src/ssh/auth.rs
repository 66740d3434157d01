use std::path::Path;
use std::sync::Arc;

use russh::keys::{HashAlg, PrivateKey, PrivateKeyWithHashAlg};
use secrecy::{ExposeSecret, SecretString};

use crate::config::Credential;
use crate::error::ConnectError;

/// Credential turned into something russh can authenticate with
pub enum ResolvedAuth {
    Password(SecretString),
    PublicKey(PrivateKeyWithHashAlg),
}

impl std::fmt::Debug for ResolvedAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolvedAuth::Password(_) => f.debug_tuple("Password").field(&"[REDACTED]").finish(),
            ResolvedAuth::PublicKey(_) => f.debug_tuple("PublicKey").field(&"[KEY]").finish(),
        }
    }
}

impl ResolvedAuth {
    /// Parse key material. Key files are read on a blocking thread.
    pub async fn resolve(credential: &Credential) -> Result<Self, ConnectError> {
        match credential {
            Credential::Password(password) => Ok(ResolvedAuth::Password(password.clone())),
            Credential::Key { pem, passphrase } => {
                check_private_key_text(pem.expose_secret(), "in-memory key")?;
                let key = russh::keys::decode_secret_key(
                    pem.expose_secret(),
                    passphrase.as_ref().map(|p| p.expose_secret()),
                )
                .map_err(|e| key_error(e, "in-memory key", passphrase.is_some()))?;
                Ok(ResolvedAuth::PublicKey(with_hash_alg(key)))
            }
            Credential::KeyFile { path, passphrase } => {
                let path = path.clone();
                let passphrase = passphrase.clone();
                tokio::task::spawn_blocking(move || load_key_file(&path, passphrase.as_ref()))
                    .await
                    .map_err(|e| ConnectError::Key(format!("Key loading task failed: {}", e)))?
            }
        }
    }
}

fn load_key_file(
    path: &Path,
    passphrase: Option<&SecretString>,
) -> Result<ResolvedAuth, ConnectError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        ConnectError::Key(format!("Cannot read key file {}: {}", path.display(), e))
    })?;
    let origin = path.display().to_string();
    check_private_key_text(&content, &origin)?;

    let key = russh::keys::decode_secret_key(&content, passphrase.map(|p| p.expose_secret()))
        .map_err(|e| key_error(e, &origin, passphrase.is_some()))?;
    Ok(ResolvedAuth::PublicKey(with_hash_alg(key)))
}

/// Catch the common mistake of pointing at a `.pub` file.
fn check_private_key_text(content: &str, origin: &str) -> Result<(), ConnectError> {
    let first_line = content.lines().next().unwrap_or("").trim();
    if first_line.starts_with("ssh-") || first_line.starts_with("ecdsa-") {
        return Err(ConnectError::Key(format!(
            "{} contains a PUBLIC key, not a private key",
            origin
        )));
    }
    if !first_line.starts_with("-----BEGIN") {
        return Err(ConnectError::Key(format!(
            "{} does not appear to be a valid SSH private key",
            origin
        )));
    }
    Ok(())
}

fn key_error(err: russh::keys::Error, origin: &str, had_passphrase: bool) -> ConnectError {
    let normalized = err.to_string().to_lowercase();
    let passphrase_problem = normalized.contains("encrypted")
        || normalized.contains("passphrase")
        || normalized.contains("cryptographic");

    if passphrase_problem && had_passphrase {
        ConnectError::Key(format!("Wrong passphrase for {}", origin))
    } else if passphrase_problem {
        ConnectError::Key(format!("{} is encrypted; a passphrase is required", origin))
    } else {
        ConnectError::Key(format!("Failed to load key {}: {}", origin, err))
    }
}

/// RSA keys sign with SHA-512; other algorithms use their native scheme.
fn with_hash_alg(key: PrivateKey) -> PrivateKeyWithHashAlg {
    let hash_alg = if key.algorithm().is_rsa() {
        Some(HashAlg::Sha512)
    } else {
        None
    };
    PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg)
}
