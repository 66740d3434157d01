//! Content digests and sidecar digest files
//!
//! A sidecar sits next to the file it describes, is named
//! `<file>.<ext>` and holds `"<hex-digest> <basename>"`.

use std::ffi::OsString;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use md5::Md5;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::ChecksumError;

const CHUNK_SIZE: usize = 1 << 20;

/// Digest algorithm used for sidecar files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    #[default]
    Md5,
    Sha256,
}

impl DigestAlgorithm {
    /// File extension of sidecars produced with this algorithm
    pub fn extension(self) -> &'static str {
        match self {
            DigestAlgorithm::Md5 => "md5",
            DigestAlgorithm::Sha256 => "sha256",
        }
    }
}

/// Hex digest of a file, read in fixed-size chunks.
pub fn digest(path: &Path, algorithm: DigestAlgorithm) -> Result<String, ChecksumError> {
    let file = File::open(path).map_err(|e| ChecksumError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;

    let bytes = match algorithm {
        DigestAlgorithm::Md5 => hash_reader::<Md5>(file),
        DigestAlgorithm::Sha256 => hash_reader::<Sha256>(file),
    }
    .map_err(|e| ChecksumError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;

    Ok(data_encoding::HEXLOWER.encode(&bytes))
}

fn hash_reader<D: Digest>(mut reader: impl Read) -> std::io::Result<Vec<u8>> {
    let mut hasher = D::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_vec())
}

/// Path of the sidecar for `path`: the full file name with `.<ext>` appended.
pub fn sidecar_path(path: &Path, algorithm: DigestAlgorithm) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".");
    name.push(algorithm.extension());
    PathBuf::from(name)
}

/// Compute the digest of `path` and write its sidecar file.
///
/// The caller owns the returned file and is responsible for removing it.
pub fn write_sidecar(path: &Path, algorithm: DigestAlgorithm) -> Result<PathBuf, ChecksumError> {
    let hex = digest(path, algorithm)?;
    let base = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let sidecar = sidecar_path(path, algorithm);
    std::fs::write(&sidecar, format!("{} {}", hex, base)).map_err(|e| ChecksumError::Write {
        path: sidecar.clone(),
        source: e,
    })?;

    tracing::debug!("Wrote {} sidecar {}", algorithm.extension(), sidecar.display());
    Ok(sidecar)
}

/// Rewrite `path` in place, replacing every CRLF with LF.
///
/// The file is left untouched when it contains no CRLF. Returns whether it
/// was rewritten.
pub fn normalize_line_endings(path: &Path) -> Result<bool, ChecksumError> {
    let data = std::fs::read(path).map_err(|e| ChecksumError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;

    if !data.windows(2).any(|w| w == b"\r\n") {
        return Ok(false);
    }

    std::fs::write(path, crlf_to_lf(&data)).map_err(|e| ChecksumError::Write {
        path: path.to_path_buf(),
        source: e,
    })?;

    tracing::info!("Converted CRLF line endings in {}", path.display());
    Ok(true)
}

fn crlf_to_lf(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut i = 0;
    while i < data.len() {
        if data[i] == b'\r' && data.get(i + 1) == Some(&b'\n') {
            out.push(b'\n');
            i += 2;
        } else {
            out.push(data[i]);
            i += 1;
        }
    }
    out
}
