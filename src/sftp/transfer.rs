//! Chunked SFTP uploads into a remote directory

use std::path::Path;

use russh_sftp::client::SftpSession;
use russh_sftp::protocol::OpenFlags;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio_util::sync::CancellationToken;

use crate::error::UploadError;

/// Read chunk and write buffer size
pub const CHUNK_SIZE: usize = 40 * 1024;

/// `<dir>/<name>`, tolerating a trailing slash on `dir`
pub fn remote_file_path(remote_dir: &str, name: &str) -> String {
    format!("{}/{}", remote_dir.trim_end_matches('/'), name)
}

/// Every ancestor of an absolute remote directory, outermost first.
fn remote_dir_prefixes(remote_dir: &str) -> Vec<String> {
    let mut prefixes = Vec::new();
    let mut current = String::new();
    for component in remote_dir.split('/').filter(|c| !c.is_empty()) {
        current.push('/');
        current.push_str(component);
        prefixes.push(current.clone());
    }
    prefixes
}

/// `mkdir -p` over SFTP.
pub async fn create_dir_all(sftp: &SftpSession, remote_dir: &str) -> Result<(), UploadError> {
    for dir in remote_dir_prefixes(remote_dir) {
        let exists = sftp
            .try_exists(dir.clone())
            .await
            .map_err(|e| UploadError::CreateDir {
                path: dir.clone(),
                reason: e.to_string(),
            })?;
        if exists {
            continue;
        }

        if let Err(e) = sftp.create_dir(dir.clone()).await {
            // Another client may have created it in the meantime
            if !sftp.try_exists(dir.clone()).await.unwrap_or(false) {
                return Err(UploadError::CreateDir {
                    path: dir,
                    reason: e.to_string(),
                });
            }
        }
    }
    Ok(())
}

/// Upload a local file into `remote_dir`, keeping its base name.
pub async fn upload_file(
    sftp: &SftpSession,
    local_path: &Path,
    remote_dir: &str,
    cancel: &CancellationToken,
) -> Result<u64, UploadError> {
    let name = local_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| {
            UploadError::Transfer(format!("{} has no file name", local_path.display()))
        })?;

    let mut local = tokio::fs::File::open(local_path)
        .await
        .map_err(|e| UploadError::OpenLocal {
            path: local_path.to_path_buf(),
            source: e,
        })?;

    upload_reader(sftp, &mut local, &name, remote_dir, cancel).await
}

/// Upload in-memory content as `remote_dir/name`.
pub async fn upload_buffer(
    sftp: &SftpSession,
    name: &str,
    content: &[u8],
    remote_dir: &str,
    cancel: &CancellationToken,
) -> Result<u64, UploadError> {
    let mut reader = content;
    upload_reader(sftp, &mut reader, name, remote_dir, cancel).await
}

async fn upload_reader<R: AsyncRead + Unpin>(
    sftp: &SftpSession,
    reader: &mut R,
    name: &str,
    remote_dir: &str,
    cancel: &CancellationToken,
) -> Result<u64, UploadError> {
    create_dir_all(sftp, remote_dir).await?;

    let remote_path = remote_file_path(remote_dir, name);
    let mut remote = sftp
        .open_with_flags(
            remote_path.clone(),
            OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::TRUNCATE,
        )
        .await
        .map_err(|e| UploadError::OpenRemote {
            path: remote_path.clone(),
            reason: e.to_string(),
        })?;

    let written = copy_chunked(reader, &mut remote, cancel).await?;

    remote
        .shutdown()
        .await
        .map_err(|e| UploadError::Transfer(format!("Failed to close {}: {}", remote_path, e)))?;

    tracing::debug!("Uploaded {} bytes to {}", written, remote_path);
    Ok(written)
}

/// Copy until EOF through a write buffer, flushing once at the end.
///
/// `cancel` is checked before every chunk. A cancelled copy leaves whatever
/// was already written on the remote side.
pub(crate) async fn copy_chunked<R, W>(
    reader: &mut R,
    writer: &mut W,
    cancel: &CancellationToken,
) -> Result<u64, UploadError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut out = BufWriter::with_capacity(CHUNK_SIZE, writer);
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut total = 0u64;

    loop {
        if cancel.is_cancelled() {
            return Err(UploadError::Cancelled);
        }
        let n = reader
            .read(&mut buf)
            .await
            .map_err(|e| UploadError::Transfer(format!("read failed: {}", e)))?;
        if n == 0 {
            break;
        }
        out.write_all(&buf[..n])
            .await
            .map_err(|e| UploadError::Transfer(format!("write failed: {}", e)))?;
        total += n as u64;
    }

    out.flush()
        .await
        .map_err(|e| UploadError::Transfer(format!("flush failed: {}", e)))?;
    Ok(total)
}
