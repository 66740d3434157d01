//! Local artifacts of a deployment and their digest sidecars

use std::path::{Path, PathBuf};

use crate::checksum::{self, DigestAlgorithm};
use crate::config::DEFAULT_UPLOAD_DIR;
use crate::error::ChecksumError;
use crate::validation::{self, ValidationError};

/// What to upload and where
#[derive(Debug, Clone)]
pub struct TransferSpec {
    /// Installer script, executed with `bash`
    pub script: PathBuf,
    /// Optional payload handed to the script as its second argument
    pub archive: Option<PathBuf>,
    /// Remote directory receiving every artifact
    pub upload_dir: String,
}

impl TransferSpec {
    /// An empty `upload_dir` falls back to [`DEFAULT_UPLOAD_DIR`].
    pub fn new(script: PathBuf, archive: Option<PathBuf>, upload_dir: impl Into<String>) -> Self {
        let upload_dir = upload_dir.into();
        let upload_dir = if upload_dir.trim().is_empty() {
            DEFAULT_UPLOAD_DIR.to_string()
        } else {
            upload_dir.trim().to_string()
        };
        Self {
            script,
            archive,
            upload_dir,
        }
    }

    /// Remote directory without a trailing slash
    pub fn remote_dir(&self) -> &str {
        match self.upload_dir.trim_end_matches('/') {
            "" => "/",
            dir => dir,
        }
    }

    /// `bash <dir>/<script> <dir> <archive>`; the archive argument is empty
    /// when there is no archive.
    pub fn install_command(&self) -> String {
        let dir = self.remote_dir().trim_end_matches('/');
        let archive = self.archive.as_deref().map(base_name).unwrap_or_default();
        format!(
            "bash {}/{} {} {}",
            dir,
            base_name(&self.script),
            self.remote_dir(),
            archive
        )
        .trim_end()
        .to_string()
    }

    /// Names and directory end up on the remote command line unquoted.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validation::validate_remote_dir(&self.upload_dir)?;
        validation::validate_artifact_name(&base_name(&self.script))?;
        if let Some(archive) = &self.archive {
            validation::validate_artifact_name(&base_name(archive))?;
        }
        Ok(())
    }
}

pub(crate) fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Removes the sidecars it holds when dropped
#[derive(Debug, Default)]
pub struct SidecarGuard {
    paths: Vec<PathBuf>,
}

impl SidecarGuard {
    fn track(&mut self, path: PathBuf) {
        self.paths.push(path);
    }
}

impl Drop for SidecarGuard {
    fn drop(&mut self) {
        for path in &self.paths {
            match std::fs::remove_file(path) {
                Ok(()) => tracing::debug!("Removed sidecar {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!("Failed to remove sidecar {}: {}", path.display(), e),
            }
        }
    }
}

/// Upload list in order: script, its sidecar, archive, its sidecar.
#[derive(Debug)]
pub struct PreparedArtifacts {
    pub files: Vec<PathBuf>,
    _sidecars: SidecarGuard,
}

/// Normalize the script's line endings and write sidecars.
///
/// Sidecars written before a failure are removed again.
pub fn prepare(
    spec: &TransferSpec,
    algorithm: DigestAlgorithm,
) -> Result<PreparedArtifacts, ChecksumError> {
    checksum::normalize_line_endings(&spec.script)?;

    let mut sidecars = SidecarGuard::default();
    let mut files = Vec::with_capacity(4);

    for artifact in std::iter::once(&spec.script).chain(spec.archive.as_ref()) {
        let sidecar = checksum::write_sidecar(artifact, algorithm)?;
        sidecars.track(sidecar.clone());
        files.push(artifact.clone());
        files.push(sidecar);
    }

    Ok(PreparedArtifacts {
        files,
        _sidecars: sidecars,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn empty_upload_dir_uses_default() {
        let spec = TransferSpec::new("a.sh".into(), None, "");
        assert_eq!(spec.upload_dir, "/tmp/upload");
        let spec = TransferSpec::new("a.sh".into(), None, "   ");
        assert_eq!(spec.upload_dir, "/tmp/upload");
    }

    #[test]
    fn install_command_with_archive() {
        let spec = TransferSpec::new(
            "/work/node_exporter_install.sh".into(),
            Some("/work/node_exporter-1.3.1.tar.gz".into()),
            "/tmp/upload/",
        );
        assert_eq!(
            spec.install_command(),
            "bash /tmp/upload/node_exporter_install.sh /tmp/upload node_exporter-1.3.1.tar.gz"
        );
    }

    #[test]
    fn install_command_without_archive() {
        let spec = TransferSpec::new("/work/install.sh".into(), None, "/opt/drop");
        assert_eq!(spec.install_command(), "bash /opt/drop/install.sh /opt/drop");
    }

    #[test]
    fn install_command_in_root_dir() {
        let spec = TransferSpec::new("/work/install.sh".into(), None, "/");
        assert_eq!(spec.install_command(), "bash /install.sh /");
    }

    #[test]
    fn validate_rejects_unsafe_names() {
        assert!(TransferSpec::new("/w/ok.sh".into(), None, "/tmp/up").validate().is_ok());
        assert!(TransferSpec::new("/w/a b.sh".into(), None, "/tmp/up").validate().is_err());
        assert!(TransferSpec::new("/w/ok.sh".into(), None, "relative").validate().is_err());
        assert!(
            TransferSpec::new("/w/ok.sh".into(), Some("/w/x;rm.tgz".into()), "/tmp")
                .validate()
                .is_err()
        );
    }

    #[test]
    fn prepare_lists_artifacts_and_cleans_up_on_drop() {
        let dir = tempdir().unwrap();
        let script = dir.path().join("install.sh");
        let archive = dir.path().join("payload.tar.gz");
        fs::write(&script, "echo hi\r\n").unwrap();
        fs::write(&archive, [0u8, 1, 2, 3]).unwrap();

        let spec = TransferSpec::new(script.clone(), Some(archive.clone()), "");
        let prepared = prepare(&spec, DigestAlgorithm::Md5).unwrap();

        assert_eq!(
            prepared.files,
            vec![
                script.clone(),
                dir.path().join("install.sh.md5"),
                archive.clone(),
                dir.path().join("payload.tar.gz.md5"),
            ]
        );
        assert_eq!(fs::read(&script).unwrap(), b"echo hi\n");
        assert!(dir.path().join("install.sh.md5").exists());

        drop(prepared);
        assert!(!dir.path().join("install.sh.md5").exists());
        assert!(!dir.path().join("payload.tar.gz.md5").exists());
        assert!(script.exists());
        assert!(archive.exists());
    }

    #[test]
    fn failed_prepare_leaves_no_sidecars() {
        let dir = tempdir().unwrap();
        let script = dir.path().join("install.sh");
        fs::write(&script, "echo hi\n").unwrap();

        let spec = TransferSpec::new(script, Some(dir.path().join("missing.tgz")), "");
        let err = prepare(&spec, DigestAlgorithm::Sha256).unwrap_err();

        assert!(matches!(err, ChecksumError::Read { .. }));
        assert!(!dir.path().join("install.sh.sha256").exists());
    }

    #[test]
    fn missing_script_fails_before_any_sidecar() {
        let dir = tempdir().unwrap();
        let spec = TransferSpec::new(dir.path().join("nope.sh"), None, "");
        assert!(prepare(&spec, DigestAlgorithm::Md5).is_err());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
