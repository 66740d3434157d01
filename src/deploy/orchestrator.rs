//! Sequential, fail-fast deployment across targets
//!
//! Every target gets its own connection, opened only after the previous
//! target finished successfully and closed before moving on. The whole run
//! shares one cancellation token armed with the run deadline.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::checksum::DigestAlgorithm;
use crate::config::RemoteTarget;
use crate::error::{ChecksumError, DeployError, ExecError, UploadError};
use crate::remote::{Connector, RemoteHost};
use crate::stream::{self, DeploymentStream, OutputSink, SEPARATOR, SUCCESS_SENTINEL};

use super::artifacts::{self, PreparedArtifacts, TransferSpec, base_name};

/// Default deadline for a whole multi-host run
pub const DEFAULT_RUN_TIMEOUT: Duration = Duration::from_secs(300);

/// Runs a [`TransferSpec`] against targets through a [`Connector`]
pub struct Deployer<C> {
    connector: Arc<C>,
    run_timeout: Duration,
    checksum: DigestAlgorithm,
}

impl<C> Clone for Deployer<C> {
    fn clone(&self) -> Self {
        Self {
            connector: self.connector.clone(),
            run_timeout: self.run_timeout,
            checksum: self.checksum,
        }
    }
}

impl<C: Connector> Deployer<C> {
    pub fn new(connector: Arc<C>) -> Self {
        Self {
            connector,
            run_timeout: DEFAULT_RUN_TIMEOUT,
            checksum: DigestAlgorithm::default(),
        }
    }

    pub fn with_run_timeout(mut self, run_timeout: Duration) -> Self {
        self.run_timeout = run_timeout;
        self
    }

    pub fn with_checksum(mut self, checksum: DigestAlgorithm) -> Self {
        self.checksum = checksum;
        self
    }

    /// Deploy to every target in order and stream the merged output.
    pub fn run(&self, targets: Vec<RemoteTarget>, transfer: TransferSpec) -> DeploymentStream {
        self.run_until(targets, transfer, CancellationToken::new())
    }

    /// Like [`Deployer::run`], additionally stopping when `cancel` fires.
    pub fn run_until(
        &self,
        targets: Vec<RemoteTarget>,
        transfer: TransferSpec,
        cancel: CancellationToken,
    ) -> DeploymentStream {
        let (sink, stream) = stream::channel();
        let deployer = self.clone();

        tokio::spawn(async move {
            let cancel = cancel.child_token();
            let _deadline = arm_deadline(cancel.clone(), deployer.run_timeout);

            let result = deployer
                .orchestrate(&targets, &transfer, &sink, &cancel)
                .await;

            match &result {
                Ok(()) => tracing::info!("Deployment finished on {} target(s)", targets.len()),
                Err(e) => {
                    tracing::error!("Deployment failed: {}", e);
                    let line = format!("{}\n", e);
                    if cancel.is_cancelled() {
                        sink.try_send(line);
                    } else {
                        sink.send_until(line, &cancel).await;
                    }
                }
            }
            sink.finish(result);
        });

        stream
    }

    async fn orchestrate(
        &self,
        targets: &[RemoteTarget],
        transfer: &TransferSpec,
        sink: &OutputSink<DeployError>,
        cancel: &CancellationToken,
    ) -> Result<(), DeployError> {
        transfer
            .validate()
            .map_err(|e| DeployError::Invalid(e.to_string()))?;

        let artifacts = prepare(transfer, self.checksum).await?;
        let command = transfer.install_command();

        sink.send_until(SEPARATOR, cancel).await;

        for target in targets {
            if cancel.is_cancelled() || sink.is_closed() {
                return Err(DeployError::Cancelled);
            }

            sink.send_until(format!("connecting remote server {}\n", target.host), cancel)
                .await;
            let mut host = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(DeployError::Cancelled),
                connected = self.connector.connect(target) => {
                    connected.map_err(|source| DeployError::Connect {
                        host: target.host.clone(),
                        source,
                    })?
                }
            };

            let outcome = deploy_to(
                &mut host,
                target,
                &artifacts,
                transfer.remote_dir(),
                &command,
                sink,
                cancel,
            )
            .await;
            host.close().await;
            outcome?;

            sink.send_until(SEPARATOR, cancel).await;
        }

        drop(artifacts);
        if !sink.send_until(SUCCESS_SENTINEL, cancel).await && cancel.is_cancelled() {
            return Err(DeployError::Cancelled);
        }
        Ok(())
    }
}

/// Cancels `token` once `timeout` elapses.
///
/// Dropping the returned guard cancels `token` as well, which also stops
/// the timer.
pub fn arm_deadline(token: CancellationToken, timeout: Duration) -> tokio_util::sync::DropGuard {
    let timer = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = timer.cancelled() => {}
            _ = tokio::time::sleep(timeout) => {
                tracing::warn!("Run deadline of {:?} reached, cancelling", timeout);
                timer.cancel();
            }
        }
    });
    token.drop_guard()
}

async fn prepare(
    transfer: &TransferSpec,
    algorithm: DigestAlgorithm,
) -> Result<PreparedArtifacts, DeployError> {
    let transfer = transfer.clone();
    let prepared = tokio::task::spawn_blocking(move || artifacts::prepare(&transfer, algorithm))
        .await
        .map_err(|e| ChecksumError::Task(e.to_string()))??;
    Ok(prepared)
}

async fn deploy_to<H: RemoteHost>(
    host: &mut H,
    target: &RemoteTarget,
    artifacts: &PreparedArtifacts,
    remote_dir: &str,
    command: &str,
    sink: &OutputSink<DeployError>,
    cancel: &CancellationToken,
) -> Result<(), DeployError> {
    for file in &artifacts.files {
        let name = base_name(file);
        let Some(size) = stat_size(file, sink, cancel).await else {
            continue;
        };

        sink.send_until(
            format!(
                "sending file '{}' to remote server {}, size={}Bytes ......\n",
                name, target.host, size
            ),
            cancel,
        )
        .await;

        host.upload_file(file, remote_dir, cancel)
            .await
            .map_err(|source| match source {
                UploadError::Cancelled => DeployError::Cancelled,
                source => DeployError::Upload {
                    host: target.host.clone(),
                    file: name,
                    source,
                },
            })?;
    }

    sink.send_until(format!("running command in remote server {}\n", target.host), cancel)
        .await;

    let mut output = host.execute(command, cancel.clone());
    while let Some(line) = output.next_line().await {
        if !sink.send_until(line, cancel).await && cancel.is_cancelled() {
            break;
        }
    }
    output.outcome().await.map_err(|source| match source {
        ExecError::Cancelled => DeployError::Cancelled,
        source => DeployError::Exec {
            host: target.host.clone(),
            source,
        },
    })
}

/// Size of a local artifact; an unreadable one is reported and skipped.
async fn stat_size(
    file: &Path,
    sink: &OutputSink<DeployError>,
    cancel: &CancellationToken,
) -> Option<u64> {
    match tokio::fs::metadata(file).await {
        Ok(metadata) => Some(metadata.len()),
        Err(e) => {
            tracing::warn!("Skipping {}: {}", file.display(), e);
            sink.send_until(
                format!("stat error, {}, skipping '{}'\n", e, file.display()),
                cancel,
            )
            .await;
            None
        }
    }
}
