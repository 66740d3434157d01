//! End-to-end deployment runs

use std::fs;
use std::sync::Arc;

use sshdeploy::checksum::DigestAlgorithm;
use sshdeploy::error::DeployError;
use sshdeploy::{Deployer, SEPARATOR, SUCCESS_SENTINEL, TransferSpec};

use super::fixtures::SshTestEnvironment;

#[tokio::test]
async fn test_deploy_runs_installer_with_archive() {
    skip_if_no_server!();

    let env = SshTestEnvironment::new()
        .await
        .expect("Failed to create test environment");
    let remote_dir = env.remote_dir("deploy");

    let script = env.workspace.path().join("install.sh");
    let archive = env.workspace.path().join("payload.tar.gz");
    // CRLF endings are normalized before upload
    fs::write(
        &script,
        "cd \"$1\" && test -s install.sh.md5 && test -s \"$2\" && echo \"installing $2\"\r\nrm -rf \"$1\"\r\n",
    )
    .unwrap();
    fs::write(&archive, b"not really an archive").unwrap();

    let deployer = Deployer::new(Arc::new(env.trusting_client()))
        .with_checksum(DigestAlgorithm::Md5);
    let spec = TransferSpec::new(script.clone(), Some(archive), remote_dir.clone());

    let (lines, result) = deployer
        .run(vec![env.password_target()], spec)
        .collect()
        .await;

    assert!(result.is_ok(), "{:?}\n{}", result, lines.concat());
    assert_eq!(lines.first().map(String::as_str), Some(SEPARATOR));
    assert_eq!(lines.last().map(String::as_str), Some(SUCCESS_SENTINEL));
    assert!(lines.contains(&"installing payload.tar.gz\n".to_string()));
    assert!(
        lines
            .iter()
            .any(|l| l.starts_with("sending file '") && l.contains("install.sh.md5"))
    );

    // Sidecars are removed locally once the run ends
    assert!(!env.workspace.path().join("install.sh.md5").exists());
    assert!(!env.workspace.path().join("payload.tar.gz.md5").exists());
}

#[tokio::test]
async fn test_failing_installer_ends_without_sentinel() {
    skip_if_no_server!();

    let env = SshTestEnvironment::new()
        .await
        .expect("Failed to create test environment");
    let remote_dir = env.remote_dir("failing");

    let script = env.workspace.path().join("broken.sh");
    fs::write(&script, "rm -rf \"$1\"\nexit 3\n").unwrap();

    let deployer = Deployer::new(Arc::new(env.trusting_client()));
    let spec = TransferSpec::new(script, None, remote_dir);

    let (lines, result) = deployer
        .run(vec![env.password_target(), env.password_target()], spec)
        .collect()
        .await;

    assert!(matches!(result, Err(DeployError::Exec { .. })), "{:?}", result);
    assert_ne!(lines.last().map(String::as_str), Some(SUCCESS_SENTINEL));
    // Fail-fast: the second target is never contacted
    let connects = lines
        .iter()
        .filter(|l| l.starts_with("connecting remote server"))
        .count();
    assert_eq!(connects, 1);
}
