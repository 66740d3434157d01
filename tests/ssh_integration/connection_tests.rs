//! SSH connection, command execution and SFTP upload tests

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use sshdeploy::config::RemoteTarget;
use sshdeploy::error::{ConnectError, ExecError};
use sshdeploy::remote::RemoteHost;

use super::fixtures::SshTestEnvironment;

#[tokio::test]
async fn test_password_auth_success() {
    skip_if_no_server!();

    let env = SshTestEnvironment::new()
        .await
        .expect("Failed to create test environment");

    let result = env.trusting_client().check_connect(&env.password_target()).await;
    assert!(result.is_ok(), "Connection failed: {:?}", result.err());
}

#[tokio::test]
async fn test_wrong_password_is_auth_error() {
    skip_if_no_server!();

    let env = SshTestEnvironment::new()
        .await
        .expect("Failed to create test environment");

    let target = RemoteTarget::with_password(
        &env.server.host,
        env.server.port,
        &env.server.username,
        "definitely-not-the-password",
    );
    let result = env.trusting_client().check_connect(&target).await;
    assert!(
        matches!(result, Err(ConnectError::Auth(_))),
        "Expected auth error, got {:?}",
        result
    );
}

#[tokio::test]
async fn test_key_auth_success() {
    skip_if_no_server!();

    let env = SshTestEnvironment::new()
        .await
        .expect("Failed to create test environment");
    let Some(target) = env.key_target() else {
        eprintln!("Skipping test: SSHDEPLOY_TEST_KEY not set");
        return;
    };

    let result = env.trusting_client().check_connect(&target).await;
    assert!(result.is_ok(), "Key auth failed: {:?}", result.err());
}

#[tokio::test]
async fn test_execute_streams_echo_then_output() {
    skip_if_no_server!();

    let env = SshTestEnvironment::new()
        .await
        .expect("Failed to create test environment");
    let mut conn = env
        .trusting_client()
        .connect(&env.password_target())
        .await
        .expect("connect");

    let (lines, result) = conn
        .execute("echo one; echo two", CancellationToken::new())
        .collect()
        .await;
    conn.close().await;

    assert!(result.is_ok(), "{:?}", result);
    assert_eq!(lines, vec!["echo one; echo two\n", "one\n", "two\n"]);
}

#[tokio::test]
async fn test_execs_stops_at_first_failure() {
    skip_if_no_server!();

    let env = SshTestEnvironment::new()
        .await
        .expect("Failed to create test environment");
    let mut conn = env
        .trusting_client()
        .connect(&env.password_target())
        .await
        .expect("connect");

    let (lines, result) = conn
        .execs(&["echo first", "false", "echo never"], CancellationToken::new())
        .collect()
        .await;
    conn.close().await;

    assert_eq!(lines[0], "echo first && false && echo never\n");
    assert!(lines.contains(&"first\n".to_string()));
    assert!(!lines.contains(&"never\n".to_string()));
    assert!(matches!(result, Err(ExecError::ExitStatus(1))), "{:?}", result);
}

#[tokio::test]
async fn test_stderr_output_fails_command() {
    skip_if_no_server!();

    let env = SshTestEnvironment::new()
        .await
        .expect("Failed to create test environment");
    let mut conn = env
        .trusting_client()
        .connect(&env.password_target())
        .await
        .expect("connect");

    let (_, result) = conn
        .execute("echo broken >&2", CancellationToken::new())
        .collect()
        .await;
    conn.close().await;

    match result {
        Err(ExecError::Stderr(text)) => assert_eq!(text, "broken"),
        other => panic!("Expected stderr failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_cancel_kills_long_running_command() {
    skip_if_no_server!();

    let env = SshTestEnvironment::new()
        .await
        .expect("Failed to create test environment");
    let mut conn = env
        .trusting_client()
        .connect(&env.password_target())
        .await
        .expect("connect");

    let cancel = CancellationToken::new();
    let stream = conn.execute("sleep 60", cancel.clone());
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            cancel.cancel();
        }
    });

    let (_, result) = tokio::time::timeout(Duration::from_secs(15), stream.collect())
        .await
        .expect("cancelled command should finish promptly");
    conn.close().await;

    assert!(matches!(result, Err(ExecError::Cancelled)), "{:?}", result);
}

#[tokio::test]
async fn test_upload_file_and_buffer() {
    skip_if_no_server!();

    let env = SshTestEnvironment::new()
        .await
        .expect("Failed to create test environment");
    let remote_dir = format!("{}/nested/dir", env.remote_dir("upload"));

    let local = env.workspace.path().join("payload.txt");
    std::fs::write(&local, "payload contents\n").unwrap();

    let mut conn = env
        .trusting_client()
        .connect(&env.password_target())
        .await
        .expect("connect");
    let cancel = CancellationToken::new();

    let written = conn
        .upload_file(&local, &remote_dir, &cancel)
        .await
        .expect("upload_file");
    assert_eq!(written, 17);

    let written = conn
        .upload_buffer("note.txt", b"from memory\n", &remote_dir, &cancel)
        .await
        .expect("upload_buffer");
    assert_eq!(written, 12);

    let command = format!(
        "cat {dir}/payload.txt {dir}/note.txt; rm -rf {root}",
        dir = remote_dir,
        root = env.remote_dir("upload")
    );
    let (lines, result) = conn.execute(&command, cancel).collect().await;
    conn.close().await;

    assert!(result.is_ok(), "{:?}", result);
    assert_eq!(&lines[1..], ["payload contents\n", "from memory\n"]);
}

#[tokio::test]
async fn test_close_is_idempotent() {
    skip_if_no_server!();

    let env = SshTestEnvironment::new()
        .await
        .expect("Failed to create test environment");
    let mut conn = env
        .trusting_client()
        .connect(&env.password_target())
        .await
        .expect("connect");

    conn.transfer().await.expect("sftp session");
    conn.close().await;
    conn.close().await;

    assert!(conn.transfer().await.is_err());
}
