//! Host key verification tests

use std::fs;
use std::time::Duration;

use sshdeploy::error::ConnectError;
use sshdeploy::ssh::{HostKeyPolicy, SshClient};

use super::fixtures::SshTestEnvironment;

/// A valid ed25519 key that no test server uses
const FOREIGN_KEY: &str = "AAAAC3NzaC1lZDI1NTE5AAAAIJdD7y3aLq454yWBdwLWbieU1ebz9/cu7/QEXn9OIeZJ";

fn known_hosts_name(env: &SshTestEnvironment) -> String {
    if env.server.port == 22 {
        env.server.host.clone()
    } else {
        format!("[{}]:{}", env.server.host, env.server.port)
    }
}

#[tokio::test]
async fn test_unknown_host_is_rejected() {
    skip_if_no_server!();

    let env = SshTestEnvironment::new()
        .await
        .expect("Failed to create test environment");
    assert!(!env.known_hosts_path.exists());

    let result = env.strict_client().check_connect(&env.password_target()).await;
    match result {
        Err(ConnectError::HostKey(reason)) => assert!(reason.contains("not listed"), "{}", reason),
        other => panic!("Expected host key rejection, got {:?}", other),
    }

    // Verification never writes to the file
    assert!(!env.known_hosts_path.exists());
}

#[tokio::test]
async fn test_changed_host_key_is_rejected() {
    skip_if_no_server!();

    let env = SshTestEnvironment::new()
        .await
        .expect("Failed to create test environment");
    fs::write(
        &env.known_hosts_path,
        format!("{} ssh-ed25519 {}\n", known_hosts_name(&env), FOREIGN_KEY),
    )
    .unwrap();

    let result = env.strict_client().check_connect(&env.password_target()).await;
    match result {
        // Servers without an ed25519 key report the host as unlisted instead
        Err(ConnectError::HostKey(reason)) => assert!(
            reason.contains("HOST KEY CHANGED") || reason.contains("not listed"),
            "{}",
            reason
        ),
        other => panic!("Expected changed host key, got {:?}", other),
    }
}

#[tokio::test]
async fn test_wrong_pinned_fingerprint_is_rejected() {
    skip_if_no_server!();

    let env = SshTestEnvironment::new()
        .await
        .expect("Failed to create test environment");
    let client = SshClient::new(
        Duration::from_secs(10),
        None,
        HostKeyPolicy::Fingerprint(
            "SHA256:AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA".to_string(),
        ),
    );

    let result = client.check_connect(&env.password_target()).await;
    assert!(
        matches!(result, Err(ConnectError::HostKey(_))),
        "Expected host key rejection, got {:?}",
        result
    );
}

#[tokio::test]
async fn test_accept_any_connects_without_known_hosts() {
    skip_if_no_server!();

    let env = SshTestEnvironment::new()
        .await
        .expect("Failed to create test environment");

    let result = env.trusting_client().check_connect(&env.password_target()).await;
    assert!(result.is_ok(), "{:?}", result.err());
    assert!(!env.known_hosts_path.exists());
}
