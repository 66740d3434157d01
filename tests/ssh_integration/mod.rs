//! SSH integration tests
//!
//! These tests need a reachable SSH server with SFTP enabled and `bash`
//! installed. They are skipped unless `SSHDEPLOY_TEST_HOST` is set.
//!
//! ## Running the tests
//!
//! ```bash
//! SSHDEPLOY_TEST_HOST=127.0.0.1 \
//! SSHDEPLOY_TEST_PORT=2222 \
//! SSHDEPLOY_TEST_USER=testuser \
//! SSHDEPLOY_TEST_PASSWORD=testpass123 \
//!     cargo test --test ssh_integration
//! ```
//!
//! `SSHDEPLOY_TEST_KEY` (and optionally `SSHDEPLOY_TEST_KEY_PASSPHRASE`)
//! enables the public key tests.

#[macro_use]
pub mod fixtures;

mod connection_tests;
mod deploy_tests;
mod host_key_tests;
