//! sshdeploy library
//!
//! Uploads an installer script (plus an optional archive and digest
//! sidecars) to remote hosts over SFTP, runs it with `bash`, and streams the
//! output back line by line. Hosts are processed one at a time and the first
//! failure stops the run.

pub mod checksum;
pub mod config;
pub mod deploy;
pub mod error;
pub mod exec;
pub mod logging;
pub mod reload;
pub mod remote;
pub mod sftp;
pub mod ssh;
pub mod stream;
pub mod validation;

pub(crate) mod security_log;

pub use deploy::{Deployer, TransferSpec};
pub use stream::{SEPARATOR, SUCCESS_SENTINEL};
