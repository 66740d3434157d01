//! SSH transport: connecting, authenticating, host key checks and command
//! sessions.

pub mod auth;
pub mod client;
pub mod connection;
pub mod handler;
pub mod known_hosts;
pub mod process;

pub use client::SshClient;
pub use connection::SshConnection;
pub use handler::HostKeyPolicy;
