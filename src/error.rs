use std::path::PathBuf;
use thiserror::Error;

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to parse servers list '{path}': {source}")]
    ParseTargets {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Remote servers list '{0}' is empty")]
    NoTargets(PathBuf),

    #[error("Invalid target #{index}: {reason}")]
    InvalidTarget { index: usize, reason: String },

    #[error("Invalid setting: {0}")]
    InvalidSetting(String),
}

/// Local digest / sidecar errors
#[derive(Error, Debug)]
pub enum ChecksumError {
    #[error("Failed to read '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write '{path}': {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Checksum task failed: {0}")]
    Task(String),
}

/// Errors raised while establishing an SSH connection.
///
/// Network failures (`Dial`, `Timeout`, `Handshake`) are kept apart from
/// credential failures (`Auth`, `Key`) so callers can tell an unreachable
/// host from a rejected login.
#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("Connection failed to {host}:{port}: {reason}")]
    Dial {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("Timeout connecting to {0}")]
    Timeout(String),

    #[error("SSH handshake failed for {host}:{port}: {reason}")]
    Handshake {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Key error: {0}")]
    Key(String),

    #[error("Host key verification failed: {0}")]
    HostKey(String),

    #[error("SSH protocol error: {0}")]
    Protocol(String),
}

/// SFTP upload errors
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("SFTP session failed: {0}")]
    Session(String),

    #[error("Failed to create remote directory {path}: {reason}")]
    CreateDir { path: String, reason: String },

    #[error("Failed to open remote file {path}: {reason}")]
    OpenRemote { path: String, reason: String },

    #[error("Failed to open local file {path}: {source}")]
    OpenLocal {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Transfer failed: {0}")]
    Transfer(String),

    #[error("cancel or time out")]
    Cancelled,
}

/// Remote command execution errors
#[derive(Error, Debug)]
pub enum ExecError {
    #[error("Failed to open session: {0}")]
    Session(String),

    #[error("session start error, err = {0}")]
    Start(String),

    #[error("stdout error, err = {0}")]
    Read(String),

    #[error("{0}")]
    Stderr(String),

    #[error("Process exited with status {0}")]
    ExitStatus(u32),

    #[error("Process killed by signal {0}")]
    Signal(String),

    #[error("Process exited without reporting a status")]
    NoExitStatus,

    #[error("cancel or time out")]
    Cancelled,

    #[error("Output producer stopped before reporting a result")]
    Aborted,
}

/// Terminal error of a whole deployment run
#[derive(Error, Debug)]
pub enum DeployError {
    #[error("invalid transfer parameters, {0}")]
    Invalid(String),

    #[error("prepare artifacts error, {0}")]
    Prepare(#[from] ChecksumError),

    #[error("connect to {host} failed: {source}")]
    Connect {
        host: String,
        #[source]
        source: ConnectError,
    },

    #[error("upload of '{file}' to {host} failed: {source}")]
    Upload {
        host: String,
        file: String,
        #[source]
        source: UploadError,
    },

    #[error("command on {host} failed: {source}")]
    Exec {
        host: String,
        #[source]
        source: ExecError,
    },

    #[error("cancel or time out")]
    Cancelled,

    #[error("Deployment task stopped before reporting a result")]
    Aborted,
}

/// Configuration reload notification errors
#[derive(Error, Debug)]
pub enum ReloadError {
    #[error("Reload request to {url} failed: {reason}")]
    Request { url: String, reason: String },

    #[error("Reload rejected with status {status}: {body}")]
    Status { status: u16, body: String },
}

impl From<russh::Error> for ConnectError {
    fn from(err: russh::Error) -> Self {
        ConnectError::Protocol(err.to_string())
    }
}
