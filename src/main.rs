//! sshdeploy command line
//!
//! Usage:
//!   sshdeploy exec -H 10.0.0.5 -u root -p secret -e install.sh -f pkg.tar.gz
//!   sshdeploy exec -j servers.json -e install.sh
//!   sshdeploy run -H 10.0.0.5 -u root -k ~/.ssh/id_ed25519 -- "systemctl restart agent"
//!   sshdeploy check -j servers.json
//!   sshdeploy reload

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Args, Parser, Subcommand};
use secrecy::SecretString;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use sshdeploy::config::{self, Credential, HostKeyMode, HostKeySettings, RemoteTarget, Settings};
use sshdeploy::remote::RemoteHost;
use sshdeploy::ssh::SshClient;
use sshdeploy::stream::OutputStream;
use sshdeploy::{Deployer, SUCCESS_SENTINEL, TransferSpec, deploy, logging, reload};

#[derive(Parser)]
#[command(name = "sshdeploy", version)]
#[command(about = "Upload an installer over SFTP and run it on remote hosts", long_about = None)]
struct Cli {
    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Settings file (defaults to the user config directory)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Deadline for the whole run, in seconds
    #[arg(long, value_name = "SECS", global = true)]
    timeout: Option<u64>,

    /// Skip host key verification
    #[arg(long, global = true, conflicts_with = "known_hosts")]
    accept_any_host_key: bool,

    /// known_hosts file used for host key verification
    #[arg(long, value_name = "FILE", global = true)]
    known_hosts: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload the installer (and archive) and run it on each target
    Exec {
        #[command(flatten)]
        target: TargetArgs,

        /// Installer script
        #[arg(short = 'e', long, value_name = "FILE")]
        script: PathBuf,

        /// Archive passed to the script
        #[arg(short = 'f', long, value_name = "FILE")]
        archive: Option<PathBuf>,

        /// Remote upload directory
        #[arg(short = 'd', long, value_name = "DIR")]
        dir: Option<String>,
    },

    /// Run commands on each target, joined with &&
    Run {
        #[command(flatten)]
        target: TargetArgs,

        /// Commands to run
        #[arg(required = true, last = true)]
        commands: Vec<String>,
    },

    /// Check that each target accepts a connection
    Check {
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Ask a collector to reload its configuration
    Reload {
        /// Reload endpoint
        #[arg(short = 'u', long, default_value = reload::DEFAULT_RELOAD_URL)]
        url: String,
    },
}

#[derive(Args)]
struct TargetArgs {
    /// JSON servers list
    #[arg(short = 'j', long, value_name = "FILE", conflicts_with = "host")]
    servers: Option<PathBuf>,

    /// Remote host
    #[arg(short = 'H', long, required_unless_present = "servers")]
    host: Option<String>,

    /// Remote SSH port
    #[arg(short = 'P', long, default_value_t = 22)]
    port: u16,

    /// Login user
    #[arg(short = 'u', long, required_unless_present = "servers")]
    user: Option<String>,

    /// Login password
    #[arg(short = 'p', long, env = "SSHDEPLOY_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Private key file
    #[arg(short = 'k', long, value_name = "FILE", conflicts_with = "password")]
    key: Option<PathBuf>,

    /// Passphrase of the private key
    #[arg(long, env = "SSHDEPLOY_PASSPHRASE", hide_env_values = true)]
    passphrase: Option<String>,
}

impl TargetArgs {
    fn targets(self) -> Result<Vec<RemoteTarget>> {
        if let Some(servers) = self.servers {
            return Ok(config::load_targets(&servers)?);
        }

        let (Some(host), Some(user)) = (self.host, self.user) else {
            bail!("either --servers or --host and --user are required");
        };
        let credential = match (self.key, self.password) {
            (Some(path), _) => Credential::KeyFile {
                path,
                passphrase: self.passphrase.map(SecretString::from),
            },
            (None, Some(password)) => Credential::Password(SecretString::from(password)),
            (None, None) => bail!("either --password or --key is required"),
        };

        let target = RemoteTarget {
            host,
            port: self.port,
            user,
            credential,
        };
        target.validate()?;
        Ok(vec![target])
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_dir = config::paths::ensure_log_dir().ok();
    let _guard = logging::init_logging(log_dir, logging::level_for_verbosity(cli.verbose));

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let settings = load_settings(&cli)?;

    match cli.command {
        Commands::Exec {
            target,
            script,
            archive,
            dir,
        } => {
            let targets = target.targets()?;
            let transfer = TransferSpec::new(
                script,
                archive,
                dir.unwrap_or_else(|| settings.upload_dir.clone()),
            );
            transfer.validate()?;

            let client = SshClient::from_settings(&settings)?;
            let deployer = Deployer::new(Arc::new(client))
                .with_run_timeout(settings.run_timeout())
                .with_checksum(settings.checksum);

            let stream = deployer.run_until(targets, transfer, interrupt_token());
            let (succeeded, result) = relay(stream).await?;
            if let Err(e) = result {
                tracing::debug!("Run failed: {:?}", e);
            }
            Ok(exit_code(succeeded))
        }

        Commands::Run { target, commands } => {
            let targets = target.targets()?;
            let client = SshClient::from_settings(&settings)?;
            let cancel = interrupt_token();
            let _deadline = deploy::arm_deadline(cancel.clone(), settings.run_timeout());

            for target in &targets {
                let mut connection = tokio::select! {
                    _ = cancel.cancelled() => bail!("cancel or time out"),
                    connected = client.connect(target) => connected
                        .with_context(|| format!("connect to {} failed", target.host))?,
                };
                let output = connection.execs(&commands, cancel.clone());
                let relayed = relay(output).await;
                connection.close().await;

                let (_, result) = relayed?;
                result.with_context(|| format!("command on {} failed", target.host))?;
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::Check { target } => {
            let targets = target.targets()?;
            let client = SshClient::from_settings(&settings)?;

            let mut failed = 0;
            for target in &targets {
                match client.check_connect(target).await {
                    Ok(()) => println!("ok      {}", target),
                    Err(e) => {
                        failed += 1;
                        println!("failed  {}: {}", target, e);
                    }
                }
            }
            Ok(exit_code(failed == 0))
        }

        Commands::Reload { url } => {
            let body = reload::notify(&url).await?;
            if !body.trim().is_empty() {
                println!("{}", body.trim_end());
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = match &cli.config {
        Some(path) => Settings::load_from(path)?,
        None => Settings::load()?,
    };

    if let Some(secs) = cli.timeout {
        if secs == 0 {
            bail!("--timeout must be greater than zero");
        }
        settings.run_timeout_secs = secs;
    }
    if cli.accept_any_host_key {
        settings.host_key.policy = HostKeyMode::AcceptAny;
    } else if let Some(path) = &cli.known_hosts {
        settings.host_key = HostKeySettings::with_known_hosts(path.clone());
    }
    Ok(settings)
}

/// Token cancelled on Ctrl-C.
fn interrupt_token() -> CancellationToken {
    let token = CancellationToken::new();
    let on_signal = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling");
            on_signal.cancel();
        }
    });
    token
}

/// Print every line as it arrives. Reports whether the last line was the
/// success sentinel, plus the terminal result.
async fn relay<E>(mut stream: OutputStream<E>) -> Result<(bool, Result<(), E>)>
where
    E: sshdeploy::stream::AbortedError,
{
    let mut stdout = tokio::io::stdout();
    let mut last_was_sentinel = false;

    while let Some(line) = stream.next_line().await {
        stdout.write_all(line.as_bytes()).await?;
        stdout.flush().await?;
        last_was_sentinel = line == SUCCESS_SENTINEL;
    }

    Ok((last_was_sentinel, stream.outcome().await))
}

fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
