//! Command line front end for the connection-group correlation monitor.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod render;

use std::convert::Infallible;
use std::fmt;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use affinity_admin::{AdminTransport, Credentials};
use affinity_admin_mqsc::{MqscAdminTransport, MqscOptions};
use affinity_admin_rest::{RestAdminTransport, RestOptions};
use affinity_monitor::{Monitor, MonitorConfig, MonitorEvent, TransportKind, WatchSummary};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::render::{Format, write_event, write_report};

/// Exit code when some node was unreachable for the whole run.
const EXIT_UNREACHABLE: u8 = 1;

/// Exit code for invalid arguments or configuration.
const EXIT_INVALID: u8 = 2;

/// Exit code when the report could not be written.
const EXIT_OUTPUT: u8 = 3;

/// CLI-specific error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration could not be loaded or is invalid
    #[error(transparent)]
    Config(#[from] affinity_monitor::Error),

    /// REST transport could not be set up
    #[error("rest transport: {0}")]
    Rest(#[from] affinity_admin_rest::Error),

    /// MQSC transport could not be set up
    #[error("mqsc transport: {0}")]
    Mqsc(#[from] affinity_admin_mqsc::Error),

    /// Writing output failed
    #[error("output: {0}")]
    Output(#[from] std::io::Error),
}

impl Error {
    const fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) | Self::Rest(_) | Self::Mqsc(_) => EXIT_INVALID,
            Self::Output(_) => EXIT_OUTPUT,
        }
    }
}

/// Accepts plain seconds ("5") or a duration ("500ms", "1m30s").
fn parse_interval(value: &str) -> Result<Duration, String> {
    let value = value.trim();
    value.parse::<u64>().map_or_else(
        |_| humantime::parse_duration(value).map_err(|e| e.to_string()),
        |secs| Ok(Duration::from_secs(secs)),
    )
}

/// A password that never shows up in debug output.
#[derive(Clone)]
struct Password(String);

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("********")
    }
}

impl FromStr for Password {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

#[derive(Clone, Debug, Parser)]
#[command(name = "monitor", version, about, long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(long, global = true, env = "AFFINITY_CONFIG")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, value_enum, default_value_t = Format::Table, env = "AFFINITY_FORMAT")]
    format: Format,

    /// Administrative transport: rest, mqsc or docker
    #[arg(long, global = true, env = "AFFINITY_TRANSPORT")]
    transport: Option<TransportKind>,

    /// Only report connections whose tag starts with this value
    #[arg(long, global = true, env = "AFFINITY_TAG_FILTER")]
    tag_filter: Option<String>,

    /// Match the tag filter exactly instead of as a prefix
    #[arg(long, global = true, env = "AFFINITY_EXACT_TAG")]
    exact_tag: bool,

    /// Administrative user
    #[arg(long, global = true, env = "AFFINITY_ADMIN_USER")]
    user: Option<String>,

    /// Administrative password
    #[arg(long, global = true, env = "AFFINITY_ADMIN_PASSWORD", hide_env_values = true)]
    password: Option<Password>,

    /// Accept self-signed certificates from the REST API
    #[arg(long, global = true, env = "AFFINITY_ACCEPT_INVALID_CERTS")]
    accept_invalid_certs: bool,

    /// Deadline shared by all node queries of one snapshot
    #[arg(long, global = true, value_parser = parse_interval, env = "AFFINITY_SNAPSHOT_TIMEOUT")]
    snapshot_timeout: Option<Duration>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Debug, Subcommand)]
enum Command {
    /// Query every node once and print the report
    Snapshot {
        /// Node address; repeat or separate with commas
        #[arg(long = "node", alias = "nodes", value_delimiter = ',', env = "AFFINITY_NODES")]
        nodes: Vec<String>,
    },

    /// Poll the nodes until interrupted and report group failovers
    Watch {
        /// Node addresses, separated with commas
        #[arg(long = "nodes", alias = "node", value_delimiter = ',', env = "AFFINITY_NODES")]
        nodes: Vec<String>,

        /// Pause between polls, in seconds or as a duration
        #[arg(long, value_parser = parse_interval, env = "AFFINITY_INTERVAL")]
        interval: Option<Duration>,

        /// How long a reconnecting group may take to settle
        #[arg(long, value_parser = parse_interval, env = "AFFINITY_DWELL")]
        dwell: Option<Duration>,
    },
}

impl Command {
    fn nodes(&self) -> &[String] {
        match self {
            Self::Snapshot { nodes } | Self::Watch { nodes, .. } => nodes,
        }
    }
}

/// Defaults, then the config file, then environment and flags.
fn load_config(args: &Args) -> Result<MonitorConfig, Error> {
    let mut config = match &args.config {
        Some(path) => {
            info!("loading configuration from {}", path.display());
            MonitorConfig::from_file(path)?
        }
        None => MonitorConfig::default(),
    };

    let nodes: Vec<String> = args
        .command
        .nodes()
        .iter()
        .map(|node| node.trim().to_string())
        .filter(|node| !node.is_empty())
        .collect();
    if !nodes.is_empty() {
        config.nodes = nodes;
    }

    if let Some(tag) = &args.tag_filter {
        config.tag_filter = Some(tag.clone());
    }
    if args.exact_tag {
        config.exact_tag = true;
    }
    if let Some(user) = &args.user {
        config.user = Some(user.clone());
    }
    if let Some(kind) = args.transport {
        config.transport.kind = kind;
    }
    if args.accept_invalid_certs {
        config.transport.accept_invalid_certs = true;
    }
    if let Some(timeout) = args.snapshot_timeout {
        config.snapshot_timeout = timeout;
    }
    if let Command::Watch {
        interval, dwell, ..
    } = &args.command
    {
        if let Some(interval) = interval {
            config.interval = *interval;
        }
        if let Some(dwell) = dwell {
            config.dwell = *dwell;
        }
    }

    config.validate()?;
    Ok(config)
}

fn mqsc_options(config: &MonitorConfig) -> MqscOptions {
    let mut options = if config.transport.kind == TransportKind::Docker {
        MqscOptions::docker()
    } else {
        MqscOptions::default()
    };

    if let Some(program) = &config.transport.program {
        options.program.clone_from(program);
    }
    if let Some(args) = &config.transport.args {
        options.args.clone_from(args);
    }
    options.timeout = config.transport.command_timeout;
    options
}

async fn snapshot<T>(monitor: &Monitor<T>, format: Format) -> Result<u8, Error>
where
    T: AdminTransport,
{
    let report = monitor.snapshot().await;

    let mut stdout = std::io::stdout().lock();
    write_report(&mut stdout, &report, format)?;
    stdout.flush()?;

    if report.is_partial() {
        error!("some nodes did not answer");
        return Ok(EXIT_UNREACHABLE);
    }

    Ok(0)
}

async fn print_events(mut events: mpsc::Receiver<MonitorEvent>, format: Format) -> std::io::Result<()> {
    while let Some(event) = events.recv().await {
        let mut stdout = std::io::stdout().lock();
        write_event(&mut stdout, &event, format)?;
        stdout.flush()?;
    }

    Ok(())
}

async fn watch<T>(monitor: &Monitor<T>, format: Format, cancel: CancellationToken) -> Result<u8, Error>
where
    T: AdminTransport,
{
    let (tx, rx) = mpsc::channel(256);

    let (summary, printed): (WatchSummary, _) =
        tokio::join!(monitor.run(cancel, tx), print_events(rx, format));
    printed?;

    if summary.is_clean() {
        Ok(0)
    } else {
        Ok(EXIT_UNREACHABLE)
    }
}

async fn execute<T>(
    transport: T,
    args: &Args,
    config: &MonitorConfig,
    credentials: Credentials,
    cancel: CancellationToken,
) -> Result<u8, Error>
where
    T: AdminTransport,
{
    let monitor = Monitor::new(Arc::new(transport), config, credentials)?;

    match args.command {
        Command::Snapshot { .. } => snapshot(&monitor, args.format).await,
        Command::Watch { .. } => watch(&monitor, args.format, cancel).await,
    }
}

async fn run(args: Args, cancel: CancellationToken) -> Result<u8, Error> {
    let config = load_config(&args)?;
    let credentials = Credentials::from_parts(
        config.user.clone(),
        args.password.as_ref().map(|password| password.0.clone()),
    );

    info!(
        "using {} transport against {}",
        config.transport.kind,
        config.nodes.join(",")
    );

    match config.transport.kind {
        TransportKind::Rest => {
            let transport = RestAdminTransport::new(&RestOptions {
                request_timeout: config.transport.request_timeout,
                accept_invalid_certs: config.transport.accept_invalid_certs,
            })?;
            execute(transport, &args, &config, credentials, cancel).await
        }
        TransportKind::Mqsc | TransportKind::Docker => {
            let transport = MqscAdminTransport::new(mqsc_options(&config))?;
            execute(transport, &args, &config, credentials, cancel).await
        }
    }
}

fn shutdown_on_signal(token: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};

            match (
                signal(SignalKind::terminate()),
                signal(SignalKind::interrupt()),
            ) {
                (Ok(mut sigterm), Ok(mut sigint)) => {
                    tokio::select! {
                        _ = sigterm.recv() => info!("Received SIGTERM"),
                        _ = sigint.recv() => info!("Received SIGINT"),
                    }
                }
                _ => {
                    warn!("could not install signal handlers, falling back to ctrl-c");
                    let _ = tokio::signal::ctrl_c().await;
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            info!("Received interrupt signal");
        }

        info!("Shutting down");
        token.cancel();
    });
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let shutdown_token = CancellationToken::new();
    shutdown_on_signal(shutdown_token.clone());

    match run(args, shutdown_token).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("{e}");
            ExitCode::from(e.exit_code())
        }
    }
}
