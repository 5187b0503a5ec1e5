//! Command-line interface for demandlink.

mod config;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use demandlink_commands::{
    AckHandler, Command, CommandDispatcher, CommandKind, DispatchError, EventRecord,
    HttpGatewayTransport, codec,
};
use demandlink_storage::RedbEventLog;
use tracing::warn;

use crate::config::AppConfig;

/// demandlink - issue and audit demand-response device commands.
#[derive(Parser, Debug)]
#[command(name = "demandlink")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Action to perform.
    #[command(subcommand)]
    command: Action,

    /// Configuration file (defaults to ./demandlink.toml when present).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Gateway base URL (overrides config and environment).
    #[arg(long, global = true)]
    gateway_url: Option<String>,

    /// Event database directory (overrides config and environment).
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Available actions.
#[derive(Subcommand, Debug)]
enum Action {
    /// Print the wire payload of a command as hex.
    Encode {
        #[command(flatten)]
        command: CommandArgs,
    },
    /// Decode a hex payload and print the command as JSON.
    Decode {
        /// Payload bytes as hex.
        payload: String,
    },
    /// Send a command to a device and record the event.
    Send {
        #[command(flatten)]
        command: CommandArgs,
        /// Target device ID.
        device_id: String,
    },
    /// List recorded events, newest first.
    Events {
        /// Only events for this device.
        #[arg(short, long)]
        device: Option<String>,
        /// Maximum number of events.
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Store an event record left unpersisted by a failed send.
    Persist {
        /// File holding the record JSON.
        record: PathBuf,
    },
    /// Record a device acknowledgment for an event.
    Ack {
        /// Acknowledged event ID.
        event_id: String,
        /// Device response data as JSON.
        #[arg(long)]
        data: Option<String>,
    },
}

/// Command kinds as accepted on the command line.
#[derive(ValueEnum, Clone, Copy, Debug)]
enum KindArg {
    StartLoadShed,
    EndLoadShed,
    ReadClock,
    SetClock,
    RequestConnectionInfo,
}

impl From<KindArg> for CommandKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::StartLoadShed => CommandKind::StartLoadShed,
            KindArg::EndLoadShed => CommandKind::EndLoadShed,
            KindArg::ReadClock => CommandKind::ReadClock,
            KindArg::SetClock => CommandKind::SetClock,
            KindArg::RequestConnectionInfo => CommandKind::RequestConnectionInfo,
        }
    }
}

/// Command kind and its parameters.
#[derive(Args, Debug)]
struct CommandArgs {
    /// Command kind.
    #[arg(value_enum)]
    kind: KindArg,

    /// Load-shed start time, RFC 3339 (omit to start immediately).
    #[arg(long, value_parser = parse_time)]
    start_time: Option<DateTime<Utc>>,

    /// Load-shed duration.
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    duration: i32,

    /// Clock value for set-clock, RFC 3339.
    #[arg(long, value_parser = parse_time)]
    time: Option<DateTime<Utc>>,
}

impl CommandArgs {
    fn into_command(self) -> Result<Command> {
        let command = match CommandKind::from(self.kind) {
            CommandKind::StartLoadShed => Command::start_load_shed(self.start_time, self.duration),
            CommandKind::EndLoadShed => Command::EndLoadShed,
            CommandKind::ReadClock => Command::ReadClock,
            CommandKind::SetClock => Command::SetClock {
                time: self
                    .time
                    .ok_or_else(|| anyhow!("set-clock requires --time"))?,
            },
            CommandKind::RequestConnectionInfo => Command::RequestConnectionInfo,
        };
        Ok(command)
    }
}

fn parse_time(value: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("invalid RFC 3339 time '{}': {}", value, e))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let mut app_config = AppConfig::load(cli.config.as_deref())?;
    if let Some(url) = cli.gateway_url {
        app_config.gateway.base_url = url;
    }
    if let Some(dir) = cli.data_dir {
        app_config.storage.data_dir = dir;
    }

    match cli.command {
        Action::Encode { command } => run_encode(command),
        Action::Decode { payload } => run_decode(&payload),
        Action::Send { command, device_id } => run_send(&app_config, command, &device_id).await,
        Action::Events { device, limit } => run_events(&app_config, device.as_deref(), limit),
        Action::Persist { record } => run_persist(&app_config, &record).await,
        Action::Ack { event_id, data } => run_ack(&app_config, &event_id, data.as_deref()).await,
    }
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "demandlink={0},demandlink_commands={0},demandlink_storage={0},warn",
            default_level
        ))
    });

    if config::json_logging() {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .compact()
            .with_writer(std::io::stderr)
            .init();
    }
}

fn run_encode(args: CommandArgs) -> Result<()> {
    let payload = args.into_command()?.encode()?;
    println!("{}", hex::encode(&payload));
    Ok(())
}

fn run_decode(payload: &str) -> Result<()> {
    let bytes = hex::decode(payload.trim()).context("Payload is not valid hex")?;
    let command = codec::decode(&bytes)?;
    println!("{}", serde_json::to_string_pretty(&command)?);
    Ok(())
}

fn open_log(config: &AppConfig) -> Result<Arc<RedbEventLog>> {
    let log = RedbEventLog::open(&config.storage.data_dir).with_context(|| {
        format!(
            "Failed to open event log in {}",
            config.storage.data_dir.display()
        )
    })?;
    Ok(Arc::new(log))
}

async fn run_send(config: &AppConfig, args: CommandArgs, device_id: &str) -> Result<()> {
    let command = args.into_command()?;
    let kind = command.kind();
    let transport = Arc::new(HttpGatewayTransport::new(config.gateway.clone())?);
    let dispatcher = CommandDispatcher::new(transport, open_log(config)?);

    match dispatcher.dispatch(device_id, command).await {
        Ok(record) => {
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(())
        }
        Err(DispatchError::Persistence { record, source }) => {
            // The command already went out; surface the record so it can be stored by hand.
            eprintln!("{}", serde_json::to_string_pretty(&record)?);
            bail!(
                "{} was sent but not recorded ({}); do not resend, save the record above \
                 and run `demandlink persist <file>`",
                kind,
                source
            )
        }
        Err(e) => {
            if matches!(e, DispatchError::Transport(_)) && !e.is_retry_safe(kind) {
                warn!(
                    device_id = %device_id,
                    "Device state unknown; check the device before resending {}", kind
                );
            }
            Err(e.into())
        }
    }
}

fn run_events(config: &AppConfig, device: Option<&str>, limit: usize) -> Result<()> {
    let events = open_log(config)?.list(device, limit)?;
    println!("{}", serde_json::to_string_pretty(&events)?);
    Ok(())
}

async fn run_persist(config: &AppConfig, path: &Path) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read record {}", path.display()))?;
    let record: EventRecord =
        serde_json::from_str(&content).context("Record file is not a valid event record")?;

    // Only the log is touched; the transport is never called.
    let transport = Arc::new(HttpGatewayTransport::new(config.gateway.clone())?);
    let dispatcher = CommandDispatcher::new(transport, open_log(config)?);
    dispatcher.persist(&record).await?;

    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

async fn run_ack(config: &AppConfig, event_id: &str, data: Option<&str>) -> Result<()> {
    let data: Option<serde_json::Value> = data
        .map(serde_json::from_str)
        .transpose()
        .context("--data must be valid JSON")?;
    let handler = AckHandler::new(open_log(config)?);
    let ack = handler.acknowledge(event_id, data).await?;
    println!("{}", serde_json::to_string_pretty(&ack)?);
    Ok(())
}
