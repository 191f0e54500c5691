//! Main entry point for the relay control binary
//!
//! `relayctl serve` runs the status monitor in the foreground; every other
//! subcommand performs one channel operation against the same
//! configuration file and prints the result as JSON.

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;

use orchestrator::services::{Monitor, DEFAULT_LOG_LINES};
use orchestrator::{Settings, TimeWindow};
use shared::{component_debug, component_info, logging, Channel, ChannelUpdate, ComponentId};

/// Supervisor for srt-live-transmit relay channels
#[derive(Parser)]
#[command(name = "relayctl")]
#[command(about = "Runs and supervises SRT/UDP relay channels")]
pub struct Args {
    #[command(flatten)]
    pub settings: Settings,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Reconcile channels, then monitor them until Ctrl+C
    Serve {
        /// Skip periodic media probing
        #[arg(long)]
        no_probe: bool,
    },
    /// List every channel with its reconciled status
    List,
    /// Full configuration and live state of one channel
    Show { name: String },
    /// Create a channel from a JSON file (`-` reads stdin)
    Create { file: PathBuf },
    /// Apply a partial JSON update to a stopped channel (`-` reads stdin)
    Update { name: String, file: PathBuf },
    /// Stop and remove a channel
    Delete { name: String },
    Start { name: String },
    Stop { name: String },
    Restart { name: String },
    /// Print the relay argument vectors without spawning anything
    Argv { name: String },
    /// Telemetry series of one channel
    Stats {
        name: String,
        /// 5m, 15m, 30m, 1h, 6h, 24h, 7d or all
        #[arg(long, default_value = "all")]
        window: TimeWindow,
    },
    /// Telemetry of every channel plus the fleet summary
    AllStats {
        #[arg(long, default_value = "1h")]
        window: TimeWindow,
    },
    /// Dashboard totals and per-channel overview
    Summary,
    /// Trailing relay log lines
    Logs {
        name: String,
        #[arg(long, default_value_t = DEFAULT_LOG_LINES)]
        lines: usize,
        /// Destination index of a fan-out channel
        #[arg(long)]
        process: Option<usize>,
    },
    /// Media analysis of a running channel's input
    Probe {
        name: String,
        /// Probe now instead of returning the cached report
        #[arg(long)]
        force: bool,
    },
}

fn read_json_input(file: &Path) -> anyhow::Result<String> {
    if file.as_os_str() == "-" {
        let mut body = String::new();
        std::io::stdin().read_to_string(&mut body).context("reading stdin")?;
        return Ok(body);
    }
    std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    Settings::load_env();
    let args = Args::parse();

    match &args.command {
        Command::Serve { .. } => ComponentId::init_orchestrator(),
        _ => ComponentId::init_control(),
    };
    logging::init_tracing_with_level(Some(&args.settings.log_level));

    let service = Arc::new(args.settings.channel_service()?);
    if !matches!(args.command, Command::Serve { .. }) {
        service.state().load().await;
    }

    match args.command {
        Command::Serve { no_probe } => {
            logging::log_startup(ComponentId::current(), "relay orchestrator");
            service.initialize().await?;

            let mut monitor = Monitor::new(Arc::clone(&service))
                .with_interval(args.settings.monitor_interval())
                .with_probing(!no_probe);

            let mut events = service.subscribe();
            tokio::spawn(async move {
                loop {
                    match events.recv().await {
                        Ok(event) => {
                            component_debug!(ComponentId::current(), "📣 {}: {:?}", event.channel_name(), event);
                        }
                        Err(RecvError::Lagged(missed)) => {
                            component_debug!(ComponentId::current(), "Event log fell behind by {} event(s)", missed);
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            });

            // Set up graceful shutdown
            let shutdown_sender = monitor.get_shutdown_sender();
            tokio::spawn(async move {
                match signal::ctrl_c().await {
                    Ok(()) => {
                        logging::log_shutdown(ComponentId::current(), "Received Ctrl+C signal");
                        let _ = shutdown_sender.send(()).await;
                    }
                    Err(err) => {
                        logging::log_error(ComponentId::current(), "Signal handling", &err);
                    }
                }
            });

            monitor.run().await?;
            service.state().save().await?;
            component_info!(ComponentId::current(), "Relay processes left running");
            logging::log_success(ComponentId::current(), "Orchestrator stopped gracefully");
        }
        Command::List => print_json(&service.list().await?)?,
        Command::Show { name } => print_json(&service.get_full_info(&name).await?)?,
        Command::Create { file } => {
            let channel: Channel = serde_json::from_str(&read_json_input(&file)?).context("parsing channel JSON")?;
            print_json(&service.create(channel).await?)?;
        }
        Command::Update { name, file } => {
            let update: ChannelUpdate =
                serde_json::from_str(&read_json_input(&file)?).context("parsing update JSON")?;
            print_json(&service.update(&name, &update).await?)?;
        }
        Command::Delete { name } => {
            service.delete(&name).await?;
            print_json(&serde_json::json!({ "message": format!("Channel {name} deleted") }))?;
        }
        Command::Start { name } => print_json(&service.start(&name).await?)?,
        Command::Stop { name } => print_json(&service.stop(&name).await?)?,
        Command::Restart { name } => print_json(&service.restart(&name).await?)?,
        Command::Argv { name } => {
            let channel = service.get(&name).await?;
            let invocations = args.settings.command_builder().build_all(&channel)?;
            let argv: Vec<&[String]> = invocations.iter().map(|i| i.args.as_slice()).collect();
            print_json(&argv)?;
        }
        Command::Stats { name, window } => print_json(&service.get_stats(&name, window).await?)?,
        Command::AllStats { window } => print_json(&service.get_all_stats(window).await?)?,
        Command::Summary => print_json(&service.analytics_summary().await?)?,
        Command::Logs { name, lines, process } => print_json(&service.get_logs(&name, lines, process).await?)?,
        Command::Probe { name, force } => {
            let report = service.stream_info(&name, force).await?;
            service.state().save().await?;
            print_json(&report)?;
        }
    }

    Ok(())
}
