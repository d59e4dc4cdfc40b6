// src/main.rs - ntp-relay entry point
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

use ntp_relay::communication::{RouteProbe, SerialLink, SntpSource};
use ntp_relay::config::{self, Config};
use ntp_relay::hardware::HostWatchdog;
use ntp_relay::scheduler::StdTimeSync;
use ntp_relay::storage::FileStore;
use ntp_relay::{LoopControl, Relay, RelayError, RelayParts, console};

/// Relay network time to a downstream microcontroller
#[derive(Parser, Debug)]
#[command(name = "ntp-relay", version, about = "Relay network time to a downstream MCU over UART.")]
struct Cli {
    /// Path to a TOML config file (defaults apply when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level, overrides [logging] level
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), RelayError> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => match config::load_config(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("Failed to load config from '{}': {}", path.display(), e);
                return Err(e.into());
            }
        },
        None => Config::default(),
    };
    let level = match &cli.log_level {
        Some(level) => config::parse_log_level(level)?,
        None => config.log_level()?,
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    tracing::info!("Starting ntp-relay {}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Master: {} @ {} baud", config.master.port, config.master.baud);
    tracing::info!(
        "Downstream: {} @ {} baud",
        config.downstream.port,
        config.downstream.baud
    );

    let store = FileStore::open(&config.storage.path)?;
    let master = SerialLink::open(&config.master.port, config.master.baud).map_err(|e| {
        tracing::error!("Failed to open master link: {}", e);
        tracing::error!("Available ports: {:?}", SerialLink::available_ports());
        e
    })?;
    let downstream = SerialLink::open(&config.downstream.port, config.downstream.baud)?;
    let watchdog = HostWatchdog::new(&config.watchdog.state_dir);
    watchdog.install_panic_marker();

    let parts = RelayParts {
        time: Arc::new(StdTimeSync::new()),
        source: Box::new(SntpSource::new(
            config.time.ntp_port,
            Duration::from_millis(config.time.query_timeout_ms),
        )),
        network: Box::new(RouteProbe::new(config.network.probe_target.clone())),
        master: Box::new(master),
        downstream: Box::new(downstream),
        store: Box::new(store),
        watchdog: Box::new(watchdog),
    };
    let mut relay = Relay::new(&config, parts);
    relay.wait_for_link().await;
    relay.start_master_probe().await;

    let mut commands = console::spawn_stdin_reader();
    let mut ticker = tokio::time::interval(Duration::from_millis(config.delivery.tick_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    tracing::info!("Relay running, type 'help' for console commands");
    loop {
        tokio::select! {
            _ = ticker.tick() => relay.tick().await,
            Some(line) = commands.recv() => {
                if relay.handle_command(&line).await == LoopControl::Restart {
                    break;
                }
            }
            _ = &mut shutdown => {
                tracing::info!("Interrupted, shutting down");
                relay.wind_down().await;
                break;
            }
        }
    }
    Ok(())
}
