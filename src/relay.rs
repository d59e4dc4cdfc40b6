// src/relay.rs - The relay loop and everything it owns
//
// One `Relay` holds every piece of mutable state. The binary calls `tick`
// once per millisecond and hands console lines to `handle_command`; nothing
// in here waits longer than a single bounded time query.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use crate::clock::{PrecisionClock, QuerySample};
use crate::communication::{ByteLink, NetworkLink, TimeSource};
use crate::config::Config;
use crate::console::{ConsoleCommand, HELP};
use crate::failover::{ActiveServer, ServerFailoverManager};
use crate::protocol::ingest::ACK;
use crate::protocol::{ConfigIngestor, StatusByte};
use crate::scheduler::{
    BoundedRetry, DeliveryScheduler, RetryPoll, RetryStep, StatusThrottle, TimeInterface,
};
use crate::server_config::{Address, ServerConfig};
use crate::storage::{KeyValueStore, load_server_config, save_server_config};
use crate::watchdog::{PlatformWatchdog, WatchdogSupervisor};

pub const MASTER_PROBE: &[u8] = b"TEST\r\n";
const READ_CHUNK: usize = 64;

/// The collaborators a relay is built from.
pub struct RelayParts {
    pub time: Arc<dyn TimeInterface>,
    pub source: Box<dyn TimeSource>,
    pub network: Box<dyn NetworkLink>,
    pub master: Box<dyn ByteLink>,
    pub downstream: Box<dyn ByteLink>,
    pub store: Box<dyn KeyValueStore>,
    pub watchdog: Box<dyn PlatformWatchdog>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopControl {
    Continue,
    /// Everything is flushed and persisted; the process should exit so it
    /// can be relaunched.
    Restart,
}

/// An outstanding `TEST` probe on the master link.
#[derive(Debug)]
struct MasterProbe {
    deadline_ms: u64,
    line: Vec<u8>,
}

pub struct Relay {
    time: Arc<dyn TimeInterface>,
    source: Box<dyn TimeSource>,
    network: Box<dyn NetworkLink>,
    master: Box<dyn ByteLink>,
    downstream: Box<dyn ByteLink>,
    store: Box<dyn KeyValueStore>,
    watchdog: WatchdogSupervisor,

    ingestor: ConfigIngestor,
    failover: ServerFailoverManager,
    clock: PrecisionClock,
    delivery: DeliveryScheduler,
    status: StatusThrottle,
    acquisition: BoundedRetry,
    probe: Option<MasterProbe>,

    network_up: bool,
    last_network_check_ms: u64,
    config_received: bool,

    network_check_interval_ms: u64,
    link_wait_ms: u64,
    link_poll_ms: u64,
    probe_timeout_ms: u64,
    min_plausible_epoch: u64,
}

impl Relay {
    /// Bring the relay up: watchdog first, then the stored configuration and
    /// an initial look at the network.
    pub fn new(config: &Config, parts: RelayParts) -> Self {
        let RelayParts {
            time,
            source,
            mut network,
            master,
            downstream,
            mut store,
            watchdog,
        } = parts;
        let now = time.now_ms();

        let watchdog = WatchdogSupervisor::start(
            watchdog,
            store.as_mut(),
            Duration::from_secs(config.watchdog.timeout_secs),
            config.watchdog.feed_interval_ms,
            now,
        );

        let mut failover = ServerFailoverManager::new(config.failover.threshold);
        let mut acquisition = BoundedRetry::new(config.retry.attempts, config.retry.delay_ms);
        if let Some(stored) = load_server_config(store.as_ref()) {
            failover.apply_config(stored);
            acquisition.arm(now);
        }

        let network_up = network.link_up();
        tracing::info!("Network link {}", if network_up { "up" } else { "down" });

        Self {
            time,
            source,
            network,
            master,
            downstream,
            store,
            watchdog,
            ingestor: ConfigIngestor::new(),
            failover,
            clock: PrecisionClock::new(config.time.refresh_interval_ms),
            delivery: DeliveryScheduler::new(
                config.delivery.target_ms,
                config.delivery.tolerance_ms,
                config.time.utc_offset_secs,
            ),
            status: StatusThrottle::new(config.delivery.status_interval_ms),
            acquisition,
            probe: None,
            network_up,
            last_network_check_ms: now,
            config_received: false,
            network_check_interval_ms: config.network.check_interval_ms,
            link_wait_ms: config.network.link_wait_ms,
            link_poll_ms: config.network.poll_ms.max(1),
            probe_timeout_ms: config.master.probe_timeout_ms,
            min_plausible_epoch: config.time.min_plausible_epoch,
        }
    }

    /// Poll the link until it comes up or the wait budget is spent.
    ///
    /// The budget is counted in polls, so a stalled clock cannot stretch it.
    pub async fn wait_for_link(&mut self) -> bool {
        let polls = self.link_wait_ms / self.link_poll_ms;
        tracing::info!("Waiting up to {}ms for the network link", self.link_wait_ms);
        for _ in 0..=polls {
            if self.network.link_up() {
                self.network_up = true;
                tracing::info!("Network link up");
                return true;
            }
            self.watchdog.service(self.time.now_ms());
            tokio::time::sleep(Duration::from_millis(self.link_poll_ms)).await;
        }
        self.network_up = false;
        tracing::warn!("Network link still down, continuing without it");
        false
    }

    /// Send `TEST` to the master; the reply is picked up by later ticks.
    pub async fn start_master_probe(&mut self) {
        tracing::info!("Testing master link");
        if let Err(e) = self.master.write_all(MASTER_PROBE).await {
            tracing::error!("Failed to send master probe: {}", e);
            return;
        }
        self.probe = Some(MasterProbe {
            deadline_ms: self.time.now_ms() + self.probe_timeout_ms,
            line: Vec::new(),
        });
    }

    /// One pass of the loop.
    pub async fn tick(&mut self) {
        let now = self.time.now_ms();
        self.watchdog.service(now);
        self.poll_master(now).await;
        self.check_network(now);
        self.run_sync(now).await;
        let now = self.time.now_ms();
        self.deliver(now).await;
    }

    async fn poll_master(&mut self, now: u64) {
        let mut buf = [0u8; READ_CHUNK];
        let n = match self.master.read_available(&mut buf).await {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!("Master link read failed: {}", e);
                0
            }
        };
        for &byte in &buf[..n] {
            if self.probe.is_some() {
                self.probe_byte(byte);
                continue;
            }
            let Some(outcome) = self.ingestor.push(byte) else {
                continue;
            };
            if outcome.acknowledge {
                if let Err(e) = self.master.write_all(ACK).await {
                    tracing::warn!("Failed to acknowledge {}: {}", outcome.fragment, e);
                }
            }
            if let Some(config) = outcome.config {
                self.apply_config(config, now);
            }
        }
        if self.probe.as_ref().is_some_and(|p| now >= p.deadline_ms) {
            tracing::warn!("Master did not answer the probe within {}ms", self.probe_timeout_ms);
            self.probe = None;
        }
    }

    fn probe_byte(&mut self, byte: u8) {
        let Some(probe) = self.probe.as_mut() else {
            return;
        };
        if byte == b'\r' || byte == b'\n' {
            if !probe.line.is_empty() {
                tracing::info!("Master responded: {}", String::from_utf8_lossy(&probe.line));
                self.probe = None;
            }
        } else {
            probe.line.push(byte);
        }
    }

    fn apply_config(&mut self, config: ServerConfig, now: u64) {
        if let Err(e) = save_server_config(self.store.as_mut(), &config) {
            tracing::warn!("Failed to persist server configuration: {}", e);
        }
        self.watchdog.feed_after("configuration save", now);
        self.failover.apply_config(config);
        self.config_received = true;
        self.acquisition.arm(now);
    }

    fn check_network(&mut self, now: u64) {
        if now.saturating_sub(self.last_network_check_ms) < self.network_check_interval_ms {
            return;
        }
        self.last_network_check_ms = now;
        let up = self.network.link_up();
        match (self.network_up, up) {
            (false, true) => tracing::info!("Network link restored"),
            (true, false) => tracing::warn!("Network link lost"),
            _ => {}
        }
        self.network_up = up;
    }

    async fn run_sync(&mut self, now: u64) {
        if !self.network_up || !self.failover.has_valid_config() {
            return;
        }
        if self.acquisition.is_active() {
            let RetryPoll::Due { attempt } = self.acquisition.poll(now) else {
                return;
            };
            tracing::info!("Time acquisition attempt {}", attempt);
            let ok = self.sync_once().await;
            let after = self.time.now_ms();
            match self.acquisition.record(ok, after) {
                RetryStep::Succeeded { attempt } => {
                    tracing::info!("Precise time acquired on attempt {}", attempt)
                }
                RetryStep::Retrying { next_at_ms } => {
                    tracing::debug!("Next acquisition attempt at {}ms", next_at_ms)
                }
                RetryStep::Exhausted => {
                    tracing::warn!("Time acquisition gave up, continuing with periodic refresh")
                }
            }
            return;
        }
        if self.clock.refresh_due(now) {
            self.sync_once().await;
        }
    }

    /// One query against the current server. Feeds the failover counters
    /// and, on success, replaces the anchor.
    async fn sync_once(&mut self) -> bool {
        let Some(server) = self.failover.current_server().cloned() else {
            return false;
        };
        let query_start_ms = self.time.now_ms();
        self.clock.mark_attempt(query_start_ms);
        let result = self.source.query(&server).await;
        let query_end_ms = self.time.now_ms();
        self.watchdog.feed_after("time sync", query_end_ms);

        let outcome = match result {
            Ok(raw_epoch) if raw_epoch >= self.min_plausible_epoch => Ok(raw_epoch),
            Ok(raw_epoch) => Err(format!("implausible epoch {}", raw_epoch)),
            Err(e) => Err(e.to_string()),
        };
        match outcome {
            Ok(raw_epoch) => {
                self.clock.apply_sample(QuerySample {
                    raw_epoch,
                    query_start_ms,
                    query_end_ms,
                });
                self.failover.record_success();
                true
            }
            Err(reason) => {
                tracing::warn!("Time query to {} failed: {}", server, reason);
                self.clock.note_failure();
                self.failover.record_failure();
                false
            }
        }
    }

    async fn deliver(&mut self, now: u64) {
        if !self.network_up {
            self.send_status(StatusByte::NoNetwork, now).await;
            return;
        }
        let projection = self.clock.project(now, self.source.last_known_epoch());
        if !self.failover.has_valid_config()
            || !projection.precise
            || projection.epoch < self.min_plausible_epoch
        {
            self.send_status(StatusByte::NoTime, now).await;
            return;
        }
        if let Some(frame) = self.delivery.tick(projection) {
            match self.downstream.write_all(frame.as_bytes()).await {
                Ok(()) => tracing::debug!("Sent {} at {}ms", frame, projection.millisecond),
                Err(e) => tracing::warn!("Downstream write failed: {}", e),
            }
        }
    }

    async fn send_status(&mut self, status: StatusByte, now: u64) {
        if !self.status.poll(now) {
            return;
        }
        if let Err(e) = self.downstream.write_all(&[status.as_byte()]).await {
            tracing::warn!("Downstream status write failed: {}", e);
        }
    }

    /// Run one console line. Reports go to stdout.
    pub async fn handle_command(&mut self, line: &str) -> LoopControl {
        let command = match line.parse::<ConsoleCommand>() {
            Ok(command) => command,
            Err(e) => {
                tracing::warn!("Console: {}", e);
                return LoopControl::Continue;
            }
        };
        let now = self.time.now_ms();
        let report = match command {
            ConsoleCommand::Reset => return self.graceful_restart().await,
            ConsoleCommand::TestMaster => {
                self.start_master_probe().await;
                return LoopControl::Continue;
            }
            ConsoleCommand::Status => self.status_report(),
            ConsoleCommand::Wdt => self.wdt_report(now),
            ConsoleCommand::MasterInfo => self.master_report(),
            ConsoleCommand::Sync => self.sync_report(now),
            ConsoleCommand::Help => HELP.to_string(),
        };
        println!("{}", report);
        LoopControl::Continue
    }

    /// Quiesce the links and persist the watchdog record.
    pub async fn wind_down(&mut self) {
        self.watchdog.disable();
        if let Err(e) = self.downstream.flush().await {
            tracing::warn!("Downstream flush failed: {}", e);
        }
        if let Err(e) = self.master.flush().await {
            tracing::warn!("Master flush failed: {}", e);
        }
        if let Err(e) = std::io::stdout().flush() {
            tracing::warn!("Console flush failed: {}", e);
        }
        let now = self.time.now_ms();
        if let Err(e) = self.watchdog.persist(self.store.as_mut(), now) {
            tracing::warn!("Failed to persist watchdog record: {}", e);
        }
    }

    pub async fn graceful_restart(&mut self) -> LoopControl {
        tracing::info!("Graceful restart requested");
        self.wind_down().await;
        if let Err(e) = self.watchdog.request_restart() {
            tracing::error!("Restart request failed: {}", e);
        }
        LoopControl::Restart
    }

    pub fn status_report(&self) -> String {
        let state = self.failover.state();
        let (primary, secondary) = match self.failover.config() {
            Some(config) => (
                config.primary().to_string(),
                config.secondary().map_or("none".to_string(), Address::to_string),
            ),
            None => ("none".to_string(), "none".to_string()),
        };
        let active = match state.active {
            ActiveServer::Primary => "primary",
            ActiveServer::Secondary => "secondary",
        };
        let record = self.watchdog.record();
        format!(
            "Primary: {} | Secondary: {}\n\
             Active: {} ({})\n\
             Fail counts: primary {} | secondary {}\n\
             Network: {}\n\
             Watchdog: {} | resets: {}",
            primary,
            secondary,
            active,
            self.failover
                .current_server()
                .map_or("none", Address::as_str),
            state.primary_fail_count,
            state.secondary_fail_count,
            if self.network_up { "up" } else { "down" },
            if self.watchdog.is_enabled() { "enabled" } else { "disabled" },
            record.reset_count
        )
    }

    pub fn wdt_report(&self, now: u64) -> String {
        let record = self.watchdog.record();
        format!(
            "Reset count: {}\nLast reset cause: {}\nSince last feed: {}ms\nTimeout: {}s",
            record.reset_count,
            record.last_reset_cause.describe(),
            self.watchdog.since_last_feed_ms(now),
            self.watchdog.timeout().as_secs()
        )
    }

    pub fn master_report(&self) -> String {
        let pending = self.ingestor.buffer().pending();
        format!(
            "Config received: {}\nPending fragments: {}",
            if self.config_received { "yes" } else { "no" },
            if pending.is_empty() {
                "none".to_string()
            } else {
                pending.join(", ")
            }
        )
    }

    pub fn sync_report(&self, now: u64) -> String {
        let projection = self.clock.project(now, self.source.last_known_epoch());
        let age = self
            .clock
            .last_sync_ms()
            .map_or("never".to_string(), |at| format!("{}ms ago", now.saturating_sub(at)));
        format!(
            "Precise: {}\nEpoch: {}.{:03}\nTarget window: {}±{}ms\nLast sync: {}",
            if projection.precise { "yes" } else { "no" },
            projection.epoch,
            projection.millisecond,
            self.delivery.target_ms(),
            self.delivery.tolerance_ms(),
            age
        )
    }

    pub fn failover(&self) -> &ServerFailoverManager {
        &self.failover
    }

    pub fn clock(&self) -> &PrecisionClock {
        &self.clock
    }

    pub fn delivery(&self) -> &DeliveryScheduler {
        &self.delivery
    }

    pub fn watchdog(&self) -> &WatchdogSupervisor {
        &self.watchdog
    }

    pub fn network_up(&self) -> bool {
        self.network_up
    }

    pub fn config_received(&self) -> bool {
        self.config_received
    }

    pub fn is_probing_master(&self) -> bool {
        self.probe.is_some()
    }

    pub fn acquisition_active(&self) -> bool {
        self.acquisition.is_active()
    }
}

impl std::fmt::Debug for Relay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relay")
            .field("failover", &self.failover)
            .field("clock", &self.clock)
            .field("network_up", &self.network_up)
            .field("config_received", &self.config_received)
            .finish_non_exhaustive()
    }
}
