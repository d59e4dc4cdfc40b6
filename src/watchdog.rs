// src/watchdog.rs - Liveness supervision and reset history
use std::time::Duration;

use serde_json::Value;

use crate::error::{StoreError, WatchdogError};
use crate::storage::{
    KeyValueStore, WDT_LAST_REBOOT_KEY, WDT_RESET_COUNT_KEY, WDT_STATS_NAMESPACE, WDT_UPTIME_KEY,
};

pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_FEED_INTERVAL_MS: u64 = 1000;
/// Hard upper bound on the time between two feeds.
pub const MAX_FEED_INTERVAL_MS: u64 = 5000;

const FEED_LOG_INTERVAL_MS: u64 = 30_000;

/// Why the previous run ended. Codes follow the common MCU reset-reason
/// numbering so persisted values stay comparable with device logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetCause {
    PowerOn,
    Software,
    Panic,
    InterruptWatchdog,
    TaskWatchdog,
    Watchdog,
    Brownout,
    Unknown(u32),
}

impl ResetCause {
    pub fn code(self) -> u32 {
        match self {
            ResetCause::PowerOn => 1,
            ResetCause::Software => 3,
            ResetCause::Panic => 4,
            ResetCause::InterruptWatchdog => 5,
            ResetCause::TaskWatchdog => 6,
            ResetCause::Watchdog => 7,
            ResetCause::Brownout => 9,
            ResetCause::Unknown(code) => code,
        }
    }

    pub fn from_code(code: u32) -> Self {
        match code {
            1 => ResetCause::PowerOn,
            3 => ResetCause::Software,
            4 => ResetCause::Panic,
            5 => ResetCause::InterruptWatchdog,
            6 => ResetCause::TaskWatchdog,
            7 => ResetCause::Watchdog,
            9 => ResetCause::Brownout,
            other => ResetCause::Unknown(other),
        }
    }

    /// The loop stopped feeding and the platform pulled the plug.
    pub fn is_stall(self) -> bool {
        matches!(
            self,
            ResetCause::InterruptWatchdog | ResetCause::TaskWatchdog | ResetCause::Watchdog
        )
    }

    pub fn describe(self) -> String {
        match self {
            ResetCause::PowerOn => "power-on".to_string(),
            ResetCause::Software => "software restart".to_string(),
            ResetCause::Panic => "panic".to_string(),
            ResetCause::InterruptWatchdog => "interrupt watchdog timeout".to_string(),
            ResetCause::TaskWatchdog => "task watchdog timeout, loop was stalled".to_string(),
            ResetCause::Watchdog => "watchdog timeout".to_string(),
            ResetCause::Brownout => "brownout".to_string(),
            ResetCause::Unknown(code) => format!("unknown ({})", code),
        }
    }
}

/// What the supervisor needs from the hardware (or the host emulation).
pub trait PlatformWatchdog: Send {
    /// Cause recorded for the run that just ended.
    fn reset_cause(&mut self) -> ResetCause;
    fn enable(&mut self, timeout: Duration) -> Result<(), WatchdogError>;
    fn feed(&mut self);
    fn disable(&mut self);
    /// Mark the coming restart as clean and request it.
    fn restart(&mut self) -> Result<(), WatchdogError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchdogRecord {
    pub reset_count: u16,
    pub last_reset_cause: ResetCause,
    pub last_feed_instant: u64,
}

pub struct WatchdogSupervisor {
    platform: Box<dyn PlatformWatchdog>,
    record: WatchdogRecord,
    enabled: bool,
    timeout: Duration,
    feed_interval_ms: u64,
    last_feed_log_ms: u64,
}

impl WatchdogSupervisor {
    /// Inspect the previous reset, bump the stall counter if needed, persist
    /// the result and arm the watchdog.
    pub fn start(
        mut platform: Box<dyn PlatformWatchdog>,
        store: &mut dyn KeyValueStore,
        timeout: Duration,
        feed_interval_ms: u64,
        now_ms: u64,
    ) -> Self {
        let previous = store
            .get_u64(WDT_STATS_NAMESPACE, WDT_RESET_COUNT_KEY)
            .and_then(|n| u16::try_from(n).ok())
            .unwrap_or(0);
        if previous > 0 {
            let uptime = store.get_u64(WDT_STATS_NAMESPACE, WDT_UPTIME_KEY).unwrap_or(0);
            tracing::info!(
                "Previous watchdog resets: {} | previous uptime: {}s",
                previous,
                uptime / 1000
            );
        }

        let cause = platform.reset_cause();
        tracing::info!("Last reset cause: {}", cause.describe());
        let reset_count = if cause.is_stall() {
            previous.saturating_add(1)
        } else {
            previous
        };

        let mut supervisor = Self {
            platform,
            record: WatchdogRecord {
                reset_count,
                last_reset_cause: cause,
                last_feed_instant: now_ms,
            },
            enabled: false,
            timeout,
            feed_interval_ms: feed_interval_ms.min(MAX_FEED_INTERVAL_MS),
            last_feed_log_ms: now_ms,
        };
        if let Err(e) = supervisor.persist(store, now_ms) {
            tracing::warn!("Failed to persist watchdog record: {}", e);
        }
        match supervisor.platform.enable(timeout) {
            Ok(()) => {
                supervisor.enabled = true;
                tracing::info!("Watchdog started ({}s timeout)", timeout.as_secs());
            }
            Err(e) => tracing::error!("Watchdog unavailable: {}", e),
        }
        supervisor
    }

    /// Feed if the feed interval has elapsed since the last assertion.
    pub fn service(&mut self, now_ms: u64) -> bool {
        if now_ms.saturating_sub(self.record.last_feed_instant) >= self.feed_interval_ms {
            self.feed(now_ms);
            true
        } else {
            false
        }
    }

    pub fn feed(&mut self, now_ms: u64) {
        if !self.enabled {
            return;
        }
        self.platform.feed();
        self.record.last_feed_instant = now_ms;
        if now_ms.saturating_sub(self.last_feed_log_ms) >= FEED_LOG_INTERVAL_MS {
            self.last_feed_log_ms = now_ms;
            tracing::debug!("Watchdog fed (uptime: {}s)", now_ms / 1000);
        }
    }

    /// Unconditional feed after an operation that may have taken a while.
    pub fn feed_after(&mut self, operation: &str, now_ms: u64) {
        tracing::trace!("Watchdog feed after {}", operation);
        self.feed(now_ms);
    }

    pub fn disable(&mut self) {
        if self.enabled {
            self.platform.disable();
            self.enabled = false;
            tracing::info!("Watchdog disabled");
        }
    }

    pub fn persist(&self, store: &mut dyn KeyValueStore, now_ms: u64) -> Result<(), StoreError> {
        store.put(
            WDT_STATS_NAMESPACE,
            WDT_RESET_COUNT_KEY,
            Value::from(self.record.reset_count),
        )?;
        store.put(
            WDT_STATS_NAMESPACE,
            WDT_LAST_REBOOT_KEY,
            Value::from(self.record.last_reset_cause.code()),
        )?;
        store.put(WDT_STATS_NAMESPACE, WDT_UPTIME_KEY, Value::from(now_ms))?;
        tracing::info!("Watchdog statistics saved");
        Ok(())
    }

    pub fn request_restart(&mut self) -> Result<(), WatchdogError> {
        self.platform.restart()
    }

    pub fn record(&self) -> WatchdogRecord {
        self.record
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn since_last_feed_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.record.last_feed_instant)
    }
}

impl std::fmt::Debug for WatchdogSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchdogSupervisor")
            .field("record", &self.record)
            .field("enabled", &self.enabled)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Calls {
        feeds: u32,
        enabled: bool,
        restarted: bool,
    }

    struct FakePlatform {
        cause: ResetCause,
        calls: Arc<Mutex<Calls>>,
    }

    impl PlatformWatchdog for FakePlatform {
        fn reset_cause(&mut self) -> ResetCause {
            self.cause
        }
        fn enable(&mut self, _timeout: Duration) -> Result<(), WatchdogError> {
            self.calls.lock().unwrap().enabled = true;
            Ok(())
        }
        fn feed(&mut self) {
            self.calls.lock().unwrap().feeds += 1;
        }
        fn disable(&mut self) {
            self.calls.lock().unwrap().enabled = false;
        }
        fn restart(&mut self) -> Result<(), WatchdogError> {
            self.calls.lock().unwrap().restarted = true;
            Ok(())
        }
    }

    fn start(cause: ResetCause, store: &mut MemoryStore) -> (WatchdogSupervisor, Arc<Mutex<Calls>>) {
        let calls = Arc::new(Mutex::new(Calls::default()));
        let platform = FakePlatform {
            cause,
            calls: calls.clone(),
        };
        let supervisor = WatchdogSupervisor::start(
            Box::new(platform),
            store,
            Duration::from_secs(60),
            1000,
            0,
        );
        (supervisor, calls)
    }

    #[test]
    fn stall_causes_increment_persisted_count() {
        let mut store = MemoryStore::new();
        let (supervisor, _) = start(ResetCause::TaskWatchdog, &mut store);
        assert_eq!(supervisor.record().reset_count, 1);
        let (supervisor, _) = start(ResetCause::InterruptWatchdog, &mut store);
        assert_eq!(supervisor.record().reset_count, 2);
        assert_eq!(store.get_u64(WDT_STATS_NAMESPACE, WDT_RESET_COUNT_KEY), Some(2));
        assert_eq!(store.get_u64(WDT_STATS_NAMESPACE, WDT_LAST_REBOOT_KEY), Some(5));
    }

    #[test]
    fn clean_causes_keep_count() {
        let mut store = MemoryStore::new();
        store
            .put(WDT_STATS_NAMESPACE, WDT_RESET_COUNT_KEY, Value::from(4u64))
            .unwrap();
        for cause in [ResetCause::PowerOn, ResetCause::Software, ResetCause::Brownout] {
            let (supervisor, _) = start(cause, &mut store);
            assert_eq!(supervisor.record().reset_count, 4);
        }
    }

    #[test]
    fn service_feeds_on_interval() {
        let mut store = MemoryStore::new();
        let (mut supervisor, calls) = start(ResetCause::PowerOn, &mut store);
        assert!(calls.lock().unwrap().enabled);
        assert!(!supervisor.service(999));
        assert!(supervisor.service(1000));
        assert!(!supervisor.service(1500));
        assert!(supervisor.service(2000));
        assert_eq!(calls.lock().unwrap().feeds, 2);
        assert_eq!(supervisor.since_last_feed_ms(2600), 600);
    }

    #[test]
    fn disabled_watchdog_is_not_fed() {
        let mut store = MemoryStore::new();
        let (mut supervisor, calls) = start(ResetCause::PowerOn, &mut store);
        supervisor.disable();
        supervisor.feed(5000);
        assert_eq!(calls.lock().unwrap().feeds, 0);
        assert!(!supervisor.is_enabled());
    }

    #[test]
    fn reset_cause_codes_round_trip() {
        for code in 0..12 {
            assert_eq!(ResetCause::from_code(code).code(), code);
        }
        assert!(!ResetCause::Panic.is_stall());
        assert!(ResetCause::Watchdog.is_stall());
    }
}
