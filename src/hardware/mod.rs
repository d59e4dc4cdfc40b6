// src/hardware/mod.rs - Host stand-ins for the board's platform services
//
// On a real board the watchdog and reset-reason register come from the
// SoC. On a host the same contract is emulated: a monitor thread aborts
// the process when the loop stops feeding, and the reset cause survives the
// restart as a one-line marker file next to the store.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::error::WatchdogError;
use crate::watchdog::{PlatformWatchdog, ResetCause};

const MARKER_FILE: &str = "reset-cause";
const MONITOR_PERIOD: Duration = Duration::from_millis(250);

#[derive(Debug)]
struct Shared {
    start: Instant,
    last_feed_ms: AtomicU64,
    timeout_ms: AtomicU64,
    enabled: AtomicBool,
    stop: AtomicBool,
}

impl Shared {
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

/// Software watchdog for hosts without a hardware one.
#[derive(Debug)]
pub struct HostWatchdog {
    marker: PathBuf,
    shared: Arc<Shared>,
    monitor: Option<JoinHandle<()>>,
}

impl HostWatchdog {
    pub fn new(state_dir: impl AsRef<Path>) -> Self {
        Self {
            marker: state_dir.as_ref().join(MARKER_FILE),
            shared: Arc::new(Shared {
                start: Instant::now(),
                last_feed_ms: AtomicU64::new(0),
                timeout_ms: AtomicU64::new(0),
                enabled: AtomicBool::new(false),
                stop: AtomicBool::new(false),
            }),
            monitor: None,
        }
    }

    pub fn marker_path(&self) -> &Path {
        &self.marker
    }

    /// Record `Panic` as the reset cause if the process panics.
    pub fn install_panic_marker(&self) {
        let marker = self.marker.clone();
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let _ = write_marker(&marker, ResetCause::Panic);
            previous(info);
        }));
    }
}

fn write_marker(path: &Path, cause: ResetCause) -> std::io::Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(path, cause.code().to_string())
}

impl PlatformWatchdog for HostWatchdog {
    fn reset_cause(&mut self) -> ResetCause {
        match std::fs::read_to_string(&self.marker) {
            Ok(text) => {
                let _ = std::fs::remove_file(&self.marker);
                text.trim()
                    .parse::<u32>()
                    .map(ResetCause::from_code)
                    .unwrap_or(ResetCause::Unknown(0))
            }
            Err(_) => ResetCause::PowerOn,
        }
    }

    fn enable(&mut self, timeout: Duration) -> Result<(), WatchdogError> {
        let shared = &self.shared;
        shared.timeout_ms.store(timeout.as_millis() as u64, Ordering::SeqCst);
        shared.last_feed_ms.store(shared.now_ms(), Ordering::SeqCst);
        shared.enabled.store(true, Ordering::SeqCst);
        if self.monitor.is_some() {
            return Ok(());
        }
        let shared = self.shared.clone();
        let marker = self.marker.clone();
        let handle = std::thread::Builder::new()
            .name("soft-watchdog".to_string())
            .spawn(move || {
                while !shared.stop.load(Ordering::SeqCst) {
                    std::thread::sleep(MONITOR_PERIOD);
                    if !shared.enabled.load(Ordering::SeqCst) {
                        continue;
                    }
                    let idle = shared
                        .now_ms()
                        .saturating_sub(shared.last_feed_ms.load(Ordering::SeqCst));
                    if idle > shared.timeout_ms.load(Ordering::SeqCst) {
                        tracing::error!("Watchdog timeout: loop silent for {}ms, aborting", idle);
                        let _ = write_marker(&marker, ResetCause::TaskWatchdog);
                        std::process::abort();
                    }
                }
            })
            .map_err(|e| WatchdogError::Enable(e.to_string()))?;
        self.monitor = Some(handle);
        Ok(())
    }

    fn feed(&mut self) {
        self.shared
            .last_feed_ms
            .store(self.shared.now_ms(), Ordering::SeqCst);
    }

    fn disable(&mut self) {
        self.shared.enabled.store(false, Ordering::SeqCst);
    }

    fn restart(&mut self) -> Result<(), WatchdogError> {
        write_marker(&self.marker, ResetCause::Software)?;
        self.shared.stop.store(true, Ordering::SeqCst);
        tracing::info!("Restart requested, exiting for the service manager to relaunch");
        Ok(())
    }
}

impl Drop for HostWatchdog {
    fn drop(&mut self) {
        self.shared.stop.store(true, Ordering::SeqCst);
    }
}
