//! # Precision clock
//!
//! A time query yields a whole-second epoch and nothing about where inside
//! that second it was sampled. The clock pins the epoch to a local
//! monotonic instant (the [`EpochAnchor`]) and from then on projects both
//! the epoch and the millisecond within the second from the local counter
//! alone.
//!
//! The capture instant is taken as the middle of the query round trip,
//! assuming symmetric network latency:
//!
//! ```text
//! query_start ──── rtt/2 ────► capture ──── rtt/2 ────► query_end
//! ```
//!
//! Until the first anchor exists the clock reports the time source's own
//! coarse epoch and `now % 1000`, with [`Projection::precise`] set to
//! `false` so callers can tell.

pub const DEFAULT_REFRESH_INTERVAL_MS: u64 = 30_000;

/// A precise `(epoch, local instant)` pair. Replaced, never adjusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpochAnchor {
    pub epoch_at_capture: u64,
    pub local_instant_at_capture: u64,
}

impl EpochAnchor {
    pub fn projected_epoch(&self, now_ms: u64) -> u64 {
        self.epoch_at_capture + self.elapsed(now_ms) / 1000
    }

    pub fn projected_millisecond(&self, now_ms: u64) -> u16 {
        (self.elapsed(now_ms) % 1000) as u16
    }

    // A tick that reads the counter before the estimated capture instant
    // sees zero elapsed time rather than wrapping.
    fn elapsed(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.local_instant_at_capture)
    }
}

/// Build an anchor from one successful query.
pub fn refresh(raw_epoch: u64, round_trip_ms: u64, query_start_ms: u64) -> EpochAnchor {
    EpochAnchor {
        epoch_at_capture: raw_epoch,
        local_instant_at_capture: query_start_ms + round_trip_ms / 2,
    }
}

/// One answered query, timed on the local monotonic counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuerySample {
    pub raw_epoch: u64,
    pub query_start_ms: u64,
    pub query_end_ms: u64,
}

impl QuerySample {
    pub fn round_trip_ms(&self) -> u64 {
        self.query_end_ms.saturating_sub(self.query_start_ms)
    }
}

/// Current time as seen by the clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Projection {
    pub epoch: u64,
    pub millisecond: u16,
    /// False while running on the coarse fallback.
    pub precise: bool,
}

#[derive(Debug, Clone)]
pub struct PrecisionClock {
    anchor: Option<EpochAnchor>,
    last_sync_ms: Option<u64>,
    last_attempt_ms: Option<u64>,
    refresh_interval_ms: u64,
}

impl PrecisionClock {
    pub fn new(refresh_interval_ms: u64) -> Self {
        Self {
            anchor: None,
            last_sync_ms: None,
            last_attempt_ms: None,
            refresh_interval_ms,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.anchor.is_some()
    }

    pub fn anchor(&self) -> Option<EpochAnchor> {
        self.anchor
    }

    pub fn last_sync_ms(&self) -> Option<u64> {
        self.last_sync_ms
    }

    /// Supersede the current anchor with one built from `sample`.
    pub fn apply_sample(&mut self, sample: QuerySample) -> EpochAnchor {
        let rtt = sample.round_trip_ms();
        let anchor = refresh(sample.raw_epoch, rtt, sample.query_start_ms);
        self.anchor = Some(anchor);
        self.last_sync_ms = Some(sample.query_end_ms);
        tracing::info!("Time sync OK | RTT: {}ms | Epoch: {}", rtt, sample.raw_epoch);
        anchor
    }

    /// A failed attempt keeps whatever anchor was there.
    pub fn note_failure(&self) {
        match self.anchor {
            Some(_) => tracing::warn!("Time sync failed, keeping previous anchor"),
            None => tracing::warn!("Time sync failed, no precise anchor yet"),
        }
    }

    /// Restart the refresh interval from an attempt made outside
    /// [`refresh_due`](Self::refresh_due), e.g. during initial acquisition.
    pub fn mark_attempt(&mut self, now_ms: u64) {
        self.last_attempt_ms = Some(now_ms);
    }

    /// Whether the periodic refresh should run now. Arms the next deadline
    /// when it returns true.
    pub fn refresh_due(&mut self, now_ms: u64) -> bool {
        let due = match self.last_attempt_ms {
            None => now_ms >= self.refresh_interval_ms,
            Some(last) => now_ms.saturating_sub(last) >= self.refresh_interval_ms,
        };
        if due {
            self.last_attempt_ms = Some(now_ms);
        }
        due
    }

    /// Project `(epoch, ms)` at `now_ms`. `fallback_epoch` is the time
    /// source's own unadjusted estimate, only used before the first anchor.
    pub fn project(&self, now_ms: u64, fallback_epoch: u64) -> Projection {
        match &self.anchor {
            Some(anchor) => Projection {
                epoch: anchor.projected_epoch(now_ms),
                millisecond: anchor.projected_millisecond(now_ms),
                precise: true,
            },
            None => Projection {
                epoch: fallback_epoch,
                millisecond: (now_ms % 1000) as u16,
                precise: false,
            },
        }
    }
}

impl Default for PrecisionClock {
    fn default() -> Self {
        Self::new(DEFAULT_REFRESH_INTERVAL_MS)
    }
}
