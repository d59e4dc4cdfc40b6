// src/scheduler/delivery.rs - Once-per-second timed frame delivery
use chrono::{DateTime, Datelike, Timelike};

use crate::clock::Projection;
use crate::protocol::checksum::{FrameKind, OutboundFrame, PAYLOAD_LEN, encode};

pub const DEFAULT_TARGET_MS: u16 = 50;
pub const DEFAULT_TOLERANCE_MS: u16 = 5;
pub const DEFAULT_STATUS_INTERVAL_MS: u64 = 1000;

/// Emits one frame per second, alternating date and time, only while the
/// projected millisecond sits inside `target ± tolerance`.
#[derive(Debug, Clone)]
pub struct DeliveryScheduler {
    target_ms: u16,
    tolerance_ms: u16,
    utc_offset_secs: i64,
    last_sent_epoch: Option<u64>,
    next_kind: FrameKind,
}

impl DeliveryScheduler {
    pub fn new(target_ms: u16, tolerance_ms: u16, utc_offset_secs: i64) -> Self {
        Self {
            target_ms,
            tolerance_ms,
            utc_offset_secs,
            last_sent_epoch: None,
            next_kind: FrameKind::Date,
        }
    }

    pub fn in_window(&self, millisecond: u16) -> bool {
        let low = self.target_ms.saturating_sub(self.tolerance_ms);
        let high = self.target_ms.saturating_add(self.tolerance_ms);
        (low..=high).contains(&millisecond)
    }

    pub fn next_kind(&self) -> FrameKind {
        self.next_kind
    }

    pub fn last_sent_epoch(&self) -> Option<u64> {
        self.last_sent_epoch
    }

    pub fn target_ms(&self) -> u16 {
        self.target_ms
    }

    pub fn tolerance_ms(&self) -> u16 {
        self.tolerance_ms
    }

    /// Evaluate one tick. Outside the window, or in a second that already
    /// had its frame, this is a no-op.
    pub fn tick(&mut self, projection: Projection) -> Option<OutboundFrame> {
        if !self.in_window(projection.millisecond) {
            return None;
        }
        if self.last_sent_epoch == Some(projection.epoch) {
            return None;
        }
        self.last_sent_epoch = Some(projection.epoch);
        let kind = self.next_kind;
        self.next_kind = kind.flipped();

        let frame = self.build_frame(kind, projection.epoch);
        tracing::debug!(
            "Sync target: {}ms | actual: {}ms | deviation: {}ms",
            self.target_ms,
            projection.millisecond,
            i32::from(projection.millisecond) - i32::from(self.target_ms)
        );
        frame
    }

    /// Render `epoch` (shifted to local time) as a frame of `kind`.
    pub fn build_frame(&self, kind: FrameKind, epoch: u64) -> Option<OutboundFrame> {
        let local = i64::try_from(epoch).ok()?.checked_add(self.utc_offset_secs)?;
        let time = DateTime::from_timestamp(local, 0)?;
        let (a, b, c) = match kind {
            FrameKind::Date => (time.day(), time.month(), time.year().rem_euclid(100) as u32),
            FrameKind::Time => (time.hour(), time.minute(), time.second()),
        };
        let text = format!("{:02}{:02}{:02}", a, b, c);
        let payload: [u8; PAYLOAD_LEN] = text.as_bytes().try_into().ok()?;
        encode(kind, payload)
    }
}

impl Default for DeliveryScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_TARGET_MS, DEFAULT_TOLERANCE_MS, 0)
    }
}

/// Rate limit for the single-byte status substitute.
#[derive(Debug, Clone)]
pub struct StatusThrottle {
    interval_ms: u64,
    last_sent_ms: Option<u64>,
}

impl StatusThrottle {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            last_sent_ms: None,
        }
    }

    /// True at most once per interval; records the send when it returns
    /// true.
    pub fn poll(&mut self, now_ms: u64) -> bool {
        let ready = self
            .last_sent_ms
            .is_none_or(|last| now_ms.saturating_sub(last) >= self.interval_ms);
        if ready {
            self.last_sent_ms = Some(now_ms);
        }
        ready
    }
}

impl Default for StatusThrottle {
    fn default() -> Self {
        Self::new(DEFAULT_STATUS_INTERVAL_MS)
    }
}
