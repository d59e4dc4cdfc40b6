//! Tick-driven bounded retry.
//!
//! Nothing sleeps between attempts. The owner polls with the current time
//! each tick and runs the operation only when an attempt is due, so the
//! loop keeps servicing the watchdog and the serial links while waiting.

pub const DEFAULT_ATTEMPTS: u32 = 5;
pub const DEFAULT_DELAY_MS: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPoll {
    /// Not armed, or finished.
    Idle,
    Waiting,
    /// Run attempt number `attempt` (1-based) now.
    Due { attempt: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStep {
    Succeeded { attempt: u32 },
    Retrying { next_at_ms: u64 },
    /// Cap reached; the caller carries on degraded.
    Exhausted,
}

#[derive(Debug, Clone)]
pub struct BoundedRetry {
    max_attempts: u32,
    delay_ms: u64,
    attempts_made: u32,
    next_at_ms: Option<u64>,
}

impl BoundedRetry {
    pub fn new(max_attempts: u32, delay_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay_ms,
            attempts_made: 0,
            next_at_ms: None,
        }
    }

    /// Start a fresh round; the first attempt is due immediately.
    pub fn arm(&mut self, now_ms: u64) {
        self.attempts_made = 0;
        self.next_at_ms = Some(now_ms);
    }

    pub fn cancel(&mut self) {
        self.next_at_ms = None;
    }

    pub fn is_active(&self) -> bool {
        self.next_at_ms.is_some()
    }

    pub fn attempts_made(&self) -> u32 {
        self.attempts_made
    }

    pub fn poll(&self, now_ms: u64) -> RetryPoll {
        match self.next_at_ms {
            None => RetryPoll::Idle,
            Some(at) if now_ms >= at => RetryPoll::Due {
                attempt: self.attempts_made + 1,
            },
            Some(_) => RetryPoll::Waiting,
        }
    }

    /// Record the outcome of the attempt that [`poll`](Self::poll) reported
    /// as due.
    pub fn record(&mut self, success: bool, now_ms: u64) -> RetryStep {
        self.attempts_made += 1;
        if success {
            self.next_at_ms = None;
            return RetryStep::Succeeded {
                attempt: self.attempts_made,
            };
        }
        if self.attempts_made >= self.max_attempts {
            self.next_at_ms = None;
            return RetryStep::Exhausted;
        }
        let next_at_ms = now_ms + self.delay_ms;
        self.next_at_ms = Some(next_at_ms);
        RetryStep::Retrying { next_at_ms }
    }
}

impl Default for BoundedRetry {
    fn default() -> Self {
        Self::new(DEFAULT_ATTEMPTS, DEFAULT_DELAY_MS)
    }
}
