// src/failover.rs - Primary/secondary time server selection
use crate::server_config::{Address, ServerConfig};

pub const DEFAULT_FAIL_THRESHOLD: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveServer {
    Primary,
    Secondary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailoverState {
    pub active: ActiveServer,
    pub primary_fail_count: u32,
    pub secondary_fail_count: u32,
}

impl Default for FailoverState {
    fn default() -> Self {
        Self {
            active: ActiveServer::Primary,
            primary_fail_count: 0,
            secondary_fail_count: 0,
        }
    }
}

/// What a recorded query failure did to the selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailoverEvent {
    /// Counter incremented, still below threshold.
    Counted,
    SwitchedToSecondary,
    SwitchedToPrimary,
    /// Primary hit the threshold with nothing to fall back to; its counter
    /// was reset instead.
    NoSecondary,
    /// No configuration, nothing to count against.
    Unconfigured,
}

/// Owns the configuration together with its failover counters so both are
/// always replaced as one unit.
#[derive(Debug, Clone)]
pub struct ServerFailoverManager {
    config: Option<ServerConfig>,
    state: FailoverState,
    threshold: u32,
}

impl ServerFailoverManager {
    pub fn new(threshold: u32) -> Self {
        Self {
            config: None,
            state: FailoverState::default(),
            threshold: threshold.max(1),
        }
    }

    pub fn with_config(threshold: u32, config: ServerConfig) -> Self {
        let mut manager = Self::new(threshold);
        manager.apply_config(config);
        manager
    }

    /// A fresh configuration is trusted immediately: back to the primary
    /// with both counters cleared.
    pub fn apply_config(&mut self, config: ServerConfig) {
        tracing::info!("Applying server configuration, primary {}", config.primary());
        self.config = Some(config);
        self.state = FailoverState::default();
    }

    pub fn record_success(&mut self) {
        match self.state.active {
            ActiveServer::Primary => self.state.primary_fail_count = 0,
            ActiveServer::Secondary => self.state.secondary_fail_count = 0,
        }
    }

    pub fn record_failure(&mut self) -> FailoverEvent {
        let Some(config) = &self.config else {
            return FailoverEvent::Unconfigured;
        };
        match self.state.active {
            ActiveServer::Primary => {
                self.state.primary_fail_count += 1;
                if self.state.primary_fail_count < self.threshold {
                    return FailoverEvent::Counted;
                }
                match config.usable_secondary() {
                    Some(secondary) => {
                        tracing::warn!(
                            "Primary failed {} times, switching to secondary {}",
                            self.state.primary_fail_count,
                            secondary
                        );
                        self.state = FailoverState {
                            active: ActiveServer::Secondary,
                            ..FailoverState::default()
                        };
                        FailoverEvent::SwitchedToSecondary
                    }
                    None => {
                        tracing::warn!("Primary failed {} times but no secondary is configured", self.state.primary_fail_count);
                        self.state.primary_fail_count = 0;
                        FailoverEvent::NoSecondary
                    }
                }
            }
            ActiveServer::Secondary => {
                self.state.secondary_fail_count += 1;
                if self.state.secondary_fail_count < self.threshold {
                    return FailoverEvent::Counted;
                }
                tracing::warn!(
                    "Secondary failed {} times, returning to primary {}",
                    self.state.secondary_fail_count,
                    config.primary()
                );
                self.state = FailoverState::default();
                FailoverEvent::SwitchedToPrimary
            }
        }
    }

    pub fn current_server(&self) -> Option<&Address> {
        let config = self.config.as_ref()?;
        match self.state.active {
            ActiveServer::Primary => Some(config.primary()),
            ActiveServer::Secondary => config.secondary(),
        }
    }

    pub fn has_valid_config(&self) -> bool {
        self.config.is_some()
    }

    pub fn config(&self) -> Option<&ServerConfig> {
        self.config.as_ref()
    }

    pub fn state(&self) -> FailoverState {
        self.state
    }
}
