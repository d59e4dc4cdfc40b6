// src/lib.rs - ntp-relay: network time to a downstream MCU over UART
pub mod clock;
pub mod communication;
pub mod config;
pub mod console;
pub mod error;
pub mod failover;
pub mod hardware;
pub mod protocol;
pub mod relay;
pub mod scheduler;
pub mod server_config;
pub mod storage;
pub mod watchdog;

pub use error::RelayError;
pub use relay::{LoopControl, Relay, RelayParts};
