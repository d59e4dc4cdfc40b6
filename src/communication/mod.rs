// src/communication/mod.rs - Collaborator interfaces at the edge of the relay
//
// The relay core only sees these traits; the host adapters live next to
// them and tests plug in in-memory fakes.

pub mod network;
pub mod serial;
pub mod sntp;

use async_trait::async_trait;

use crate::error::{LinkError, QueryError};
use crate::server_config::Address;

pub use network::RouteProbe;
pub use serial::SerialLink;
pub use sntp::SntpSource;

/// A byte-oriented duplex link (one UART).
#[async_trait]
pub trait ByteLink: Send {
    /// Copy whatever has already arrived into `buf` without waiting.
    /// Returns 0 when nothing is pending.
    async fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, LinkError>;

    async fn write_all(&mut self, bytes: &[u8]) -> Result<(), LinkError>;

    /// Wait until everything written has left the transmitter.
    async fn flush(&mut self) -> Result<(), LinkError>;
}

/// The time-query primitive: one request, one whole-second epoch.
#[async_trait]
pub trait TimeSource: Send {
    async fn query(&mut self, server: &Address) -> Result<u64, QueryError>;

    /// The source's own running estimate, without latency compensation.
    /// Zero before the first answer.
    fn last_known_epoch(&self) -> u64;
}

/// Link-layer status.
pub trait NetworkLink: Send {
    fn link_up(&mut self) -> bool;
}
