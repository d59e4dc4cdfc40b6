// src/protocol/mod.rs - Framed serial protocols (inbound config, outbound time)
pub mod checksum;
pub mod ingest;

pub use checksum::{FrameKind, OutboundFrame, checksum, encode, verify};
pub use ingest::{CompletedFragment, ConfigIngestor, FragmentTag, IngestOutcome};

/// Single status byte sent downstream in place of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusByte {
    /// No network link.
    NoNetwork,
    /// No valid time: missing configuration, no precise anchor, or an
    /// implausible epoch.
    NoTime,
}

impl StatusByte {
    pub fn as_byte(self) -> u8 {
        match self {
            StatusByte::NoNetwork => b'Y',
            StatusByte::NoTime => b'X',
        }
    }
}
