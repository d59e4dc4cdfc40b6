// src/communication/sntp.rs - Minimal one-shot SNTP query
//
// Only what the relay needs: send a client request, read the server's
// transmit timestamp, drop the fraction. Latency compensation happens in
// the precision clock, not here.

use async_trait::async_trait;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::time::timeout;

use super::TimeSource;
use crate::error::QueryError;
use crate::server_config::Address;

const PACKET_LEN: usize = 48;
/// Seconds between 1900-01-01 and 1970-01-01.
const NTP_UNIX_OFFSET: u64 = 2_208_988_800;
/// LI = 0, VN = 4, Mode = 3 (client).
const CLIENT_HEADER: u8 = 0x23;
const MODE_SERVER: u8 = 4;
const TRANSMIT_OFFSET: usize = 40;

#[derive(Debug)]
pub struct SntpSource {
    port: u16,
    timeout: Duration,
    last: Option<(u64, Instant)>,
}

impl SntpSource {
    pub fn new(port: u16, timeout: Duration) -> Self {
        Self {
            port,
            timeout,
            last: None,
        }
    }
}

/// Extract the Unix epoch seconds from a server reply.
pub fn parse_reply(reply: &[u8]) -> Result<u64, QueryError> {
    if reply.len() < PACKET_LEN {
        return Err(QueryError::Malformed(format!("{} byte reply", reply.len())));
    }
    let mode = reply[0] & 0x07;
    if mode != MODE_SERVER {
        return Err(QueryError::Malformed(format!("mode {}", mode)));
    }
    let stratum = reply[1];
    if stratum == 0 {
        return Err(QueryError::Malformed("kiss-of-death reply".to_string()));
    }
    let mut secs = [0u8; 4];
    secs.copy_from_slice(&reply[TRANSMIT_OFFSET..TRANSMIT_OFFSET + 4]);
    let ntp_secs = u64::from(u32::from_be_bytes(secs));
    ntp_secs
        .checked_sub(NTP_UNIX_OFFSET)
        .ok_or_else(|| QueryError::Malformed(format!("transmit time {} before 1970", ntp_secs)))
}

#[async_trait]
impl TimeSource for SntpSource {
    async fn query(&mut self, server: &Address) -> Result<u64, QueryError> {
        if server.is_empty() {
            return Err(QueryError::NoServer);
        }
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        let mut request = [0u8; PACKET_LEN];
        request[0] = CLIENT_HEADER;
        socket.send_to(&request, (server.as_str(), self.port)).await?;

        let mut reply = [0u8; PACKET_LEN];
        let wait_ms = self.timeout.as_millis() as u64;
        let (n, _) = timeout(self.timeout, socket.recv_from(&mut reply))
            .await
            .map_err(|_| QueryError::Timeout(wait_ms))??;
        let epoch = parse_reply(&reply[..n])?;
        self.last = Some((epoch, Instant::now()));
        tracing::debug!("SNTP reply from {}: epoch {}", server, epoch);
        Ok(epoch)
    }

    fn last_known_epoch(&self) -> u64 {
        match self.last {
            Some((epoch, at)) => epoch + at.elapsed().as_secs(),
            None => 0,
        }
    }
}
