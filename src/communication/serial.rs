// src/communication/serial.rs - UART links over serial2-tokio
use async_trait::async_trait;
use serial2_tokio::SerialPort;
use std::time::Duration;
use tokio::time::timeout;

use super::ByteLink;
use crate::error::LinkError;

/// One opened serial port.
pub struct SerialLink {
    name: String,
    port: SerialPort,
}

impl SerialLink {
    pub fn open(port_name: &str, baud_rate: u32) -> Result<Self, LinkError> {
        tracing::info!("Opening serial link {} at {} baud", port_name, baud_rate);
        let port = SerialPort::open(port_name, baud_rate)?;
        Ok(Self {
            name: port_name.to_string(),
            port,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Paths of the serial ports the OS knows about.
    pub fn available_ports() -> Vec<String> {
        match SerialPort::available_ports() {
            Ok(paths) => paths.iter().map(|p| p.display().to_string()).collect(),
            Err(_) => vec![],
        }
    }
}

#[async_trait]
impl ByteLink for SerialLink {
    async fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, LinkError> {
        // A zero timeout still polls the read once, so pending bytes come
        // through and an idle line returns immediately.
        match timeout(Duration::ZERO, self.port.read(buf)).await {
            Ok(Ok(n)) => Ok(n),
            Ok(Err(e))
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
                ) =>
            {
                Ok(0)
            }
            Ok(Err(e)) => {
                tracing::error!("Serial read error on {}: {}", self.name, e);
                Err(e.into())
            }
            Err(_) => Ok(0),
        }
    }

    async fn write_all(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        let mut written = 0;
        while written < bytes.len() {
            match self.port.write(&bytes[written..]).await? {
                0 => return Err(LinkError::Closed),
                n => written += n,
            }
        }
        tracing::trace!("Serial TX {} bytes on {}", bytes.len(), self.name);
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), LinkError> {
        tokio::io::AsyncWriteExt::flush(&mut self.port).await?;
        Ok(())
    }
}

impl std::fmt::Debug for SerialLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialLink").field("name", &self.name).finish()
    }
}
