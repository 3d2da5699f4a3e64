//! TCP transport
//!
//! Raw socket connection to a networked controller (grblHAL ethernet,
//! FluidNC telnet). The wire protocol is identical to serial: newline
//! terminated text plus single real-time bytes.

use crate::communication::{Communicator, ConnectionDriver, ConnectionParams};
use carvekit_core::{ConnectionError, Result};
use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

/// TCP transport for telnet-style controller connections
#[derive(Default)]
pub struct TcpCommunicator {
    stream: Option<TcpStream>,
    endpoint: String,
}

impl TcpCommunicator {
    /// Create a new, unconnected TCP communicator
    pub fn new() -> Self {
        Self::default()
    }
}

impl Communicator for TcpCommunicator {
    fn connect(&mut self, params: &ConnectionParams) -> Result<()> {
        if params.driver != ConnectionDriver::Tcp {
            return Err(ConnectionError::InvalidParameters {
                reason: format!("tcp communicator given {} driver", params.driver),
            }
            .into());
        }

        let stream = TcpStream::connect(&params.port).map_err(|e| {
            tracing::warn!("Failed to connect to {}: {}", params.port, e);
            ConnectionError::FailedToOpen {
                port: params.port.clone(),
                reason: e.to_string(),
            }
        })?;

        stream
            .set_read_timeout(Some(Duration::from_millis(params.timeout_ms)))
            .map_err(|e| ConnectionError::FailedToOpen {
                port: params.port.clone(),
                reason: e.to_string(),
            })?;
        // Real-time bytes must not sit in Nagle's buffer
        stream.set_nodelay(true).ok();

        self.stream = Some(stream);
        self.endpoint = params.port.clone();
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.take() {
            stream.shutdown(std::net::Shutdown::Both).ok();
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn send(&mut self, data: &[u8]) -> Result<usize> {
        let stream = self.stream.as_mut().ok_or(ConnectionError::NotOpen)?;
        stream
            .write_all(data)
            .map_err(|e| ConnectionError::SendFailed {
                reason: e.to_string(),
            })?;
        Ok(data.len())
    }

    fn receive(&mut self) -> Result<Vec<u8>> {
        let stream = self.stream.as_mut().ok_or(ConnectionError::NotOpen)?;
        let mut buf = [0u8; 256];
        match stream.read(&mut buf) {
            // Remote closed the connection
            Ok(0) => {
                self.stream = None;
                Err(ConnectionError::ConnectionLost {
                    reason: "remote closed connection".to_string(),
                }
                .into())
            }
            Ok(n) => Ok(buf[..n].to_vec()),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(Vec::new()),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(Vec::new()),
            Err(e) => {
                tracing::warn!("TCP read failed on {}: {}", self.endpoint, e);
                self.stream = None;
                Err(ConnectionError::ConnectionLost {
                    reason: e.to_string(),
                }
                .into())
            }
        }
    }
}
