//! Transport abstraction for controller connections
//!
//! A `Communicator` is a bidirectional byte stream to a controller. Serial
//! and TCP implementations are built in; host platforms (e.g. an Android
//! shell providing Bluetooth RFCOMM or WebSocket links) inject their own
//! implementation of the same trait. Discovery and pairing are the host's
//! concern, not this crate's.
//!
//! Only one connection is active per session; reconnecting tears the
//! previous connection down first.

pub mod serial;
pub mod tcp;

use carvekit_core::{ConnectionError, Result};
use parking_lot::Mutex;

/// Connection driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionDriver {
    /// USB/RS-232 serial port
    #[default]
    Serial,
    /// Raw TCP socket (telnet-style line protocol)
    Tcp,
    /// WebSocket text frames (implementation injected by the host)
    WebSocket,
    /// Bluetooth RFCOMM / serial port profile (implementation injected by the host)
    BluetoothRfcomm,
}

impl std::fmt::Display for ConnectionDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Serial => write!(f, "serial"),
            Self::Tcp => write!(f, "tcp"),
            Self::WebSocket => write!(f, "websocket"),
            Self::BluetoothRfcomm => write!(f, "bluetooth"),
        }
    }
}

/// Serial parity setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SerialParity {
    /// No parity bit
    #[default]
    None,
    /// Even parity
    Even,
    /// Odd parity
    Odd,
}

/// Parameters for opening a connection
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionParams {
    /// Driver to use
    pub driver: ConnectionDriver,
    /// Port name (`/dev/ttyUSB0`, `COM3`) or `host:port` for TCP
    pub port: String,
    /// Baud rate (serial only)
    pub baud_rate: u32,
    /// Data bits (serial only)
    pub data_bits: u8,
    /// Stop bits (serial only)
    pub stop_bits: u8,
    /// Parity (serial only)
    pub parity: SerialParity,
    /// Read timeout for the receive loop, in milliseconds
    pub timeout_ms: u64,
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            driver: ConnectionDriver::Serial,
            port: String::new(),
            baud_rate: 115_200,
            data_bits: 8,
            stop_bits: 1,
            parity: SerialParity::None,
            timeout_ms: 10,
        }
    }
}

impl ConnectionParams {
    /// Parameters for a serial connection with GRBL defaults (115200 8-N-1)
    pub fn serial(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            ..Default::default()
        }
    }

    /// Parameters for a TCP connection (`host:port`)
    pub fn tcp(endpoint: impl Into<String>) -> Self {
        Self {
            driver: ConnectionDriver::Tcp,
            port: endpoint.into(),
            ..Default::default()
        }
    }
}

/// Bidirectional byte-stream connection to a controller
///
/// `receive` is expected to return quickly: implementations use a short
/// read timeout and return an empty buffer when no data is available, so
/// the caller's read loop can interleave with sends.
pub trait Communicator: Send {
    /// Open the connection
    fn connect(&mut self, params: &ConnectionParams) -> Result<()>;

    /// Close the connection
    fn disconnect(&mut self) -> Result<()>;

    /// Check whether the connection is open
    fn is_connected(&self) -> bool;

    /// Write raw bytes, returning the number written
    fn send(&mut self, data: &[u8]) -> Result<usize>;

    /// Read whatever bytes are available (empty when none)
    fn receive(&mut self) -> Result<Vec<u8>>;
}

/// No-op communicator used for wiring and tests
#[derive(Debug, Default)]
pub struct NoOpCommunicator {
    connected: bool,
}

impl NoOpCommunicator {
    /// Create a new no-op communicator
    pub fn new() -> Self {
        Self::default()
    }
}

impl Communicator for NoOpCommunicator {
    fn connect(&mut self, _params: &ConnectionParams) -> Result<()> {
        self.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        self.connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn send(&mut self, data: &[u8]) -> Result<usize> {
        Ok(data.len())
    }

    fn receive(&mut self) -> Result<Vec<u8>> {
        Ok(Vec::new())
    }
}

/// Shared handle over a `Communicator`
///
/// Serializes all writers (queued lines, single commands, real-time bytes)
/// through one lock so their relative order on the wire is deterministic.
pub struct TransportHandle {
    inner: Mutex<Box<dyn Communicator>>,
}

impl TransportHandle {
    /// Wrap a communicator in a shared handle
    pub fn new(communicator: Box<dyn Communicator>) -> Self {
        Self {
            inner: Mutex::new(communicator),
        }
    }

    /// Open the underlying connection
    pub fn connect(&self, params: &ConnectionParams) -> Result<()> {
        self.inner.lock().connect(params)
    }

    /// Close the underlying connection
    pub fn disconnect(&self) -> Result<()> {
        self.inner.lock().disconnect()
    }

    /// Check whether the connection is open
    pub fn is_connected(&self) -> bool {
        self.inner.lock().is_connected()
    }

    /// Send a text line, appending the `\n` terminator
    pub fn send_line(&self, line: &str) -> Result<()> {
        let mut guard = self.inner.lock();
        if !guard.is_connected() {
            return Err(ConnectionError::NotOpen.into());
        }
        guard.send(line.as_bytes())?;
        guard.send(b"\n")?;
        Ok(())
    }

    /// Send a single real-time byte (no terminator)
    pub fn send_byte(&self, byte: u8) -> Result<()> {
        let mut guard = self.inner.lock();
        if !guard.is_connected() {
            return Err(ConnectionError::NotOpen.into());
        }
        guard.send(&[byte])?;
        Ok(())
    }

    /// Read whatever bytes are available
    pub fn receive_chunk(&self) -> Result<Vec<u8>> {
        self.inner.lock().receive()
    }
}
