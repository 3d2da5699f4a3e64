//! Serial port transport
//!
//! USB/RS-232 connection to a controller via the `serialport` crate.
//! GRBL defaults: 115200 baud, 8 data bits, 1 stop bit, no parity.

use crate::communication::{Communicator, ConnectionDriver, ConnectionParams, SerialParity};
use carvekit_core::{ConnectionError, Result};
use std::io::{Read, Write};
use std::time::Duration;

/// Information about an available serial port
#[derive(Debug, Clone)]
pub struct SerialPortInfo {
    /// Port name (e.g., "/dev/ttyUSB0", "COM3")
    pub port_name: String,
    /// Port description (e.g., "USB Serial Port")
    pub description: String,
    /// Manufacturer name if available
    pub manufacturer: Option<String>,
    /// USB vendor ID if applicable
    pub vid: Option<u16>,
    /// USB product ID if applicable
    pub pid: Option<u16>,
}

/// List serial ports that look like CNC controllers
///
/// Filters to the usual controller patterns:
/// - Windows: COM*
/// - Linux: /dev/ttyUSB*, /dev/ttyACM*
/// - macOS: /dev/cu.usbserial-*, /dev/cu.usbmodem*
pub fn list_ports() -> Result<Vec<SerialPortInfo>> {
    let ports = serialport::available_ports().map_err(|e| {
        tracing::error!("Failed to enumerate serial ports: {}", e);
        ConnectionError::FailedToOpen {
            port: "<enumeration>".to_string(),
            reason: e.to_string(),
        }
    })?;

    Ok(ports
        .iter()
        .filter(|port| is_controller_port(&port.port_name))
        .map(|port| {
            let mut info = SerialPortInfo {
                port_name: port.port_name.clone(),
                description: describe_port(port),
                manufacturer: None,
                vid: None,
                pid: None,
            };
            if let serialport::SerialPortType::UsbPort(usb) = &port.port_type {
                info.manufacturer = usb.manufacturer.clone();
                info.vid = Some(usb.vid);
                info.pid = Some(usb.pid);
            }
            info
        })
        .collect())
}

fn is_controller_port(port_name: &str) -> bool {
    if port_name.starts_with("COM") && port_name[3..].chars().all(|c| c.is_ascii_digit()) {
        return true;
    }
    if port_name.starts_with("/dev/ttyUSB") || port_name.starts_with("/dev/ttyACM") {
        return true;
    }
    if port_name.starts_with("/dev/cu.usbserial-") || port_name.starts_with("/dev/cu.usbmodem") {
        return true;
    }
    false
}

fn describe_port(port: &serialport::SerialPortInfo) -> String {
    match &port.port_type {
        serialport::SerialPortType::UsbPort(usb) => format!(
            "USB {} {}",
            usb.manufacturer.as_deref().unwrap_or("Device"),
            usb.product.as_deref().unwrap_or("Serial Port")
        ),
        serialport::SerialPortType::BluetoothPort => "Bluetooth Serial".to_string(),
        serialport::SerialPortType::PciPort => "PCI Serial".to_string(),
        _ => "Serial Port".to_string(),
    }
}

fn to_serialport_parity(parity: SerialParity) -> serialport::Parity {
    match parity {
        SerialParity::None => serialport::Parity::None,
        SerialParity::Even => serialport::Parity::Even,
        SerialParity::Odd => serialport::Parity::Odd,
    }
}

/// Serial transport backed by the `serialport` crate
#[derive(Default)]
pub struct SerialCommunicator {
    port: Option<Box<dyn serialport::SerialPort>>,
    port_name: String,
}

impl SerialCommunicator {
    /// Create a new, unconnected serial communicator
    pub fn new() -> Self {
        Self::default()
    }
}

impl Communicator for SerialCommunicator {
    fn connect(&mut self, params: &ConnectionParams) -> Result<()> {
        if params.driver != ConnectionDriver::Serial {
            return Err(ConnectionError::InvalidParameters {
                reason: format!("serial communicator given {} driver", params.driver),
            }
            .into());
        }

        let builder = serialport::new(&params.port, params.baud_rate)
            // Short timeout so the receive loop never blocks sends for long
            .timeout(Duration::from_millis(params.timeout_ms))
            .data_bits(match params.data_bits {
                5 => serialport::DataBits::Five,
                6 => serialport::DataBits::Six,
                7 => serialport::DataBits::Seven,
                8 => serialport::DataBits::Eight,
                other => {
                    return Err(ConnectionError::InvalidParameters {
                        reason: format!("invalid data bits: {}", other),
                    }
                    .into())
                }
            })
            .stop_bits(match params.stop_bits {
                1 => serialport::StopBits::One,
                2 => serialport::StopBits::Two,
                other => {
                    return Err(ConnectionError::InvalidParameters {
                        reason: format!("invalid stop bits: {}", other),
                    }
                    .into())
                }
            })
            .parity(to_serialport_parity(params.parity))
            .flow_control(serialport::FlowControl::None);

        match builder.open() {
            Ok(port) => {
                self.port = Some(port);
                self.port_name = params.port.clone();
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Failed to open serial port {}: {}", params.port, e);
                Err(ConnectionError::FailedToOpen {
                    port: params.port.clone(),
                    reason: e.to_string(),
                }
                .into())
            }
        }
    }

    fn disconnect(&mut self) -> Result<()> {
        self.port = None;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.port.is_some()
    }

    fn send(&mut self, data: &[u8]) -> Result<usize> {
        let port = self.port.as_mut().ok_or(ConnectionError::NotOpen)?;
        port.write_all(data).map_err(|e| ConnectionError::SendFailed {
            reason: e.to_string(),
        })?;
        Ok(data.len())
    }

    fn receive(&mut self) -> Result<Vec<u8>> {
        let port = self.port.as_mut().ok_or(ConnectionError::NotOpen)?;
        let mut buf = [0u8; 256];
        match port.read(&mut buf) {
            Ok(n) => Ok(buf[..n].to_vec()),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(Vec::new()),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(Vec::new()),
            Err(e) => {
                tracing::warn!("Serial read failed on {}: {}", self.port_name, e);
                self.port = None;
                Err(ConnectionError::ConnectionLost {
                    reason: e.to_string(),
                }
                .into())
            }
        }
    }
}
