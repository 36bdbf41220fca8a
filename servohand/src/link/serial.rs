//! Serial port transport backed by the `serialport` crate.

use std::time::Duration;

use serialport::SerialPortType;
use tracing::debug;

use super::{Connector, LinkError, Transport};

/// Baud rate the servo firmware listens on.
pub const DEFAULT_BAUD: u32 = 9600;

/// Upper bound for a single frame write before it is treated as failed.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// Opens a serial device by path (e.g. `/dev/ttyACM0`, `COM8`).
#[derive(Debug, Clone)]
pub struct SerialConnector {
    path: String,
    baud: u32,
    timeout: Duration,
}

impl SerialConnector {
    pub fn new(path: impl Into<String>, baud: u32) -> Self {
        Self {
            path: path.into(),
            baud,
            timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }

    /// Read/write timeout applied to the opened port.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl Connector for SerialConnector {
    fn describe(&self) -> String {
        format!("{} @ {} bps", self.path, self.baud)
    }

    fn connect(&self) -> Result<Box<dyn Transport>, LinkError> {
        debug!("Opening serial port {} at {} bps", self.path, self.baud);
        let port = serialport::new(self.path.as_str(), self.baud)
            .timeout(self.timeout)
            .open()
            .map_err(|e| LinkError::Open {
                target: self.path.clone(),
                reason: e.to_string(),
            })?;
        Ok(Box::new(port))
    }
}

/// Serial ports visible to the OS, formatted as `path (kind)`.
pub fn list_ports() -> Result<Vec<String>, LinkError> {
    let ports = serialport::available_ports().map_err(|e| LinkError::Enumerate(e.to_string()))?;
    Ok(ports
        .into_iter()
        .map(|port| {
            let kind = match port.port_type {
                SerialPortType::UsbPort(usb) => format!(
                    "USB {:04x}:{:04x} {}",
                    usb.vid,
                    usb.pid,
                    usb.product.unwrap_or_default()
                ),
                SerialPortType::PciPort => "PCI".to_string(),
                SerialPortType::BluetoothPort => "Bluetooth".to_string(),
                SerialPortType::Unknown => "unknown".to_string(),
            };
            format!("{} ({})", port.port_name, kind.trim_end())
        })
        .collect())
}
