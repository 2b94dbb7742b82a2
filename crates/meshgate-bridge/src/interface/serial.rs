//! Serial transport for USB-attached mesh radios
//!
//! Opens the port with tokio-serial. When no device is configured,
//! [`detect_serial_port`] picks the only serial port on the system.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, info};

use super::stream::{Connector, StreamInterface};
use crate::config::DEFAULT_BAUD_RATE;
use crate::error::{GatewayError, Result};

/// Dials a radio over a serial port
#[derive(Debug, Clone)]
pub struct SerialConnector {
    port_path: PathBuf,
    baud_rate: u32,
}

impl SerialConnector {
    /// Open `port` at `baud_rate`
    pub fn new(port: impl AsRef<Path>, baud_rate: u32) -> Self {
        Self {
            port_path: port.as_ref().to_path_buf(),
            baud_rate,
        }
    }

    /// Get the port path
    pub fn port_path(&self) -> &Path {
        &self.port_path
    }
}

#[async_trait]
impl Connector for SerialConnector {
    type Stream = SerialStream;

    async fn connect(&self) -> Result<SerialStream> {
        if !self.port_path.exists() {
            return Err(GatewayError::PortNotFound(
                self.port_path.display().to_string(),
            ));
        }

        debug!(port = %self.port_path.display(), baud = self.baud_rate, "Opening serial port");
        tokio_serial::new(self.port_path.to_string_lossy(), self.baud_rate)
            .open_native_async()
            .map_err(|e| GatewayError::PortOpenFailed {
                port: self.port_path.display().to_string(),
                reason: e.to_string(),
            })
    }

    fn describe(&self) -> String {
        format!("serial:{}", self.port_path.display())
    }
}

/// Stream interface over a serial port
pub type SerialInterface = StreamInterface<SerialConnector>;

impl StreamInterface<SerialConnector> {
    /// Interface for the radio on `port`
    pub fn serial(port: impl AsRef<Path>, baud_rate: u32) -> Self {
        StreamInterface::new(SerialConnector::new(port, baud_rate))
    }

    /// Interface for the radio on `port` at the default baud rate
    pub fn serial_default(port: impl AsRef<Path>) -> Self {
        Self::serial(port, DEFAULT_BAUD_RATE)
    }
}

/// The only serial port present
///
/// Zero or several ports is [`GatewayError::PortNotFound`]; the operator
/// must then name the device in the configuration.
pub fn detect_serial_port() -> Result<PathBuf> {
    let ports = serialport::available_ports()?;
    match ports.as_slice() {
        [port] => {
            info!(port = %port.port_name, "Detected mesh radio serial port");
            Ok(PathBuf::from(&port.port_name))
        }
        [] => Err(GatewayError::PortNotFound(
            "no serial ports detected".to_string(),
        )),
        many => Err(GatewayError::PortNotFound(format!(
            "{} serial ports found ({}); set meshtastic_interface.device",
            many.len(),
            many.iter()
                .map(|p| p.port_name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ))),
    }
}
