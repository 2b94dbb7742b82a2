//! Mesh radio transports
//!
//! The gateway talks to the radio through [`MeshInterface`]. One
//! implementation, [`StreamInterface`], speaks the radio stream API over any
//! byte stream; the connectors pick the stream:
//!
//! - [`TcpConnector`] - radios with network, `host:4403`
//! - [`SerialConnector`] - USB serial (requires `serial` feature)
//!
//! # Feature Requirements
//!
//! - `serial`: Requires `libudev-dev` and `pkg-config` on Linux
//!   ```bash
//!   # Ubuntu/Debian
//!   apt install libudev-dev pkg-config
//!   ```

pub mod frame;
#[allow(missing_docs)]
pub mod proto;
mod stream;
mod tcp;

#[cfg(feature = "serial")]
mod serial;

#[cfg(feature = "serial")]
pub use serial::{detect_serial_port, SerialConnector, SerialInterface};
pub use stream::{Connector, StreamInterface};
pub use tcp::{TcpConnector, TcpInterface};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::config::InterfaceConfig;
use crate::error::{GatewayError, Result};
use crate::packet::{GeoPoint, MeshPacket};

/// The radio as seen by the gateway
///
/// Received packets are pushed to the subscribed sink from the transport's
/// own task; everything else is called from the gateway loop.
#[async_trait]
pub trait MeshInterface: Send + Sync {
    /// Connect and wait for the radio to report its identity
    async fn open(&mut self) -> Result<()>;

    /// Disconnect; packets stop flowing until the next `open`
    async fn close(&mut self) -> Result<()>;

    /// True while the underlying stream is usable
    fn is_open(&self) -> bool;

    /// Deliver every decoded packet to `sink`
    fn subscribe(&mut self, sink: mpsc::UnboundedSender<MeshPacket>);

    /// Stop delivering packets
    fn unsubscribe(&mut self);

    /// The attached radio's identity and last known position
    fn local_node(&self) -> Option<LocalNode>;

    /// Snapshot of the radio's node database
    fn nodes(&self) -> Vec<NodeRecord>;

    /// Queue a text message; returns without waiting for transmission
    fn send_text(&self, text: &str, destination: &str, want_ack: bool) -> Result<()>;

    /// Get the interface name (for logging)
    fn name(&self) -> &str;
}

#[async_trait]
impl<T: MeshInterface + ?Sized> MeshInterface for Box<T> {
    async fn open(&mut self) -> Result<()> {
        (**self).open().await
    }

    async fn close(&mut self) -> Result<()> {
        (**self).close().await
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn subscribe(&mut self, sink: mpsc::UnboundedSender<MeshPacket>) {
        (**self).subscribe(sink)
    }

    fn unsubscribe(&mut self) {
        (**self).unsubscribe()
    }

    fn local_node(&self) -> Option<LocalNode> {
        (**self).local_node()
    }

    fn nodes(&self) -> Vec<NodeRecord> {
        (**self).nodes()
    }

    fn send_text(&self, text: &str, destination: &str, want_ack: bool) -> Result<()> {
        (**self).send_text(text, destination, want_ack)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Identity of the attached radio
#[derive(Debug, Clone, PartialEq)]
pub struct LocalNode {
    /// Node number
    pub num: u32,
    /// Node id, `!%08x`
    pub id: String,
    /// Last known position
    pub position: Option<GeoPoint>,
}

/// Node database entry
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRecord {
    /// Node number
    pub num: u32,
    /// Node id, `!%08x`
    pub id: String,
    /// Long name from the node's user info
    pub long_name: Option<String>,
    /// When the node was last heard
    pub last_heard: Option<DateTime<Utc>>,
    /// Last known position
    pub position: Option<GeoPoint>,
}

/// Connection state for interfaces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected
    Disconnected,
    /// Stream open, waiting for the configuration dump
    Connecting,
    /// Configuration received, packets flowing
    Connected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
        }
    }
}

/// Build the transport named by the configuration
///
/// A serial interface without a device uses the only serial port present;
/// none or several is [`GatewayError::PortNotFound`].
pub fn from_config(config: &InterfaceConfig) -> Result<Box<dyn MeshInterface>> {
    match config {
        InterfaceConfig::Tcp { host, port } => Ok(Box::new(TcpInterface::tcp(host.clone(), *port))),
        #[cfg(feature = "serial")]
        InterfaceConfig::Serial { device, baud_rate } => {
            let device = match device {
                Some(device) => device.clone(),
                None => detect_serial_port()?,
            };
            Ok(Box::new(SerialInterface::serial(device, *baud_rate)))
        }
        #[cfg(not(feature = "serial"))]
        InterfaceConfig::Serial { .. } => Err(GatewayError::PortNotFound(
            "serial support not compiled in (enable the `serial` feature or use a tcp interface)"
                .to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_state_display() {
        assert_eq!(ConnectionState::Connected.to_string(), "connected");
        assert_eq!(ConnectionState::Disconnected.to_string(), "disconnected");
    }

    #[test]
    fn test_from_config_tcp() {
        let iface = from_config(&InterfaceConfig::Tcp {
            host: "radio.local".to_string(),
            port: 4403,
        })
        .unwrap();
        assert_eq!(iface.name(), "tcp:radio.local:4403");
        assert!(!iface.is_open());
    }
}
