//! TCP transport for mesh radios with a network interface
//!
//! Network-capable radios expose the same framed stream API as the USB
//! serial port on TCP port 4403.

use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::debug;

use super::stream::{Connector, StreamInterface};
use crate::config::DEFAULT_MESH_TCP_PORT;
use crate::error::{GatewayError, Result};

/// Dials a radio over TCP
#[derive(Debug, Clone)]
pub struct TcpConnector {
    host: String,
    port: u16,
}

impl TcpConnector {
    /// Connect to `host:port`
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Connect to `host` on the default port
    pub fn with_default_port(host: impl Into<String>) -> Self {
        Self::new(host, DEFAULT_MESH_TCP_PORT)
    }
}

#[async_trait]
impl Connector for TcpConnector {
    type Stream = TcpStream;

    async fn connect(&self) -> Result<TcpStream> {
        let target = format!("{}:{}", self.host, self.port);
        debug!(%target, "Dialing mesh radio");
        let stream = TcpStream::connect(&target)
            .await
            .map_err(|e| GatewayError::ConnectFailed {
                target: target.clone(),
                reason: e.to_string(),
            })?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }

    fn describe(&self) -> String {
        format!("tcp:{}:{}", self.host, self.port)
    }
}

/// Stream interface over TCP
pub type TcpInterface = StreamInterface<TcpConnector>;

impl StreamInterface<TcpConnector> {
    /// Interface for the radio at `host:port`
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        StreamInterface::new(TcpConnector::new(host, port))
    }
}
