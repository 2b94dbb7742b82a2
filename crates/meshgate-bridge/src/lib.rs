//! APRS-IS ↔ mesh radio gateway
//!
//! This crate connects a mesh radio (over serial or TCP) with the APRS-IS
//! network. Licensed operators register their mesh device under a call sign
//! and can then exchange APRS messages from the mesh.
//!
//! # Architecture
//!
//! The gateway operates in three layers:
//!
//! 1. **Physical Interface** - Serial/TCP stream to the radio, framed protobufs
//! 2. **Registry** - device id ↔ call sign bindings (`meshgate-registry`)
//! 3. **Routing** - [`Gateway`] turns mesh commands into APRS traffic and back
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use meshgate_aprs::AprsClient;
//! use meshgate_bridge::{interface, Gateway, GatewayConfig};
//! use meshgate_registry::Registry;
//!
//! let config = GatewayConfig::load("meshgate.yaml".as_ref())?;
//! let registry = Registry::open_with(config.data_dir(), config.registry_options()).await?;
//! let mesh = interface::from_config(&config.meshtastic_interface)?;
//!
//! let mut gateway = Gateway::start(&config, mesh, registry, |filter| {
//!     AprsClient::spawn(config.aprs_client_config(filter))
//! })
//! .await?;
//! gateway.run().await;
//! ```
//!
//! # Features
//!
//! - `serial` - Serial port interface (requires `libudev-dev` on Linux)
//!
//! # Message Flow
//!
//! ## Mesh → APRS-IS
//!
//! 1. The radio task decodes a `FromRadio` frame into a [`MeshPacket`]
//! 2. The gateway classifies direct text with [`MeshCommand`]
//! 3. Registered senders' messages and positions are formatted and sent
//!
//! ## APRS-IS → Mesh
//!
//! 1. The APRS-IS client parses a line into an `AprsPacket`
//! 2. Messages are acked, retransmissions suppressed
//! 3. The addressee's call sign is resolved to a device and texted
//!
//! # Protocol Details
//!
//! The radio stream API frames every protobuf:
//! - Bytes 0-1: Magic number `0x94C3`
//! - Bytes 2-3: Payload length (big-endian u16)
//! - Bytes 4+: Protobuf payload

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

// Transport
pub mod config;
pub mod error;
pub mod interface;
pub mod packet;

// Routing helpers
pub mod cache;
pub mod commands;
pub mod watchdog;

// Run loop
pub mod bridge;

// Testing utilities
pub mod test_utils;

pub use config::{
    AprsIsConfig, BeaconConfig, GatewayConfig, GatewayConfigBuilder, InterfaceConfig,
    MessageLimits, RegistrySettings, WatchdogConfig,
};
pub use error::{ConfigError, GatewayError, Result};
pub use interface::{ConnectionState, LocalNode, MeshInterface, NodeRecord, StreamInterface};

#[cfg(feature = "serial")]
pub use interface::SerialInterface;
pub use interface::TcpInterface;

pub use cache::{RetransmissionCache, RetransmissionKey};
pub use commands::MeshCommand;
pub use packet::{GeoPoint, MeshPacket, Payload, Port, BROADCAST_ID, BROADCAST_NUM};
pub use watchdog::{Watchdog, WatchdogVerdict};

pub use bridge::{
    filter_expression, initial_filter, Gateway, GatewayStats, NO_CALL_SIGN, NO_DEVICE_ID,
    REGISTRATION_BEACON,
};

pub use test_utils::{MockAprsLink, MockMeshInterface, SentText};

pub use config::{DEFAULT_BAUD_RATE, DEFAULT_MESH_TCP_PORT};
pub use interface::frame::{FRAME_MAGIC, MAX_FRAME_LEN};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_constants() {
        assert_eq!(FRAME_MAGIC, 0x94C3);
        assert_eq!(MAX_FRAME_LEN, 512);
        assert_eq!(DEFAULT_BAUD_RATE, 115200);
        assert_eq!(DEFAULT_MESH_TCP_PORT, 4403);
        assert_eq!(REGISTRATION_BEACON, "MESHID-01");
    }
}
