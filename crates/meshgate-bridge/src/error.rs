//! Error types for gateway operations
//!
//! [`GatewayError`] covers the mesh transport, the stream framing and the
//! run loop. [`ConfigError`] covers loading `meshgate.yaml`.

use std::path::PathBuf;

use meshgate_aprs::AprsError;
use meshgate_registry::RegistryError;
use thiserror::Error;

/// Main error type for gateway operations
#[derive(Error, Debug)]
pub enum GatewayError {
    // ===== Interface Errors =====
    /// No mesh device given and none could be detected
    #[error("No mesh device found: {0}")]
    PortNotFound(String),

    /// Serial port open failed
    #[error("Failed to open serial port {port}: {reason}")]
    PortOpenFailed {
        /// Port path
        port: String,
        /// Failure reason
        reason: String,
    },

    /// TCP connection to a networked radio failed
    #[error("Failed to connect to {target}: {reason}")]
    ConnectFailed {
        /// host:port
        target: String,
        /// Failure reason
        reason: String,
    },

    /// Stream closed by the device
    #[error("Mesh device disconnected")]
    Disconnected,

    /// Operation needs an open interface
    #[error("Mesh interface is not open")]
    NotConnected,

    /// Device did not finish its configuration handshake in time
    #[error("Connection timeout after {duration_ms}ms")]
    ConnectionTimeout {
        /// Timeout duration in milliseconds
        duration_ms: u64,
    },

    // ===== Protocol Errors =====
    /// Invalid magic number in frame header
    #[error("Invalid magic number: expected 0x94C3, got 0x{got:04X}")]
    InvalidMagic {
        /// The received magic number
        got: u16,
    },

    /// Frame longer than the protocol allows
    #[error("Frame too large: {len} bytes exceeds maximum of {max} bytes")]
    FrameTooLarge {
        /// Declared or actual length
        len: usize,
        /// Maximum allowed length
        max: usize,
    },

    /// Protobuf decode error
    #[error("Protobuf decode error: {0}")]
    ProtobufDecode(String),

    /// Protobuf encode error
    #[error("Protobuf encode error: {0}")]
    ProtobufEncode(String),

    /// Invalid packet contents
    #[error("Invalid packet: {0}")]
    InvalidPacket(String),

    /// Invalid node id text
    #[error("Invalid node ID format: {0}")]
    InvalidNodeId(String),

    // ===== Gateway Errors =====
    /// Device never reported its own node identity
    #[error("Mesh device did not report its node identity")]
    NoLocalNode,

    /// Registry failure
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// APRS-IS failure
    #[error("APRS-IS error: {0}")]
    Aprs(#[from] AprsError),

    /// A run-loop step panicked
    #[error("Handler panicked: {0}")]
    HandlerPanicked(String),

    // ===== General Errors =====
    /// Channel send error
    #[error("Channel send error: {0}")]
    ChannelError(String),

    /// Channel closed
    #[error("Channel closed")]
    ChannelClosed,

    /// IO error wrapper
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl GatewayError {
    /// Check if this error is recoverable/retriable
    pub fn is_retriable(&self) -> bool {
        match self {
            GatewayError::ConnectionTimeout { .. }
            | GatewayError::ConnectFailed { .. }
            | GatewayError::Disconnected
            | GatewayError::NotConnected
            | GatewayError::PortOpenFailed { .. }
            | GatewayError::Io(_) => true,
            GatewayError::Aprs(e) => e.is_retriable(),
            _ => false,
        }
    }

    /// Check if this is a protocol error (bad data from device)
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            GatewayError::InvalidMagic { .. }
                | GatewayError::FrameTooLarge { .. }
                | GatewayError::ProtobufDecode(_)
                | GatewayError::InvalidPacket(_)
        )
    }

    /// Get an error code for logging
    pub fn error_code(&self) -> &'static str {
        match self {
            GatewayError::PortNotFound(_) => "PORT_NOT_FOUND",
            GatewayError::PortOpenFailed { .. } => "PORT_OPEN_FAILED",
            GatewayError::ConnectFailed { .. } => "CONNECT_FAILED",
            GatewayError::Disconnected => "DISCONNECTED",
            GatewayError::NotConnected => "NOT_CONNECTED",
            GatewayError::ConnectionTimeout { .. } => "CONNECTION_TIMEOUT",
            GatewayError::InvalidMagic { .. } => "INVALID_MAGIC",
            GatewayError::FrameTooLarge { .. } => "FRAME_TOO_LARGE",
            GatewayError::ProtobufDecode(_) => "PROTOBUF_DECODE",
            GatewayError::ProtobufEncode(_) => "PROTOBUF_ENCODE",
            GatewayError::InvalidPacket(_) => "INVALID_PACKET",
            GatewayError::InvalidNodeId(_) => "INVALID_NODE_ID",
            GatewayError::NoLocalNode => "NO_LOCAL_NODE",
            GatewayError::Registry(_) => "REGISTRY_ERROR",
            GatewayError::Aprs(_) => "APRS_ERROR",
            GatewayError::HandlerPanicked(_) => "HANDLER_PANICKED",
            GatewayError::ChannelError(_) => "CHANNEL_ERROR",
            GatewayError::ChannelClosed => "CHANNEL_CLOSED",
            GatewayError::Io(_) => "IO_ERROR",
        }
    }
}

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

// Conversion from prost decode error
impl From<prost::DecodeError> for GatewayError {
    fn from(err: prost::DecodeError) -> Self {
        GatewayError::ProtobufDecode(err.to_string())
    }
}

// Conversion from prost encode error
impl From<prost::EncodeError> for GatewayError {
    fn from(err: prost::EncodeError) -> Self {
        GatewayError::ProtobufEncode(err.to_string())
    }
}

// Conversion from serialport error (only when serial feature is enabled)
#[cfg(feature = "serial")]
impl From<serialport::Error> for GatewayError {
    fn from(err: serialport::Error) -> Self {
        match err.kind {
            serialport::ErrorKind::NoDevice => GatewayError::PortNotFound(err.description),
            serialport::ErrorKind::Io(kind) => {
                GatewayError::Io(std::io::Error::new(kind, err.description))
            }
            _ => GatewayError::PortOpenFailed {
                port: String::new(),
                reason: err.description,
            },
        }
    }
}

// Conversion from tokio mpsc send error
impl<T> From<tokio::sync::mpsc::error::SendError<T>> for GatewayError {
    fn from(err: tokio::sync::mpsc::error::SendError<T>) -> Self {
        GatewayError::ChannelError(err.to_string())
    }
}

/// Errors raised while loading the configuration file
#[derive(Error, Debug)]
pub enum ConfigError {
    /// No configuration existed; a sample was written for the operator
    #[error(
        "No 'meshgate.yaml' file was found.\nA sample configuration was written to '{}'\nBE SURE TO EDIT THIS FILE BEFORE PROCEEDING.\nAt the very least, edit the 'call_sign' and 'aprsis_passcode' values!",
        path.display()
    )]
    SampleWritten {
        /// Where the sample was written
        path: PathBuf,
    },

    /// The configuration still carries the sample call sign
    #[error(
        "'{}' appears to be the sample config.\nBE SURE TO EDIT THIS FILE BEFORE PROCEEDING.\nAt the very least, edit the 'call_sign' and 'aprsis_passcode' values!",
        path.display()
    )]
    SampleConfig {
        /// Offending file
        path: PathBuf,
    },

    /// A value failed validation
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// YAML syntax or schema error
    #[error("Failed to parse configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// IO error wrapper
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = GatewayError::PortNotFound("/dev/ttyUSB0".to_string());
        assert_eq!(err.error_code(), "PORT_NOT_FOUND");
        assert_eq!(GatewayError::NoLocalNode.error_code(), "NO_LOCAL_NODE");
    }

    #[test]
    fn test_is_retriable() {
        assert!(GatewayError::Disconnected.is_retriable());
        assert!(GatewayError::ConnectionTimeout { duration_ms: 5000 }.is_retriable());
        assert!(GatewayError::Aprs(AprsError::Disconnected).is_retriable());
        assert!(!GatewayError::InvalidMagic { got: 0x1234 }.is_retriable());
        assert!(!GatewayError::PortNotFound(String::new()).is_retriable());
    }

    #[test]
    fn test_is_protocol_error() {
        assert!(GatewayError::InvalidMagic { got: 0x1234 }.is_protocol_error());
        assert!(GatewayError::FrameTooLarge { len: 600, max: 512 }.is_protocol_error());
        assert!(!GatewayError::Disconnected.is_protocol_error());
    }

    #[test]
    fn test_registry_error_converts() {
        let err: GatewayError = RegistryError::InvalidArgument("x".to_string()).into();
        assert_eq!(err.error_code(), "REGISTRY_ERROR");
    }

    #[test]
    fn test_config_error_messages() {
        let err = ConfigError::SampleWritten {
            path: PathBuf::from("/tmp/meshgate.yaml"),
        };
        assert!(err.to_string().contains("/tmp/meshgate.yaml"));
        assert!(err.to_string().contains("call_sign"));
    }
}
