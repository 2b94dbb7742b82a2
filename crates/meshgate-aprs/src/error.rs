//! Error types for APRS-IS operations

use thiserror::Error;

/// Errors raised by the APRS-IS link
#[derive(Error, Debug)]
pub enum AprsError {
    /// TCP connection to the server could not be established
    #[error("Failed to connect to APRS-IS server {server}: {reason}")]
    ConnectFailed {
        /// host:port that was dialed
        server: String,
        /// Failure reason
        reason: String,
    },

    /// Server closed the connection
    #[error("APRS-IS connection closed by server")]
    Disconnected,

    /// Received line could not be decoded
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// IO error wrapper
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AprsError {
    /// Check if the link should simply be retried
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            AprsError::ConnectFailed { .. } | AprsError::Disconnected | AprsError::Io(_)
        )
    }
}

/// Reasons a received APRS line could not be decoded
///
/// Parse failures are an expected, loggable outcome on a busy feed and are
/// never propagated past [`crate::AprsClient::recv`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Blank line
    #[error("empty packet")]
    Empty,

    /// No `>` between source and destination
    #[error("missing source/destination separator")]
    MissingHeader,

    /// No `:` before the information field
    #[error("missing information field")]
    MissingInfo,

    /// Source call sign is empty or contains invalid characters
    #[error("invalid source call sign: {0:?}")]
    InvalidSource(String),

    /// Destination call sign is empty
    #[error("missing destination")]
    MissingDestination,

    /// Message information field is malformed
    #[error("malformed message: {0}")]
    MalformedMessage(String),
}

/// Result type alias for APRS-IS operations
pub type Result<T> = std::result::Result<T, AprsError>;
