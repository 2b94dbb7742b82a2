//! APRS-IS side of the meshgate gateway
//!
//! This crate owns everything the gateway needs to talk to the wide-area
//! amateur packet network:
//!
//! - [`client::AprsClient`] - background send/receive tasks around one APRS-IS
//!   TCP session, exposed to the gateway as non-blocking queues
//! - [`packet`] - decoding of received lines into [`AprsPacket`]s
//! - [`format`] - encoding of outbound message, ack, position and beacon lines
//! - [`symbols`] - the two-letter icon code → map symbol lookup table
//!
//! # Message Flow
//!
//! ```text
//!  Gateway ──send()/set_filter()──► outbound queue ──► send task ──► TCP
//!  Gateway ◄──────recv()────────── inbound queue ◄── receive task ◄── TCP
//! ```
//!
//! The gateway never touches the socket. The receive task owns the
//! connection and hands the write half to the send task after each login.

#![warn(missing_docs)]

pub mod client;
pub mod error;
pub mod format;
pub mod packet;
pub mod symbols;

pub use client::{AprsClient, AprsClientConfig, AprsLink};
pub use error::{AprsError, ParseError, Result};
pub use format::{
    chunk_text, format_latitude, format_longitude, format_timestamp, truncate_to_bytes,
    PacketFormatter, PositionReport, DEFAULT_MAX_COMMENT_BYTES, DEFAULT_MAX_TEXT_BYTES,
    SOFTWARE_ID,
};
pub use packet::{parse, AprsPacket, PacketFormat, Response};
pub use symbols::{symbol_code, DEFAULT_POSITION_SYMBOL};

/// Crate version, reported in the APRS-IS login line
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Software name reported in the APRS-IS login line
pub const SOFTWARE_NAME: &str = "meshgate";

/// Default APRS-IS server (DNS round-robin of tier-2 servers)
pub const DEFAULT_SERVER: &str = "rotate.aprs2.net";

/// Default APRS-IS filtered-feed port
pub const DEFAULT_PORT: u16 = 14580;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_constants() {
        assert_eq!(DEFAULT_PORT, 14580);
        assert_eq!(SOFTWARE_ID, "APZMAG");
    }
}
