//! Decoded mesh packets
//!
//! The transport turns raw `FromRadio` protobufs into [`MeshPacket`]s so the
//! gateway never deals with wire types. Node numbers are rendered as the
//! textual ids users see on their radios (`!a1b2c3d4`, broadcast `^all`).

use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};

use crate::error::{GatewayError, Result};
use crate::interface::proto;

/// Node number addressing every node
pub const BROADCAST_NUM: u32 = 0xFFFF_FFFF;

/// Textual id of [`BROADCAST_NUM`]
pub const BROADCAST_ID: &str = "^all";

/// Render a node number as `!%08x`
pub fn node_id(num: u32) -> String {
    if num == BROADCAST_NUM {
        BROADCAST_ID.to_string()
    } else {
        format!("!{:08x}", num)
    }
}

/// Parse a textual node id back into a node number
pub fn parse_node_id(id: &str) -> Result<u32> {
    if id == BROADCAST_ID {
        return Ok(BROADCAST_NUM);
    }
    id.strip_prefix('!')
        .filter(|hex| hex.len() == 8)
        .and_then(|hex| u32::from_str_radix(hex, 16).ok())
        .ok_or_else(|| GatewayError::InvalidNodeId(id.to_string()))
}

/// Application port of a packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Port {
    /// Text message
    Text,
    /// Position report
    Position,
    /// User info
    NodeInfo,
    /// Telemetry
    Telemetry,
    /// Any other application
    Other(i32),
}

impl From<i32> for Port {
    fn from(value: i32) -> Self {
        match proto::PortNum::try_from(value) {
            Ok(proto::PortNum::TextMessageApp) => Port::Text,
            Ok(proto::PortNum::PositionApp) => Port::Position,
            Ok(proto::PortNum::NodeinfoApp) => Port::NodeInfo,
            Ok(proto::PortNum::TelemetryApp) => Port::Telemetry,
            _ => Port::Other(value),
        }
    }
}

impl std::fmt::Display for Port {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Port::Text => write!(f, "TEXT_MESSAGE_APP"),
            Port::Position => write!(f, "POSITION_APP"),
            Port::NodeInfo => write!(f, "NODEINFO_APP"),
            Port::Telemetry => write!(f, "TELEMETRY_APP"),
            Port::Other(n) => write!(f, "PORT_{}", n),
        }
    }
}

/// A position in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    /// Latitude, degrees north
    pub latitude: f64,
    /// Longitude, degrees east
    pub longitude: f64,
    /// Altitude in meters
    pub altitude: Option<i32>,
    /// When the fix was taken
    pub time: Option<DateTime<Utc>>,
}

impl GeoPoint {
    /// A fix without altitude or time
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            altitude: None,
            time: None,
        }
    }

    /// Convert from the wire form; `None` without both coordinates
    pub fn from_proto(position: &proto::Position) -> Option<Self> {
        let latitude = position.latitude_i? as f64 * 1e-7;
        let longitude = position.longitude_i? as f64 * 1e-7;
        Some(Self {
            latitude,
            longitude,
            altitude: position.altitude,
            time: epoch(position.time),
        })
    }

    /// Convert to the wire form
    pub fn to_proto(&self) -> proto::Position {
        proto::Position {
            latitude_i: Some((self.latitude * 1e7).round() as i32),
            longitude_i: Some((self.longitude * 1e7).round() as i32),
            altitude: self.altitude,
            time: self.time.map(|t| t.timestamp() as u32).unwrap_or(0),
        }
    }
}

/// Decoded application payload
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Text, lossily decoded as UTF-8
    Text(String),
    /// Position with both coordinates present
    Position(GeoPoint),
    /// Anything else, undecoded
    Raw(Bytes),
}

/// A decoded packet heard on the mesh
#[derive(Debug, Clone, PartialEq)]
pub struct MeshPacket {
    /// Packet id assigned by the sender
    pub id: u32,
    /// Sender node number
    pub from: u32,
    /// Destination node number
    pub to: u32,
    /// Sender id, `!%08x`
    pub from_id: String,
    /// Destination id, `!%08x` or `^all`
    pub to_id: String,
    /// Application port
    pub port: Port,
    /// Decoded payload
    pub payload: Payload,
    /// Reception time reported by the radio
    pub rx_time: Option<DateTime<Utc>>,
}

impl MeshPacket {
    fn with_payload(from: u32, to: u32, port: Port, payload: Payload) -> Self {
        Self {
            id: 0,
            from,
            to,
            from_id: node_id(from),
            to_id: node_id(to),
            port,
            payload,
            rx_time: None,
        }
    }

    /// A text message
    pub fn text(from: u32, to: u32, text: impl Into<String>) -> Self {
        Self::with_payload(from, to, Port::Text, Payload::Text(text.into()))
    }

    /// A position report
    pub fn position(from: u32, to: u32, position: GeoPoint) -> Self {
        Self::with_payload(from, to, Port::Position, Payload::Position(position))
    }

    /// Any other application payload
    pub fn raw(from: u32, to: u32, port: Port, payload: impl Into<Bytes>) -> Self {
        Self::with_payload(from, to, port, Payload::Raw(payload.into()))
    }

    /// True when addressed to every node
    pub fn is_broadcast(&self) -> bool {
        self.to == BROADCAST_NUM
    }

    /// Text of a text message
    pub fn text_payload(&self) -> Option<&str> {
        match &self.payload {
            Payload::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Position of a position report
    pub fn position_payload(&self) -> Option<&GeoPoint> {
        match &self.payload {
            Payload::Position(position) => Some(position),
            _ => None,
        }
    }

    /// Decode a wire packet
    ///
    /// Returns `Ok(None)` for packets the radio could not decrypt.
    pub fn from_proto(packet: proto::MeshPacket) -> Result<Option<Self>> {
        let data = match packet.payload_variant {
            Some(proto::mesh_packet::PayloadVariant::Decoded(data)) => data,
            _ => return Ok(None),
        };

        let port = Port::from(data.portnum);
        let payload = match port {
            Port::Text => Payload::Text(String::from_utf8_lossy(&data.payload).into_owned()),
            Port::Position => {
                let position = <proto::Position as prost::Message>::decode(data.payload.as_slice())?;
                match GeoPoint::from_proto(&position) {
                    Some(point) => Payload::Position(point),
                    None => Payload::Raw(Bytes::from(data.payload)),
                }
            }
            _ => Payload::Raw(Bytes::from(data.payload)),
        };

        Ok(Some(Self {
            id: packet.id,
            from: packet.from,
            to: packet.to,
            from_id: node_id(packet.from),
            to_id: node_id(packet.to),
            port,
            payload,
            rx_time: epoch(packet.rx_time),
        }))
    }
}

fn epoch(seconds: u32) -> Option<DateTime<Utc>> {
    if seconds == 0 {
        return None;
    }
    Utc.timestamp_opt(i64::from(seconds), 0).single()
}
