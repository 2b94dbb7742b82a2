//! Protobuf messages of the radio stream API
//!
//! Only the subset the gateway reads or writes is declared. Field tags match
//! the upstream `mesh.proto` / `portnums.proto` definitions; prost skips any
//! field it does not know, so newer firmware stays readable.

/// Application port of a decoded payload
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum PortNum {
    /// Unset
    UnknownApp = 0,
    /// UTF-8 text message
    TextMessageApp = 1,
    /// Position report
    PositionApp = 3,
    /// User info broadcast
    NodeinfoApp = 4,
    /// Device and environment telemetry
    TelemetryApp = 67,
}

/// Packet sent from the host to the radio
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ToRadio {
    #[prost(oneof = "to_radio::PayloadVariant", tags = "1, 3")]
    pub payload_variant: Option<to_radio::PayloadVariant>,
}

/// Nested types of [`ToRadio`]
pub mod to_radio {
    /// Payload of a [`super::ToRadio`]
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum PayloadVariant {
        /// Packet to transmit on the mesh
        #[prost(message, tag = "1")]
        Packet(super::MeshPacket),
        /// Ask the radio to dump its configuration and node database
        #[prost(uint32, tag = "3")]
        WantConfigId(u32),
    }
}

/// Packet sent from the radio to the host
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FromRadio {
    #[prost(uint32, tag = "1")]
    pub id: u32,
    #[prost(oneof = "from_radio::PayloadVariant", tags = "2, 3, 4, 7")]
    pub payload_variant: Option<from_radio::PayloadVariant>,
}

/// Nested types of [`FromRadio`]
pub mod from_radio {
    /// Payload of a [`super::FromRadio`]
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum PayloadVariant {
        /// Packet heard on the mesh
        #[prost(message, tag = "2")]
        Packet(super::MeshPacket),
        /// The radio's own identity
        #[prost(message, tag = "3")]
        MyInfo(super::MyNodeInfo),
        /// One node database entry
        #[prost(message, tag = "4")]
        NodeInfo(super::NodeInfo),
        /// End of the configuration dump, echoing `want_config_id`
        #[prost(uint32, tag = "7")]
        ConfigCompleteId(u32),
    }
}

/// A mesh packet
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MeshPacket {
    #[prost(fixed32, tag = "1")]
    pub from: u32,
    #[prost(fixed32, tag = "2")]
    pub to: u32,
    #[prost(uint32, tag = "3")]
    pub channel: u32,
    #[prost(fixed32, tag = "6")]
    pub id: u32,
    #[prost(fixed32, tag = "7")]
    pub rx_time: u32,
    #[prost(uint32, tag = "9")]
    pub hop_limit: u32,
    #[prost(bool, tag = "10")]
    pub want_ack: bool,
    #[prost(oneof = "mesh_packet::PayloadVariant", tags = "4, 5")]
    pub payload_variant: Option<mesh_packet::PayloadVariant>,
}

/// Nested types of [`MeshPacket`]
pub mod mesh_packet {
    /// Payload of a [`super::MeshPacket`]
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum PayloadVariant {
        /// Decrypted application payload
        #[prost(message, tag = "4")]
        Decoded(super::Data),
        /// Payload the radio could not decrypt
        #[prost(bytes, tag = "5")]
        Encrypted(Vec<u8>),
    }
}

/// Application payload of a packet
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Data {
    #[prost(enumeration = "PortNum", tag = "1")]
    pub portnum: i32,
    #[prost(bytes = "vec", tag = "2")]
    pub payload: Vec<u8>,
}

/// Position report, degrees scaled by 1e7
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Position {
    #[prost(sfixed32, optional, tag = "1")]
    pub latitude_i: Option<i32>,
    #[prost(sfixed32, optional, tag = "2")]
    pub longitude_i: Option<i32>,
    #[prost(int32, optional, tag = "3")]
    pub altitude: Option<i32>,
    #[prost(fixed32, tag = "4")]
    pub time: u32,
}

/// User identity of a node
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct User {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(string, tag = "2")]
    pub long_name: String,
    #[prost(string, tag = "3")]
    pub short_name: String,
}

/// Node database entry
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NodeInfo {
    #[prost(uint32, tag = "1")]
    pub num: u32,
    #[prost(message, optional, tag = "2")]
    pub user: Option<User>,
    #[prost(message, optional, tag = "3")]
    pub position: Option<Position>,
    #[prost(fixed32, tag = "5")]
    pub last_heard: u32,
}

/// Identity of the attached radio
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MyNodeInfo {
    #[prost(uint32, tag = "1")]
    pub my_node_num: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn test_from_radio_round_trip() {
        let msg = FromRadio {
            id: 7,
            payload_variant: Some(from_radio::PayloadVariant::MyInfo(MyNodeInfo {
                my_node_num: 0xa1b2c3d4,
            })),
        };
        let decoded = FromRadio::decode(msg.encode_to_vec().as_slice()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_portnum_conversion() {
        assert_eq!(PortNum::try_from(67), Ok(PortNum::TelemetryApp));
        assert!(PortNum::try_from(999).is_err());
    }

    #[test]
    fn test_text_packet_wire_tags() {
        let packet = MeshPacket {
            to: 0xffffffff,
            payload_variant: Some(mesh_packet::PayloadVariant::Decoded(Data {
                portnum: PortNum::TextMessageApp as i32,
                payload: b"hi".to_vec(),
            })),
            ..Default::default()
        };
        let bytes = packet.encode_to_vec();
        // fixed32 `to` is field 2, wire type 5
        assert_eq!(bytes[0], (2 << 3) | 5);
    }
}
