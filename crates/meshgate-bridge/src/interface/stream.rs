//! Radio stream API over an arbitrary byte stream
//!
//! Opening a [`StreamInterface`]:
//! 1. the [`Connector`] dials the stream
//! 2. a writer task sends the wake preamble, then serializes `ToRadio` frames
//! 3. `want_config_id` asks the radio for its identity and node database
//! 4. a reader task decodes `FromRadio` frames, keeps the node database and
//!    forwards decoded packets to the subscriber
//! 5. `open` returns once the radio echoes the config id
//!
//! The node database and local identity live behind `parking_lot` locks
//! shared with the reader task.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use prost::Message;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use super::frame::{frame_packet, FrameDecoder, WAKE_PREAMBLE};
use super::proto::{self, from_radio, mesh_packet, to_radio};
use super::{ConnectionState, LocalNode, MeshInterface, NodeRecord};
use crate::error::{GatewayError, Result};
use crate::packet::{node_id, parse_node_id, GeoPoint, MeshPacket, Payload};

/// Default hop limit for packets we originate
const DEFAULT_HOP_LIMIT: u32 = 3;

/// How long `open` waits for the configuration dump
const DEFAULT_CONFIG_TIMEOUT: Duration = Duration::from_secs(30);

const READ_BUFFER_SIZE: usize = 512;

/// Dials the byte stream a [`StreamInterface`] runs over
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Stream type produced by [`Connector::connect`]
    type Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    /// Open a fresh stream
    async fn connect(&self) -> Result<Self::Stream>;

    /// Human-readable target, used as the interface name
    fn describe(&self) -> String;
}

#[derive(Debug, Default)]
struct NodeDb {
    my_node_num: Option<u32>,
    nodes: HashMap<u32, NodeRecord>,
}

impl NodeDb {
    fn entry(&mut self, num: u32) -> &mut NodeRecord {
        self.nodes.entry(num).or_insert_with(|| NodeRecord {
            num,
            id: node_id(num),
            long_name: None,
            last_heard: None,
            position: None,
        })
    }
}

struct Shared {
    state: RwLock<ConnectionState>,
    db: RwLock<NodeDb>,
    sink: RwLock<Option<mpsc::UnboundedSender<MeshPacket>>>,
}

/// [`MeshInterface`] over a framed protobuf byte stream
pub struct StreamInterface<C: Connector> {
    connector: C,
    name: String,
    config_timeout: Duration,
    shared: Arc<Shared>,
    outbound: Option<mpsc::UnboundedSender<proto::ToRadio>>,
    tasks: Vec<JoinHandle<()>>,
}

impl<C: Connector> StreamInterface<C> {
    /// Create an interface that dials through `connector`
    pub fn new(connector: C) -> Self {
        let name = connector.describe();
        Self {
            connector,
            name,
            config_timeout: DEFAULT_CONFIG_TIMEOUT,
            shared: Arc::new(Shared {
                state: RwLock::new(ConnectionState::Disconnected),
                db: RwLock::new(NodeDb::default()),
                sink: RwLock::new(None),
            }),
            outbound: None,
            tasks: Vec::new(),
        }
    }

    /// Set how long `open` waits for the radio's configuration
    pub fn with_config_timeout(mut self, timeout: Duration) -> Self {
        self.config_timeout = timeout;
        self
    }

    /// Get the current connection state
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.read()
    }

    fn shutdown_tasks(&mut self) {
        self.outbound = None;
        for task in self.tasks.drain(..) {
            task.abort();
        }
        *self.shared.state.write() = ConnectionState::Disconnected;
    }
}

#[async_trait]
impl<C: Connector> MeshInterface for StreamInterface<C> {
    async fn open(&mut self) -> Result<()> {
        if self.is_open() {
            return Ok(());
        }
        self.shutdown_tasks();

        *self.shared.state.write() = ConnectionState::Connecting;
        info!(interface = %self.name, "Connecting to mesh radio");

        let stream = match self.connector.connect().await {
            Ok(stream) => stream,
            Err(e) => {
                *self.shared.state.write() = ConnectionState::Disconnected;
                return Err(e);
            }
        };
        let (reader, writer) = tokio::io::split(stream);

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel();
        let config_id: u32 = rand::random::<u32>().max(1);

        self.tasks.push(tokio::spawn(write_loop(
            writer,
            outbound_rx,
            Arc::clone(&self.shared),
        )));
        self.tasks.push(tokio::spawn(read_loop(
            reader,
            Arc::clone(&self.shared),
            config_id,
            ready_tx,
        )));

        outbound_tx.send(proto::ToRadio {
            payload_variant: Some(to_radio::PayloadVariant::WantConfigId(config_id)),
        })?;
        self.outbound = Some(outbound_tx);

        match tokio::time::timeout(self.config_timeout, ready_rx).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => {
                self.shutdown_tasks();
                return Err(GatewayError::Disconnected);
            }
            Err(_) => {
                self.shutdown_tasks();
                return Err(GatewayError::ConnectionTimeout {
                    duration_ms: self.config_timeout.as_millis() as u64,
                });
            }
        }

        let local = self.local_node().ok_or(GatewayError::NoLocalNode);
        match local {
            Ok(local) => {
                *self.shared.state.write() = ConnectionState::Connected;
                info!(
                    interface = %self.name,
                    node = %local.id,
                    nodes = self.shared.db.read().nodes.len(),
                    "Connected to mesh radio"
                );
                Ok(())
            }
            Err(e) => {
                self.shutdown_tasks();
                Err(e)
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.shutdown_tasks();
        info!(interface = %self.name, "Disconnected from mesh radio");
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.state() == ConnectionState::Connected
            && self.outbound.as_ref().is_some_and(|tx| !tx.is_closed())
    }

    fn subscribe(&mut self, sink: mpsc::UnboundedSender<MeshPacket>) {
        *self.shared.sink.write() = Some(sink);
    }

    fn unsubscribe(&mut self) {
        *self.shared.sink.write() = None;
    }

    fn local_node(&self) -> Option<LocalNode> {
        let db = self.shared.db.read();
        let num = db.my_node_num?;
        let position = db.nodes.get(&num).and_then(|n| n.position);
        Some(LocalNode {
            num,
            id: node_id(num),
            position,
        })
    }

    fn nodes(&self) -> Vec<NodeRecord> {
        self.shared.db.read().nodes.values().cloned().collect()
    }

    fn send_text(&self, text: &str, destination: &str, want_ack: bool) -> Result<()> {
        let to = parse_node_id(destination)?;
        let outbound = self.outbound.as_ref().ok_or(GatewayError::NotConnected)?;

        let packet = proto::MeshPacket {
            to,
            id: rand::random::<u32>().max(1),
            hop_limit: DEFAULT_HOP_LIMIT,
            want_ack,
            payload_variant: Some(mesh_packet::PayloadVariant::Decoded(proto::Data {
                portnum: proto::PortNum::TextMessageApp as i32,
                payload: text.as_bytes().to_vec(),
            })),
            ..Default::default()
        };
        debug!(to = %destination, bytes = text.len(), want_ack, "Queueing mesh text");

        outbound
            .send(proto::ToRadio {
                payload_variant: Some(to_radio::PayloadVariant::Packet(packet)),
            })
            .map_err(|_| GatewayError::NotConnected)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl<C: Connector> Drop for StreamInterface<C> {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

impl<C: Connector> std::fmt::Debug for StreamInterface<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamInterface")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

async fn write_loop<W: AsyncWrite + Unpin>(
    mut writer: W,
    mut outbound: mpsc::UnboundedReceiver<proto::ToRadio>,
    shared: Arc<Shared>,
) {
    if let Err(e) = writer.write_all(&WAKE_PREAMBLE).await {
        warn!(error = %e, "Failed to wake radio");
        *shared.state.write() = ConnectionState::Disconnected;
        return;
    }

    while let Some(message) = outbound.recv().await {
        let framed = match frame_packet(&message.encode_to_vec()) {
            Ok(framed) => framed,
            Err(e) => {
                warn!(error = %e, code = e.error_code(), "Dropping outbound packet");
                continue;
            }
        };
        trace!(size = framed.len(), "Writing frame");

        let written = async {
            writer.write_all(&framed).await?;
            writer.flush().await
        };
        if let Err(e) = written.await {
            warn!(error = %e, "Mesh radio write failed");
            *shared.state.write() = ConnectionState::Disconnected;
            return;
        }
    }
}

async fn read_loop<R: AsyncRead + Unpin>(
    mut reader: R,
    shared: Arc<Shared>,
    config_id: u32,
    ready: oneshot::Sender<()>,
) {
    let mut ready = Some(ready);
    let mut decoder = FrameDecoder::new();
    let mut buf = [0u8; READ_BUFFER_SIZE];

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => {
                warn!("Mesh radio closed the stream");
                break;
            }
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "Mesh radio read failed");
                break;
            }
        };
        decoder.extend(&buf[..n]);

        loop {
            match decoder.next_frame() {
                Ok(Some(frame)) => match proto::FromRadio::decode(frame) {
                    Ok(message) => handle_from_radio(&shared, message, config_id, &mut ready),
                    Err(e) => debug!(error = %e, "Undecodable frame"),
                },
                Ok(None) => break,
                Err(e) => debug!(error = %e, code = e.error_code(), "Bad frame"),
            }
        }
    }

    *shared.state.write() = ConnectionState::Disconnected;
}

fn handle_from_radio(
    shared: &Shared,
    message: proto::FromRadio,
    config_id: u32,
    ready: &mut Option<oneshot::Sender<()>>,
) {
    match message.payload_variant {
        Some(from_radio::PayloadVariant::MyInfo(info)) => {
            debug!(node = %node_id(info.my_node_num), "Radio identity");
            shared.db.write().my_node_num = Some(info.my_node_num);
        }
        Some(from_radio::PayloadVariant::NodeInfo(info)) => {
            let mut db = shared.db.write();
            let record = db.entry(info.num);
            if let Some(user) = info.user.filter(|u| !u.long_name.is_empty()) {
                record.long_name = Some(user.long_name);
            }
            if let Some(position) = info.position.as_ref().and_then(GeoPoint::from_proto) {
                record.position = Some(position);
            }
            if info.last_heard != 0 {
                record.last_heard = chrono::DateTime::from_timestamp(i64::from(info.last_heard), 0);
            }
        }
        Some(from_radio::PayloadVariant::ConfigCompleteId(id)) => {
            if id == config_id {
                if let Some(ready) = ready.take() {
                    let _ = ready.send(());
                }
            } else {
                trace!(id, "Ignoring stale config completion");
            }
        }
        Some(from_radio::PayloadVariant::Packet(packet)) => {
            let packet = match MeshPacket::from_proto(packet) {
                Ok(Some(packet)) => packet,
                Ok(None) => return,
                Err(e) => {
                    debug!(error = %e, "Undecodable mesh packet");
                    return;
                }
            };

            {
                let mut db = shared.db.write();
                let record = db.entry(packet.from);
                record.last_heard = Some(packet.rx_time.unwrap_or_else(Utc::now));
                if let Payload::Position(position) = &packet.payload {
                    record.position = Some(*position);
                }
            }

            if let Some(sink) = shared.sink.read().as_ref() {
                let _ = sink.send(packet);
            }
        }
        None => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::BROADCAST_NUM;
    use tokio::io::DuplexStream;

    const RADIO_NUM: u32 = 0xaaaaaaaa;

    struct DuplexConnector {
        stream: parking_lot::Mutex<Option<DuplexStream>>,
    }

    #[async_trait]
    impl Connector for DuplexConnector {
        type Stream = DuplexStream;

        async fn connect(&self) -> Result<DuplexStream> {
            self.stream.lock().take().ok_or(GatewayError::Disconnected)
        }

        fn describe(&self) -> String {
            "duplex".to_string()
        }
    }

    struct FakeRadio {
        stream: DuplexStream,
        decoder: FrameDecoder,
    }

    impl FakeRadio {
        async fn next_to_radio(&mut self) -> proto::ToRadio {
            let mut buf = [0u8; 256];
            loop {
                if let Some(frame) = self.decoder.next_frame().unwrap() {
                    return proto::ToRadio::decode(frame).unwrap();
                }
                let n = self.stream.read(&mut buf).await.unwrap();
                assert!(n > 0, "interface closed the stream");
                self.decoder.extend(&buf[..n]);
            }
        }

        async fn send(&mut self, variant: from_radio::PayloadVariant) {
            let message = proto::FromRadio {
                id: 0,
                payload_variant: Some(variant),
            };
            let framed = frame_packet(&message.encode_to_vec()).unwrap();
            self.stream.write_all(&framed).await.unwrap();
        }

        async fn handshake(&mut self) {
            let config_id = match self.next_to_radio().await.payload_variant {
                Some(to_radio::PayloadVariant::WantConfigId(id)) => id,
                other => panic!("expected want_config_id, got {:?}", other),
            };
            self.send(from_radio::PayloadVariant::MyInfo(proto::MyNodeInfo {
                my_node_num: RADIO_NUM,
            }))
            .await;
            self.send(from_radio::PayloadVariant::NodeInfo(proto::NodeInfo {
                num: RADIO_NUM,
                user: Some(proto::User {
                    id: node_id(RADIO_NUM),
                    long_name: "Gateway".to_string(),
                    short_name: "GW".to_string(),
                }),
                position: Some(GeoPoint::new(47.6, -122.3).to_proto()),
                last_heard: 1_700_000_000,
            }))
            .await;
            self.send(from_radio::PayloadVariant::NodeInfo(proto::NodeInfo {
                num: 0xbbbbbbbb,
                last_heard: 1_700_000_000,
                ..Default::default()
            }))
            .await;
            self.send(from_radio::PayloadVariant::ConfigCompleteId(config_id))
                .await;
        }
    }

    fn pair() -> (StreamInterface<DuplexConnector>, FakeRadio) {
        let (ours, theirs) = tokio::io::duplex(4096);
        let iface = StreamInterface::new(DuplexConnector {
            stream: parking_lot::Mutex::new(Some(ours)),
        })
        .with_config_timeout(Duration::from_secs(5));
        let radio = FakeRadio {
            stream: theirs,
            decoder: FrameDecoder::new(),
        };
        (iface, radio)
    }

    #[tokio::test]
    async fn test_open_reads_identity_and_node_db() {
        let (mut iface, mut radio) = pair();
        let radio_task = tokio::spawn(async move {
            radio.handshake().await;
            radio
        });

        iface.open().await.unwrap();
        let _radio = radio_task.await.unwrap();

        assert!(iface.is_open());
        let local = iface.local_node().unwrap();
        assert_eq!(local.id, "!aaaaaaaa");
        let position = local.position.unwrap();
        assert!((position.latitude - 47.6).abs() < 1e-6);

        let mut nodes = iface.nodes();
        nodes.sort_by_key(|n| n.num);
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].long_name.as_deref(), Some("Gateway"));
        assert!(nodes[1].last_heard.is_some());
    }

    #[tokio::test]
    async fn test_received_packets_reach_subscriber() {
        let (mut iface, mut radio) = pair();
        let (tx, mut rx) = mpsc::unbounded_channel();
        iface.subscribe(tx);

        let radio_task = tokio::spawn(async move {
            radio.handshake().await;
            radio
        });
        iface.open().await.unwrap();
        let mut radio = radio_task.await.unwrap();

        radio
            .send(from_radio::PayloadVariant::Packet(proto::MeshPacket {
                from: 0xbbbbbbbb,
                to: RADIO_NUM,
                id: 9,
                payload_variant: Some(mesh_packet::PayloadVariant::Decoded(proto::Data {
                    portnum: proto::PortNum::TextMessageApp as i32,
                    payload: b"?".to_vec(),
                })),
                ..Default::default()
            }))
            .await;

        let packet = rx.recv().await.unwrap();
        assert_eq!(packet.from_id, "!bbbbbbbb");
        assert_eq!(packet.text_payload(), Some("?"));
    }

    #[tokio::test]
    async fn test_send_text_writes_frame() {
        let (mut iface, mut radio) = pair();
        let radio_task = tokio::spawn(async move {
            radio.handshake().await;
            radio
        });
        iface.open().await.unwrap();
        let mut radio = radio_task.await.unwrap();

        iface.send_text("hello", "!bbbbbbbb", true).unwrap();
        iface.send_text("all", "^all", false).unwrap();

        let first = match radio.next_to_radio().await.payload_variant {
            Some(to_radio::PayloadVariant::Packet(p)) => p,
            other => panic!("expected packet, got {:?}", other),
        };
        assert_eq!(first.to, 0xbbbbbbbb);
        assert!(first.want_ack);
        match first.payload_variant {
            Some(mesh_packet::PayloadVariant::Decoded(data)) => {
                assert_eq!(data.portnum, proto::PortNum::TextMessageApp as i32);
                assert_eq!(data.payload, b"hello".to_vec());
            }
            other => panic!("expected decoded payload, got {:?}", other),
        }

        let second = match radio.next_to_radio().await.payload_variant {
            Some(to_radio::PayloadVariant::Packet(p)) => p,
            other => panic!("expected packet, got {:?}", other),
        };
        assert_eq!(second.to, BROADCAST_NUM);
    }

    #[tokio::test]
    async fn test_send_text_rejects_bad_destination() {
        let (iface, _radio) = pair();
        assert!(matches!(
            iface.send_text("x", "bbbbbbbb", true),
            Err(GatewayError::InvalidNodeId(_))
        ));
        assert!(matches!(
            iface.send_text("x", "!bbbbbbbb", true),
            Err(GatewayError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_stream_close_marks_interface_closed() {
        let (mut iface, mut radio) = pair();
        let radio_task = tokio::spawn(async move {
            radio.handshake().await;
            radio
        });
        iface.open().await.unwrap();
        let radio = radio_task.await.unwrap();

        drop(radio);
        for _ in 0..50 {
            if !iface.is_open() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!iface.is_open());
    }

    #[tokio::test]
    async fn test_open_fails_when_stream_ends_before_config() {
        let (mut iface, radio) = pair();
        drop(radio);
        let err = iface.open().await.unwrap_err();
        assert!(matches!(err, GatewayError::Disconnected));
        assert_eq!(iface.state(), ConnectionState::Disconnected);
    }
}
