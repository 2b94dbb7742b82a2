//! Test doubles for the gateway's two links
//!
//! [`MockMeshInterface`] and [`MockAprsLink`] are cheap clonable handles over
//! shared state: hand one clone to the [`Gateway`](crate::Gateway) and keep
//! the other to inject traffic and inspect what was sent.
//!
//! # Example
//!
//! ```rust,ignore
//! use meshgate_bridge::test_utils::{MockAprsLink, MockMeshInterface};
//! use meshgate_bridge::{Gateway, MeshPacket};
//!
//! let mesh = MockMeshInterface::new(0xaaaaaaaa);
//! let aprs = MockAprsLink::new();
//! let mut gateway = Gateway::start(&config, mesh.clone(), registry, aprs.connector()).await?;
//!
//! mesh.inject(MeshPacket::text(0xbbbbbbbb, 0xaaaaaaaa, "?"));
//! gateway.step().await;
//! assert_eq!(mesh.sent_texts().len(), 1);
//! ```

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use meshgate_aprs::{AprsLink, AprsPacket, ParseError};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::{GatewayError, Result};
use crate::interface::{LocalNode, MeshInterface, NodeRecord};
use crate::packet::{node_id, GeoPoint, MeshPacket};

/// A text message the gateway queued for the radio
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentText {
    /// Destination node id
    pub destination: String,
    /// Message text
    pub text: String,
    /// Whether an ack was requested
    pub want_ack: bool,
}

#[derive(Debug, Default)]
struct MeshState {
    open: bool,
    fail_open: bool,
    fail_sends: bool,
    panic_on_send: bool,
    open_calls: usize,
    close_calls: usize,
    local: Option<LocalNode>,
    nodes: Vec<NodeRecord>,
    sink: Option<mpsc::UnboundedSender<MeshPacket>>,
    sent: Vec<SentText>,
}

/// Simulated radio for gateway tests
#[derive(Debug, Clone)]
pub struct MockMeshInterface {
    state: Arc<Mutex<MeshState>>,
}

impl MockMeshInterface {
    /// Radio with node number `num`, opened on first use
    pub fn new(num: u32) -> Self {
        let state = MeshState {
            local: Some(LocalNode {
                num,
                id: node_id(num),
                position: None,
            }),
            ..Default::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Radio that never reports its identity
    pub fn without_identity() -> Self {
        Self {
            state: Arc::new(Mutex::new(MeshState::default())),
        }
    }

    /// Set the radio's own position
    pub fn set_position(&self, position: Option<GeoPoint>) {
        if let Some(local) = self.state.lock().local.as_mut() {
            local.position = position;
        }
    }

    /// Add a node database entry
    pub fn add_node(&self, record: NodeRecord) {
        self.state.lock().nodes.push(record);
    }

    /// Deliver a packet to the subscriber; false when nobody listens
    pub fn inject(&self, packet: MeshPacket) -> bool {
        match self.state.lock().sink.as_ref() {
            Some(sink) => sink.send(packet).is_ok(),
            None => false,
        }
    }

    /// Simulate the stream dropping
    pub fn drop_link(&self) {
        self.state.lock().open = false;
    }

    /// Make `open` fail until cleared
    pub fn fail_open(&self, fail: bool) {
        self.state.lock().fail_open = fail;
    }

    /// Make `send_text` fail until cleared
    pub fn fail_sends(&self, fail: bool) {
        self.state.lock().fail_sends = fail;
    }

    /// Make `send_text` panic until cleared
    pub fn panic_on_send(&self, panic: bool) {
        self.state.lock().panic_on_send = panic;
    }

    /// Texts queued so far
    pub fn sent_texts(&self) -> Vec<SentText> {
        self.state.lock().sent.clone()
    }

    /// Texts queued so far, clearing the record
    pub fn take_sent(&self) -> Vec<SentText> {
        std::mem::take(&mut self.state.lock().sent)
    }

    /// Texts queued for one destination
    pub fn sent_to(&self, destination: &str) -> Vec<String> {
        self.state
            .lock()
            .sent
            .iter()
            .filter(|s| s.destination == destination)
            .map(|s| s.text.clone())
            .collect()
    }

    /// Number of `open` calls
    pub fn open_calls(&self) -> usize {
        self.state.lock().open_calls
    }

    /// Number of `close` calls
    pub fn close_calls(&self) -> usize {
        self.state.lock().close_calls
    }

    /// True while a subscriber is attached
    pub fn is_subscribed(&self) -> bool {
        self.state.lock().sink.is_some()
    }
}

#[async_trait]
impl MeshInterface for MockMeshInterface {
    async fn open(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        state.open_calls += 1;
        if state.fail_open {
            return Err(GatewayError::ConnectionTimeout { duration_ms: 5000 });
        }
        state.open = true;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        state.close_calls += 1;
        state.open = false;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.state.lock().open
    }

    fn subscribe(&mut self, sink: mpsc::UnboundedSender<MeshPacket>) {
        self.state.lock().sink = Some(sink);
    }

    fn unsubscribe(&mut self) {
        self.state.lock().sink = None;
    }

    fn local_node(&self) -> Option<LocalNode> {
        self.state.lock().local.clone()
    }

    fn nodes(&self) -> Vec<NodeRecord> {
        self.state.lock().nodes.clone()
    }

    fn send_text(&self, text: &str, destination: &str, want_ack: bool) -> Result<()> {
        let mut state = self.state.lock();
        if state.panic_on_send {
            drop(state);
            panic!("radio driver fault");
        }
        if state.fail_sends {
            return Err(GatewayError::NotConnected);
        }
        state.sent.push(SentText {
            destination: destination.to_string(),
            text: text.to_string(),
            want_ack,
        });
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[derive(Debug, Default)]
struct AprsState {
    login_filter: Option<String>,
    filters: Vec<String>,
    sent: Vec<String>,
    inbound: VecDeque<AprsPacket>,
}

/// Simulated APRS-IS connection for gateway tests
#[derive(Debug, Clone, Default)]
pub struct MockAprsLink {
    state: Arc<Mutex<AprsState>>,
}

impl MockAprsLink {
    /// Create an idle link
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect callback for [`Gateway::start`](crate::Gateway::start)
    ///
    /// Records the login filter and hands back a clone of this link.
    pub fn connector(&self) -> impl FnOnce(&str) -> MockAprsLink {
        let link = self.clone();
        move |filter| {
            link.state.lock().login_filter = Some(filter.to_string());
            link
        }
    }

    /// Queue a received line
    pub fn push_line(&self, line: &str) -> std::result::Result<(), ParseError> {
        let packet = meshgate_aprs::parse(line)?;
        self.state.lock().inbound.push_back(packet);
        Ok(())
    }

    /// Filter sent at login
    pub fn login_filter(&self) -> Option<String> {
        self.state.lock().login_filter.clone()
    }

    /// Filter changes sent after login
    pub fn filters(&self) -> Vec<String> {
        self.state.lock().filters.clone()
    }

    /// Most recent filter, login included
    pub fn current_filter(&self) -> Option<String> {
        let state = self.state.lock();
        state
            .filters
            .last()
            .cloned()
            .or_else(|| state.login_filter.clone())
    }

    /// Lines sent so far
    pub fn sent_lines(&self) -> Vec<String> {
        self.state.lock().sent.clone()
    }

    /// Lines sent so far, clearing the record
    pub fn take_sent(&self) -> Vec<String> {
        std::mem::take(&mut self.state.lock().sent)
    }
}

impl AprsLink for MockAprsLink {
    fn send(&self, line: String) {
        self.state.lock().sent.push(line);
    }

    fn set_filter(&self, expression: String) {
        self.state.lock().filters.push(expression);
    }

    fn recv(&mut self) -> Option<AprsPacket> {
        self.state.lock().inbound.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_mesh_basic() {
        let mut mesh = MockMeshInterface::new(0xaaaaaaaa);
        assert!(!mesh.is_open());
        mesh.open().await.unwrap();
        assert!(mesh.is_open());
        assert_eq!(mesh.local_node().unwrap().id, "!aaaaaaaa");

        assert!(!mesh.inject(MeshPacket::text(1, 2, "dropped")));
        let (tx, mut rx) = mpsc::unbounded_channel();
        mesh.subscribe(tx);
        assert!(mesh.inject(MeshPacket::text(1, 2, "hello")));
        assert_eq!(rx.recv().await.unwrap().text_payload(), Some("hello"));
    }

    #[tokio::test]
    async fn test_mock_mesh_failures() {
        let mut mesh = MockMeshInterface::new(1);
        mesh.fail_open(true);
        assert!(mesh.open().await.is_err());
        assert_eq!(mesh.open_calls(), 1);

        mesh.fail_sends(true);
        assert!(mesh.send_text("x", "!00000002", true).is_err());
        mesh.fail_sends(false);
        mesh.send_text("x", "!00000002", true).unwrap();
        assert_eq!(mesh.sent_to("!00000002"), vec!["x"]);
    }

    #[test]
    fn test_mock_aprs_link() {
        let mut link = MockAprsLink::new();
        let connected = (link.connector())("g/N0CALL-10");
        assert_eq!(connected.login_filter().as_deref(), Some("g/N0CALL-10"));

        link.set_filter("g/N0CALL-10/N0CALL-5".to_string());
        assert_eq!(link.current_filter().as_deref(), Some("g/N0CALL-10/N0CALL-5"));

        link.push_line("N0CALL-9>APRS,TCPIP*::N0CALL-5 :hi{1").unwrap();
        assert_eq!(link.recv().unwrap().message_text.as_deref(), Some("hi"));
        assert!(link.recv().is_none());
        assert!(link.push_line("garbage").is_err());
    }
}
