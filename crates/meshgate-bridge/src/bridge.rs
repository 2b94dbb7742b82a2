//! Gateway - mesh ↔ APRS-IS router
//!
//! This module provides the run loop that bridges a mesh radio with the
//! APRS-IS network. It handles:
//!
//! - Mesh → APRS: registration commands, directed and reply-to messages,
//!   position reports of registered devices
//! - APRS → mesh: acknowledgement, registration beacons from other
//!   gateways, delivery to the registered device
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          Gateway                                │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌─────────────┐    ┌──────────────┐    ┌─────────────────┐    │
//! │  │ MeshInterface│──►│ mesh queue   │    │ AprsLink        │    │
//! │  │ (radio task)│    │              │◄──►│ (send/recv      │    │
//! │  └─────────────┘    │ Registry     │    │  queues)        │    │
//! │                     │ Watchdog     │    └─────────────────┘    │
//! │                     │ reply-to map │                            │
//! │                     │ filter list  │                            │
//! │                     └──────────────┘                            │
//! │                                                                 │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each loop iteration runs four steps in order: watchdog, gateway beacon,
//! one mesh packet, one APRS packet. A step that fails or panics is logged
//! and the loop carries on.
//!
//! # Example
//!
//! ```rust,ignore
//! use meshgate_bridge::{interface, Gateway, GatewayConfig};
//! use meshgate_aprs::AprsClient;
//!
//! let mesh = interface::from_config(&config.meshtastic_interface)?;
//! let registry = Registry::open_with(config.data_dir(), config.registry_options()).await?;
//! let mut gateway = Gateway::start(&config, mesh, registry, |filter| {
//!     AprsClient::spawn(config.aprs_client_config(filter))
//! })
//! .await?;
//! gateway.run().await;
//! ```

use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use meshgate_aprs::{
    symbol_code, AprsLink, AprsPacket, PacketFormatter, PositionReport, DEFAULT_POSITION_SYMBOL,
};
use meshgate_registry::Registry;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

use crate::cache::{RetransmissionCache, RetransmissionKey};
use crate::commands::{self, beacon_device_id, is_probe, MeshCommand};
use crate::config::{BeaconConfig, GatewayConfig};
use crate::error::{GatewayError, Result};
use crate::interface::{MeshInterface, NodeRecord};
use crate::packet::{MeshPacket, Port};
use crate::watchdog::Watchdog;
use crate::VERSION;

/// Call sign registration beacons are addressed to
pub const REGISTRATION_BEACON: &str = "MESHID-01";

/// Beacon payload meaning "this call sign is no longer bound"
pub const NO_DEVICE_ID: &str = "!00000000";

/// Beacon sender meaning "this device is no longer bound"
pub const NO_CALL_SIGN: &str = "N0CALL";

/// Registered nodes heard this recently seed the initial filter
const RECENTLY_HEARD_HOURS: i64 = 24;

/// Sleep when an iteration found nothing to do
const IDLE_SLEEP: Duration = Duration::from_millis(1);

/// Comment attached to positions sent on behalf of a mesh node
fn position_comment(device_id: &str) -> String {
    format!("meshgate: {}", device_id)
}

/// Render a filter list as an APRS-IS group filter
pub fn filter_expression(call_signs: &[String]) -> String {
    format!("g/{}", call_signs.join("/"))
}

/// Call signs the gateway subscribes to at startup
///
/// The gateway itself, the registration beacon when beaconing, and every
/// registered node the radio heard within the last day.
pub fn initial_filter(
    call_sign: &str,
    beacon_registrations: bool,
    registry: &Registry,
    nodes: &[NodeRecord],
    now: DateTime<Utc>,
) -> Vec<String> {
    let mut filter = vec![call_sign.to_string()];
    if beacon_registrations {
        filter.push(REGISTRATION_BEACON.to_string());
    }

    let horizon = now - chrono::Duration::hours(RECENTLY_HEARD_HOURS);
    for node in nodes {
        let Some(last_heard) = node.last_heard else {
            continue;
        };
        if last_heard < horizon {
            continue;
        }
        if let Some(registered) = registry.lookup(&node.id) {
            if !filter.iter().any(|c| c == registered) {
                filter.push(registered.to_string());
            }
        }
    }
    filter
}

/// Gateway statistics
#[derive(Debug, Clone, Default)]
pub struct GatewayStats {
    /// Mesh packets processed
    pub mesh_packets: u64,
    /// APRS packets processed
    pub aprs_packets: u64,
    /// Messages forwarded from the mesh to APRS-IS
    pub mesh_to_aprs: u64,
    /// Messages forwarded from APRS-IS to the mesh
    pub aprs_to_mesh: u64,
    /// Positions forwarded to APRS-IS
    pub positions_forwarded: u64,
    /// Acks sent to APRS-IS
    pub acks_sent: u64,
    /// APRS retransmissions not forwarded again
    pub retransmissions: u64,
    /// Registrations and unregistrations from the mesh
    pub registrations: u64,
    /// Registration beacons learned from APRS-IS
    pub beacons_observed: u64,
    /// Gateway position beacons sent
    pub beacons_sent: u64,
    /// Successful mesh reconnects
    pub reconnects: u64,
    /// Steps that failed or panicked
    pub handler_failures: u64,
}

/// The mesh ↔ APRS-IS router
pub struct Gateway<M: MeshInterface, A: AprsLink> {
    mesh: M,
    aprs: A,
    registry: Registry,
    formatter: PacketFormatter,
    call_sign: String,
    gateway_id: String,
    beacon_registrations: bool,
    beacon: BeaconConfig,
    mesh_tx: mpsc::UnboundedSender<MeshPacket>,
    mesh_rx: mpsc::UnboundedReceiver<MeshPacket>,
    reply_to: HashMap<String, String>,
    filter: Vec<String>,
    greeted: HashSet<String>,
    retransmissions: RetransmissionCache,
    watchdog: Watchdog,
    next_beacon: Instant,
    started: Instant,
    stats: GatewayStats,
}

impl<M: MeshInterface, A: AprsLink> Gateway<M, A> {
    /// Open the radio, seed the filter and connect to APRS-IS
    ///
    /// `connect` receives the initial filter expression and returns the
    /// APRS-IS link. Fails when the radio cannot be opened or never reports
    /// its identity.
    pub async fn start<F>(
        config: &GatewayConfig,
        mut mesh: M,
        registry: Registry,
        connect: F,
    ) -> Result<Self>
    where
        F: FnOnce(&str) -> A,
    {
        if !mesh.is_open() {
            mesh.open().await?;
        }
        let local = mesh.local_node().ok_or(GatewayError::NoLocalNode)?;
        info!(gateway_id = %local.id, interface = mesh.name(), "Mesh radio ready");

        let (mesh_tx, mesh_rx) = mpsc::unbounded_channel();
        mesh.subscribe(mesh_tx.clone());

        let filter = initial_filter(
            &config.call_sign,
            config.beacon_registrations,
            &registry,
            &mesh.nodes(),
            Utc::now(),
        );
        let expression = filter_expression(&filter);
        info!(filter = %expression, "Connecting to APRS-IS");
        let aprs = connect(&expression);

        let now = Instant::now();
        Ok(Self {
            mesh,
            aprs,
            registry,
            formatter: PacketFormatter::new(config.call_sign.clone())
                .with_limits(config.message.max_text_bytes, config.message.max_comment_bytes),
            call_sign: config.call_sign.clone(),
            gateway_id: local.id,
            beacon_registrations: config.beacon_registrations,
            beacon: config.gateway_beacon.clone(),
            mesh_tx,
            mesh_rx,
            reply_to: HashMap::new(),
            filter,
            greeted: HashSet::new(),
            retransmissions: RetransmissionCache::new(),
            watchdog: Watchdog::new(&config.watchdog),
            next_beacon: now,
            started: now,
            stats: GatewayStats::default(),
        })
    }

    /// Run until the future is dropped
    pub async fn run(&mut self) {
        info!(call_sign = %self.call_sign, gateway_id = %self.gateway_id, "Gateway running");
        loop {
            if !self.step().await {
                tokio::time::sleep(IDLE_SLEEP).await;
            }
        }
    }

    /// One loop iteration; returns true when a packet was processed
    pub async fn step(&mut self) -> bool {
        let outcome = AssertUnwindSafe(self.check_watchdog()).catch_unwind().await;
        self.settle("watchdog", outcome);

        let outcome = AssertUnwindSafe(self.check_beacon()).catch_unwind().await;
        self.settle("beacon", outcome);

        let mut busy = false;

        if let Ok(packet) = self.mesh_rx.try_recv() {
            busy = true;
            self.watchdog.packet_seen();
            let outcome = AssertUnwindSafe(self.process_mesh_packet(packet))
                .catch_unwind()
                .await;
            self.settle("mesh packet", outcome);
        }

        if let Some(packet) = self.aprs.recv() {
            busy = true;
            let outcome = AssertUnwindSafe(self.process_aprs_packet(packet))
                .catch_unwind()
                .await;
            self.settle("aprs packet", outcome);
        }

        busy
    }

    fn settle(&mut self, step: &'static str, outcome: std::thread::Result<Result<()>>) {
        let err = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(e)) => e,
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                GatewayError::HandlerPanicked(reason)
            }
        };
        self.stats.handler_failures += 1;
        error!(step, error = %err, code = err.error_code(), "Gateway step failed");
    }

    // ===== Watchdog and beacon =====

    async fn check_watchdog(&mut self) -> Result<()> {
        let verdict = self.watchdog.check(self.mesh.is_open());
        if !verdict.needs_reconnect() {
            return Ok(());
        }
        warn!(?verdict, interface = self.mesh.name(), "Mesh link unhealthy, reconnecting");
        self.reconnect().await
    }

    async fn reconnect(&mut self) -> Result<()> {
        self.mesh.unsubscribe();
        if let Err(e) = self.mesh.close().await {
            debug!(error = %e, "Error closing mesh interface");
        }

        tokio::time::sleep(self.watchdog.reconnect_backoff()).await;

        self.mesh.open().await?;
        self.mesh.subscribe(self.mesh_tx.clone());
        if let Some(local) = self.mesh.local_node() {
            if local.id != self.gateway_id {
                warn!(old = %self.gateway_id, new = %local.id, "Gateway node id changed");
                self.gateway_id = local.id;
            }
        }

        self.watchdog.reconnected();
        self.stats.reconnects += 1;
        info!(interface = self.mesh.name(), "Reconnected to mesh radio");
        Ok(())
    }

    async fn check_beacon(&mut self) -> Result<()> {
        if !self.beacon.enabled {
            return Ok(());
        }
        let now = Instant::now();
        if now < self.next_beacon {
            return Ok(());
        }

        let position = self.beacon.fixed_position().or_else(|| {
            self.mesh
                .local_node()
                .and_then(|n| n.position)
                .map(|p| (p.latitude, p.longitude))
        });

        match position {
            Some((latitude, longitude)) => {
                let line = self.formatter.beacon(
                    latitude,
                    longitude,
                    &self.beacon.icon,
                    &position_comment(&self.gateway_id),
                );
                debug!(%line, "Beaconing gateway position");
                self.aprs.send(line);
                self.stats.beacons_sent += 1;
                self.next_beacon = now + self.beacon.interval;
            }
            None => {
                debug!("Gateway position unknown, retrying beacon later");
                self.next_beacon = now + self.beacon.retry;
            }
        }
        Ok(())
    }

    // ===== Mesh side =====

    /// Route one packet heard on the mesh
    pub async fn process_mesh_packet(&mut self, packet: MeshPacket) -> Result<()> {
        self.stats.mesh_packets += 1;
        let from = packet.from_id.clone();

        if packet.port == Port::Telemetry && from == self.gateway_id {
            trace!(from = %from, "Own telemetry");
        } else {
            info!(from = %from, to = %packet.to_id, port = %packet.port, "Mesh packet");
        }

        let greet = self.spotted(&from);

        match packet.port {
            Port::Position => self.forward_position(&packet),
            Port::Text => self.handle_text(&packet).await?,
            _ => {}
        }

        if greet {
            self.send_mesh(&from, commands::BANNER);
        }
        Ok(())
    }

    /// Subscribe to a registered sender; true on its first sighting this run
    fn spotted(&mut self, device_id: &str) -> bool {
        let Some(call_sign) = self.registry.lookup(device_id).map(str::to_string) else {
            return false;
        };
        self.subscribe_call_sign(&call_sign);
        self.greeted.insert(device_id.to_string())
    }

    fn forward_position(&mut self, packet: &MeshPacket) {
        let Some(entry) = self.registry.entry(&packet.from_id) else {
            return;
        };
        let Some(position) = packet.position_payload() else {
            debug!(from = %packet.from_id, "Position packet without a fix");
            return;
        };

        let symbol = entry
            .icon
            .as_deref()
            .and_then(symbol_code)
            .unwrap_or_else(|| DEFAULT_POSITION_SYMBOL.to_string());
        let mut report =
            PositionReport::new(entry.call_sign.clone(), position.latitude, position.longitude)
                .with_symbol(symbol)
                .with_comment(position_comment(&packet.from_id));
        if let Some(time) = position.time {
            report = report.with_timestamp(time);
        }

        let line = self.formatter.position(&report);
        debug!(%line, "Sending position to APRS-IS");
        self.aprs.send(line);
        self.stats.positions_forwarded += 1;
    }

    async fn handle_text(&mut self, packet: &MeshPacket) -> Result<()> {
        let from = packet.from_id.as_str();
        let text = packet.text_payload().unwrap_or_default();

        if packet.is_broadcast() && is_probe(text) {
            self.send_mesh(from, commands::BANNER);
            return Ok(());
        }

        if packet.to_id != self.gateway_id {
            trace!(from, to = %packet.to_id, "Text not addressed to the gateway");
            return Ok(());
        }

        match MeshCommand::parse(text) {
            MeshCommand::Help => {
                let reply = match self.registry.lookup(from) {
                    Some(call_sign) => commands::help_registered(call_sign),
                    None => commands::HELP_UNREGISTERED.to_string(),
                };
                self.send_mesh(from, &reply);
            }
            MeshCommand::Id => {
                let status = self.status();
                self.send_mesh(from, &status);
            }
            MeshCommand::Register { call_sign, icon } => {
                self.register(from, &call_sign, icon.as_deref()).await?;
            }
            MeshCommand::RegisterInvalid => self.send_mesh(from, commands::REGISTER_SYNTAX),
            MeshCommand::Unregister => self.unregister(from).await?,
            MeshCommand::Directed { call_sign, body } => {
                let Some(sender) = self.sender_call_sign(from) else {
                    return Ok(());
                };
                self.reply_to.insert(from.to_string(), call_sign.clone());
                self.send_aprs_message(&sender, &call_sign, &body);
                self.stats.mesh_to_aprs += 1;
            }
            MeshCommand::Plain(text) => {
                let Some(sender) = self.sender_call_sign(from) else {
                    return Ok(());
                };
                match self.reply_to.get(from).cloned() {
                    Some(target) => {
                        self.send_aprs_message(&sender, &target, &text);
                        self.stats.mesh_to_aprs += 1;
                    }
                    None => self.send_mesh(from, commands::PREFIX_REQUIRED),
                }
            }
        }
        Ok(())
    }

    /// Registered call sign of a sender, prompting unregistered devices
    fn sender_call_sign(&mut self, device_id: &str) -> Option<String> {
        let call_sign = self.registry.lookup(device_id).map(str::to_string);
        if call_sign.is_none() {
            self.send_mesh(device_id, commands::UNKNOWN_DEVICE);
        }
        call_sign
    }

    async fn register(&mut self, device_id: &str, call_sign: &str, icon: Option<&str>) -> Result<()> {
        let previous = self.registry.lookup(device_id).map(str::to_string);
        self.registry
            .add_registration(Some(device_id), Some(call_sign), icon, true)
            .await?;
        self.stats.registrations += 1;
        info!(device_id, call_sign, ?icon, "Registered device");

        if let Some(previous) = previous.as_deref() {
            if self.registry.lookup(device_id) != Some(previous) {
                self.unsubscribe_call_sign(previous);
            }
        }

        let reply = if previous.is_some() {
            commands::REGISTRATION_UPDATED
        } else {
            commands::REGISTERED
        };
        self.send_mesh(device_id, reply);
        self.spotted(device_id);

        if self.beacon_registrations {
            info!(
                device_id,
                call_sign,
                beacon = REGISTRATION_BEACON,
                "Beaconing registration"
            );
            self.send_aprs_message(call_sign, REGISTRATION_BEACON, device_id);
        }
        Ok(())
    }

    async fn unregister(&mut self, device_id: &str) -> Result<()> {
        let Some(call_sign) = self.registry.lookup(device_id).map(str::to_string) else {
            self.send_mesh(device_id, commands::NOT_REGISTERED);
            return Ok(());
        };

        self.registry
            .add_registration(Some(device_id), None, None, true)
            .await?;
        self.registry
            .add_registration(None, Some(&call_sign), None, true)
            .await?;
        self.stats.registrations += 1;
        info!(device_id, call_sign = %call_sign, "Unregistered device");

        self.reply_to.remove(device_id);
        self.unsubscribe_call_sign(&call_sign);
        self.send_mesh(device_id, &commands::unregistered(&call_sign));

        if self.beacon_registrations {
            self.send_aprs_message(NO_CALL_SIGN, REGISTRATION_BEACON, device_id);
            self.send_aprs_message(&call_sign, REGISTRATION_BEACON, NO_DEVICE_ID);
        }
        Ok(())
    }

    // ===== APRS side =====

    /// Route one packet received from APRS-IS
    pub async fn process_aprs_packet(&mut self, packet: AprsPacket) -> Result<()> {
        self.stats.aprs_packets += 1;
        if !packet.is_message() {
            trace!(raw = %packet.raw, "Ignoring non-message APRS packet");
            return Ok(());
        }

        let from = packet.from.trim().to_uppercase();
        let to = packet.addressee.clone().unwrap_or_default();

        if let Some(response) = packet.response {
            debug!(
                ?response,
                to = %to,
                msg_no = packet.msg_no.as_deref().unwrap_or_default(),
                "Received response"
            );
            return Ok(());
        }

        if to == REGISTRATION_BEACON {
            return self.observe_registration_beacon(&from, &packet).await;
        }

        if let Some(msg_no) = packet.msg_no.as_deref() {
            let ack = self.formatter.ack(&to, &from, msg_no);
            debug!(line = %ack, "Acking APRS message");
            self.aprs.send(ack);
            self.stats.acks_sent += 1;
        }

        if to == self.call_sign {
            info!(raw = %packet.raw, "APRS message addressed to the gateway");
            if self.first_delivery(&packet) {
                let status = self.status();
                let call_sign = self.call_sign.clone();
                self.send_aprs_message(&call_sign, &from, &status);
            }
            return Ok(());
        }

        let Some(device_id) = self.registry.lookup_by_call_sign(&to).map(str::to_string) else {
            warn!(to = %to, "Unknown APRS recipient");
            return Ok(());
        };
        let Some(text) = packet.message_text.as_deref() else {
            return Ok(());
        };
        if !self.first_delivery(&packet) {
            self.stats.retransmissions += 1;
            debug!(from = %from, to = %to, "Dropping APRS retransmission");
            return Ok(());
        }

        self.reply_to.insert(device_id.clone(), from.clone());
        self.send_mesh(&device_id, &format!("{}: {}", from, text));
        self.stats.aprs_to_mesh += 1;
        Ok(())
    }

    fn first_delivery(&mut self, packet: &AprsPacket) -> bool {
        match RetransmissionKey::from_packet(packet) {
            Some(key) => !self.retransmissions.is_duplicate(&key),
            None => true,
        }
    }

    async fn observe_registration_beacon(&mut self, from: &str, packet: &AprsPacket) -> Result<()> {
        let text = packet.message_text.as_deref().unwrap_or_default();
        let Some(device_id) = beacon_device_id(text) else {
            error!(raw = %packet.raw, "Invalid registration beacon");
            return Ok(());
        };
        info!(device_id = %device_id, call_sign = from, "Observed registration beacon");

        if device_id == NO_DEVICE_ID {
            self.registry
                .add_registration(None, Some(from), None, false)
                .await?;
        } else if from == NO_CALL_SIGN {
            self.registry
                .add_registration(Some(&device_id), None, None, false)
                .await?;
        } else {
            self.registry
                .add_registration(Some(&device_id), Some(from), None, false)
                .await?;
        }
        self.stats.beacons_observed += 1;
        Ok(())
    }

    // ===== Outbound =====

    fn send_mesh(&self, device_id: &str, text: &str) {
        info!(to = device_id, text, "Sending to mesh");
        if let Err(e) = self.mesh.send_text(text, device_id, true) {
            warn!(to = device_id, error = %e, code = e.error_code(), "Mesh send failed");
        }
    }

    fn send_aprs_message(&self, from: &str, to: &str, text: &str) {
        for line in self.formatter.messages(from, to, text) {
            debug!(%line, "Sending to APRS-IS");
            self.aprs.send(line);
        }
    }

    fn subscribe_call_sign(&mut self, call_sign: &str) {
        if self.filter.iter().any(|c| c == call_sign) {
            return;
        }
        self.filter.push(call_sign.to_string());
        let expression = filter_expression(&self.filter);
        debug!(filter = %expression, "Updating APRS-IS filter");
        self.aprs.set_filter(expression);
    }

    fn unsubscribe_call_sign(&mut self, call_sign: &str) {
        if call_sign == self.call_sign || call_sign == REGISTRATION_BEACON {
            return;
        }
        let before = self.filter.len();
        self.filter.retain(|c| c != call_sign);
        if self.filter.len() != before {
            let expression = filter_expression(&self.filter);
            debug!(filter = %expression, "Updating APRS-IS filter");
            self.aprs.set_filter(expression);
        }
    }

    fn status(&self) -> String {
        commands::station_status(&self.call_sign, self.started.elapsed(), VERSION)
    }

    // ===== Accessors =====

    /// Gateway statistics
    pub fn stats(&self) -> &GatewayStats {
        &self.stats
    }

    /// Gateway call sign
    pub fn call_sign(&self) -> &str {
        &self.call_sign
    }

    /// Node id of the attached radio
    pub fn gateway_id(&self) -> &str {
        &self.gateway_id
    }

    /// Call signs in the current APRS-IS filter
    pub fn filter(&self) -> &[String] {
        &self.filter
    }

    /// Where a device's unprefixed messages go
    pub fn reply_target(&self, device_id: &str) -> Option<&str> {
        self.reply_to.get(device_id).map(String::as_str)
    }

    /// The registration registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The mesh interface
    pub fn mesh(&self) -> &M {
        &self.mesh
    }

    /// The APRS-IS link
    pub fn aprs(&self) -> &A {
        &self.aprs
    }
}
