//! Background APRS-IS client
//!
//! [`AprsClient`] runs two tokio tasks around one APRS-IS session:
//!
//! - the **receive task** owns the TCP connection. It dials the server, logs
//!   in with the current filter, hands the write half to the send task and
//!   then pushes every received line into the inbound queue. When the server
//!   drops the session it waits and dials again.
//! - the **send task** drains the outbound queue in FIFO order, writing data
//!   lines and `#filter` commands to whichever write half it last received.
//!
//! The gateway only ever sees queues: [`AprsLink::send`] and
//! [`AprsLink::set_filter`] enqueue, [`AprsLink::recv`] polls.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::error::{AprsError, Result};
use crate::packet::{parse, AprsPacket};
use crate::{DEFAULT_PORT, DEFAULT_SERVER, SOFTWARE_NAME, VERSION};

/// The packet-network side as seen by the gateway
///
/// All methods return immediately. Implemented by [`AprsClient`] and by the
/// recording mock used in gateway tests.
pub trait AprsLink: Send {
    /// Enqueue a pre-formatted line for transmission
    fn send(&self, line: String);

    /// Enqueue a server-side filter change, ordered with respect to `send`
    fn set_filter(&self, expression: String);

    /// Take the next decoded packet, if one is waiting
    fn recv(&mut self) -> Option<AprsPacket>;
}

/// Connection settings for [`AprsClient`]
#[derive(Debug, Clone)]
pub struct AprsClientConfig {
    /// Server host name
    pub host: String,
    /// Server port (filtered feed)
    pub port: u16,
    /// Login call sign
    pub login: String,
    /// APRS-IS passcode for the login call sign
    pub passcode: i32,
    /// Filter applied at login
    pub filter: Option<String>,
    /// Delay before redialing a dropped session
    pub reconnect_delay: Duration,
}

impl AprsClientConfig {
    /// Settings for the default server with no filter
    pub fn new(login: impl Into<String>, passcode: i32) -> Self {
        Self {
            host: DEFAULT_SERVER.to_string(),
            port: DEFAULT_PORT,
            login: login.into(),
            passcode,
            filter: None,
            reconnect_delay: Duration::from_secs(30),
        }
    }

    /// Set the server address
    pub fn with_server(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    /// Set the initial filter expression
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Set the reconnect delay
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    fn server(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn login_line(&self, filter: Option<&str>) -> String {
        let mut line = format!(
            "user {} pass {} vers {} {}",
            self.login, self.passcode, SOFTWARE_NAME, VERSION
        );
        if let Some(filter) = filter.filter(|f| !f.is_empty()) {
            line.push_str(" filter ");
            line.push_str(filter);
        }
        line
    }
}

/// Item on the outbound queue
#[derive(Debug)]
enum Outbound {
    Line(String),
    Filter(String),
}

/// Queue-backed APRS-IS client
pub struct AprsClient {
    outbound: mpsc::UnboundedSender<Outbound>,
    inbound: mpsc::UnboundedReceiver<String>,
    filter: watch::Receiver<Option<String>>,
    tasks: Vec<JoinHandle<()>>,
}

impl AprsClient {
    /// Start the send and receive tasks
    ///
    /// Must be called from within a tokio runtime. Connection failures are
    /// retried in the background and never surface here.
    pub fn spawn(config: AprsClientConfig) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (writer_tx, writer_rx) = mpsc::channel(1);
        let (filter_tx, filter_rx) = watch::channel(config.filter.clone());

        info!(server = %config.server(), login = %config.login, "Starting APRS-IS client");

        let receiver = tokio::spawn(receive_loop(
            config,
            filter_rx.clone(),
            writer_tx,
            inbound_tx,
        ));
        let sender = tokio::spawn(send_loop(outbound_rx, writer_rx, filter_tx));

        Self {
            outbound: outbound_tx,
            inbound: inbound_rx,
            filter: filter_rx,
            tasks: vec![receiver, sender],
        }
    }

    /// Take the next raw line, if one is waiting
    pub fn recv_raw(&mut self) -> Option<String> {
        self.inbound.try_recv().ok()
    }

    /// Filter expression most recently applied to the session
    pub fn filter(&self) -> Option<String> {
        self.filter.borrow().clone()
    }
}

impl AprsLink for AprsClient {
    fn send(&self, line: String) {
        trace!(%line, "Queueing APRS line");
        if self.outbound.send(Outbound::Line(line)).is_err() {
            warn!("APRS-IS send task has stopped; line dropped");
        }
    }

    fn set_filter(&self, expression: String) {
        if self.outbound.send(Outbound::Filter(expression)).is_err() {
            warn!("APRS-IS send task has stopped; filter update dropped");
        }
    }

    fn recv(&mut self) -> Option<AprsPacket> {
        let line = self.recv_raw()?;
        match parse(&line) {
            Ok(packet) => Some(packet),
            Err(e) => {
                debug!(error = %e, %line, "Unparseable APRS-IS line");
                None
            }
        }
    }
}

impl Drop for AprsClient {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

async fn connect(
    config: &AprsClientConfig,
    filter: Option<&str>,
) -> Result<(OwnedReadHalf, OwnedWriteHalf)> {
    let stream = TcpStream::connect((config.host.as_str(), config.port))
        .await
        .map_err(|e| AprsError::ConnectFailed {
            server: config.server(),
            reason: e.to_string(),
        })?;
    let (reader, mut writer) = stream.into_split();

    let login = config.login_line(filter);
    writer.write_all(login.as_bytes()).await?;
    writer.write_all(b"\r\n").await?;
    writer.flush().await?;

    Ok((reader, writer))
}

async fn read_lines(
    reader: OwnedReadHalf,
    inbound: &mpsc::UnboundedSender<String>,
) -> Result<()> {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            return Err(AprsError::Disconnected);
        }

        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            continue;
        }
        if line.starts_with('#') {
            trace!(%line, "APRS-IS server comment");
            continue;
        }
        if inbound.send(line.to_string()).is_err() {
            return Ok(());
        }
    }
}

async fn receive_loop(
    config: AprsClientConfig,
    filter: watch::Receiver<Option<String>>,
    writers: mpsc::Sender<OwnedWriteHalf>,
    inbound: mpsc::UnboundedSender<String>,
) {
    loop {
        let current = filter.borrow().clone();
        match connect(&config, current.as_deref()).await {
            Ok((reader, writer)) => {
                info!(server = %config.server(), "Connected to APRS-IS");
                if writers.send(writer).await.is_err() {
                    return;
                }
                match read_lines(reader, &inbound).await {
                    Ok(()) => return,
                    Err(e) => warn!(error = %e, "APRS-IS session ended"),
                }
            }
            Err(e) => warn!(error = %e, "APRS-IS connection failed"),
        }

        if inbound.is_closed() {
            return;
        }
        debug!(delay = ?config.reconnect_delay, "Reconnecting to APRS-IS");
        tokio::time::sleep(config.reconnect_delay).await;
    }
}

async fn write_line(writer: &mut OwnedWriteHalf, line: &str) -> std::io::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\r\n").await?;
    writer.flush().await
}

async fn send_loop(
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    mut writers: mpsc::Receiver<OwnedWriteHalf>,
    filter: watch::Sender<Option<String>>,
) {
    let mut writer: Option<OwnedWriteHalf> = None;

    loop {
        tokio::select! {
            biased;

            next = writers.recv() => match next {
                Some(w) => writer = Some(w),
                None => return,
            },

            item = outbound.recv(), if writer.is_some() => {
                let Some(item) = item else { return };
                let Some(w) = writer.as_mut() else { continue };

                let result = match item {
                    Outbound::Line(line) => {
                        debug!(%line, "Sending to APRS-IS");
                        write_line(w, &line).await
                    }
                    Outbound::Filter(expression) => {
                        info!(filter = %expression, "Updating APRS-IS filter");
                        let command = format!("#filter {expression}");
                        filter.send_replace(Some(expression));
                        write_line(w, &command).await
                    }
                };

                if let Err(e) = result {
                    warn!(error = %e, "APRS-IS write failed; waiting for reconnect");
                    writer = None;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_line() {
        let config = AprsClientConfig::new("N0CALL-10", 12345);
        assert_eq!(
            config.login_line(None),
            format!("user N0CALL-10 pass 12345 vers meshgate {VERSION}")
        );
        assert!(config
            .login_line(Some("g/N0CALL-10/MESHID-01"))
            .ends_with(" filter g/N0CALL-10/MESHID-01"));
        assert!(!config.login_line(Some("")).contains("filter"));
    }

    #[test]
    fn test_config_builder() {
        let config = AprsClientConfig::new("N0CALL", -1)
            .with_server("localhost", 10152)
            .with_filter("g/N0CALL")
            .with_reconnect_delay(Duration::from_millis(10));
        assert_eq!(config.server(), "localhost:10152");
        assert_eq!(config.filter.as_deref(), Some("g/N0CALL"));
    }
}
