//! Decoding of received APRS-IS lines
//!
//! APRS-IS delivers one packet per line in TNC2 text form:
//!
//! ```text
//! N0CALL-9>APRS,TCPIP*,qAC,T2TEST::N0CALL-5 :hello there{42
//! └─from─┘ └to┘ └──path──────────┘└────────── info ───────────┘
//! ```
//!
//! Only messages are decoded in depth. Other formats are classified so the
//! gateway can ignore them.

use crate::error::ParseError;

/// Width of the padded addressee field in a message
const ADDRESSEE_WIDTH: usize = 9;

/// Maximum length of a message number
const MAX_MSG_NO_LEN: usize = 5;

/// Coarse classification of the information field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketFormat {
    /// `:ADDRESSEE:text` message, ack or rej
    Message,
    /// Position report (`!`, `=`, `/`, `@`)
    Position,
    /// Status report (`>`)
    Status,
    /// Anything else (telemetry, objects, third-party, Mic-E, ...)
    Other,
}

/// Kind of message response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    /// Acknowledgment
    Ack,
    /// Rejection
    Rej,
}

/// A decoded APRS packet
#[derive(Debug, Clone, PartialEq)]
pub struct AprsPacket {
    /// The line as received, without the line terminator
    pub raw: String,
    /// Source call sign, upper-cased
    pub from: String,
    /// Destination (tocall) field
    pub to: String,
    /// Digipeater / q-construct path
    pub path: Vec<String>,
    /// Classification of the information field
    pub format: PacketFormat,
    /// Message addressee, trimmed and upper-cased (messages only)
    pub addressee: Option<String>,
    /// Message text without the message number (messages only)
    pub message_text: Option<String>,
    /// Message number, or the number being acked/rejected
    pub msg_no: Option<String>,
    /// Set when the message is itself an ack or rej
    pub response: Option<Response>,
}

impl AprsPacket {
    /// Check if this packet is a message (including acks and rejs)
    pub fn is_message(&self) -> bool {
        self.format == PacketFormat::Message
    }

    /// Check if this packet is an ack or rej for an earlier message
    pub fn is_response(&self) -> bool {
        self.response.is_some()
    }
}

/// Parse one APRS-IS line
pub fn parse(line: &str) -> Result<AprsPacket, ParseError> {
    let raw = line.trim_end_matches(['\r', '\n']);
    if raw.trim().is_empty() {
        return Err(ParseError::Empty);
    }

    let (header, info) = raw.split_once(':').ok_or(ParseError::MissingInfo)?;
    let (from, route) = header.split_once('>').ok_or(ParseError::MissingHeader)?;

    let from = from.trim();
    if !is_valid_source(from) {
        return Err(ParseError::InvalidSource(from.to_string()));
    }

    let mut route = route.split(',');
    let to = route.next().unwrap_or_default().trim();
    if to.is_empty() {
        return Err(ParseError::MissingDestination);
    }
    let path = route.map(|hop| hop.trim().to_string()).collect();

    let mut packet = AprsPacket {
        raw: raw.to_string(),
        from: from.to_uppercase(),
        to: to.to_string(),
        path,
        format: classify(info),
        addressee: None,
        message_text: None,
        msg_no: None,
        response: None,
    };

    if packet.format == PacketFormat::Message {
        decode_message(info, &mut packet)?;
    }

    Ok(packet)
}

fn is_valid_source(call: &str) -> bool {
    !call.is_empty()
        && call.len() <= ADDRESSEE_WIDTH
        && call.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

fn classify(info: &str) -> PacketFormat {
    match info.as_bytes().first() {
        Some(b':') => PacketFormat::Message,
        Some(b'!' | b'=' | b'/' | b'@') => PacketFormat::Position,
        Some(b'>') => PacketFormat::Status,
        _ => PacketFormat::Other,
    }
}

/// Decode `:ADDRESSEE:text[{msgno]`
fn decode_message(info: &str, packet: &mut AprsPacket) -> Result<(), ParseError> {
    let addressee = info
        .get(1..=ADDRESSEE_WIDTH)
        .ok_or_else(|| ParseError::MalformedMessage("short addressee".to_string()))?;
    if info.as_bytes().get(ADDRESSEE_WIDTH + 1) != Some(&b':') {
        return Err(ParseError::MalformedMessage(
            "addressee not terminated by ':'".to_string(),
        ));
    }
    let text = &info[ADDRESSEE_WIDTH + 2..];

    packet.addressee = Some(addressee.trim().to_uppercase());

    if let Some((response, msg_no)) = split_response(text) {
        packet.response = Some(response);
        packet.msg_no = Some(msg_no.to_string());
        packet.message_text = Some(text.to_string());
        return Ok(());
    }

    match split_msg_no(text) {
        Some((body, msg_no)) => {
            packet.message_text = Some(body.to_string());
            packet.msg_no = Some(msg_no.to_string());
        }
        None => packet.message_text = Some(text.to_string()),
    }
    Ok(())
}

fn is_msg_no(s: &str) -> bool {
    !s.is_empty() && s.len() <= MAX_MSG_NO_LEN && s.chars().all(|c| c.is_ascii_alphanumeric())
}

/// `ack12` / `rej12`, optionally in the `ack12}34` reply-ack form
fn split_response(text: &str) -> Option<(Response, &str)> {
    let text = text.trim_end();
    let (response, rest) = if let Some(rest) = text.strip_prefix("ack") {
        (Response::Ack, rest)
    } else if let Some(rest) = text.strip_prefix("rej") {
        (Response::Rej, rest)
    } else {
        return None;
    };
    let msg_no = rest.split_once('}').map_or(rest, |(no, _)| no);
    is_msg_no(msg_no).then_some((response, msg_no))
}

/// `text{12` or the reply-ack form `text{12}34`
fn split_msg_no(text: &str) -> Option<(&str, &str)> {
    let (body, tail) = text.rsplit_once('{')?;
    let tail = tail.trim_end();
    let msg_no = match tail.split_once('}') {
        Some((no, reply)) if reply.is_empty() || is_msg_no(reply) => no,
        Some(_) => return None,
        None => tail,
    };
    is_msg_no(msg_no).then_some((body, msg_no))
}
