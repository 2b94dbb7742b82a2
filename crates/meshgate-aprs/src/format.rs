//! Outbound APRS-IS line formatting
//!
//! Traffic relayed on behalf of mesh devices is injected as third-party
//! packets gated by this station:
//!
//! ```text
//! N0CALL-5>APZMAG,WIDE1-1,qAR,GW0CALL::N0CALL-9 :hello there{417
//! N0CALL-5>APZMAG,WIDE1-1,qAR,GW0CALL:@161522z4740.53N/12207.12W>comment
//! GW0CALL>APZMAG,TCPIP*:!4740.53NM12207.12W&meshgate: !a1b2c3d4
//! ```

use chrono::{DateTime, Utc};
use rand::Rng;
use tracing::warn;

use crate::symbols::DEFAULT_POSITION_SYMBOL;

/// Destination (tocall) identifying this gateway software
pub const SOFTWARE_ID: &str = "APZMAG";

/// Maximum UTF-8 length of one message's text
pub const DEFAULT_MAX_TEXT_BYTES: usize = 67;

/// Maximum UTF-8 length of a position comment
pub const DEFAULT_MAX_COMMENT_BYTES: usize = 43;

/// Width of the padded addressee field
const ADDRESSEE_WIDTH: usize = 9;

/// Largest message number handed out
const MAX_MSG_NO: u16 = 999;

/// A position to be reported on behalf of a call sign
#[derive(Debug, Clone, PartialEq)]
pub struct PositionReport {
    /// Call sign the report is sent from
    pub from: String,
    /// Latitude in decimal degrees
    pub latitude: f64,
    /// Longitude in decimal degrees
    pub longitude: f64,
    /// Time of the fix, when known
    pub timestamp: Option<DateTime<Utc>>,
    /// Two-character symbol (table + code)
    pub symbol: String,
    /// Free-text comment, truncated on output
    pub comment: String,
}

impl PositionReport {
    /// Create a report with the default symbol and no comment
    pub fn new(from: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            from: from.into(),
            latitude,
            longitude,
            timestamp: None,
            symbol: DEFAULT_POSITION_SYMBOL.to_string(),
            comment: String::new(),
        }
    }

    /// Set the time of the fix
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Set the map symbol
    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = symbol.into();
        self
    }

    /// Set the comment
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }
}

/// Builds outbound lines gated through one station
#[derive(Debug, Clone)]
pub struct PacketFormatter {
    gateway: String,
    max_text_bytes: usize,
    max_comment_bytes: usize,
}

impl PacketFormatter {
    /// Create a formatter for the given gateway call sign
    pub fn new(gateway: impl Into<String>) -> Self {
        Self {
            gateway: gateway.into(),
            max_text_bytes: DEFAULT_MAX_TEXT_BYTES,
            max_comment_bytes: DEFAULT_MAX_COMMENT_BYTES,
        }
    }

    /// Override the message and comment length limits
    pub fn with_limits(mut self, max_text_bytes: usize, max_comment_bytes: usize) -> Self {
        self.max_text_bytes = max_text_bytes.max(1);
        self.max_comment_bytes = max_comment_bytes;
        self
    }

    /// Gateway call sign
    pub fn gateway(&self) -> &str {
        &self.gateway
    }

    fn third_party_header(&self, from: &str) -> String {
        format!("{from}>{SOFTWARE_ID},WIDE1-1,qAR,{}", self.gateway)
    }

    /// Format a message, split into as many lines as the length limit needs
    pub fn messages(&self, from: &str, to: &str, text: &str) -> Vec<String> {
        let mut rng = rand::thread_rng();
        chunk_text(text, self.max_text_bytes)
            .iter()
            .map(|chunk| self.message(from, to, chunk, rng.gen_range(0..=MAX_MSG_NO)))
            .collect()
    }

    /// Format a single message line with an explicit message number
    pub fn message(&self, from: &str, to: &str, text: &str, msg_no: u16) -> String {
        format!(
            "{}::{}:{}{{{}",
            self.third_party_header(from),
            pad_addressee(to),
            text.trim(),
            msg_no
        )
    }

    /// Format an acknowledgment sent from `from` to `to`
    pub fn ack(&self, from: &str, to: &str, msg_no: &str) -> String {
        format!(
            "{}::{}:ack{}",
            self.third_party_header(from),
            pad_addressee(to),
            msg_no
        )
    }

    /// Format a position report
    pub fn position(&self, report: &PositionReport) -> String {
        let comment = truncate_to_bytes(&report.comment, self.max_comment_bytes);
        if comment.len() < report.comment.len() {
            warn!(
                from = %report.from,
                limit = self.max_comment_bytes,
                "Position comment truncated"
            );
        }

        let (table, code) = split_symbol(&report.symbol);
        let time = match report.timestamp {
            Some(ts) => format!("@{}", format_timestamp(ts)),
            None => "!".to_string(),
        };

        format!(
            "{}:{}{}{}{}{}{}",
            self.third_party_header(&report.from),
            time,
            format_latitude(report.latitude),
            table,
            format_longitude(report.longitude),
            code,
            comment
        )
    }

    /// Format the gateway's own position beacon
    pub fn beacon(&self, latitude: f64, longitude: f64, symbol: &str, comment: &str) -> String {
        let (table, code) = split_symbol(symbol);
        format!(
            "{}>{SOFTWARE_ID},TCPIP*:!{}{}{}{}{}",
            self.gateway,
            format_latitude(latitude),
            table,
            format_longitude(longitude),
            code,
            truncate_to_bytes(comment, self.max_comment_bytes)
        )
    }
}

fn pad_addressee(call: &str) -> String {
    format!("{:<width$}", call, width = ADDRESSEE_WIDTH)
}

fn split_symbol(symbol: &str) -> (char, char) {
    let mut chars = symbol.chars();
    match (chars.next(), chars.next()) {
        (Some(table), Some(code)) => (table, code),
        _ => {
            let mut default = DEFAULT_POSITION_SYMBOL.chars();
            (
                default.next().unwrap_or('/'),
                default.next().unwrap_or('>'),
            )
        }
    }
}

/// Split text at whitespace into chunks of at most `max_bytes` UTF-8 bytes
///
/// Words are never broken: a word longer than the limit becomes a chunk of
/// its own. Runs of whitespace collapse to a single space and no chunk is
/// ever empty.
pub fn chunk_text(text: &str, max_bytes: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if current.is_empty() {
            current.push_str(word);
        } else if current.len() + 1 + word.len() <= max_bytes {
            current.push(' ');
            current.push_str(word);
        } else {
            chunks.push(std::mem::take(&mut current));
            current.push_str(word);
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Drop trailing characters until `text` fits in `max_bytes` UTF-8 bytes
pub fn truncate_to_bytes(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Split decimal degrees into whole degrees and hundredths of minutes
fn degrees_minutes(value: f64) -> (u32, u32) {
    let hundredths = (value.abs() * 6000.0).round() as u64;
    ((hundredths / 6000) as u32, (hundredths % 6000) as u32)
}

/// Render a latitude as `DDMM.mmN`
pub fn format_latitude(latitude: f64) -> String {
    let (deg, min) = degrees_minutes(latitude);
    let hemisphere = if latitude >= 0.0 { 'N' } else { 'S' };
    format!("{:02}{:02}.{:02}{}", deg, min / 100, min % 100, hemisphere)
}

/// Render a longitude as `DDDMM.mmE`
pub fn format_longitude(longitude: f64) -> String {
    let (deg, min) = degrees_minutes(longitude);
    let hemisphere = if longitude >= 0.0 { 'E' } else { 'W' };
    format!("{:03}{:02}.{:02}{}", deg, min / 100, min % 100, hemisphere)
}

/// Render a UTC timestamp as `DDHHMMz`
pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    format!("{}z", timestamp.format("%d%H%M"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn formatter() -> PacketFormatter {
        PacketFormatter::new("GW0CALL")
    }

    #[test]
    fn test_message_line() {
        let line = formatter().message("N0CALL-5", "N0CALL-9", " hello there ", 417);
        assert_eq!(
            line,
            "N0CALL-5>APZMAG,WIDE1-1,qAR,GW0CALL::N0CALL-9 :hello there{417"
        );
    }

    #[test]
    fn test_messages_are_chunked_with_numbers() {
        let text = "word ".repeat(40);
        let lines = formatter().messages("N0CALL-5", "N0CALL-9", &text);
        assert!(lines.len() > 1);
        for line in &lines {
            let (_, tail) = line.split_once("::N0CALL-9 :").unwrap();
            let (body, msg_no) = tail.rsplit_once('{').unwrap();
            assert!(body.len() <= DEFAULT_MAX_TEXT_BYTES);
            assert!(msg_no.parse::<u16>().unwrap() <= 999);
        }
    }

    #[test]
    fn test_ack_line() {
        let line = formatter().ack("N0CALL-5", "W1AW", "42");
        assert_eq!(line, "N0CALL-5>APZMAG,WIDE1-1,qAR,GW0CALL::W1AW     :ack42");
    }

    #[test]
    fn test_position_line_with_timestamp() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 5, 7, 9, 0).unwrap();
        let report = PositionReport::new("N0CALL-5", 47.6755, -122.1187)
            .with_timestamp(ts)
            .with_comment("meshgate: !a1b2c3d4");

        assert_eq!(
            formatter().position(&report),
            "N0CALL-5>APZMAG,WIDE1-1,qAR,GW0CALL:@050709z4740.53N/12207.12W>meshgate: !a1b2c3d4"
        );
    }

    #[test]
    fn test_position_line_without_timestamp() {
        let report = PositionReport::new("N0CALL-5", -33.5, 151.25).with_symbol("/[");
        assert_eq!(
            formatter().position(&report),
            "N0CALL-5>APZMAG,WIDE1-1,qAR,GW0CALL:!3330.00S/15115.00E["
        );
    }

    #[test]
    fn test_position_comment_truncated() {
        let report = PositionReport::new("N0CALL-5", 0.0, 0.0).with_comment("x".repeat(60));
        let line = formatter().position(&report);
        assert!(line.ends_with(&"x".repeat(DEFAULT_MAX_COMMENT_BYTES)));
        assert!(!line.ends_with(&"x".repeat(DEFAULT_MAX_COMMENT_BYTES + 1)));
    }

    #[test]
    fn test_beacon_line() {
        let line = formatter().beacon(47.6755, -122.1187, "M&", "meshgate: !a1b2c3d4");
        assert_eq!(
            line,
            "GW0CALL>APZMAG,TCPIP*:!4740.53NM12207.12W&meshgate: !a1b2c3d4"
        );
    }

    #[test]
    fn test_minutes_never_render_as_sixty() {
        assert_eq!(format_latitude(10.99999999), "1100.00N");
        assert_eq!(format_longitude(-9.999999), "01000.00W");
    }

    #[test]
    fn test_timestamp_is_zero_padded() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(format_timestamp(ts), "020304z");
    }

    #[test]
    fn test_chunk_oversized_word() {
        let long = "a".repeat(80);
        let chunks = chunk_text(&format!("hi {long} there"), 67);
        assert_eq!(chunks, vec!["hi".to_string(), long, "there".to_string()]);
    }

    #[test]
    fn test_chunk_blank_text() {
        assert!(chunk_text("   \t ", 67).is_empty());
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate_to_bytes("héllo", 2), "h");
        assert_eq!(truncate_to_bytes("héllo", 3), "hé");
        assert_eq!(truncate_to_bytes("short", 43), "short");
    }

    proptest! {
        #[test]
        fn prop_chunks_preserve_words(text in "[a-z ]{0,200}", max in 1usize..80) {
            let chunks = chunk_text(&text, max);
            for chunk in &chunks {
                prop_assert!(!chunk.is_empty());
                prop_assert!(chunk.len() <= max || !chunk.contains(' '));
            }
            let rejoined: Vec<&str> = chunks.iter().flat_map(|c| c.split(' ')).collect();
            let original: Vec<&str> = text.split_whitespace().collect();
            prop_assert_eq!(rejoined, original);
        }

        #[test]
        fn prop_truncate_is_bounded_prefix(text in "\\PC{0,80}", max in 0usize..100) {
            let truncated = truncate_to_bytes(&text, max);
            prop_assert!(truncated.len() <= max);
            prop_assert!(text.starts_with(truncated));
        }
    }
}
