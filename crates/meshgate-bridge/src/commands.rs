//! Mesh text commands and gateway replies
//!
//! [`MeshCommand::parse`] classifies the text of a direct message. Which
//! rule applies to a sender (registered or not, reply target or not) is
//! decided by the gateway; this module only knows the syntax.

use std::sync::OnceLock;

use meshgate_aprs::symbol_code;
use regex::Regex;

/// Availability banner, also the one-time greeting
pub const BANNER: &str = "APRS Gateway available here. Welcome. Reply '?' for more info.";

/// `?` from an unregistered device
pub const HELP_UNREGISTERED: &str = "Send and receive APRS messages by registering your call sign. HAM license required.\n\nReply with:\n!register [CALLSIGN]-[SSID]\nE.g.,\n!register N0CALL-1";

/// Registration syntax error
pub const REGISTER_SYNTAX: &str = "Invalid call sign + ssid.\nSYNTAX: !register [CALLSIGN]-[SSID] [ICON]\nE.g.,\n!register N0CALL-1";

/// Message from an unregistered device
pub const UNKNOWN_DEVICE: &str = "Unknown device. HAM license required!\nRegister by replying with:\n!register [CALLSIGN]-[SSID]\nE.g.,\n!register N0CALL-1";

/// First registration of a device
pub const REGISTERED: &str = "Registered. Send APRS messages by replying here, and prefixing your message with the dest callsign. E.g., 'WLNK-1: hello' ";

/// Re-registration of a device
pub const REGISTRATION_UPDATED: &str = "Registration updated.";

/// `!unregister` from an unregistered device
pub const NOT_REGISTERED: &str = "This device is not registered.";

/// Message without destination and without a reply target
pub const PREFIX_REQUIRED: &str =
    "Please prefix your message with the dest callsign. E.g., 'WLNK-1: hello'";

/// `?` from a registered device
pub fn help_registered(call_sign: &str) -> String {
    format!(
        "Registered as {}. Send APRS messages by prefixing them with the dest callsign. E.g., 'WLNK-1: hello'\nReplies go to the last station you messaged.\n!unregister to remove.",
        call_sign
    )
}

/// Reply to `!unregister`
pub fn unregistered(call_sign: &str) -> String {
    format!("Unregistered {}.", call_sign)
}

/// Station status for `!id` and for APRS messages to the gateway
pub fn station_status(call_sign: &str, uptime: std::time::Duration, version: &str) -> String {
    let uptime = std::time::Duration::from_secs(uptime.as_secs());
    format!(
        "Gateway call sign: {}, Uptime: {}, Version: {}",
        call_sign,
        humantime::format_duration(uptime),
        version
    )
}

/// A parsed direct message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MeshCommand {
    /// `?`
    Help,
    /// `!id` or `!version`
    Id,
    /// `!register CALL-SSID [ICON]`
    Register {
        /// Upper-cased call sign with SSID
        call_sign: String,
        /// Validated icon code, upper-cased
        icon: Option<String>,
    },
    /// `!register` with a bad argument
    RegisterInvalid,
    /// `!unregister`
    Unregister,
    /// `CALL[-SSID]: body`
    Directed {
        /// Upper-cased destination
        call_sign: String,
        /// Trimmed body
        body: String,
    },
    /// Anything else
    Plain(String),
}

fn register_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^!register:?\s+([a-z0-9]{4,7}-[0-9]{1,2})(?:\s+([a-z0-9]{2,3}))?$")
            .expect("literal pattern compiles")
    })
}

fn directed_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)^([A-Za-z0-9]+(?:-[A-Za-z0-9]+)?):(.*)$")
            .expect("literal pattern compiles")
    })
}

fn device_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^![a-f0-9]{8}$").expect("literal pattern compiles")
    })
}

/// True for a broadcast availability probe (`aprs?`, any case)
pub fn is_probe(text: &str) -> bool {
    text.trim().to_lowercase().starts_with("aprs?")
}

/// Normalize a registration beacon payload to a device id
pub fn beacon_device_id(text: &str) -> Option<String> {
    let id = text.trim().to_lowercase();
    device_id_re().is_match(&id).then_some(id)
}

impl MeshCommand {
    /// Classify the text of a direct message
    pub fn parse(text: &str) -> Self {
        let trimmed = text.trim();
        let lowered = trimmed.to_lowercase();

        if trimmed == "?" {
            return MeshCommand::Help;
        }
        if trimmed == "!id" || trimmed == "!version" {
            return MeshCommand::Id;
        }
        if lowered == "!unregister" {
            return MeshCommand::Unregister;
        }
        if lowered.starts_with("!register") {
            return parse_register(&lowered);
        }
        if let Some(caps) = directed_re().captures(text) {
            return MeshCommand::Directed {
                call_sign: caps[1].to_uppercase(),
                body: caps[2].trim().to_string(),
            };
        }
        MeshCommand::Plain(text.to_string())
    }
}

fn parse_register(lowered: &str) -> MeshCommand {
    let Some(caps) = register_re().captures(lowered) else {
        return MeshCommand::RegisterInvalid;
    };
    let call_sign = caps[1].to_uppercase();
    let icon = match caps.get(2) {
        Some(icon) => match symbol_code(icon.as_str()) {
            Some(_) => Some(icon.as_str().to_uppercase()),
            None => return MeshCommand::RegisterInvalid,
        },
        None => None,
    };
    MeshCommand::Register { call_sign, icon }
}
