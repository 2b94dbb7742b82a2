//! Configuration types for the gateway
//!
//! The gateway reads a single YAML file, `meshgate.yaml`. Only `call_sign`
//! and `aprsis_passcode` are required; everything else has a default.
//! Durations use humantime strings (`15m`, `1h`, `30s`).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use meshgate_aprs::{
    AprsClientConfig, DEFAULT_MAX_COMMENT_BYTES, DEFAULT_MAX_TEXT_BYTES, DEFAULT_PORT,
    DEFAULT_SERVER,
};
use meshgate_registry::RegistryOptions;
use tracing::debug;

use crate::error::ConfigError;

/// Configuration file name
pub const CONFIG_FILE_NAME: &str = "meshgate.yaml";

/// Call sign shipped in the sample configuration
pub const SAMPLE_CALL_SIGN: &str = "N0CALL";

/// Default data directory, relative to the configuration file
pub const DATA_SUBDIR: &str = "data";

/// Default logs directory, relative to the configuration file
pub const LOGS_SUBDIR: &str = "logs";

/// Default baud rate for Meshtastic serial devices
pub const DEFAULT_BAUD_RATE: u32 = 115200;

/// Default TCP port of networked Meshtastic devices
pub const DEFAULT_MESH_TCP_PORT: u16 = 4403;

/// Default gateway beacon icon ('M' overlaid on a gateway diamond)
pub const DEFAULT_BEACON_ICON: &str = "M&";

/// Sample configuration written when none is found
pub const SAMPLE_CONFIG: &str = r#"#
# MESHGATE CONFIGURATION FILE (version: 1)
# Be sure to at least modify 'call_sign' and 'aprsis_passcode'.
#


# Radio call sign of the gateway itself (analogy, iGate's call sign)
call_sign: N0CALL


# APRS-IS passcode for the call sign above
aprsis_passcode: 12345


# APRS-IS server
#aprsis:
#  host: rotate.aprs2.net
#  port: 14580


# How to reach the Meshtastic radio.
# For serial devices, if 'device' is commented out, an attempt will be made
# to detect it automatically.
meshtastic_interface:
  type: serial
#  device: /dev/ttyACM0
#
# Networked radios:
#  type: tcp
#  host: 192.168.1.50
#  port: 4403


# Beacon new registrations to APRS-IS to facilitate discovery
beacon_registrations: true


# Should the gateway beacon its own position
gateway_beacon:
  enabled: true
  icon: "M&"                  # 'M' in a diamond, representing a Gateway
#  latitude: 47.6205063       # Leave commented to read position from the radio
#  longitude: -122.3518523    # Leave commented to read position from the radio


# Reconnect to the radio if nothing is heard for this long
#watchdog:
#  stall_timeout: 15m
#  reconnect_backoff: 30s


# Where should logs be stored?
# If null, (or commented out), store logs in the `logs` dir, sibling to this file.
#logs_dir: null


# Where should data be stored?
# If null, (or commented out), store data in the `data` dir, sibling to this file.
#data_dir: null
"#;

/// Main configuration for the gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Gateway call sign (upper-cased on load)
    pub call_sign: String,

    /// APRS-IS passcode for `call_sign`
    pub aprsis_passcode: i32,

    /// APRS-IS server settings
    #[serde(default)]
    pub aprsis: AprsIsConfig,

    /// How to reach the mesh radio
    #[serde(default)]
    pub meshtastic_interface: InterfaceConfig,

    /// Beacon registrations to other gateways
    #[serde(default = "default_true")]
    pub beacon_registrations: bool,

    /// Gateway position beacon
    #[serde(default)]
    pub gateway_beacon: BeaconConfig,

    /// Stall detection and reconnection
    #[serde(default)]
    pub watchdog: WatchdogConfig,

    /// Registry seed settings
    #[serde(default)]
    pub registry: RegistrySettings,

    /// Outbound length limits
    #[serde(default)]
    pub message: MessageLimits,

    /// Registry data directory
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// Log file directory
    #[serde(default)]
    pub logs_dir: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}

/// APRS-IS server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AprsIsConfig {
    /// Server host
    #[serde(default = "default_aprs_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_aprs_port")]
    pub port: u16,

    /// Delay before redialing a dropped session
    #[serde(with = "humantime_serde", default = "default_aprs_reconnect")]
    pub reconnect_delay: Duration,
}

fn default_aprs_host() -> String {
    DEFAULT_SERVER.to_string()
}

fn default_aprs_port() -> u16 {
    DEFAULT_PORT
}

fn default_aprs_reconnect() -> Duration {
    Duration::from_secs(30)
}

impl Default for AprsIsConfig {
    fn default() -> Self {
        Self {
            host: default_aprs_host(),
            port: DEFAULT_PORT,
            reconnect_delay: default_aprs_reconnect(),
        }
    }
}

/// Interface type for connecting to the mesh radio
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum InterfaceConfig {
    /// Serial port connection (most common)
    Serial {
        /// Path to serial port; detected when absent
        #[serde(default)]
        device: Option<PathBuf>,
        /// Baud rate (default: 115200)
        #[serde(default = "default_baud_rate")]
        baud_rate: u32,
    },
    /// TCP connection (for devices with network)
    Tcp {
        /// Host address
        host: String,
        /// Port number
        #[serde(default = "default_mesh_tcp_port")]
        port: u16,
    },
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_mesh_tcp_port() -> u16 {
    DEFAULT_MESH_TCP_PORT
}

impl Default for InterfaceConfig {
    fn default() -> Self {
        InterfaceConfig::Serial {
            device: None,
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }
}

/// Gateway position beacon settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeaconConfig {
    /// Beacon at all
    #[serde(default)]
    pub enabled: bool,

    /// Two-character symbol (table + code)
    #[serde(default = "default_beacon_icon")]
    pub icon: String,

    /// Fixed latitude; read from the radio when absent
    #[serde(default)]
    pub latitude: Option<f64>,

    /// Fixed longitude; read from the radio when absent
    #[serde(default)]
    pub longitude: Option<f64>,

    /// Time between beacons
    #[serde(with = "humantime_serde", default = "default_beacon_interval")]
    pub interval: Duration,

    /// Retry delay while no position is known
    #[serde(with = "humantime_serde", default = "default_beacon_retry")]
    pub retry: Duration,
}

fn default_beacon_icon() -> String {
    DEFAULT_BEACON_ICON.to_string()
}

fn default_beacon_interval() -> Duration {
    Duration::from_secs(3600)
}

fn default_beacon_retry() -> Duration {
    Duration::from_secs(60)
}

impl Default for BeaconConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            icon: default_beacon_icon(),
            latitude: None,
            longitude: None,
            interval: default_beacon_interval(),
            retry: default_beacon_retry(),
        }
    }
}

impl BeaconConfig {
    /// Configured fixed position, when both coordinates are set
    pub fn fixed_position(&self) -> Option<(f64, f64)> {
        self.latitude.zip(self.longitude)
    }
}

/// Watchdog settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchdogConfig {
    /// Reconnect when no mesh packet arrives for this long
    #[serde(with = "humantime_serde", default = "default_stall_timeout")]
    pub stall_timeout: Duration,

    /// Pause between closing and reopening the radio
    #[serde(with = "humantime_serde", default = "default_reconnect_backoff")]
    pub reconnect_backoff: Duration,
}

fn default_stall_timeout() -> Duration {
    Duration::from_secs(15 * 60)
}

fn default_reconnect_backoff() -> Duration {
    Duration::from_secs(30)
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            stall_timeout: default_stall_timeout(),
            reconnect_backoff: default_reconnect_backoff(),
        }
    }
}

/// Registry seed settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrySettings {
    /// Refresh the community list when stale
    #[serde(default = "default_true")]
    pub refresh_precompiled: bool,

    /// Alternative community list URL
    #[serde(default)]
    pub precompiled_url: Option<String>,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            refresh_precompiled: true,
            precompiled_url: None,
        }
    }
}

/// Outbound APRS length limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageLimits {
    /// Maximum message text bytes per APRS message
    #[serde(default = "default_max_text_bytes")]
    pub max_text_bytes: usize,

    /// Maximum position comment bytes
    #[serde(default = "default_max_comment_bytes")]
    pub max_comment_bytes: usize,
}

fn default_max_text_bytes() -> usize {
    DEFAULT_MAX_TEXT_BYTES
}

fn default_max_comment_bytes() -> usize {
    DEFAULT_MAX_COMMENT_BYTES
}

impl Default for MessageLimits {
    fn default() -> Self {
        Self {
            max_text_bytes: DEFAULT_MAX_TEXT_BYTES,
            max_comment_bytes: DEFAULT_MAX_COMMENT_BYTES,
        }
    }
}

impl GatewayConfig {
    /// Parse and validate a configuration file
    ///
    /// Relative `data_dir`/`logs_dir` resolve against the file's directory
    /// and both are created when missing.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        debug!(path = %path.display(), "Loading configuration");
        let text = std::fs::read_to_string(path)?;
        let mut config: GatewayConfig = serde_yaml::from_str(&text)?;
        config.validate(path)?;
        config.resolve_dirs(path)?;
        Ok(config)
    }

    /// Find and load the configuration file
    ///
    /// An explicit path is loaded as-is. Otherwise `./meshgate.yaml` is
    /// tried, then `<config dir>/meshgate/meshgate.yaml`. When neither
    /// exists a sample is written to the latter and
    /// [`ConfigError::SampleWritten`] is returned.
    pub fn discover(explicit: Option<&Path>) -> Result<(PathBuf, Self), ConfigError> {
        if let Some(path) = explicit {
            return Ok((path.to_path_buf(), Self::load(path)?));
        }

        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.is_file() {
            return Ok((local.clone(), Self::load(&local)?));
        }

        let user = default_config_path()?;
        if user.is_file() {
            return Ok((user.clone(), Self::load(&user)?));
        }

        write_sample(&user)?;
        Err(ConfigError::SampleWritten { path: user })
    }

    fn validate(&mut self, path: &Path) -> Result<(), ConfigError> {
        self.call_sign = self.call_sign.trim().to_uppercase();
        if self.call_sign.is_empty() {
            return Err(ConfigError::Invalid("call_sign is empty".to_string()));
        }
        if self.call_sign == SAMPLE_CALL_SIGN {
            return Err(ConfigError::SampleConfig {
                path: path.to_path_buf(),
            });
        }
        if self.gateway_beacon.icon.chars().count() != 2 {
            return Err(ConfigError::Invalid(format!(
                "gateway_beacon.icon must be two characters, got {:?}",
                self.gateway_beacon.icon
            )));
        }
        if self.message.max_text_bytes == 0 {
            return Err(ConfigError::Invalid(
                "message.max_text_bytes must be positive".to_string(),
            ));
        }
        Ok(())
    }

    fn resolve_dirs(&mut self, path: &Path) -> Result<(), ConfigError> {
        let base = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let data_dir = resolve_dir(base, self.data_dir.as_deref(), DATA_SUBDIR);
        let logs_dir = resolve_dir(base, self.logs_dir.as_deref(), LOGS_SUBDIR);
        std::fs::create_dir_all(&data_dir)?;
        std::fs::create_dir_all(&logs_dir)?;

        debug!(data_dir = %data_dir.display(), logs_dir = %logs_dir.display(), "Resolved directories");
        self.data_dir = Some(data_dir);
        self.logs_dir = Some(logs_dir);
        Ok(())
    }

    /// Data directory, or `data` in the working directory before `load`
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DATA_SUBDIR))
    }

    /// Registry options derived from the `registry` section
    pub fn registry_options(&self) -> RegistryOptions {
        RegistryOptions {
            refresh_precompiled: self.registry.refresh_precompiled,
            precompiled_url: self.registry.precompiled_url.clone(),
            ..Default::default()
        }
    }

    /// APRS-IS client settings with the given initial filter
    pub fn aprs_client_config(&self, filter: impl Into<String>) -> AprsClientConfig {
        AprsClientConfig::new(self.call_sign.clone(), self.aprsis_passcode)
            .with_server(self.aprsis.host.clone(), self.aprsis.port)
            .with_filter(filter)
            .with_reconnect_delay(self.aprsis.reconnect_delay)
    }
}

fn resolve_dir(base: &Path, configured: Option<&Path>, default: &str) -> PathBuf {
    match configured {
        Some(dir) if dir.as_os_str().is_empty() => base.join(default),
        Some(dir) if dir.is_absolute() => dir.to_path_buf(),
        Some(dir) => base.join(dir),
        None => base.join(default),
    }
}

/// `<config dir>/meshgate/meshgate.yaml`
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    let base = dirs::config_dir()
        .ok_or_else(|| ConfigError::Invalid("no user configuration directory".to_string()))?;
    Ok(base.join("meshgate").join(CONFIG_FILE_NAME))
}

/// Write the sample configuration, creating parent directories
pub fn write_sample(path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, format!("{}\n", SAMPLE_CONFIG.trim_end()))?;
    Ok(())
}

/// Builder for GatewayConfig
#[derive(Debug)]
pub struct GatewayConfigBuilder {
    config: GatewayConfig,
}

impl GatewayConfigBuilder {
    /// Create a new builder with defaults
    pub fn new(call_sign: impl Into<String>) -> Self {
        Self {
            config: GatewayConfig {
                call_sign: call_sign.into().trim().to_uppercase(),
                aprsis_passcode: -1,
                aprsis: AprsIsConfig::default(),
                meshtastic_interface: InterfaceConfig::default(),
                beacon_registrations: true,
                gateway_beacon: BeaconConfig::default(),
                watchdog: WatchdogConfig::default(),
                registry: RegistrySettings::default(),
                message: MessageLimits::default(),
                data_dir: None,
                logs_dir: None,
            },
        }
    }

    /// Set the APRS-IS passcode
    pub fn passcode(mut self, passcode: i32) -> Self {
        self.config.aprsis_passcode = passcode;
        self
    }

    /// Set the APRS-IS server
    pub fn aprs_server(mut self, host: impl Into<String>, port: u16) -> Self {
        self.config.aprsis.host = host.into();
        self.config.aprsis.port = port;
        self
    }

    /// Use a serial radio
    pub fn serial_device(mut self, device: impl Into<PathBuf>) -> Self {
        self.config.meshtastic_interface = InterfaceConfig::Serial {
            device: Some(device.into()),
            baud_rate: DEFAULT_BAUD_RATE,
        };
        self
    }

    /// Use a networked radio
    pub fn tcp_device(mut self, host: impl Into<String>, port: u16) -> Self {
        self.config.meshtastic_interface = InterfaceConfig::Tcp {
            host: host.into(),
            port,
        };
        self
    }

    /// Enable or disable registration beacons
    pub fn beacon_registrations(mut self, enabled: bool) -> Self {
        self.config.beacon_registrations = enabled;
        self
    }

    /// Enable the gateway beacon, optionally at a fixed position
    pub fn gateway_beacon(mut self, position: Option<(f64, f64)>) -> Self {
        self.config.gateway_beacon.enabled = true;
        self.config.gateway_beacon.latitude = position.map(|p| p.0);
        self.config.gateway_beacon.longitude = position.map(|p| p.1);
        self
    }

    /// Set the watchdog timings
    pub fn watchdog(mut self, stall_timeout: Duration, reconnect_backoff: Duration) -> Self {
        self.config.watchdog = WatchdogConfig {
            stall_timeout,
            reconnect_backoff,
        };
        self
    }

    /// Set the data directory
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.data_dir = Some(dir.into());
        self
    }

    /// Disable the community list refresh
    pub fn offline_registry(mut self) -> Self {
        self.config.registry.refresh_precompiled = false;
        self
    }

    /// Build the configuration
    pub fn build(self) -> GatewayConfig {
        self.config
    }
}

// Custom serde module for Duration with humantime
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
