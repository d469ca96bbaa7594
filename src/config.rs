//! Configuration for the cloudlet sender
//!
//! Loaded from YAML. Every field is optional and falls back to the defaults
//! shown here.
//!
//! ```yaml
//! device_identity: "123"
//! frame_limit: 15
//! sample_pause_ms: 5
//! handshake_timeout_ms: 30000
//! channel:
//!   group: 33
//!   port: 40433
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::types::DeviceIdentity;
use crate::{CloudletError, Result};

/// Payload budget per frame before the sequence number's digits are subtracted
pub const DEFAULT_FRAME_LIMIT: usize = 15;

/// Top-level sender configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CloudletConfig {
    /// Identity override; detected from the host when absent
    pub device_identity: Option<String>,

    /// Characters per frame shared by the sequence digits and the chunk
    pub frame_limit: usize,

    /// Pause between sampling ticks
    pub sample_pause_ms: u64,

    /// Bound on the handshake wait. `null` waits forever.
    pub handshake_timeout_ms: Option<u64>,

    /// How long a received identity stays displayed
    pub identity_display_ms: u64,

    /// Send `<sessionId>cl:<label>` right after the handshake reply
    pub announce_class_frame: bool,

    pub channel: ChannelConfig,
}

/// Group addressing for the UDP channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChannelConfig {
    /// Radio group; datagrams for other groups are ignored
    pub group: u8,

    /// UDP port shared by the whole group
    pub port: u16,

    /// Local bind address
    pub bind: String,

    /// Broadcast address datagrams are sent to
    pub broadcast: String,
}

impl Default for CloudletConfig {
    fn default() -> Self {
        Self {
            device_identity: None,
            frame_limit: DEFAULT_FRAME_LIMIT,
            sample_pause_ms: 5,
            handshake_timeout_ms: Some(30_000),
            identity_display_ms: 2_000,
            announce_class_frame: false,
            channel: ChannelConfig::default(),
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            group: 33,
            port: 40433,
            bind: "0.0.0.0".to_string(),
            broadcast: "255.255.255.255".to_string(),
        }
    }
}

impl CloudletConfig {
    /// Parse configuration from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Self::parse(yaml, Path::new("<inline>"))
    }

    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| CloudletError::config_error(path, e.to_string()))?;
        Self::parse(&contents, path)
    }

    fn parse(yaml: &str, path: &Path) -> Result<Self> {
        // An empty document means "all defaults"
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Self = serde_yaml_ng::from_str(yaml)
            .map_err(|e| CloudletError::config_error(path, e.to_string()))?;

        if config.frame_limit < 2 {
            return Err(CloudletError::config_error(path, "frame_limit must be at least 2"));
        }
        Ok(config)
    }

    /// Resolve this node's identity once
    pub fn resolve_identity(&self) -> DeviceIdentity {
        match &self.device_identity {
            Some(id) if !id.trim().is_empty() => DeviceIdentity::new(id.trim()),
            _ => DeviceIdentity::detect(),
        }
    }

    pub fn handshake_timeout(&self) -> Option<Duration> {
        self.handshake_timeout_ms.map(Duration::from_millis)
    }

    pub fn sample_pause(&self) -> Duration {
        Duration::from_millis(self.sample_pause_ms)
    }

    pub fn identity_display_window(&self) -> Duration {
        Duration::from_millis(self.identity_display_ms)
    }
}
