//! Device identity used to correlate replies on a shared group

use serde::{Deserialize, Serialize};
use std::fmt;

/// Environment variable that overrides the detected identity
pub const DEVICE_ID_ENV: &str = "CLOUDLET_DEVICE_ID";

/// Identity of this node on the radio group.
///
/// Established once at process start and never mutated. It is the routing key in
/// `HS` and `ID` messages, so two nodes on one group must not share it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceIdentity(String);

impl DeviceIdentity {
    /// Wrap an explicit identity string
    pub fn new(identity: impl Into<String>) -> Self {
        Self(identity.into())
    }

    /// Detect an identity for this host.
    ///
    /// Uses `CLOUDLET_DEVICE_ID` when set, otherwise a stable decimal hash of the
    /// host name, mirroring the numeric serial a radio node reports.
    pub fn detect() -> Self {
        if let Ok(explicit) = std::env::var(DEVICE_ID_ENV) {
            let explicit = explicit.trim();
            if !explicit.is_empty() {
                return Self::new(explicit);
            }
        }

        Self::from_host_name(&host_name())
    }

    /// Derive an identity from a host name
    pub fn from_host_name(host: &str) -> Self {
        Self(fnv1a_32(host.as_bytes()).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceIdentity {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

fn host_name() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .or_else(|| std::fs::read_to_string("/etc/hostname").ok())
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "cloudlet".to_string())
}

fn fnv1a_32(bytes: &[u8]) -> u32 {
    const OFFSET_BASIS: u32 = 0x811c_9dc5;
    const PRIME: u32 = 0x0100_0193;

    bytes.iter().fold(OFFSET_BASIS, |hash, &byte| (hash ^ byte as u32).wrapping_mul(PRIME))
}
