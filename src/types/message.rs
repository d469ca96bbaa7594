//! Wire envelope for every message on the group.
//!
//! All traffic is short text of the form `<class><routing-key>,<payload>`:
//!
//! | Message            | Format                               |
//! |--------------------|--------------------------------------|
//! | Identity           | `ID<deviceIdentity>,<payload>`       |
//! | Handshake announce | `HS<deviceIdentity>,<label>`         |
//! | Handshake reply    | `HS<deviceIdentity>,<sessionId>`     |
//! | Data frame         | `<sessionId><sequence>,<chunk>`      |
//! | Terminator         | `<sessionId><sequence>,;`            |
//! | Class frame        | `<sessionId>cl:<label>`              |

use super::DeviceIdentity;

/// Separates the routing part of a message from its payload
pub const FIELD_SEPARATOR: char = ',';

/// Chunk carried by the terminator frame
pub const TERMINATOR_CHUNK: &str = ";";

/// Two-letter classes addressed to a specific device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageClass {
    Handshake,
    Identity,
}

impl MessageClass {
    pub fn prefix(self) -> &'static str {
        match self {
            MessageClass::Handshake => "HS",
            MessageClass::Identity => "ID",
        }
    }

    pub fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "HS" => Some(MessageClass::Handshake),
            "ID" => Some(MessageClass::Identity),
            _ => None,
        }
    }
}

/// A device-addressed message split into its parts.
///
/// Borrowed from the received text; nothing is allocated while routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Addressed<'a> {
    pub class: MessageClass,
    pub identity: &'a str,
    pub payload: &'a str,
}

impl<'a> Addressed<'a> {
    /// Parse an `HS`/`ID` message.
    ///
    /// Returns `None` for data frames, truncated prefixes and messages without a
    /// separator. The payload is the trimmed text between the first separator and
    /// the next one, if any.
    pub fn parse(message: &'a str) -> Option<Self> {
        let class = MessageClass::from_prefix(message.get(..2)?)?;
        let rest = &message[2..];
        let (identity, tail) = rest.split_once(FIELD_SEPARATOR)?;
        let payload = tail.split(FIELD_SEPARATOR).next().unwrap_or(tail).trim();

        Some(Self { class, identity, payload })
    }

    pub fn is_for(&self, device: &DeviceIdentity) -> bool {
        self.identity == device.as_str()
    }
}

/// `<class><identity>,<payload>`
pub fn announce(class: MessageClass, device: &DeviceIdentity, payload: &str) -> String {
    format!("{}{}{}{}", class.prefix(), device, FIELD_SEPARATOR, payload)
}

/// `<sessionId><sequence>,<chunk>`
pub fn data_frame(session_id: &str, sequence: u64, chunk: &str) -> String {
    format!("{}{}{}{}", session_id, sequence, FIELD_SEPARATOR, chunk)
}

/// `<sessionId><sequence>,;`
pub fn terminator_frame(session_id: &str, sequence: u64) -> String {
    data_frame(session_id, sequence, TERMINATOR_CHUNK)
}

/// `<sessionId>cl:<label>`
pub fn class_frame(session_id: &str, label: &str) -> String {
    format!("{}cl:{}", session_id, label)
}
