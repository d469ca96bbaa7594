//! Test utilities: a scripted collector and wire-trace helpers
//!
//! These stand in for the collector side of the protocol, which this crate does
//! not implement, so sessions can run end to end over a [`MemoryChannel`].

#![cfg(any(test, feature = "benchmark"))]

use tokio::task::JoinHandle;

use crate::channel::RadioChannel;
use crate::channels::MemoryChannel;
use crate::config::CloudletConfig;
use crate::types::{Addressed, MessageClass, message};

/// Configuration with a fixed identity and no surprises
pub fn test_config(identity: &str) -> CloudletConfig {
    CloudletConfig { device_identity: Some(identity.to_string()), ..CloudletConfig::default() }
}

/// Collector that answers every handshake announce with a fixed session id
pub struct ScriptedCollector {
    task: JoinHandle<()>,
}

impl ScriptedCollector {
    /// Start answering on `channel`.
    ///
    /// Subscribes before returning, so announces sent right after this call are
    /// never missed.
    pub fn spawn(channel: MemoryChannel, session_id: &str) -> Self {
        let mut inbound = channel.subscribe();
        let session_id = session_id.to_string();

        let task = tokio::spawn(async move {
            while let Some(text) = inbound.recv().await {
                let Some(announce) = Addressed::parse(&text) else { continue };
                if announce.class != MessageClass::Handshake {
                    continue;
                }

                let reply = format!(
                    "{}{},{}",
                    MessageClass::Handshake.prefix(),
                    announce.identity,
                    session_id
                );
                if channel.send(&reply).await.is_err() {
                    break;
                }
            }
        });

        Self { task }
    }
}

impl Drop for ScriptedCollector {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Payload frames for `session_id` in the order sent, excluding the terminator
pub fn data_frames<'a>(sent: &'a [String], session_id: &str) -> Vec<(u64, &'a str)> {
    sent.iter()
        .filter_map(|frame| {
            let body = frame.strip_prefix(session_id)?;
            let (seq, chunk) = body.split_once(message::FIELD_SEPARATOR)?;
            let seq = seq.parse().ok()?;
            (chunk != message::TERMINATOR_CHUNK).then_some((seq, chunk))
        })
        .collect()
}

/// A record-like payload of roughly `len` characters
pub fn sample_payload(len: usize) -> String {
    let mut payload = String::with_capacity(len + 16);
    let mut i = 0u32;
    payload.push('{');
    while payload.len() < len {
        if i > 0 {
            payload.push(',');
        }
        payload.push_str(&format!("\"{}\":{}.25", (b'a' + (i % 26) as u8) as char, i));
        i += 1;
    }
    payload.push('}');
    payload
}
