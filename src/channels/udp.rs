//! UDP broadcast group
//!
//! Each datagram is `[group][origin: u64 BE][text]`. The group byte plays the
//! role of the radio group number, and the origin lets every endpoint drop its
//! own transmissions when the broadcast loops back.

use std::collections::hash_map::RandomState;
use std::hash::BuildHasher;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::channel::{Datagram, Inbound, RadioChannel};
use crate::config::ChannelConfig;
use crate::{CloudletError, Result};

const HEADER_LEN: usize = 1 + 8;
const MAX_DATAGRAM: usize = 512;
const INBOUND_CAPACITY: usize = 1024;

const RECV_BACKOFF_BASE: Duration = Duration::from_millis(10);
const RECV_BACKOFF_MAX: Duration = Duration::from_secs(1);
const MAX_RECV_FAILURES: u32 = 32;

/// Endpoint on a UDP broadcast group
pub struct UdpChannel {
    socket: Arc<UdpSocket>,
    target: SocketAddr,
    group: u8,
    origin: u64,
    inbound: broadcast::Sender<Datagram>,
    cancel: CancellationToken,
}

impl UdpChannel {
    /// Bind the group port and start the receive task
    pub async fn bind(config: &ChannelConfig) -> Result<Self> {
        let local = format!("{}:{}", config.bind, config.port);
        let target: SocketAddr = format!("{}:{}", config.broadcast, config.port)
            .parse()
            .map_err(|e| {
                CloudletError::channel_failed_with_source(
                    format!("invalid broadcast address {}", config.broadcast),
                    Box::new(e),
                )
            })?;

        let socket = UdpSocket::bind(&local).await.map_err(|e| {
            CloudletError::channel_failed_with_source(format!("bind {}", local), Box::new(e))
        })?;
        socket.set_broadcast(true)?;

        let origin = RandomState::new().hash_one(std::process::id());
        let socket = Arc::new(socket);
        let (inbound, _) = broadcast::channel(INBOUND_CAPACITY);
        let cancel = CancellationToken::new();

        tokio::spawn(receive_task(
            Arc::clone(&socket),
            config.group,
            inbound.clone(),
            cancel.clone(),
        ));

        info!("UDP group {} bound on {} (broadcast {})", config.group, local, target);
        Ok(Self { socket, target, group: config.group, origin, inbound, cancel })
    }

    pub fn group(&self) -> u8 {
        self.group
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}

#[async_trait::async_trait]
impl RadioChannel for UdpChannel {
    async fn send(&self, message: &str) -> Result<()> {
        let packet = encode_datagram(self.group, self.origin, message);
        if packet.len() > MAX_DATAGRAM {
            return Err(CloudletError::channel_failed(format!(
                "message of {} bytes exceeds the {} byte datagram limit",
                message.len(),
                MAX_DATAGRAM - HEADER_LEN
            )));
        }
        self.socket.send_to(&packet, self.target).await.map_err(|e| {
            CloudletError::channel_failed_with_source("broadcast send", Box::new(e))
        })?;
        trace!("group {} -> {}", self.group, message);
        Ok(())
    }

    fn subscribe(&self) -> Inbound {
        Inbound::new(self.inbound.subscribe(), self.origin)
    }

    fn max_message_len(&self) -> Option<usize> {
        Some(MAX_DATAGRAM - HEADER_LEN)
    }
}

impl Drop for UdpChannel {
    fn drop(&mut self) {
        debug!("Dropping UDP channel");
        self.cancel.cancel();
    }
}

async fn receive_task(
    socket: Arc<UdpSocket>,
    group: u8,
    inbound: broadcast::Sender<Datagram>,
    cancel: CancellationToken,
) {
    // One spare byte so an oversized datagram is detectable instead of truncated
    let mut buf = [0u8; MAX_DATAGRAM + 1];
    let mut failures = 0u32;

    loop {
        let received = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            received = socket.recv_from(&mut buf) => received,
        };

        match received {
            Ok((len, from)) => {
                failures = 0;
                match decode_datagram(group, &buf[..len]) {
                    Some(datagram) => {
                        let _ = inbound.send(datagram);
                    }
                    None => trace!("Ignoring datagram from {}", from),
                }
            }
            Err(e) => {
                failures += 1;
                if failures >= MAX_RECV_FAILURES {
                    error!("UDP receive failed {} times in a row, stopping: {}", failures, e);
                    break;
                }

                let delay = recv_backoff(failures);
                warn!("UDP receive failed ({}), retrying in {:?}", e, delay);
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }

    debug!("UDP receive task ended");
}

/// Delay before the next receive after `failures` consecutive errors
fn recv_backoff(failures: u32) -> Duration {
    let exponent = failures.saturating_sub(1).min(16);
    RECV_BACKOFF_BASE.saturating_mul(1 << exponent).min(RECV_BACKOFF_MAX)
}

fn encode_datagram(group: u8, origin: u64, text: &str) -> Vec<u8> {
    let mut packet = Vec::with_capacity(HEADER_LEN + text.len());
    packet.push(group);
    packet.extend_from_slice(&origin.to_be_bytes());
    packet.extend_from_slice(text.as_bytes());
    packet
}

fn decode_datagram(group: u8, packet: &[u8]) -> Option<Datagram> {
    if packet.len() < HEADER_LEN || packet.len() > MAX_DATAGRAM || packet[0] != group {
        return None;
    }
    let origin = u64::from_be_bytes(packet[1..HEADER_LEN].try_into().ok()?);
    let text = std::str::from_utf8(&packet[HEADER_LEN..]).ok()?.to_string();
    Some(Datagram { origin, text })
}
