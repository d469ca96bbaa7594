//! Channel trait for the shared broadcast group

use tokio::sync::broadcast;
use tracing::warn;

use crate::Result;

/// One message observed on the group, tagged with the endpoint that sent it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    pub origin: u64,
    pub text: String,
}

/// Trait for short-message broadcast channels
///
/// A channel is one endpoint on a group. Everything it sends is observed by every
/// other endpoint on that group but never echoed back to itself, the way a radio
/// node does not hear its own transmissions.
#[async_trait::async_trait]
pub trait RadioChannel: Send + Sync + 'static {
    /// Transmit one message to the group
    ///
    /// Delivery is best-effort: `Ok` means the message left this endpoint, not
    /// that anyone received it.
    async fn send(&self, message: &str) -> Result<()>;

    /// Open the receive path for this endpoint
    fn subscribe(&self) -> Inbound;

    /// Hard ceiling on message length, if the medium has one
    fn max_message_len(&self) -> Option<usize> {
        None
    }
}

/// Receive half of a channel endpoint
pub struct Inbound {
    rx: broadcast::Receiver<Datagram>,
    local: u64,
}

impl Inbound {
    pub fn new(rx: broadcast::Receiver<Datagram>, local: u64) -> Self {
        Self { rx, local }
    }

    /// Next message sent by some other endpoint
    ///
    /// Returns `None` once the group is closed. Lagging behind the group drops the
    /// missed messages, which the protocol tolerates.
    pub async fn recv(&mut self) -> Option<String> {
        loop {
            match self.rx.recv().await {
                Ok(datagram) if datagram.origin == self.local => continue,
                Ok(datagram) => return Some(datagram.text),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!("Receive path lagged, {} messages dropped", missed);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
