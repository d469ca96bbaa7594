//! In-process broadcast group

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;
use tracing::trace;

use crate::Result;
use crate::channel::{Datagram, Inbound, RadioChannel};

const DEFAULT_CAPACITY: usize = 4096;

struct Group {
    tx: broadcast::Sender<Datagram>,
    next_origin: AtomicU64,
    transcript: Mutex<Vec<Datagram>>,
}

/// One endpoint on an in-process group.
///
/// Every endpoint created with [`MemoryChannel::peer`] shares the group. The group
/// keeps a transcript of all traffic so tests can inspect the exact wire sequence.
pub struct MemoryChannel {
    group: Arc<Group>,
    origin: u64,
    max_len: Option<usize>,
}

impl MemoryChannel {
    /// Create a new group and return its first endpoint
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a group whose receivers buffer up to `capacity` messages
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        let group = Arc::new(Group {
            tx,
            next_origin: AtomicU64::new(1),
            transcript: Mutex::new(Vec::new()),
        });

        Self { group, origin: 0, max_len: None }
    }

    /// Advertise a message length ceiling
    pub fn with_max_message_len(mut self, len: usize) -> Self {
        self.max_len = Some(len);
        self
    }

    /// Another endpoint on the same group
    pub fn peer(&self) -> Self {
        let origin = self.group.next_origin.fetch_add(1, Ordering::Relaxed);
        Self { group: Arc::clone(&self.group), origin, max_len: self.max_len }
    }

    pub fn origin(&self) -> u64 {
        self.origin
    }

    /// Every message sent on the group so far, in send order
    pub fn transcript(&self) -> Vec<Datagram> {
        self.group.transcript.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Messages sent by this endpoint
    pub fn sent(&self) -> Vec<String> {
        self.transcript()
            .into_iter()
            .filter(|d| d.origin == self.origin)
            .map(|d| d.text)
            .collect()
    }

    pub fn clear_transcript(&self) {
        self.group.transcript.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

impl Default for MemoryChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl RadioChannel for MemoryChannel {
    async fn send(&self, message: &str) -> Result<()> {
        let datagram = Datagram { origin: self.origin, text: message.to_string() };
        trace!("[{}] -> {}", self.origin, message);

        self.group
            .transcript
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(datagram.clone());

        // Nobody listening is not an error on a broadcast medium
        let _ = self.group.tx.send(datagram);
        Ok(())
    }

    fn subscribe(&self) -> Inbound {
        Inbound::new(self.group.tx.subscribe(), self.origin)
    }

    fn max_message_len(&self) -> Option<usize> {
        self.max_len
    }
}
