//! Channel listener: the node's single receive path
//!
//! Every inbound message is routed by its two-letter class and identity suffix.
//! `HS`/`ID` messages addressed to this node reach exactly one of two handlers.
//! Anything else is dropped: data frames from other nodes, replies for another
//! identity, and malformed text.

use std::sync::{Arc, PoisonError, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::channel::Inbound;
use crate::types::{Addressed, DeviceIdentity, MessageClass};

/// Callback receiving the payload of a matching reply
pub type ReplyHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// Handler that ignores its input
pub fn noop_handler() -> ReplyHandler {
    Arc::new(|_: &str| {})
}

struct Handlers {
    on_identity: ReplyHandler,
    on_handshake: ReplyHandler,
}

impl Default for Handlers {
    fn default() -> Self {
        Self { on_identity: noop_handler(), on_handshake: noop_handler() }
    }
}

/// Routes inbound traffic for one device identity
pub struct ChannelListener {
    device: DeviceIdentity,
    handlers: Arc<RwLock<Handlers>>,
    task: Option<(CancellationToken, JoinHandle<()>)>,
}

impl ChannelListener {
    /// Create a listener with no receive path yet
    pub fn new(device: DeviceIdentity) -> Self {
        Self { device, handlers: Arc::new(RwLock::new(Handlers::default())), task: None }
    }

    /// Install the receive path and both handlers.
    ///
    /// Omitted handlers default to no-ops. Calling this again replaces the running
    /// receive path rather than adding a second one. Must be called from within a
    /// tokio runtime.
    pub fn initialise(
        &mut self,
        inbound: Inbound,
        on_identity: Option<ReplyHandler>,
        on_handshake: Option<ReplyHandler>,
    ) {
        self.shutdown();

        {
            let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
            handlers.on_identity = on_identity.unwrap_or_else(noop_handler);
            handlers.on_handshake = on_handshake.unwrap_or_else(noop_handler);
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(receive_task(
            inbound,
            self.device.clone(),
            Arc::clone(&self.handlers),
            cancel.clone(),
        ));
        self.task = Some((cancel, handle));

        info!("Listening for replies to device {}", self.device);
    }

    /// Replace the handshake reply handler without restarting the receive path
    pub fn set_on_handshake_reply(&self, handler: ReplyHandler) {
        self.handlers.write().unwrap_or_else(PoisonError::into_inner).on_handshake = handler;
    }

    /// Replace the identity reply handler without restarting the receive path
    pub fn set_on_identity_reply(&self, handler: ReplyHandler) {
        self.handlers.write().unwrap_or_else(PoisonError::into_inner).on_identity = handler;
    }

    /// Route one message as if it had just been received
    pub fn dispatch(&self, message: &str) -> Option<MessageClass> {
        route(&self.device, &self.handlers, message)
    }

    pub fn device(&self) -> &DeviceIdentity {
        &self.device
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|(_, handle)| !handle.is_finished())
    }

    /// Stop the receive path, if one is running
    pub fn shutdown(&mut self) {
        if let Some((cancel, _)) = self.task.take() {
            debug!("Stopping receive path");
            cancel.cancel();
        }
    }
}

impl Drop for ChannelListener {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Route a message to the matching handler, returning the class it went to
fn route(
    device: &DeviceIdentity,
    handlers: &RwLock<Handlers>,
    message: &str,
) -> Option<MessageClass> {
    let Some(addressed) = Addressed::parse(message) else {
        trace!("Dropping non-addressed message: {}", message);
        return None;
    };
    if !addressed.is_for(device) {
        trace!("Dropping {} for device {}", addressed.class.prefix(), addressed.identity);
        return None;
    }

    // Clone out so a handler may replace handlers without deadlocking
    let handler = {
        let handlers = handlers.read().unwrap_or_else(PoisonError::into_inner);
        match addressed.class {
            MessageClass::Handshake => Arc::clone(&handlers.on_handshake),
            MessageClass::Identity => Arc::clone(&handlers.on_identity),
        }
    };

    debug!("{} reply: {}", addressed.class.prefix(), addressed.payload);
    handler(addressed.payload);
    Some(addressed.class)
}

async fn receive_task(
    mut inbound: Inbound,
    device: DeviceIdentity,
    handlers: Arc<RwLock<Handlers>>,
    cancel: CancellationToken,
) {
    loop {
        let message = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            message = inbound.recv() => message,
        };

        match message {
            Some(message) => {
                route(&device, &handlers, &message);
            }
            None => {
                debug!("Channel closed, receive path ending");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::RadioChannel;
    use crate::channels::MemoryChannel;
    use std::sync::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    fn recorder(log: &Log, tag: &'static str) -> ReplyHandler {
        let log = Arc::clone(log);
        Arc::new(move |payload: &str| log.lock().unwrap().push(format!("{}:{}", tag, payload)))
    }

    fn listener_with_log() -> (ChannelListener, Log) {
        let log: Log = Arc::default();
        let listener = ChannelListener::new(DeviceIdentity::new("123"));
        listener.set_on_identity_reply(recorder(&log, "id"));
        listener.set_on_handshake_reply(recorder(&log, "hs"));
        (listener, log)
    }

    #[test]
    fn routes_matching_replies_by_class() {
        let (listener, log) = listener_with_log();

        assert_eq!(listener.dispatch("HS123,A"), Some(MessageClass::Handshake));
        assert_eq!(listener.dispatch("ID123, bob "), Some(MessageClass::Identity));

        assert_eq!(*log.lock().unwrap(), vec!["hs:A", "id:bob"]);
    }

    #[test]
    fn drops_foreign_and_malformed_messages() {
        let (listener, log) = listener_with_log();

        for message in ["HS124,A", "HS12,A", "ID1234,x", "HS123", "H", "", "A0,{\"x\"", "XX123,A"] {
            assert_eq!(listener.dispatch(message), None, "{}", message);
        }
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn handler_may_replace_itself() {
        let listener = Arc::new(ChannelListener::new(DeviceIdentity::new("1")));
        let hits = Arc::new(Mutex::new(0));

        let weak = Arc::downgrade(&listener);
        let counter = Arc::clone(&hits);
        listener.set_on_handshake_reply(Arc::new(move |_: &str| {
            *counter.lock().unwrap() += 1;
            if let Some(listener) = weak.upgrade() {
                listener.set_on_handshake_reply(noop_handler());
            }
        }));

        listener.dispatch("HS1,A");
        listener.dispatch("HS1,B");
        assert_eq!(*hits.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn receive_task_dispatches_channel_traffic() {
        let node = MemoryChannel::new();
        let collector = node.peer();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let mut listener = ChannelListener::new(DeviceIdentity::new("123"));
        let on_handshake: ReplyHandler = Arc::new(move |id: &str| {
            let _ = tx.send(id.to_string());
        });
        listener.initialise(node.subscribe(), None, Some(on_handshake));
        assert!(listener.is_running());

        collector.send("HS999,wrong").await.unwrap();
        collector.send("HS123,A").await.unwrap();

        assert_eq!(rx.recv().await.as_deref(), Some("A"));
    }

    #[tokio::test]
    async fn reinitialise_replaces_the_receive_path() {
        let node = MemoryChannel::new();
        let collector = node.peer();
        let hits = Arc::new(Mutex::new(0));

        let mut listener = ChannelListener::new(DeviceIdentity::new("7"));
        let counter = Arc::clone(&hits);
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let handler: ReplyHandler = Arc::new(move |_: &str| {
            *counter.lock().unwrap() += 1;
            let _ = tx.send(());
        });

        listener.initialise(node.subscribe(), None, Some(Arc::clone(&handler)));
        listener.initialise(node.subscribe(), None, Some(handler));

        collector.send("HS7,A").await.unwrap();
        rx.recv().await.unwrap();
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        assert_eq!(*hits.lock().unwrap(), 1);
    }
}
