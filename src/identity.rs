//! Default identity-reply hook: show a received identity for a fixed window

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::listener::ReplyHandler;

/// Holds the most recently received identity while its display window is open.
///
/// A newer identity restarts the window; the older clear timer then does nothing.
#[derive(Clone)]
pub struct IdentityDisplay {
    shown: Arc<watch::Sender<Option<String>>>,
    generation: Arc<AtomicU64>,
    window: Duration,
}

impl IdentityDisplay {
    pub fn new(window: Duration) -> Self {
        let (shown, _) = watch::channel(None);
        Self { shown: Arc::new(shown), generation: Arc::new(AtomicU64::new(0)), window }
    }

    /// Show `identity` and schedule it to clear after the window
    pub fn show(&self, identity: &str) {
        info!("Identity received: {}", identity);
        self.shown.send_replace(Some(identity.to_string()));
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        // Without a runtime the identity simply stays until replaced
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };

        let shown = Arc::clone(&self.shown);
        let current = Arc::clone(&self.generation);
        let window = self.window;
        runtime.spawn(async move {
            tokio::time::sleep(window).await;
            if current.load(Ordering::SeqCst) == generation {
                debug!("Identity display window closed");
                shown.send_replace(None);
            }
        });
    }

    /// Identity currently on display
    pub fn current(&self) -> Option<String> {
        self.shown.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<String>> {
        self.shown.subscribe()
    }

    /// Listener handler that feeds this display
    pub fn handler(&self) -> ReplyHandler {
        let display = self.clone();
        Arc::new(move |identity: &str| display.show(identity))
    }
}
