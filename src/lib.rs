//! Session and chunked-frame transport for streaming labelled samples from a
//! small node to a collector over a short-message broadcast group.
//!
//! # Protocol
//!
//! - **Handshake**: the node announces `HS<device>,<label>`; the collector replies
//!   `HS<device>,<sessionId>`. Replies for other devices are ignored.
//! - **Data**: each sample record is serialized and cut into frames
//!   `<sessionId><sequence>,<chunk>` that fit the medium's length ceiling.
//! - **Termination**: after the sampling duration, `<sessionId><sequence>,;` ends
//!   the session.
//!
//! Delivery is best-effort: there are no acknowledgements or retransmissions.
//!
//! ## Example (in-process group)
//!
//! ```rust,no_run
//! use cloudlet::{Cloudlet, CloudletConfig, FieldKey, SampleContext};
//!
//! #[tokio::main]
//! async fn main() -> cloudlet::Result<()> {
//!     let (mut controller, _collector) = Cloudlet::in_memory(CloudletConfig::default());
//!
//!     controller.configure_fields(["x".parse::<FieldKey>()?, "y".parse::<FieldKey>()?])?;
//!     controller.set_sample_producer(|ctx: &mut SampleContext<'_>| ctx.emit_values((1.5, 2.5)));
//!
//!     let summary = controller.stream_for(2, "3").await?;
//!     println!("{} samples in session {}", summary.samples, summary.session_id);
//!     Ok(())
//! }
//! ```

// Core types and error handling
mod error;
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Protocol
pub mod encoder;
pub mod listener;
pub mod session;

// Session control
pub mod controller;
pub mod identity;
pub mod producer;

// Channels
pub mod channel;
pub mod channels;

// Ambient
pub mod config;
pub mod logging;

pub use error::*;
pub use types::*;

pub use channel::{Datagram, Inbound, RadioChannel};
pub use channels::{MemoryChannel, UdpChannel};
pub use config::{ChannelConfig, CloudletConfig};
pub use controller::SessionController;
pub use encoder::ChunkEncoder;
pub use listener::{ChannelListener, ReplyHandler};
pub use producer::{SampleContext, SampleProducer, ValueSource};
pub use session::{SessionState, SessionSummary};

/// Entry point for building a node's session controller.
///
/// A process builds exactly one controller at startup and keeps it for its
/// lifetime; the controller owns the only receive path on its channel.
pub struct Cloudlet;

impl Cloudlet {
    /// Bind the UDP group described by `config` and build the controller on it.
    ///
    /// # Errors
    ///
    /// Returns an error if the group port cannot be bound or the broadcast address
    /// is invalid.
    ///
    /// ```rust,no_run
    /// use cloudlet::{Cloudlet, CloudletConfig};
    ///
    /// # #[tokio::main]
    /// # async fn main() -> cloudlet::Result<()> {
    /// let controller = Cloudlet::udp(CloudletConfig::default()).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn udp(config: CloudletConfig) -> Result<SessionController<UdpChannel>> {
        let channel = UdpChannel::bind(&config.channel).await?;
        Ok(SessionController::new(channel, config))
    }

    /// Build a controller on a fresh in-process group.
    ///
    /// Returns the controller and a peer endpoint for acting as the collector.
    /// Must be called inside a tokio runtime.
    pub fn in_memory(config: CloudletConfig) -> (SessionController<MemoryChannel>, MemoryChannel) {
        let node = MemoryChannel::new();
        let collector = node.peer();
        (SessionController::new(node, config), collector)
    }
}
