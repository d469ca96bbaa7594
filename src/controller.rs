//! Session controller: handshake, timed sampling, termination
//!
//! The controller owns the node's one session. [`SessionController::stream_for`]
//! runs a full session:
//!
//! 1. announce `HS<device>,<label>` and wait for the collector's reply
//! 2. on the reply, start a session at sequence 0 and fire the started hook
//! 3. tick the sample producer every pause until the duration elapses, framing
//!    each emitted record through the chunk encoder
//! 4. fire the finished hook and send the terminator frame
//!
//! `stream_for` takes `&mut self`, so two sessions can never interleave frames on
//! the channel.

use futures::Stream;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::time::Instant;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::channel::RadioChannel;
use crate::config::CloudletConfig;
use crate::identity::IdentityDisplay;
use crate::listener::{ChannelListener, ReplyHandler, noop_handler};
use crate::producer::{self, SampleContext, SampleProducer, SilentProducer};
use crate::session::{Session, SessionState, SessionSummary};
use crate::types::{
    DeviceIdentity, FieldKey, FieldLayout, MessageClass, SamplePacing, SampleRecord, SampleValues,
    message,
};
use crate::{CloudletError, Result};

/// Hook fired at the start or end of a recording
pub type LifecycleHook = Box<dyn FnMut() + Send + Sync>;

/// Owns the node's session, sampling loop and chunk encoder.
///
/// Constructed once per process and kept for its lifetime. Construction installs
/// the single receive path, so it must happen inside a tokio runtime. The
/// controller is `Send + Sync`, so a session may run on a spawned task.
pub struct SessionController<C: RadioChannel> {
    channel: C,
    device: DeviceIdentity,
    config: CloudletConfig,
    listener: ChannelListener,
    identity: IdentityDisplay,
    layout: Option<FieldLayout>,
    producer: Box<dyn SampleProducer>,
    on_started: LifecycleHook,
    on_finished: LifecycleHook,
    state: watch::Sender<SessionState>,
    session: Option<Session>,
    cancel: CancellationToken,
}

impl<C: RadioChannel> SessionController<C> {
    /// Build the controller and start listening on `channel`
    pub fn new(channel: C, config: CloudletConfig) -> Self {
        let device = config.resolve_identity();
        let identity = IdentityDisplay::new(config.identity_display_window());

        let mut listener = ChannelListener::new(device.clone());
        listener.initialise(channel.subscribe(), Some(identity.handler()), None);

        let (state, _) = watch::channel(SessionState::Idle);
        info!("Session controller ready for device {}", device);

        Self {
            channel,
            device,
            config,
            listener,
            identity,
            layout: None,
            producer: Box::new(SilentProducer),
            on_started: Box::new(|| {}),
            on_finished: Box::new(|| {}),
            state,
            session: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn device_identity(&self) -> &DeviceIdentity {
        &self.device
    }

    pub fn config(&self) -> &CloudletConfig {
        &self.config
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Select the one to four fields records carry, replacing any earlier choice.
    ///
    /// Takes effect for records built afterwards; call it before streaming.
    pub fn configure_fields(&mut self, keys: impl IntoIterator<Item = FieldKey>) -> Result<()> {
        let layout = FieldLayout::new(keys)?;
        debug!("Field layout set to {:?}", layout.keys());
        self.layout = Some(layout);
        Ok(())
    }

    pub fn field_layout(&self) -> Option<&FieldLayout> {
        self.layout.as_ref()
    }

    /// Zip the configured fields with up to four positional values
    pub fn build_record(&self, values: impl Into<SampleValues>) -> Result<SampleRecord> {
        producer::build_record(self.layout.as_ref(), values.into())
    }

    /// Inject `index`, serialize the record and transmit it as frames.
    ///
    /// Returns the number of frames sent. Only valid while a session is streaming.
    pub async fn emit_record(&mut self, index: u64, record: SampleRecord) -> Result<usize> {
        let text = record.with_index(index).to_canonical_text()?;
        let session = self.session.as_mut().ok_or(CloudletError::NoSession)?;
        let frames = session.frame(&text);

        for frame in &frames {
            self.transmit(frame).await?;
        }
        Ok(frames.len())
    }

    /// Announce `HS<device>,<label>` once. No retry.
    ///
    /// Only transmits: the reply goes to the handshake handler installed with
    /// [`set_on_handshake_reply`](Self::set_on_handshake_reply) and the session
    /// state is left alone. [`stream_for`](Self::stream_for) sends the same
    /// announce as part of a full session.
    pub async fn request_session(&self, label: &str) -> Result<()> {
        let announce = message::announce(MessageClass::Handshake, &self.device, label);
        debug!("Requesting session: {}", announce);
        self.transmit(&announce).await
    }

    /// Announce `ID<device>,<payload>`
    pub async fn announce_identity(&self, payload: &str) -> Result<()> {
        self.transmit(&message::announce(MessageClass::Identity, &self.device, payload)).await
    }

    /// Install the producer each sampling tick calls
    pub fn set_sample_producer(&mut self, producer: impl SampleProducer + 'static) {
        self.producer = Box::new(producer);
    }

    pub fn set_on_recording_started(&mut self, hook: impl FnMut() + Send + Sync + 'static) {
        self.on_started = Box::new(hook);
    }

    pub fn set_on_recording_finished(&mut self, hook: impl FnMut() + Send + Sync + 'static) {
        self.on_finished = Box::new(hook);
    }

    /// Replace the identity reply handler (the identity display by default)
    pub fn set_on_identity_reply(&self, handler: ReplyHandler) {
        self.listener.set_on_identity_reply(handler);
    }

    /// Replace the handshake reply handler.
    ///
    /// [`stream_for`](Self::stream_for) installs its own handler for the duration
    /// of the handshake wait and resets it to a no-op afterwards.
    pub fn set_on_handshake_reply(&self, handler: ReplyHandler) {
        self.listener.set_on_handshake_reply(handler);
    }

    /// Identity currently shown by the default identity hook
    pub fn displayed_identity(&self) -> watch::Receiver<Option<String>> {
        self.identity.subscribe()
    }

    /// Current session state
    pub fn state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Session state changes as a stream
    pub fn state_updates(&self) -> impl Stream<Item = SessionState> + 'static {
        WatchStream::new(self.state.subscribe())
    }

    /// Token that aborts any pending and future handshake waits when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run one complete session of `seconds` under `label`
    pub async fn stream_for(&mut self, seconds: u64, label: &str) -> Result<SessionSummary> {
        let pacing = SamplePacing::new(Duration::from_secs(seconds), self.config.sample_pause());
        let cancel = self.cancel.child_token();
        self.stream_with(pacing, label, cancel).await
    }

    /// Run one complete session with explicit pacing and cancellation.
    ///
    /// Fails with [`CloudletError::HandshakeTimeout`] or [`CloudletError::Cancelled`]
    /// if no reply arrives; nothing but the announce is sent in that case.
    pub async fn stream_with(
        &mut self,
        pacing: SamplePacing,
        label: &str,
        cancel: CancellationToken,
    ) -> Result<SessionSummary> {
        if !self.state.borrow().is_idle() {
            return Err(CloudletError::SessionBusy);
        }

        let reply = self.arm_handshake();
        self.set_state(SessionState::AwaitingHandshake { label: label.to_string() });
        if let Err(e) = self.request_session(label).await {
            self.abandon();
            return Err(e);
        }

        let session_id = match self.await_handshake(reply, &cancel).await {
            Ok(id) => id,
            Err(e) => {
                self.abandon();
                return Err(e);
            }
        };

        match self.run_session(session_id, pacing, label).await {
            Ok(summary) => Ok(summary),
            Err(e) => {
                warn!("Session aborted: {}", e);
                self.abandon();
                Err(e)
            }
        }
    }

    /// One-shot handshake handler feeding a oneshot channel
    fn arm_handshake(&self) -> oneshot::Receiver<String> {
        let (tx, rx) = oneshot::channel();
        let slot = Arc::new(Mutex::new(Some(tx)));

        self.listener.set_on_handshake_reply(Arc::new(move |session_id: &str| {
            let pending = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
            if let Some(tx) = pending {
                let _ = tx.send(session_id.to_string());
            }
        }));
        rx
    }

    async fn await_handshake(
        &self,
        reply: oneshot::Receiver<String>,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let timeout = self.config.handshake_timeout();

        let wait = async {
            match timeout {
                Some(limit) => match tokio::time::timeout(limit, reply).await {
                    Ok(received) => received.map_err(|_| CloudletError::Cancelled),
                    Err(_) => {
                        warn!("No handshake reply within {:?}", limit);
                        Err(CloudletError::HandshakeTimeout { duration: limit })
                    }
                },
                None => reply.await.map_err(|_| CloudletError::Cancelled),
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Handshake wait cancelled");
                Err(CloudletError::Cancelled)
            }
            result = wait => result,
        }
    }

    async fn run_session(
        &mut self,
        session_id: String,
        pacing: SamplePacing,
        label: &str,
    ) -> Result<SessionSummary> {
        self.listener.set_on_handshake_reply(noop_handler());
        self.session = Some(Session::begin(session_id.clone(), self.config.frame_limit));
        self.set_state(SessionState::Streaming { session_id: session_id.clone() });
        info!(
            "Session {} started ({:?}, up to {} samples)",
            session_id,
            pacing.duration,
            pacing.max_ticks()
        );

        (self.on_started)();

        if self.config.announce_class_frame {
            self.transmit(&message::class_frame(&session_id, label)).await?;
        }

        let mut ticker = pacing.ticker();
        ticker.tick().await;
        let started = Instant::now();
        let mut tally = 0u64;

        while started.elapsed() < pacing.duration {
            tally += 1;

            let emitted = {
                let mut ctx = SampleContext::new(tally, self.layout.as_ref());
                if let Err(e) = self.producer.produce(&mut ctx) {
                    warn!("Sample {} skipped: {}", tally, e);
                }
                ctx.into_emitted()
            };

            for (index, record) in emitted {
                self.emit_record(index, record).await?;
            }

            ticker.tick().await;
        }

        (self.on_finished)();
        self.set_state(SessionState::Terminating { session_id: session_id.clone() });

        let session = self.session.take().ok_or(CloudletError::NoSession)?;
        self.transmit(&session.terminator()).await?;
        self.set_state(SessionState::Idle);

        let summary = SessionSummary {
            session_id,
            samples: tally,
            frames_sent: session.frames_sent(),
            terminator_sequence: session.sequence(),
        };
        info!(
            "Session {} finished: {} samples, {} frames",
            summary.session_id, summary.samples, summary.frames_sent
        );
        Ok(summary)
    }

    async fn transmit(&self, frame: &str) -> Result<()> {
        if let Some(max) = self.channel.max_message_len() {
            if frame.len() > max {
                warn!("Frame exceeds channel limit ({} > {}): {}", frame.len(), max, frame);
            }
        }
        self.channel.send(frame).await
    }

    fn abandon(&mut self) {
        self.listener.set_on_handshake_reply(noop_handler());
        self.session = None;
        self.set_state(SessionState::Idle);
    }

    fn set_state(&self, next: SessionState) {
        self.state.send_modify(|current| {
            if !current.can_transition_to(&next) && *current != next {
                debug!("Unexpected session transition {} -> {}", current, next);
            }
            *current = next;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::MemoryChannel;
    use crate::test_utils::{ScriptedCollector, data_frames, test_config};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn keys(list: &str) -> Vec<FieldKey> {
        FieldLayout::parse_list(list).unwrap().keys().to_vec()
    }

    fn controller() -> (SessionController<MemoryChannel>, MemoryChannel) {
        let node = MemoryChannel::new();
        let collector = node.peer();
        (SessionController::new(node, test_config("123")), collector)
    }

    #[tokio::test]
    async fn build_record_requires_fields() {
        let (mut ctl, _collector) = controller();
        assert!(matches!(ctl.build_record(1.0), Err(CloudletError::FieldsNotConfigured)));

        ctl.configure_fields(keys("x,y")).unwrap();
        let record = ctl.build_record((1.5, 2.5)).unwrap();
        assert_eq!(record.to_canonical_text().unwrap(), r#"{"x":1.5,"y":2.5}"#);
    }

    #[tokio::test]
    async fn configure_fields_overwrites_and_validates() {
        let (mut ctl, _collector) = controller();
        ctl.configure_fields(keys("a,b")).unwrap();
        ctl.configure_fields(keys("z")).unwrap();
        assert_eq!(ctl.field_layout().unwrap().len(), 1);

        let q: FieldKey = "q".parse().unwrap();
        assert!(ctl.configure_fields([q, q]).is_err());
        assert_eq!(ctl.field_layout().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn emit_outside_a_session_fails() {
        let (mut ctl, _collector) = controller();
        let result = ctl.emit_record(1, SampleRecord::default()).await;
        assert!(matches!(result, Err(CloudletError::NoSession)));
    }

    #[tokio::test(start_paused = true)]
    async fn full_session_wire_trace() {
        let (mut ctl, collector) = controller();
        let _script = ScriptedCollector::spawn(collector, "A");

        ctl.configure_fields(keys("x,y")).unwrap();
        ctl.set_sample_producer(|ctx: &mut SampleContext<'_>| ctx.emit_values((1.5, 2.5)));

        let summary = ctl.stream_for(1, "3").await.unwrap();
        let sent = ctl.channel().sent();

        assert_eq!(sent[0], "HS123,3");
        assert_eq!(sent[1], r#"A0,{"x":1.5,"y":2"#);
        assert_eq!(sent[2], r#"A1,.5,"n":1}"#);

        let last = sent.last().unwrap();
        assert_eq!(*last, format!("A{},;", summary.terminator_sequence));
        assert_eq!(sent.iter().filter(|f| f.ends_with(",;")).count(), 1);
        assert_eq!(summary.samples, 200);
        assert_eq!(summary.frames_sent as usize, data_frames(&sent, "A").len());
        assert_eq!(*ctl.state().borrow(), SessionState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn lifecycle_hooks_fire_once_each() {
        let (mut ctl, collector) = controller();
        let _script = ScriptedCollector::spawn(collector, "B");

        let started = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicUsize::new(0));
        let s = Arc::clone(&started);
        let f = Arc::clone(&finished);
        ctl.set_on_recording_started(move || {
            s.fetch_add(1, Ordering::SeqCst);
        });
        ctl.set_on_recording_finished(move || {
            f.fetch_add(1, Ordering::SeqCst);
        });

        let summary = ctl.stream_for(1, "x").await.unwrap();

        assert_eq!(started.load(Ordering::SeqCst), 1);
        assert_eq!(finished.load(Ordering::SeqCst), 1);
        assert_eq!(summary.frames_sent, 0);
        assert_eq!(ctl.channel().sent().last().unwrap(), "B0,;");
    }

    #[tokio::test(start_paused = true)]
    async fn handshake_timeout_returns_to_idle() {
        let (mut ctl, _silent_collector) = controller();

        let err = ctl.stream_for(1, "3").await.unwrap_err();

        assert!(matches!(err, CloudletError::HandshakeTimeout { .. }));
        assert_eq!(ctl.channel().sent(), vec!["HS123,3"]);
        assert!(ctl.state().borrow().is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn handshake_wait_is_cancellable() {
        let (mut ctl, _silent_collector) = controller();
        let token = ctl.shutdown_token();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            token.cancel();
        });

        let err = ctl.stream_for(1, "3").await.unwrap_err();
        assert!(matches!(err, CloudletError::Cancelled));
        assert!(ctl.state().borrow().is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn class_frame_precedes_data_when_enabled() {
        let node = MemoryChannel::new();
        let collector = node.peer();
        let config = CloudletConfig { announce_class_frame: true, ..test_config("9") };
        let mut ctl = SessionController::new(node, config);
        let _script = ScriptedCollector::spawn(collector, "C");

        ctl.configure_fields(keys("a")).unwrap();
        ctl.set_sample_producer(|ctx: &mut SampleContext<'_>| ctx.emit_values(1.0));
        ctl.stream_for(1, "7").await.unwrap();

        let sent = ctl.channel().sent();
        assert_eq!(sent[0], "HS9,7");
        assert_eq!(sent[1], "Ccl:7");
        assert_eq!(sent[2], r#"C0,{"a":1,"n":1}"#);
    }

    #[tokio::test(start_paused = true)]
    async fn standalone_request_leaves_controller_idle() {
        let (mut ctl, collector) = controller();
        let _script = ScriptedCollector::spawn(collector, "A");

        ctl.request_session("3").await.unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(ctl.state().borrow().is_idle());

        ctl.configure_fields(keys("x")).unwrap();
        ctl.set_sample_producer(|ctx: &mut SampleContext<'_>| ctx.emit_values(1.0));
        let summary = ctl.stream_for(1, "3").await.unwrap();

        assert_eq!(summary.session_id, "A");
        assert_eq!(ctl.channel().sent()[..2], ["HS123,3", "HS123,3"]);
    }

    #[tokio::test]
    async fn request_session_reply_reaches_custom_handler() {
        let (ctl, collector) = controller();
        let _script = ScriptedCollector::spawn(collector, "Z");
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        ctl.set_on_handshake_reply(Arc::new(move |session_id: &str| {
            let _ = tx.send(session_id.to_string());
        }));
        ctl.request_session("walk").await.unwrap();

        let reply = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap();
        assert_eq!(reply.as_deref(), Some("Z"));
        assert_eq!(ctl.channel().sent(), vec!["HS123,walk"]);
        assert!(ctl.state().borrow().is_idle());
    }

    #[test]
    fn controller_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SessionController<MemoryChannel>>();
    }

    #[tokio::test(start_paused = true)]
    async fn session_runs_on_a_spawned_task() {
        let (mut ctl, collector) = controller();
        let _script = ScriptedCollector::spawn(collector, "S");
        ctl.configure_fields(keys("a")).unwrap();
        ctl.set_sample_producer(|ctx: &mut SampleContext<'_>| ctx.emit_values(1.0));

        let task = tokio::spawn(async move {
            let summary = ctl.stream_for(1, "3").await;
            (ctl, summary)
        });
        let (ctl, summary) = task.await.unwrap();

        let summary = summary.unwrap();
        assert_eq!(summary.samples, 200);
        assert_eq!(*ctl.channel().sent().last().unwrap(), format!("S{},;", summary.terminator_sequence));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn session_runs_on_the_multi_thread_runtime() {
        let (mut ctl, collector) = controller();
        let _script = ScriptedCollector::spawn(collector, "M");
        ctl.configure_fields(keys("a")).unwrap();
        ctl.set_sample_producer(|ctx: &mut SampleContext<'_>| ctx.emit_values(1.0));

        let pacing = SamplePacing::new(Duration::from_millis(50), Duration::from_millis(5));
        let task = tokio::spawn(async move {
            let summary = ctl.stream_with(pacing, "3", CancellationToken::new()).await;
            (ctl, summary)
        });
        let (ctl, summary) = task.await.unwrap();

        let summary = summary.unwrap();
        assert!(summary.samples >= 1);
        let terminator = format!("M{},;", summary.terminator_sequence);
        assert_eq!(ctl.channel().sent().last(), Some(&terminator));
    }

    #[tokio::test(start_paused = true)]
    async fn producer_errors_skip_the_sample() {
        let (mut ctl, collector) = controller();
        let _script = ScriptedCollector::spawn(collector, "D");

        // No fields configured: every emit_values fails, session still completes
        ctl.set_sample_producer(|ctx: &mut SampleContext<'_>| ctx.emit_values(1.0));
        let summary = ctl.stream_for(1, "3").await.unwrap();

        assert_eq!(summary.frames_sent, 0);
        assert_eq!(ctl.channel().sent().last().unwrap(), "D0,;");
    }
}
