//! End-to-end sessions over an in-process group, driven through the public API

use std::time::Duration;
use tokio::task::JoinHandle;

use cloudlet::{
    Addressed, Cloudlet, CloudletConfig, CloudletError, FieldKey, MemoryChannel, MessageClass,
    RadioChannel, SampleContext, SessionState,
};

fn config(identity: &str) -> CloudletConfig {
    CloudletConfig { device_identity: Some(identity.to_string()), ..CloudletConfig::default() }
}

fn keys(list: &[char]) -> Vec<FieldKey> {
    list.iter().map(|c| FieldKey::try_from(*c).unwrap()).collect()
}

/// Answers handshake announces with `session_id`, ignoring everything else
fn answer_handshakes(collector: MemoryChannel, session_id: &'static str) -> JoinHandle<()> {
    let mut inbound = collector.subscribe();
    tokio::spawn(async move {
        while let Some(text) = inbound.recv().await {
            if let Some(announce) = Addressed::parse(&text) {
                if announce.class == MessageClass::Handshake {
                    let reply = format!("HS{},{}", announce.identity, session_id);
                    collector.send(&reply).await.unwrap();
                }
            }
        }
    })
}

/// `(sequence, chunk)` for each frame of `session_id`, terminator included
fn frames<'a>(sent: &'a [String], session_id: &str) -> Vec<(u64, &'a str)> {
    sent.iter()
        .filter_map(|f| {
            let (seq, chunk) = f.strip_prefix(session_id)?.split_once(',')?;
            Some((seq.parse().ok()?, chunk))
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn frames_reassemble_into_the_record_stream() {
    let (mut controller, collector) = Cloudlet::in_memory(config("123"));
    let script = answer_handshakes(collector, "A");

    controller.configure_fields(keys(&['x', 'y'])).unwrap();
    controller.set_sample_producer(|ctx: &mut SampleContext<'_>| ctx.emit_values((1.5, 2.5)));

    let summary = controller.stream_for(1, "3").await.unwrap();
    script.abort();

    let sent = controller.channel().sent();
    assert_eq!(sent[0], "HS123,3");

    let frames = frames(&sent, "A");
    let (data, terminator) = frames.split_at(frames.len() - 1);
    assert_eq!(terminator[0], (summary.terminator_sequence, ";"));

    // Sequences are dense from zero
    for (expected, (seq, _)) in data.iter().enumerate() {
        assert_eq!(*seq, expected as u64);
    }

    let joined: String = data.iter().map(|(_, chunk)| *chunk).collect();
    let expected: String =
        (1..=summary.samples).map(|n| format!(r#"{{"x":1.5,"y":2.5,"n":{}}}"#, n)).collect();
    assert_eq!(joined, expected);
}

#[tokio::test(start_paused = true)]
async fn chunks_shrink_as_sequence_digits_grow() {
    let (mut controller, collector) = Cloudlet::in_memory(config("7"));
    let script = answer_handshakes(collector, "Q");

    controller.configure_fields(keys(&['a', 'b', 'c', 'd'])).unwrap();
    controller.set_sample_producer(|ctx: &mut SampleContext<'_>| {
        ctx.emit_values((0.125, -3.5, 1000.0, 2.75))
    });

    controller.stream_for(1, "0").await.unwrap();
    script.abort();

    let sent = controller.channel().sent();
    let frames = frames(&sent, "Q");
    let limit = controller.config().frame_limit;
    assert!(frames.len() > 100, "expected three-digit sequences");

    for (seq, chunk) in &frames {
        let digits = seq.to_string().len();
        assert!(digits + chunk.len() <= limit, "frame {} too long", seq);
    }

    // A full chunk before and after the 9 -> 10 boundary
    let at = |n: u64| frames.iter().find(|(s, _)| *s == n).unwrap().1;
    assert_eq!(at(9).len(), limit - 1);
    assert_eq!(at(10).len(), limit - 2);
}

#[tokio::test(start_paused = true)]
async fn terminator_is_sent_once_and_last() {
    let (mut controller, collector) = Cloudlet::in_memory(config("5"));
    let script = answer_handshakes(collector, "Z");

    controller.configure_fields(keys(&['t'])).unwrap();
    controller.set_sample_producer(|ctx: &mut SampleContext<'_>| ctx.emit_values(1.0));

    let first = controller.stream_for(1, "a").await.unwrap();
    let second = controller.stream_for(1, "b").await.unwrap();
    script.abort();

    let sent = controller.channel().sent();
    let terminators: Vec<&String> = sent.iter().filter(|f| f.ends_with(",;")).collect();
    assert_eq!(terminators.len(), 2);
    assert_eq!(*terminators[0], format!("Z{},;", first.terminator_sequence));
    assert_eq!(sent.last().unwrap(), &format!("Z{},;", second.terminator_sequence));

    // Each session numbers its frames from zero
    let second_start = sent.iter().position(|f| f == "HS5,b").unwrap();
    assert_eq!(sent[second_start + 1], r#"Z0,{"t":1,"n":1}"#);
}

#[tokio::test(start_paused = true)]
async fn unanswered_handshake_sends_nothing_else() {
    let (mut controller, _collector) = Cloudlet::in_memory(config("9"));
    let mut states = controller.state();

    let err = controller.stream_for(2, "3").await.unwrap_err();

    assert!(matches!(err, CloudletError::HandshakeTimeout { .. }));
    assert!(err.is_retryable());
    assert_eq!(controller.channel().sent(), vec!["HS9,3"]);
    assert_eq!(*states.borrow_and_update(), SessionState::Idle);
}

#[tokio::test(start_paused = true)]
async fn replies_for_other_devices_are_ignored() {
    let (mut controller, collector) = Cloudlet::in_memory(config("12"));

    let impostor = tokio::spawn(async move {
        let mut inbound = collector.subscribe();
        while let Some(text) = inbound.recv().await {
            if text.starts_with("HS") {
                collector.send("HS123,A").await.unwrap();
                collector.send("HS1,A").await.unwrap();
            }
        }
    });

    let err = controller.stream_for(1, "3").await.unwrap_err();
    impostor.abort();

    assert!(matches!(err, CloudletError::HandshakeTimeout { .. }));
}

#[tokio::test(start_paused = true)]
async fn identity_reply_is_displayed_for_a_window() {
    let (controller, collector) = Cloudlet::in_memory(config("123"));
    let mut shown = controller.displayed_identity();

    collector.send("ID123, bob ").await.unwrap();
    tokio::time::timeout(Duration::from_secs(1), shown.changed()).await.unwrap().unwrap();
    assert_eq!(shown.borrow_and_update().as_deref(), Some("bob"));

    tokio::time::timeout(Duration::from_secs(5), shown.changed()).await.unwrap().unwrap();
    assert_eq!(*shown.borrow(), None);
}

#[tokio::test(start_paused = true)]
async fn identity_announce_uses_device_prefix() {
    let (controller, collector) = Cloudlet::in_memory(config("44"));
    let mut inbound = collector.subscribe();

    controller.announce_identity("hello").await.unwrap();

    assert_eq!(inbound.recv().await.as_deref(), Some("ID44,hello"));
}

#[tokio::test(start_paused = true)]
async fn standalone_request_then_full_session() {
    let (mut controller, collector) = Cloudlet::in_memory(config("31"));
    let script = answer_handshakes(collector, "R");
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    controller.set_on_handshake_reply(std::sync::Arc::new(move |id: &str| {
        let _ = tx.send(id.to_string());
    }));
    controller.request_session("idle-check").await.unwrap();
    assert_eq!(rx.recv().await.as_deref(), Some("R"));
    assert_eq!(*controller.state().borrow(), SessionState::Idle);

    controller.configure_fields(keys(&['v'])).unwrap();
    controller.set_sample_producer(|ctx: &mut SampleContext<'_>| ctx.emit_values(2.0));
    let summary = controller.stream_for(1, "3").await.unwrap();
    script.abort();

    assert_eq!(summary.session_id, "R");
    let sent = controller.channel().sent();
    assert_eq!(sent[..2], ["HS31,idle-check", "HS31,3"]);
    assert_eq!(sent[2], r#"R0,{"v":2,"n":1}"#);
}
