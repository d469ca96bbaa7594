//! Chunk encoder: splits a payload into numbered frames for one session.
//!
//! Frames are `<sessionId><sequence>,<chunk>`. The chunk budget is
//! `frame_limit - digits(sequence)`, so a frame's routing part and payload share a
//! fixed ceiling and the chunk shrinks by one character each time the sequence
//! crosses a power of ten (9 -> 10, 99 -> 100, ...). Collectors reassemble on
//! this exact split.
//!
//! The sequence number belongs to the session: it starts at 0 at handshake time,
//! advances once per payload frame across every payload encoded in the session,
//! and the terminator reuses the next unused value.

use crate::config::DEFAULT_FRAME_LIMIT;
use crate::types::message;

/// Number of decimal digits in `n`
pub fn digit_count(n: u64) -> usize {
    n.checked_ilog10().map_or(1, |d| d as usize + 1)
}

/// Chunk length available to frame `sequence`.
///
/// Never less than one character, so a tiny limit still makes progress.
pub fn max_chunk_len(frame_limit: usize, sequence: u64) -> usize {
    frame_limit.saturating_sub(digit_count(sequence)).max(1)
}

/// Stateful encoder for one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkEncoder {
    session_id: String,
    sequence: u64,
    frame_limit: usize,
}

impl ChunkEncoder {
    pub fn new(session_id: impl Into<String>, frame_limit: usize) -> Self {
        Self { session_id: session_id.into(), sequence: 0, frame_limit }
    }

    /// Encoder with the default radio frame limit
    pub fn with_default_limit(session_id: impl Into<String>) -> Self {
        Self::new(session_id, DEFAULT_FRAME_LIMIT)
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Next sequence number to be used
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn frame_limit(&self) -> usize {
        self.frame_limit
    }

    /// Split `payload` into frames, advancing the sequence once per frame.
    ///
    /// An empty payload produces no frames. Chunks are cut on character
    /// boundaries.
    pub fn encode(&mut self, payload: &str) -> Vec<String> {
        let mut frames = Vec::new();
        let mut rest = payload;

        while !rest.is_empty() {
            let max_len = max_chunk_len(self.frame_limit, self.sequence);
            let cut = rest.char_indices().nth(max_len).map_or(rest.len(), |(i, _)| i);
            let (chunk, tail) = rest.split_at(cut);

            frames.push(message::data_frame(&self.session_id, self.sequence, chunk));
            self.sequence += 1;
            rest = tail;
        }

        frames
    }

    /// Terminator frame at the current sequence. Does not advance it.
    pub fn terminator(&self) -> String {
        message::terminator_frame(&self.session_id, self.sequence)
    }
}
