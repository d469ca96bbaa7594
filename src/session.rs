//! Session lifecycle
//!
//! A node owns at most one session at a time and walks it through
//! `Idle -> AwaitingHandshake -> Streaming -> Terminating -> Idle`:
//!
//! - a session request moves `Idle` to `AwaitingHandshake`
//! - the collector's handshake reply moves it to `Streaming`
//! - the sampling duration elapsing moves it to `Terminating`
//! - sending the terminator frame returns it to `Idle`
//!
//! A handshake that times out or is cancelled returns straight to `Idle`.

use std::fmt;

use crate::encoder::ChunkEncoder;

/// Observable state of the session controller
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    AwaitingHandshake { label: String },
    Streaming { session_id: String },
    Terminating { session_id: String },
}

impl SessionState {
    pub fn is_idle(&self) -> bool {
        matches!(self, SessionState::Idle)
    }

    /// Session id once the collector has assigned one
    pub fn session_id(&self) -> Option<&str> {
        match self {
            SessionState::Streaming { session_id } | SessionState::Terminating { session_id } => {
                Some(session_id)
            }
            _ => None,
        }
    }

    /// Whether `next` is a legal successor of this state
    pub fn can_transition_to(&self, next: &SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Idle, AwaitingHandshake { .. })
                | (AwaitingHandshake { .. }, Streaming { .. })
                | (AwaitingHandshake { .. }, Idle)
                | (Streaming { .. }, Terminating { .. })
                | (Streaming { .. }, Idle)
                | (Terminating { .. }, Idle)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => f.write_str("idle"),
            SessionState::AwaitingHandshake { label } => {
                write!(f, "awaiting handshake ({})", label)
            }
            SessionState::Streaming { session_id } => write!(f, "streaming {}", session_id),
            SessionState::Terminating { session_id } => write!(f, "terminating {}", session_id),
        }
    }
}

/// A live session: the collector-assigned id plus its frame numbering
#[derive(Debug, Clone)]
pub struct Session {
    encoder: ChunkEncoder,
    frames_sent: u64,
}

impl Session {
    /// Start a session at sequence 0
    pub fn begin(session_id: impl Into<String>, frame_limit: usize) -> Self {
        Self { encoder: ChunkEncoder::new(session_id, frame_limit), frames_sent: 0 }
    }

    pub fn id(&self) -> &str {
        self.encoder.session_id()
    }

    pub fn sequence(&self) -> u64 {
        self.encoder.sequence()
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    /// Frame a payload, counting the frames against this session
    pub fn frame(&mut self, payload: &str) -> Vec<String> {
        let frames = self.encoder.encode(payload);
        self.frames_sent += frames.len() as u64;
        frames
    }

    pub fn terminator(&self) -> String {
        self.encoder.terminator()
    }
}

/// Outcome of one completed streaming session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub session_id: String,

    /// Sampling ticks run
    pub samples: u64,

    /// Payload frames sent, excluding the terminator
    pub frames_sent: u64,

    /// Sequence number carried by the terminator
    pub terminator_sequence: u64,
}
