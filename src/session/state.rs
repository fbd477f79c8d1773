use std::fmt;

use serde::Serialize;
use uuid::Uuid;

use crate::speaking::SpeakingState;
use crate::transcript::TranscriptEntry;

/// Session lifecycle as seen by the UI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Connected,
    Disconnected,
    Failed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Failed => "failed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the controller tells the UI, in the order it happened
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Connection(ConnectionState),
    Speaking(SpeakingState),
    Transcript(TranscriptEntry),
    TranscriptCleared,
    Muted(bool),
    Volume(f32),
}

/// Point-in-time view of the controller
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub state: ConnectionState,

    /// Id of the active session, if any
    pub session_id: Option<Uuid>,

    pub muted: bool,

    /// Playback volume (0.0 to 1.0)
    pub volume: f32,

    /// Data channel messages that could not be parsed
    pub dropped_messages: usize,

    /// Whether a microphone track is still capturing
    pub microphone_live: bool,

    /// Whether a peer connection is open
    pub peer_open: bool,

    /// Whether remote audio is being played
    pub remote_audio_playing: bool,
}
