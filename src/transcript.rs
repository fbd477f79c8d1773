//! Transcript entries and the in-memory transcript store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::session::SessionEvent;

/// Shown when the transcript holds nothing else
pub const PLACEHOLDER_TEXT: &str = "Transcript will appear here...";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Bot,
    /// Lifecycle notices ("Connected", "Connection failed: ...")
    Info,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub speaker: Speaker,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl TranscriptEntry {
    pub fn new(speaker: Speaker, text: impl Into<String>) -> Self {
        Self {
            speaker,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Speaker::User, text)
    }

    pub fn bot(text: impl Into<String>) -> Self {
        Self::new(Speaker::Bot, text)
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self::new(Speaker::Info, text)
    }
}

/// Payload carried on the `chat` data channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AgentMessage {
    /// What the user said, as heard by the agent
    Transcription { text: String },
    /// What the agent answered
    Response { text: String },
}

impl AgentMessage {
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn into_entry(self) -> TranscriptEntry {
        match self {
            AgentMessage::Transcription { text } => TranscriptEntry::user(text),
            AgentMessage::Response { text } => TranscriptEntry::bot(text),
        }
    }
}

/// Append-only transcript; clearing leaves a single placeholder entry
#[derive(Debug, Clone)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
    placeholder: bool,
}

impl Transcript {
    pub fn new() -> Self {
        Self {
            entries: vec![TranscriptEntry::info(PLACEHOLDER_TEXT)],
            placeholder: true,
        }
    }

    pub fn push(&mut self, entry: TranscriptEntry) {
        if self.placeholder {
            self.entries.clear();
            self.placeholder = false;
        }
        self.entries.push(entry);
    }

    pub fn clear(&mut self) {
        *self = Self::new();
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    /// True while only the placeholder is shown
    pub fn is_empty(&self) -> bool {
        self.placeholder
    }

    /// Fold a controller event into the store; other events are ignored
    pub fn apply(&mut self, event: &SessionEvent) {
        match event {
            SessionEvent::Transcript(entry) => self.push(entry.clone()),
            SessionEvent::TranscriptCleared => self.clear(),
            _ => {}
        }
    }
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new()
    }
}
