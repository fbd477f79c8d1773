//! Speaking detection on the remote audio stream
//!
//! A spectrum snapshot is taken on a fixed cadence; its mean magnitude
//! against a fixed threshold decides between `speaking` and `listening`.

mod analyzer;
mod detector;

use serde::{Deserialize, Serialize};

pub use analyzer::SpectrumAnalyzer;
pub use detector::{classify, SpeakingConfig, SpeakingDetector};

/// What the remote agent is doing, as far as its audio energy tells
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeakingState {
    /// No session
    #[default]
    Idle,
    /// Session active, remote audio below threshold
    Listening,
    /// Remote audio above threshold
    Speaking,
}
