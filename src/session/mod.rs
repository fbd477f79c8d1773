//! Session lifecycle
//!
//! `SessionController` owns the single live session and drives it through
//! `idle -> connecting -> connected -> (disconnected | failed) -> idle`:
//! - Microphone acquisition and mute
//! - Peer connection negotiation and the offer/answer exchange
//! - Speaking detection and playback of the remote audio
//! - Transcript entries from the data channel

mod config;
mod controller;
mod state;

pub use config::{SessionConfig, DATA_CHANNEL_LABEL, DEFAULT_STUN_SERVER};
pub use controller::{Platform, SessionController};
pub use state::{ConnectionState, SessionEvent, SessionStatus};
