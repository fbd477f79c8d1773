use std::time::Duration;

use crate::media::CaptureConstraints;
use crate::peer::IceServer;
use crate::speaking::SpeakingConfig;

/// Label of the auxiliary message channel the backend listens on
pub const DATA_CHANNEL_LABEL: &str = "chat";

pub const DEFAULT_STUN_SERVER: &str = "stun:stun.l.google.com:19302";

/// Configuration for the session controller
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Backend base URL; the offer is POSTed to `{base_url}/api/offer`
    pub base_url: String,

    /// STUN/TURN servers handed to the peer connection
    pub ice_servers: Vec<IceServer>,

    /// Upper bound on the ICE gathering wait before the offer is sent
    pub gathering_timeout: Duration,

    /// Voice processing requested from the microphone
    pub capture: CaptureConstraints,

    /// Speaking detector tuning
    pub speaking: SpeakingConfig,

    pub data_channel_label: String,

    /// Initial playback volume (0.0 to 1.0)
    pub volume: f32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:7860".to_string(),
            ice_servers: vec![IceServer::url(DEFAULT_STUN_SERVER)],
            gathering_timeout: Duration::from_secs(2),
            capture: CaptureConstraints::default(),
            speaking: SpeakingConfig::default(),
            data_channel_label: DATA_CHANNEL_LABEL.to_string(),
            volume: 1.0,
        }
    }
}
