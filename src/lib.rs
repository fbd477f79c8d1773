pub mod config;
pub mod error;
pub mod http;
pub mod media;
pub mod peer;
pub mod playback;
pub mod prompt;
pub mod session;
pub mod signaling;
pub mod speaking;
pub mod transcript;

pub use config::Config;
pub use error::{MediaError, NegotiationError, SessionError, SignalingError};
pub use http::{create_router, AppState};
pub use media::{AudioBackend, AudioBackendFactory, AudioFrame, CaptureConstraints, RemoteAudio};
pub use peer::{IceServer, PeerConnection, PeerConnectionFactory, PeerEvent, PeerState};
pub use playback::{AudioOutput, PlaybackSink};
pub use session::{
    ConnectionState, Platform, SessionConfig, SessionController, SessionEvent, SessionStatus,
};
pub use signaling::{SessionDescription, SignalingClient};
pub use speaking::{SpeakingConfig, SpeakingDetector, SpeakingState};
pub use transcript::{AgentMessage, Speaker, Transcript, TranscriptEntry};
