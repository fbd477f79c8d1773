use tokio::sync::broadcast;

use super::backend::AudioFrame;

/// Decoded audio arriving from the remote peer
///
/// The platform publishes frames; playback and speaking detection each
/// subscribe independently.
#[derive(Clone)]
pub struct RemoteAudio {
    id: String,
    frames: broadcast::Sender<AudioFrame>,
}

impl RemoteAudio {
    pub fn new(id: impl Into<String>) -> Self {
        let (frames, _) = broadcast::channel(64);
        Self {
            id: id.into(),
            frames,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Sender the platform uses to deliver decoded frames
    pub fn publisher(&self) -> broadcast::Sender<AudioFrame> {
        self.frames.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AudioFrame> {
        self.frames.subscribe()
    }
}
