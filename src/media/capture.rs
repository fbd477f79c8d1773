use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use super::backend::{AudioBackend, AudioBackendFactory, AudioFrame, CaptureConstraints};
use crate::error::MediaError;

/// Acquires local microphone streams
pub struct MediaCapture {
    factory: Arc<dyn AudioBackendFactory>,
    constraints: CaptureConstraints,
}

impl MediaCapture {
    pub fn new(factory: Arc<dyn AudioBackendFactory>, constraints: CaptureConstraints) -> Self {
        Self {
            factory,
            constraints,
        }
    }

    /// Open an audio-only stream with the configured voice processing
    pub async fn acquire(&self) -> Result<LocalStream, MediaError> {
        let mut backend = self.factory.create()?;

        info!(
            "Requesting microphone from {} (echo_cancellation={}, noise_suppression={}, auto_gain_control={})",
            backend.name(),
            self.constraints.echo_cancellation,
            self.constraints.noise_suppression,
            self.constraints.auto_gain_control
        );

        let frames = backend.start(&self.constraints).await?;
        let track = LocalAudioTrack::new(backend, frames);

        info!("Microphone acquired (track {})", track.id());

        Ok(LocalStream {
            id: format!("stream-{}", uuid::Uuid::new_v4()),
            tracks: vec![track],
        })
    }
}

/// A captured local stream; clones share the same tracks
#[derive(Clone)]
pub struct LocalStream {
    id: String,
    tracks: Vec<LocalAudioTrack>,
}

impl LocalStream {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn audio_tracks(&self) -> &[LocalAudioTrack] {
        &self.tracks
    }

    /// Enable or disable every audio track
    pub fn set_muted(&self, muted: bool) {
        for track in &self.tracks {
            track.set_enabled(!muted);
        }
    }

    /// Stop every track; safe to call more than once
    pub async fn release(&self) {
        for track in &self.tracks {
            track.stop().await;
        }
        debug!("Released local stream {}", self.id);
    }

    /// Number of tracks still capturing
    pub fn live_tracks(&self) -> usize {
        self.tracks.iter().filter(|t| t.is_live()).count()
    }
}

/// One microphone track backed by a capture backend
#[derive(Clone)]
pub struct LocalAudioTrack {
    inner: Arc<TrackInner>,
}

struct TrackInner {
    id: String,
    enabled: AtomicBool,
    live: AtomicBool,
    frames: Mutex<Option<mpsc::Receiver<AudioFrame>>>,
    backend: Mutex<Option<Box<dyn AudioBackend>>>,
}

impl LocalAudioTrack {
    fn new(backend: Box<dyn AudioBackend>, frames: mpsc::Receiver<AudioFrame>) -> Self {
        Self {
            inner: Arc::new(TrackInner {
                id: format!("audio-{}", uuid::Uuid::new_v4()),
                enabled: AtomicBool::new(true),
                live: AtomicBool::new(true),
                frames: Mutex::new(Some(frames)),
                backend: Mutex::new(Some(backend)),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_live(&self) -> bool {
        self.inner.live.load(Ordering::SeqCst)
    }

    /// Hand the frame stream to a consumer; only the first caller gets it
    pub async fn take_reader(&self) -> Option<TrackReader> {
        if !self.is_live() {
            return None;
        }
        let rx = self.inner.frames.lock().await.take()?;
        Some(TrackReader {
            rx,
            track: Arc::clone(&self.inner),
        })
    }

    /// Stop the underlying capture; later calls do nothing
    pub async fn stop(&self) {
        if !self.inner.live.swap(false, Ordering::SeqCst) {
            return;
        }

        let backend = self.inner.backend.lock().await.take();
        if let Some(mut backend) = backend {
            if let Err(e) = backend.stop().await {
                warn!("Failed to stop {} for track {}: {}", backend.name(), self.id(), e);
            }
        }

        self.inner.frames.lock().await.take();
        debug!("Track {} stopped", self.id());
    }
}

/// Frames from a local track; disabled tracks yield silence
pub struct TrackReader {
    rx: mpsc::Receiver<AudioFrame>,
    track: Arc<TrackInner>,
}

impl TrackReader {
    /// Next frame, or `None` once the track is stopped
    pub async fn recv(&mut self) -> Option<AudioFrame> {
        if !self.track.live.load(Ordering::SeqCst) {
            return None;
        }

        let frame = self.rx.recv().await?;

        if !self.track.live.load(Ordering::SeqCst) {
            return None;
        }

        if self.track.enabled.load(Ordering::SeqCst) {
            Some(frame)
        } else {
            Some(frame.silence())
        }
    }
}
