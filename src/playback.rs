//! Remote audio playback
//!
//! The playback sink outlives every session: its volume can be changed while
//! idle and applies to whatever remote audio is attached next.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::media::{AudioFrame, RemoteAudio};

/// Where played audio ends up (speaker, test recorder, ...)
pub trait AudioOutput: Send + Sync {
    fn write(&self, frame: AudioFrame);
}

/// Volume-controlled sink for the remote audio stream
pub struct PlaybackSink {
    output: Arc<dyn AudioOutput>,
    volume: Arc<AtomicU32>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PlaybackSink {
    pub fn new(output: Arc<dyn AudioOutput>, volume: f32) -> Self {
        Self {
            output,
            volume: Arc::new(AtomicU32::new(clamp_volume(volume).to_bits())),
            task: Mutex::new(None),
        }
    }

    pub fn volume(&self) -> f32 {
        f32::from_bits(self.volume.load(Ordering::SeqCst))
    }

    /// Set the playback volume, clamped to `0.0..=1.0`; returns the applied value
    pub fn set_volume(&self, volume: f32) -> f32 {
        let volume = clamp_volume(volume);
        self.volume.store(volume.to_bits(), Ordering::SeqCst);
        volume
    }

    /// Start playing a remote stream, replacing any previous one
    pub async fn attach(&self, remote: &RemoteAudio) {
        let mut frames = remote.subscribe();
        let output = Arc::clone(&self.output);
        let volume = Arc::clone(&self.volume);
        let remote_id = remote.id().to_string();

        let task = tokio::spawn(async move {
            loop {
                match frames.recv().await {
                    Ok(mut frame) => {
                        apply_gain(&mut frame, f32::from_bits(volume.load(Ordering::SeqCst)));
                        output.write(frame);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        debug!("Playback lagged, skipped {} frames", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("Playback of {} ended", remote_id);
        });

        let previous = self.task.lock().await.replace(task);
        if let Some(previous) = previous {
            previous.abort();
        }

        info!("Playing remote audio {}", remote.id());
    }

    /// Stop playing; the volume is kept
    pub async fn detach(&self) {
        if let Some(task) = self.task.lock().await.take() {
            task.abort();
            debug!("Playback detached");
        }
    }

    pub async fn is_playing(&self) -> bool {
        self.task
            .lock()
            .await
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }
}

fn clamp_volume(volume: f32) -> f32 {
    if volume.is_nan() {
        0.0
    } else {
        volume.clamp(0.0, 1.0)
    }
}

fn apply_gain(frame: &mut AudioFrame, volume: f32) {
    if volume >= 1.0 {
        return;
    }
    for sample in frame.samples.iter_mut() {
        *sample = (*sample as f32 * volume).round() as i16;
    }
}
