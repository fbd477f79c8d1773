use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::MediaError;

/// Audio sample data (16-bit PCM, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since the stream started
    pub timestamp_ms: u64,
}

impl AudioFrame {
    /// Duration of the frame in milliseconds
    pub fn duration_ms(&self) -> f64 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0.0;
        }
        self.samples.len() as f64 * 1000.0 / (self.sample_rate as f64 * self.channels as f64)
    }

    /// Average interleaved channels down to one
    pub fn into_mono(self) -> AudioFrame {
        if self.channels <= 1 {
            return self;
        }

        let channels = self.channels as usize;
        let samples = self
            .samples
            .chunks_exact(channels)
            .map(|chunk| {
                let sum: i32 = chunk.iter().map(|&s| s as i32).sum();
                (sum / channels as i32) as i16
            })
            .collect();

        AudioFrame {
            samples,
            channels: 1,
            ..self
        }
    }

    /// Linear-interpolation resample of a mono frame
    pub fn resample(self, target_rate: u32) -> AudioFrame {
        if self.sample_rate == target_rate || self.sample_rate == 0 || self.samples.is_empty() {
            return self;
        }

        let ratio = self.sample_rate as f64 / target_rate as f64;
        let out_len = (self.samples.len() as f64 / ratio).round() as usize;
        let last = self.samples.len() - 1;

        let samples = (0..out_len)
            .map(|i| {
                let pos = i as f64 * ratio;
                let idx = (pos.floor() as usize).min(last);
                let next = (idx + 1).min(last);
                let frac = pos - idx as f64;
                let a = self.samples[idx] as f64;
                let b = self.samples[next] as f64;
                (a + (b - a) * frac).round() as i16
            })
            .collect();

        AudioFrame {
            samples,
            sample_rate: target_rate,
            ..self
        }
    }

    /// Same shape, all samples zeroed
    pub fn silence(mut self) -> AudioFrame {
        self.samples.iter_mut().for_each(|s| *s = 0);
        self
    }
}

/// Voice processing requested from the capture device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConstraints {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
        }
    }
}

/// Audio capture backend trait
///
/// Implementations:
/// - cpal default input device (feature `audio-device`)
/// - in-process fakes in tests
#[async_trait::async_trait]
pub trait AudioBackend: Send + Sync {
    /// Start capturing audio
    ///
    /// Returns a channel receiver that will receive audio frames
    async fn start(
        &mut self,
        constraints: &CaptureConstraints,
    ) -> Result<mpsc::Receiver<AudioFrame>, MediaError>;

    /// Stop capturing audio
    async fn stop(&mut self) -> Result<(), MediaError>;

    /// Check if backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Creates a fresh capture backend for each acquisition
pub trait AudioBackendFactory: Send + Sync {
    fn create(&self) -> Result<Box<dyn AudioBackend>, MediaError>;
}
