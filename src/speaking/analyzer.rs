use std::collections::VecDeque;
use std::f32::consts::PI;
use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use crate::media::AudioFrame;

/// Decibel range mapped onto 0..=255, as browser analysers do
const MIN_DECIBELS: f32 = -100.0;
const MAX_DECIBELS: f32 = -30.0;

/// Rolling frequency-domain energy over the most recent `fft_size` samples
pub struct SpectrumAnalyzer {
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    samples: VecDeque<f32>,
    buffer: Vec<Complex<f32>>,
    fft_size: usize,
}

impl SpectrumAnalyzer {
    pub fn new(fft_size: usize) -> Self {
        let fft_size = fft_size.max(2);
        let fft = FftPlanner::new().plan_fft_forward(fft_size);

        Self {
            fft,
            window: blackman(fft_size),
            samples: VecDeque::from(vec![0.0; fft_size]),
            buffer: vec![Complex::new(0.0, 0.0); fft_size],
            fft_size,
        }
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Append a frame (downmixed to mono) to the window
    pub fn push(&mut self, frame: &AudioFrame) {
        let channels = frame.channels.max(1) as usize;
        for chunk in frame.samples.chunks(channels) {
            let sum: f32 = chunk.iter().map(|&s| s as f32 / 32768.0).sum();
            self.samples.push_back(sum / chunk.len() as f32);
        }
        while self.samples.len() > self.fft_size {
            self.samples.pop_front();
        }
    }

    /// Forget everything heard so far
    pub fn reset(&mut self) {
        self.samples.iter_mut().for_each(|s| *s = 0.0);
    }

    /// Per-bin magnitudes scaled to 0..=255 (`fft_size / 2` bins)
    pub fn byte_frequency_data(&mut self) -> Vec<u8> {
        for (i, slot) in self.buffer.iter_mut().enumerate() {
            *slot = Complex::new(self.samples[i] * self.window[i], 0.0);
        }

        self.fft.process(&mut self.buffer);

        let scale = 255.0 / (MAX_DECIBELS - MIN_DECIBELS);
        let n = self.fft_size as f32;

        self.buffer[..self.fft_size / 2]
            .iter()
            .map(|bin| {
                let magnitude = bin.norm() / n;
                let db = if magnitude > 0.0 {
                    20.0 * magnitude.log10()
                } else {
                    f32::NEG_INFINITY
                };
                (scale * (db - MIN_DECIBELS)).clamp(0.0, 255.0) as u8
            })
            .collect()
    }

    /// Mean of the byte frequency data
    pub fn level(&mut self) -> f32 {
        let bins = self.byte_frequency_data();
        if bins.is_empty() {
            return 0.0;
        }
        bins.iter().map(|&b| b as f32).sum::<f32>() / bins.len() as f32
    }
}

fn blackman(size: usize) -> Vec<f32> {
    let (a0, a1, a2) = (0.42, 0.5, 0.08);
    let n = size as f32;
    (0..size)
        .map(|i| {
            let x = i as f32 / n;
            a0 - a1 * (2.0 * PI * x).cos() + a2 * (4.0 * PI * x).cos()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noise(len: usize, amplitude: f32, seed: u32) -> Vec<i16> {
        let mut state = seed;
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                let unit = (state >> 8) as f32 / (1u32 << 24) as f32 * 2.0 - 1.0;
                (unit * amplitude * i16::MAX as f32) as i16
            })
            .collect()
    }

    fn frame(samples: Vec<i16>) -> AudioFrame {
        AudioFrame {
            samples,
            sample_rate: 8000,
            channels: 1,
            timestamp_ms: 0,
        }
    }

    #[test]
    fn test_silence_has_zero_level() {
        let mut analyzer = SpectrumAnalyzer::new(256);
        analyzer.push(&frame(vec![0; 512]));
        assert_eq!(analyzer.level(), 0.0);
    }

    #[test]
    fn test_bin_count_is_half_window() {
        let mut analyzer = SpectrumAnalyzer::new(256);
        assert_eq!(analyzer.byte_frequency_data().len(), 128);
    }

    #[test]
    fn test_loud_noise_is_well_above_threshold() {
        let mut analyzer = SpectrumAnalyzer::new(256);
        analyzer.push(&frame(noise(256, 0.5, 7)));
        assert!(analyzer.level() > 100.0, "level was {}", analyzer.level());
    }

    #[test]
    fn test_faint_noise_is_well_below_threshold() {
        let mut analyzer = SpectrumAnalyzer::new(256);
        analyzer.push(&frame(noise(256, 0.00005, 7)));
        assert!(analyzer.level() < 5.0, "level was {}", analyzer.level());
    }

    #[test]
    fn test_window_keeps_only_recent_samples() {
        let mut analyzer = SpectrumAnalyzer::new(256);
        analyzer.push(&frame(noise(256, 0.5, 3)));
        analyzer.push(&frame(vec![0; 256]));
        assert_eq!(analyzer.level(), 0.0);
    }

    #[test]
    fn test_reset_silences_window() {
        let mut analyzer = SpectrumAnalyzer::new(256);
        analyzer.push(&frame(noise(256, 0.5, 11)));
        analyzer.reset();
        assert_eq!(analyzer.level(), 0.0);
    }

    #[test]
    fn test_stereo_is_downmixed() {
        let mut analyzer = SpectrumAnalyzer::new(256);
        let mono = noise(256, 0.5, 5);
        let stereo: Vec<i16> = mono.iter().flat_map(|&s| [s, s]).collect();
        analyzer.push(&AudioFrame {
            samples: stereo,
            sample_rate: 8000,
            channels: 2,
            timestamp_ms: 0,
        });
        assert!(analyzer.level() > 100.0);
    }
}
