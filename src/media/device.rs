// Microphone capture and speaker playback through cpal
//
// cpal streams are not Send on every platform, so each stream lives on its
// own thread and is dropped there when the stop channel fires.

use std::collections::VecDeque;
use std::sync::{mpsc as std_mpsc, Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Instant;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::backend::{AudioBackend, AudioBackendFactory, AudioFrame, CaptureConstraints};
use crate::error::MediaError;
use crate::playback::AudioOutput;

/// Speaker buffer cap (one second of audio)
const MAX_QUEUED_SECONDS: usize = 1;

/// Default input device of the default cpal host
#[derive(Debug, Default)]
pub struct CpalMicrophone;

impl AudioBackendFactory for CpalMicrophone {
    fn create(&self) -> Result<Box<dyn AudioBackend>, MediaError> {
        Ok(Box::new(CpalInputBackend::default()))
    }
}

#[derive(Default)]
struct CpalInputBackend {
    stop_tx: Option<std_mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

#[async_trait::async_trait]
impl AudioBackend for CpalInputBackend {
    async fn start(
        &mut self,
        constraints: &CaptureConstraints,
    ) -> Result<mpsc::Receiver<AudioFrame>, MediaError> {
        if self.stop_tx.is_some() {
            return Err(MediaError::Device("already capturing".to_string()));
        }

        // cpal exposes raw device audio only
        debug!(?constraints, "Voice processing constraints are not applied by cpal");

        let (frame_tx, frame_rx) = mpsc::channel(64);
        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = std_mpsc::channel();

        let thread = std::thread::Builder::new()
            .name("cpal-input".to_string())
            .spawn(move || {
                let stream = match open_input(frame_tx) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                // Blocks until stop() or the backend is dropped
                let _ = stop_rx.recv();
                drop(stream);
            })
            .map_err(|e| MediaError::Device(format!("failed to spawn capture thread: {}", e)))?;

        match ready_rx.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(_) => return Err(MediaError::Device("capture thread exited".to_string())),
        }

        self.stop_tx = Some(stop_tx);
        self.thread = Some(thread);

        Ok(frame_rx)
    }

    async fn stop(&mut self) -> Result<(), MediaError> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }

        if let Some(thread) = self.thread.take() {
            tokio::task::spawn_blocking(move || thread.join())
                .await
                .map_err(|e| MediaError::Device(format!("capture thread join failed: {}", e)))?
                .map_err(|_| MediaError::Device("capture thread panicked".to_string()))?;
            info!("Microphone capture stopped");
        }

        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.stop_tx.is_some()
    }

    fn name(&self) -> &str {
        "cpal microphone"
    }
}

fn open_input(frames: mpsc::Sender<AudioFrame>) -> Result<cpal::Stream, MediaError> {
    let host = cpal::default_host();
    let device = host.default_input_device().ok_or(MediaError::NoDevice)?;

    let supported = device
        .default_input_config()
        .map_err(|e| match e {
            cpal::DefaultStreamConfigError::DeviceNotAvailable => MediaError::NoDevice,
            other => MediaError::Device(other.to_string()),
        })?;

    let sample_rate = supported.sample_rate().0;
    let channels = supported.channels();
    let config: StreamConfig = supported.config();
    let started = Instant::now();

    info!(
        "Opening input device {} ({}Hz, {} channels, {:?})",
        device.name().unwrap_or_else(|_| "unknown".to_string()),
        sample_rate,
        channels,
        supported.sample_format()
    );

    let emit = move |samples: Vec<i16>| {
        let frame = AudioFrame {
            samples,
            sample_rate,
            channels,
            timestamp_ms: started.elapsed().as_millis() as u64,
        };
        // Audio thread must not block; drop frames when the consumer lags
        let _ = frames.try_send(frame);
    };

    let stream = match supported.sample_format() {
        SampleFormat::F32 => device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                emit(data.iter().map(|&s| f32_to_i16(s)).collect())
            },
            stream_error,
            None,
        ),
        SampleFormat::I16 => device.build_input_stream(
            &config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| emit(data.to_vec()),
            stream_error,
            None,
        ),
        SampleFormat::U16 => device.build_input_stream(
            &config,
            move |data: &[u16], _: &cpal::InputCallbackInfo| {
                emit(data.iter().map(|&s| (s as i32 - 32768) as i16).collect())
            },
            stream_error,
            None,
        ),
        other => {
            return Err(MediaError::Device(format!(
                "unsupported input sample format {:?}",
                other
            )))
        }
    }
    .map_err(|e| match e {
        cpal::BuildStreamError::DeviceNotAvailable => MediaError::NoDevice,
        other => MediaError::Device(other.to_string()),
    })?;

    stream
        .play()
        .map_err(|e| MediaError::Device(e.to_string()))?;

    Ok(stream)
}

fn stream_error(err: cpal::StreamError) {
    warn!("Audio stream error: {}", err);
}

fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

/// Default output device; frames are resampled to the device rate
pub struct CpalSpeaker {
    queue: Arc<Mutex<VecDeque<f32>>>,
    sample_rate: u32,
    channels: u16,
    // Dropping the sender ends the playback thread
    _stop_tx: std_mpsc::Sender<()>,
}

impl CpalSpeaker {
    pub fn open() -> Result<Self, MediaError> {
        let queue = Arc::new(Mutex::new(VecDeque::new()));
        let (ready_tx, ready_rx) = std_mpsc::channel();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

        let thread_queue = Arc::clone(&queue);
        std::thread::Builder::new()
            .name("cpal-output".to_string())
            .spawn(move || {
                let (stream, sample_rate, channels) = match open_output(thread_queue) {
                    Ok(opened) => opened,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok((sample_rate, channels)));
                let _ = stop_rx.recv();
                drop(stream);
            })
            .map_err(|e| MediaError::Device(format!("failed to spawn playback thread: {}", e)))?;

        let (sample_rate, channels) = ready_rx
            .recv()
            .map_err(|_| MediaError::Device("playback thread exited".to_string()))??;

        Ok(Self {
            queue,
            sample_rate,
            channels,
            _stop_tx: stop_tx,
        })
    }
}

impl AudioOutput for CpalSpeaker {
    fn write(&self, frame: AudioFrame) {
        let frame = frame.into_mono().resample(self.sample_rate);
        let cap = self.sample_rate as usize * self.channels as usize * MAX_QUEUED_SECONDS;

        let mut queue = match self.queue.lock() {
            Ok(queue) => queue,
            Err(poisoned) => poisoned.into_inner(),
        };

        for sample in frame.samples {
            let value = sample as f32 / 32768.0;
            for _ in 0..self.channels {
                queue.push_back(value);
            }
        }

        if queue.len() > cap {
            let excess = queue.len() - cap;
            queue.drain(..excess);
        }
    }
}

fn open_output(
    queue: Arc<Mutex<VecDeque<f32>>>,
) -> Result<(cpal::Stream, u32, u16), MediaError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| MediaError::Device("no audio output device available".to_string()))?;

    let supported = device
        .default_output_config()
        .map_err(|e| MediaError::Device(e.to_string()))?;

    let sample_rate = supported.sample_rate().0;
    let channels = supported.channels();
    let config: StreamConfig = supported.config();

    let stream = match supported.sample_format() {
        SampleFormat::F32 => device.build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                fill_output(&queue, data, |v| v)
            },
            stream_error,
            None,
        ),
        SampleFormat::I16 => device.build_output_stream(
            &config,
            move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                fill_output(&queue, data, |v| f32_to_i16(v))
            },
            stream_error,
            None,
        ),
        other => {
            return Err(MediaError::Device(format!(
                "unsupported output sample format {:?}",
                other
            )))
        }
    }
    .map_err(|e| MediaError::Device(e.to_string()))?;

    stream
        .play()
        .map_err(|e| MediaError::Device(e.to_string()))?;

    info!("Speaker opened ({}Hz, {} channels)", sample_rate, channels);

    Ok((stream, sample_rate, channels))
}

fn fill_output<T>(queue: &Mutex<VecDeque<f32>>, data: &mut [T], convert: impl Fn(f32) -> T) {
    let mut queue = match queue.lock() {
        Ok(queue) => queue,
        Err(poisoned) => poisoned.into_inner(),
    };
    for slot in data.iter_mut() {
        *slot = convert(queue.pop_front().unwrap_or(0.0));
    }
}
