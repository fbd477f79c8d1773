use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::analyzer::SpectrumAnalyzer;
use super::SpeakingState;
use crate::media::RemoteAudio;

/// Tuning for the speaking heuristic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeakingConfig {
    /// Sampling cadence in milliseconds
    pub interval_ms: u64,

    /// Analysis window in samples (power of two)
    pub fft_size: usize,

    /// Mean byte magnitude above which the agent counts as speaking
    pub threshold: f32,
}

impl Default for SpeakingConfig {
    fn default() -> Self {
        Self {
            interval_ms: 100,
            fft_size: 256,
            threshold: 20.0,
        }
    }
}

/// Periodic speaking classification of a remote stream
///
/// No calibration and no debounce: the state can flicker around the
/// threshold.
pub struct SpeakingDetector {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SpeakingDetector {
    /// Start sampling `remote`; `on_state` is called whenever the state changes
    pub fn start<F>(remote: &RemoteAudio, config: &SpeakingConfig, on_state: F) -> Self
    where
        F: Fn(SpeakingState) + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let mut frames = remote.subscribe();
        let mut analyzer = SpectrumAnalyzer::new(config.fft_size);
        let interval = Duration::from_millis(config.interval_ms.max(1));
        let threshold = config.threshold;

        info!(
            "Speaking detection started on {} (every {:?}, window {}, threshold {})",
            remote.id(),
            interval,
            analyzer.fft_size(),
            threshold
        );

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut last: Option<SpeakingState> = None;
            let mut stream_open = true;

            loop {
                tokio::select! {
                    biased;

                    _ = token.cancelled() => break,

                    frame = frames.recv(), if stream_open => match frame {
                        Ok(frame) => analyzer.push(&frame),
                        Err(RecvError::Lagged(skipped)) => {
                            debug!("Speaking detector lagged, skipped {} frames", skipped);
                        }
                        Err(RecvError::Closed) => {
                            debug!("Remote audio closed, analysing silence");
                            analyzer.reset();
                            stream_open = false;
                        }
                    },

                    _ = ticker.tick() => {
                        let level = analyzer.level();
                        let state = classify(level, threshold);
                        if last != Some(state) {
                            debug!("Speaking state {:?} (level {:.1})", state, level);
                            on_state(state);
                            last = Some(state);
                        }
                    }
                }
            }
        });

        Self {
            cancel,
            task: Some(task),
        }
    }

    /// Stop sampling; nothing is reported once this returns
    pub async fn stop(&mut self) {
        self.cancel.cancel();

        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!("Speaking detector task panicked: {}", e);
            }
            info!("Speaking detection stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for SpeakingDetector {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Above the threshold is speech, anything else is listening
pub fn classify(level: f32, threshold: f32) -> SpeakingState {
    if level > threshold {
        SpeakingState::Speaking
    } else {
        SpeakingState::Listening
    }
}
