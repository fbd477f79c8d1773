use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::media::CaptureConstraints;
use crate::peer::IceServer;
use crate::session::{SessionConfig, DATA_CHANNEL_LABEL, DEFAULT_STUN_SERVER};
use crate::speaking::SpeakingConfig;

/// Environment variables override the file, e.g. `VOICE_AGENT_BACKEND__BASE_URL`
pub const ENV_PREFIX: &str = "VOICE_AGENT";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub ice: IceConfig,
    pub capture: CaptureConstraints,
    pub speaking: SpeakingConfig,
    pub playback: PlaybackConfig,
    pub control: ControlConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the voice-agent backend
    pub base_url: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:7860".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IceConfig {
    /// Either bare URLs or `{ urls, username, credential }` tables
    pub servers: Vec<IceServer>,
    pub gathering_timeout_ms: u64,
}

impl Default for IceConfig {
    fn default() -> Self {
        Self {
            servers: vec![IceServer::url(DEFAULT_STUN_SERVER)],
            gathering_timeout_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub volume: f32,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self { volume: 1.0 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub enabled: bool,
    pub bind: String,
    pub port: u16,
    /// Browser origins allowed to call the control API cross-origin
    pub allowed_origins: Vec<String>,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: "127.0.0.1".to_string(),
            port: 7861,
            allowed_origins: Vec::new(),
        }
    }
}

impl Config {
    /// Load from `path` (extension optional, file optional) layered under
    /// the environment
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("ice.servers")
                    .with_list_parse_key("control.allowed_origins"),
            )
            .build()
            .with_context(|| format!("Failed to read configuration from {}", path))?;

        let cfg: Config = settings
            .try_deserialize()
            .context("Invalid configuration")?;
        cfg.validate()?;

        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        let url = self.backend.base_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            bail!("backend.base_url must be an http(s) URL, got '{}'", url);
        }

        for server in &self.ice.servers {
            if server.urls.is_empty() {
                bail!("ice.servers entries need at least one URL");
            }
            if server.is_turn() && !server.has_credentials() {
                bail!(
                    "ice.servers entry {} is a TURN server and needs username and credential",
                    server.urls.join(",")
                );
            }
        }

        let fft_size = self.speaking.fft_size;
        if !fft_size.is_power_of_two() || !(32..=32768).contains(&fft_size) {
            bail!(
                "speaking.fft_size must be a power of two between 32 and 32768, got {}",
                fft_size
            );
        }

        if self.speaking.interval_ms == 0 {
            bail!("speaking.interval_ms must be greater than zero");
        }

        if !(0.0..=1.0).contains(&self.playback.volume) {
            bail!(
                "playback.volume must be between 0.0 and 1.0, got {}",
                self.playback.volume
            );
        }

        for origin in &self.control.allowed_origins {
            if !(origin.starts_with("http://") || origin.starts_with("https://")) {
                bail!(
                    "control.allowed_origins entries must be http(s) origins, got '{}'",
                    origin
                );
            }
        }

        Ok(())
    }

    /// Controller settings derived from this configuration
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            base_url: self.backend.base_url.clone(),
            ice_servers: self.ice.servers.clone(),
            gathering_timeout: Duration::from_millis(self.ice.gathering_timeout_ms),
            capture: self.capture.clone(),
            speaking: self.speaking.clone(),
            data_channel_label: DATA_CHANNEL_LABEL.to_string(),
            volume: self.playback.volume,
        }
    }

    pub fn control_addr(&self) -> String {
        format!("{}:{}", self.control.bind, self.control.port)
    }
}
