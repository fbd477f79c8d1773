// Integration tests for configuration loading

use std::time::Duration;

use anyhow::Result;
use tempfile::TempDir;
use voice_agent_client::{Config, IceServer};

fn write_config(dir: &TempDir, contents: &str) -> Result<String> {
    let path = dir.path().join("voice-agent.toml");
    std::fs::write(&path, contents)?;
    Ok(path.to_string_lossy().into_owned())
}

#[test]
fn test_missing_file_uses_defaults() -> Result<()> {
    let dir = TempDir::new()?;
    let cfg = Config::load(&dir.path().join("absent").to_string_lossy())?;

    assert_eq!(cfg.backend.base_url, "http://localhost:7860");
    assert_eq!(
        cfg.ice.servers,
        vec![IceServer::url("stun:stun.l.google.com:19302")]
    );
    assert_eq!(cfg.ice.gathering_timeout_ms, 2000);
    assert!(cfg.capture.echo_cancellation);
    assert!(cfg.capture.noise_suppression);
    assert!(cfg.capture.auto_gain_control);
    assert_eq!(cfg.speaking.interval_ms, 100);
    assert_eq!(cfg.speaking.fft_size, 256);
    assert_eq!(cfg.playback.volume, 1.0);
    assert_eq!(cfg.control_addr(), "127.0.0.1:7861");
    assert!(cfg.control.allowed_origins.is_empty());

    Ok(())
}

#[test]
fn test_file_values_override_defaults() -> Result<()> {
    let dir = TempDir::new()?;
    let path = write_config(
        &dir,
        r#"
[backend]
base_url = "https://agent.example.com/"

[ice]
servers = ["stun:stun.example.com:3478"]
gathering_timeout_ms = 500

[capture]
noise_suppression = false

[playback]
volume = 0.4
"#,
    )?;

    let cfg = Config::load(&path)?;
    assert_eq!(cfg.backend.base_url, "https://agent.example.com/");
    assert_eq!(cfg.ice.servers.len(), 1);
    assert!(cfg.capture.echo_cancellation, "unset keys keep defaults");
    assert!(!cfg.capture.noise_suppression);

    let session = cfg.session_config();
    assert_eq!(session.gathering_timeout, Duration::from_millis(500));
    assert_eq!(session.volume, 0.4);
    assert_eq!(session.data_channel_label, "chat");
    assert_eq!(session.ice_servers, cfg.ice.servers);

    Ok(())
}

#[test]
fn test_invalid_values_are_rejected() -> Result<()> {
    let dir = TempDir::new()?;

    for (contents, needle) in [
        ("[backend]\nbase_url = \"ftp://example.com\"\n", "base_url"),
        ("[speaking]\nfft_size = 300\n", "fft_size"),
        ("[speaking]\ninterval_ms = 0\n", "interval_ms"),
        ("[playback]\nvolume = 1.5\n", "volume"),
        ("[ice]\nservers = [\"turn:turn.example.com:3478\"]\n", "TURN"),
        (
            "[control]\nallowed_origins = [\"localhost:3000\"]\n",
            "allowed_origins",
        ),
    ] {
        let path = write_config(&dir, contents)?;
        let err = Config::load(&path).unwrap_err();
        assert!(
            err.to_string().contains(needle),
            "expected '{}' in '{}'",
            needle,
            err
        );
    }

    Ok(())
}

#[test]
fn test_environment_overrides_file() -> Result<()> {
    let dir = TempDir::new()?;
    let path = write_config(&dir, "[control]\nport = 9000\n")?;

    std::env::set_var("VOICE_AGENT_CONTROL__PORT", "9100");
    let cfg = Config::load(&path);
    std::env::remove_var("VOICE_AGENT_CONTROL__PORT");

    assert_eq!(cfg?.control.port, 9100);

    Ok(())
}

#[test]
fn test_ice_servers_accept_credentialed_tables() -> Result<()> {
    let dir = TempDir::new()?;
    let path = write_config(
        &dir,
        r#"
[ice]
servers = [
    { urls = ["stun:stun.example.com:3478"] },
    { urls = ["turn:turn.example.com:3478", "turns:turn.example.com:5349"], username = "agent", credential = "secret" },
]

[control]
allowed_origins = ["http://localhost:3000"]
"#,
    )?;

    let cfg = Config::load(&path)?;
    assert_eq!(cfg.ice.servers.len(), 2);
    assert_eq!(cfg.ice.servers[0], IceServer::url("stun:stun.example.com:3478"));

    let turn = &cfg.ice.servers[1];
    assert!(turn.is_turn());
    assert_eq!(turn.urls.len(), 2);
    assert_eq!(turn.username.as_deref(), Some("agent"));
    assert_eq!(turn.credential.as_deref(), Some("secret"));

    assert_eq!(cfg.control.allowed_origins, vec!["http://localhost:3000"]);
    assert_eq!(cfg.session_config().ice_servers, cfg.ice.servers);

    Ok(())
}
