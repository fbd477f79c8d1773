use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::BufReader;
use tracing::{error, info, warn};
use voice_agent_client::media::{CpalMicrophone, CpalSpeaker};
use voice_agent_client::peer::RtcPeerFactory;
use voice_agent_client::{
    create_router, prompt, AppState, Config, Platform, SessionController, SessionEvent, Speaker,
};

#[derive(Parser)]
#[command(
    name = "voice-agent",
    about = "Talk to a voice agent backend over WebRTC from the terminal",
    version
)]
struct Cli {
    /// Config file path (extension optional)
    #[arg(short, long, default_value = "config/voice-agent")]
    config: String,

    /// Override backend.base_url
    #[arg(long)]
    backend_url: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Do not start the local control API
    #[arg(long)]
    no_control_api: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    let mut cfg = Config::load(&cli.config)?;
    if let Some(url) = cli.backend_url {
        cfg.backend.base_url = url;
        cfg.validate()?;
    }

    info!("Voice agent client v{}", env!("CARGO_PKG_VERSION"));
    info!("Backend: {}", cfg.backend.base_url);

    let platform = Platform {
        microphone: Arc::new(CpalMicrophone),
        peers: Arc::new(RtcPeerFactory::new()),
        output: Arc::new(CpalSpeaker::open().context("Failed to open audio output")?),
    };

    let (controller, mut events) = SessionController::new(cfg.session_config(), platform);
    let state = AppState::new(controller.clone());

    let render_state = state.clone();
    let renderer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            render_state.record(&event).await;
            render(&event);
        }
    });

    let server = if cfg.control.enabled && !cli.no_control_api {
        let addr = cfg.control_addr();
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind control API on {}", addr))?;
        info!("Control API listening on http://{}", addr);

        let app = create_router(state.clone(), &cfg.control.allowed_origins);
        Some(tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!("Control API stopped: {}", e);
            }
        }))
    } else {
        None
    };

    println!("{}", prompt::HELP);

    let stdin = BufReader::new(tokio::io::stdin());
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
        _ = prompt::run(&controller, stdin) => {}
    }

    // Idempotent; covers the Ctrl-C path
    controller.shutdown().await;

    // The renderer ends once every event sender is gone
    if let Some(server) = server {
        server.abort();
        let _ = server.await;
    }
    drop(controller);
    drop(state);
    if tokio::time::timeout(Duration::from_secs(2), renderer)
        .await
        .is_err()
    {
        warn!("Renderer did not drain in time");
    }

    Ok(())
}

fn render(event: &SessionEvent) {
    match event {
        SessionEvent::Connection(state) => println!("[{}]", state),
        SessionEvent::Speaking(state) => println!("(agent {:?})", state),
        SessionEvent::Transcript(entry) => {
            let who = match entry.speaker {
                Speaker::User => "you",
                Speaker::Bot => "agent",
                Speaker::Info => "--",
            };
            println!(
                "{} {:>5}: {}",
                entry.timestamp.format("%H:%M:%S"),
                who,
                entry.text
            );
        }
        SessionEvent::TranscriptCleared => println!("(transcript cleared)"),
        SessionEvent::Muted(muted) => println!("(microphone {})", if *muted { "muted" } else { "live" }),
        SessionEvent::Volume(volume) => println!("(volume {:.2})", volume),
    }
}
