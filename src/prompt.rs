//! Line-oriented command prompt
//!
//! Commands: `c` (connect/disconnect), `d`, `m` (mute), `v <0-1>` (volume),
//! `clear`, `status`, `q`.

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{error, info, warn};

use crate::session::{ConnectionState, SessionController};

pub const HELP: &str =
    "Commands: c (connect/disconnect), m (mute), v <0-1> (volume), clear, status, q";

/// Run commands from `input` until quit, end of input or a read error, then
/// shut the controller down
pub async fn run<R>(controller: &SessionController, input: R)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if !run_command(controller, line.trim()).await {
                    info!("Quit requested");
                    break;
                }
            }
            Ok(None) => {
                info!("End of input");
                break;
            }
            Err(e) => {
                error!("Failed to read command: {}", e);
                break;
            }
        }
    }

    controller.shutdown().await;
}

/// Returns false when the user asked to quit
pub async fn run_command(controller: &SessionController, line: &str) -> bool {
    let mut parts = line.split_whitespace();

    match parts.next() {
        Some("c") | Some("connect") => {
            let status = controller.status().await;
            match status.state {
                ConnectionState::Connecting | ConnectionState::Connected => {
                    controller.disconnect().await
                }
                _ => {
                    // Keep the prompt live so a pending connect can be cancelled
                    let controller = controller.clone();
                    tokio::spawn(async move {
                        if let Err(e) = controller.connect().await {
                            warn!("Connect failed: {}", e);
                        }
                    });
                }
            }
        }
        Some("d") | Some("disconnect") => controller.disconnect().await,
        Some("m") | Some("mute") => {
            if controller.toggle_mute().await.is_none() {
                println!("Not connected");
            }
        }
        Some("v") | Some("volume") => match parts.next().map(str::parse::<f32>) {
            Some(Ok(volume)) => {
                controller.set_volume(volume);
            }
            _ => println!("Usage: v <0.0-1.0>"),
        },
        Some("clear") => controller.clear_transcript(),
        Some("status") => {
            let status = controller.status().await;
            println!(
                "state={} muted={} volume={:.2} dropped_messages={}",
                status.state, status.muted, status.volume, status.dropped_messages
            );
        }
        Some("q") | Some("quit") => return false,
        Some(other) => println!("Unknown command: {}", other),
        None => {}
    }

    true
}
