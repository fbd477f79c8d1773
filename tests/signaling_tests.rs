// Integration tests for the offer/answer exchange over HTTP

mod common;

use anyhow::Result;
use common::{spawn_backend, BackendReply};
use voice_agent_client::signaling::{SdpType, SessionDescription, SignalingClient};
use voice_agent_client::SignalingError;

#[tokio::test]
async fn test_exchange_offer_returns_answer() -> Result<()> {
    let backend = spawn_backend(BackendReply::Answer).await;
    let client = SignalingClient::new(&format!("{}/", backend.url));

    let answer = client
        .exchange_offer(&SessionDescription::offer("OFFER_SDP"))
        .await?;

    assert_eq!(answer.kind, SdpType::Answer);
    assert_eq!(answer.sdp, "ANSWER_SDP");
    assert_eq!(answer.pc_id.as_deref(), Some("pc-1"));

    let offers = backend.offers.lock().unwrap().clone();
    assert_eq!(offers.len(), 1);
    assert_eq!(offers[0]["sdp"], "OFFER_SDP");
    assert_eq!(offers[0]["type"], "offer");

    Ok(())
}

#[tokio::test]
async fn test_non_success_status_is_reported() {
    let backend = spawn_backend(BackendReply::Status(503)).await;
    let client = SignalingClient::new(&backend.url);

    let err = client
        .exchange_offer(&SessionDescription::offer("OFFER_SDP"))
        .await
        .unwrap_err();

    match err {
        SignalingError::Status { status, body } => {
            assert_eq!(status, 503);
            assert_eq!(body, "backend exploded");
        }
        other => panic!("expected status error, got {}", other),
    }
}

#[tokio::test]
async fn test_malformed_answer_is_parse_error() {
    let backend = spawn_backend(BackendReply::Malformed).await;
    let client = SignalingClient::new(&backend.url);

    let err = client
        .exchange_offer(&SessionDescription::offer("OFFER_SDP"))
        .await
        .unwrap_err();

    assert!(matches!(err, SignalingError::Parse(_)), "got {}", err);
}

#[tokio::test]
async fn test_unreachable_backend_is_transport_error() -> Result<()> {
    // Bind then drop to get a port nobody listens on
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);

    let client = SignalingClient::new(&format!("http://{}", addr));
    let err = client
        .exchange_offer(&SessionDescription::offer("OFFER_SDP"))
        .await
        .unwrap_err();

    assert!(matches!(err, SignalingError::Transport(_)), "got {}", err);

    Ok(())
}
