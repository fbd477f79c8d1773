use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::connection::{
    DataChannel, IceServer, PeerConnection, PeerConnectionFactory, PeerEventSender,
};
use crate::error::NegotiationError;
use crate::media::LocalStream;
use crate::signaling::{SdpType, SessionDescription};

/// Negotiation handshake with exactly one remote endpoint
pub struct PeerSession {
    connection: Arc<dyn PeerConnection>,
    channel: Mutex<Option<Arc<dyn DataChannel>>>,
    gathering_timeout: Duration,
    closed: AtomicBool,
}

impl PeerSession {
    pub async fn create(
        factory: &dyn PeerConnectionFactory,
        ice_servers: &[IceServer],
        events: PeerEventSender,
        gathering_timeout: Duration,
    ) -> Result<Self, NegotiationError> {
        info!("Creating peer connection ({} ICE servers)", ice_servers.len());

        let connection = factory.create(ice_servers, events).await?;

        Ok(Self {
            connection,
            channel: Mutex::new(None),
            gathering_timeout,
            closed: AtomicBool::new(false),
        })
    }

    /// Add every track of the stream for outbound transmission
    pub async fn attach_local_tracks(&self, stream: &LocalStream) -> Result<(), NegotiationError> {
        self.ensure_open()?;

        for track in stream.audio_tracks() {
            self.connection.add_track(track).await?;
            debug!("Attached local track {}", track.id());
        }

        Ok(())
    }

    /// Open the ordered, reliable chat channel
    pub async fn create_data_channel(&self, label: &str) -> Result<(), NegotiationError> {
        self.ensure_open()?;

        let channel = self.connection.create_data_channel(label).await?;
        info!("Data channel '{}' created", channel.label());

        let previous = self.channel.lock().await.replace(channel);
        if let Some(previous) = previous {
            warn!("Replacing data channel '{}'", previous.label());
            let _ = previous.close().await;
        }

        Ok(())
    }

    /// Create and apply the local offer, then return it once ICE gathering
    /// completes or the gathering timeout passes
    pub async fn negotiate(&self) -> Result<SessionDescription, NegotiationError> {
        self.ensure_open()?;

        let offer = self.connection.create_offer().await?;
        self.ensure_open()?;
        self.connection.set_local_description(&offer).await?;

        if tokio::time::timeout(self.gathering_timeout, self.connection.wait_gathering_complete())
            .await
            .is_err()
        {
            warn!(
                "ICE gathering did not complete within {:?}, sending partial candidates",
                self.gathering_timeout
            );
        }

        self.ensure_open()?;

        let local = self
            .connection
            .local_description()
            .await
            .ok_or_else(|| NegotiationError::new("no local description after offer"))?;

        info!("Local offer ready ({} bytes of SDP)", local.sdp.len());

        Ok(local)
    }

    /// Apply the backend's answer
    pub async fn apply_remote_answer(
        &self,
        answer: &SessionDescription,
    ) -> Result<(), NegotiationError> {
        self.ensure_open()?;

        if answer.kind != SdpType::Answer {
            return Err(NegotiationError::new(format!(
                "expected an answer, got {:?}",
                answer.kind
            )));
        }

        if answer.sdp.trim().is_empty() {
            return Err(NegotiationError::new("answer has an empty SDP"));
        }

        self.connection.set_remote_description(answer).await?;
        info!("Remote answer applied");

        Ok(())
    }

    /// Close the channel and the connection; safe to call more than once
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(channel) = self.channel.lock().await.take() {
            if let Err(e) = channel.close().await {
                warn!("Failed to close data channel '{}': {}", channel.label(), e);
            }
        }

        if let Err(e) = self.connection.close().await {
            warn!("Failed to close peer connection: {}", e);
        }

        info!("Peer connection closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub async fn has_data_channel(&self) -> bool {
        self.channel.lock().await.is_some()
    }

    fn ensure_open(&self) -> Result<(), NegotiationError> {
        if self.is_closed() {
            Err(NegotiationError::new("peer session already closed"))
        } else {
            Ok(())
        }
    }
}
