use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::NegotiationError;
use crate::media::{LocalAudioTrack, RemoteAudio};
use crate::signaling::SessionDescription;

/// One STUN or TURN server
///
/// Deserializes from a bare URL string or from a table with `urls` and
/// optional `username`/`credential` (needed by TURN).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "IceServerEntry")]
pub struct IceServer {
    pub urls: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl IceServer {
    /// A server that needs no credentials
    pub fn url(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: None,
            credential: None,
        }
    }

    pub fn is_turn(&self) -> bool {
        self.urls
            .iter()
            .any(|url| url.starts_with("turn:") || url.starts_with("turns:"))
    }

    pub fn has_credentials(&self) -> bool {
        self.username.is_some() && self.credential.is_some()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IceServerEntry {
    Url(String),
    Server {
        urls: Vec<String>,
        #[serde(default)]
        username: Option<String>,
        #[serde(default)]
        credential: Option<String>,
    },
}

impl From<IceServerEntry> for IceServer {
    fn from(entry: IceServerEntry) -> Self {
        match entry {
            IceServerEntry::Url(url) => IceServer::url(url),
            IceServerEntry::Server {
                urls,
                username,
                credential,
            } => IceServer {
                urls,
                username,
                credential,
            },
        }
    }
}

/// Transport-level connection state as reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// Everything the platform reports about one peer connection
///
/// Events from one connection arrive in the order the platform raised them.
pub enum PeerEvent {
    StateChanged(PeerState),
    RemoteTrack(RemoteAudio),
    Message { label: String, text: String },
}

pub type PeerEventSender = mpsc::UnboundedSender<PeerEvent>;

/// Auxiliary message channel handle
#[async_trait::async_trait]
pub trait DataChannel: Send + Sync {
    fn label(&self) -> &str;

    async fn close(&self) -> Result<(), NegotiationError>;
}

/// Platform peer connection
#[async_trait::async_trait]
pub trait PeerConnection: Send + Sync {
    /// Send a local track to the remote peer
    async fn add_track(&self, track: &LocalAudioTrack) -> Result<(), NegotiationError>;

    /// Open an ordered, reliable channel; its messages arrive as `PeerEvent::Message`
    async fn create_data_channel(
        &self,
        label: &str,
    ) -> Result<Arc<dyn DataChannel>, NegotiationError>;

    async fn create_offer(&self) -> Result<SessionDescription, NegotiationError>;

    async fn set_local_description(
        &self,
        description: &SessionDescription,
    ) -> Result<(), NegotiationError>;

    /// Resolves when ICE candidate gathering for the local description finishes
    async fn wait_gathering_complete(&self);

    /// Current local description, including gathered candidates
    async fn local_description(&self) -> Option<SessionDescription>;

    async fn set_remote_description(
        &self,
        description: &SessionDescription,
    ) -> Result<(), NegotiationError>;

    async fn close(&self) -> Result<(), NegotiationError>;
}

/// Creates platform peer connections
#[async_trait::async_trait]
pub trait PeerConnectionFactory: Send + Sync {
    async fn create(
        &self,
        ice_servers: &[IceServer],
        events: PeerEventSender,
    ) -> Result<Arc<dyn PeerConnection>, NegotiationError>;
}
