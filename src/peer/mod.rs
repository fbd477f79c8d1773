//! Peer-to-peer media transport
//!
//! `PeerSession` drives the offer/answer handshake over a platform
//! `PeerConnection`. The webrtc-rs backend lives behind the `webrtc` feature.

pub mod connection;
pub mod session;

#[cfg(feature = "webrtc")]
mod g711;
#[cfg(feature = "webrtc")]
pub mod rtc;

pub use connection::{
    DataChannel, IceServer, PeerConnection, PeerConnectionFactory, PeerEvent, PeerEventSender,
    PeerState,
};
pub use session::PeerSession;

#[cfg(feature = "webrtc")]
pub use rtc::RtcPeerFactory;
