pub mod client;
pub mod messages;

pub use client::{SignalingClient, OFFER_PATH};
pub use messages::{SdpType, SessionDescription};
