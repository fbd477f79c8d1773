pub mod backend;
pub mod capture;
pub mod remote;

#[cfg(feature = "audio-device")]
pub mod device;

pub use backend::{AudioBackend, AudioBackendFactory, AudioFrame, CaptureConstraints};
pub use capture::{LocalAudioTrack, LocalStream, MediaCapture, TrackReader};
pub use remote::RemoteAudio;

#[cfg(feature = "audio-device")]
pub use device::{CpalMicrophone, CpalSpeaker};
