//! Local HTTP control API
//!
//! Lets a UI page or a script drive the session:
//! - GET /health - Health check
//! - GET /session - Controller status
//! - POST /session/connect - Start a session
//! - POST /session/disconnect - End the session
//! - POST /session/mute - Toggle the microphone
//! - PUT /session/volume - Set playback volume
//! - GET /transcript - Transcript so far
//! - DELETE /transcript - Clear the transcript

mod handlers;
mod routes;
mod state;

pub use handlers::{ErrorResponse, MuteResponse, VolumeRequest, VolumeResponse};
pub use routes::create_router;
pub use state::AppState;
