use std::sync::Arc;

use tokio::sync::RwLock;

use crate::session::{SessionController, SessionEvent};
use crate::transcript::Transcript;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub controller: SessionController,

    /// Transcript as rendered so far
    pub transcript: Arc<RwLock<Transcript>>,
}

impl AppState {
    pub fn new(controller: SessionController) -> Self {
        Self {
            controller,
            transcript: Arc::new(RwLock::new(Transcript::new())),
        }
    }

    /// Fold a controller event into the shared transcript
    pub async fn record(&self, event: &SessionEvent) {
        if matches!(
            event,
            SessionEvent::Transcript(_) | SessionEvent::TranscriptCleared
        ) {
            self.transcript.write().await.apply(event);
        }
    }
}
