use tracing::{debug, info};

use super::messages::SessionDescription;
use crate::error::SignalingError;

/// Path of the offer endpoint on the backend
pub const OFFER_PATH: &str = "/api/offer";

/// One-shot offer/answer exchange over HTTP
#[derive(Debug, Clone)]
pub struct SignalingClient {
    http: reqwest::Client,
    endpoint: String,
}

impl SignalingClient {
    pub fn new(base_url: &str) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            http,
            endpoint: format!("{}{}", base_url.trim_end_matches('/'), OFFER_PATH),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// POST the local offer and return the backend's answer
    ///
    /// No retry: a slow or unreachable backend is a single failure.
    pub async fn exchange_offer(
        &self,
        offer: &SessionDescription,
    ) -> Result<SessionDescription, SignalingError> {
        info!("Sending offer to {} ({} bytes of SDP)", self.endpoint, offer.sdp.len());

        let response = self.http.post(&self.endpoint).json(offer).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(SignalingError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let answer: SessionDescription = serde_json::from_str(&body)?;

        info!(
            "Received {:?} from backend (pc_id={})",
            answer.kind,
            answer.pc_id.as_deref().unwrap_or("-")
        );
        debug!("Answer SDP:\n{}", answer.sdp);

        Ok(answer)
    }
}
