//! Fallback transmitter: the fire-and-forget facility a page may use during
//! unload. Single attempt, bounded payload, response status ignored.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use url::Url;

use omni_core::error::{OmniError, OmniResult};
use omni_core::events::Batch;

use crate::transmitter::{TransmitError, Transmitter};

/// Payload ceiling the beacon facility enforces.
pub const BEACON_QUOTA_BYTES: usize = 64 * 1024;

/// Unload-safe sends cannot wait on slow responses.
const BEACON_TIMEOUT: Duration = Duration::from_secs(5);

pub struct BeaconTransmitter {
    client: reqwest::Client,
    endpoint: Url,
    quota_bytes: usize,
}

impl BeaconTransmitter {
    pub fn new(endpoint: &str) -> OmniResult<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| OmniError::Config(format!("invalid endpoint url: {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(BEACON_TIMEOUT)
            .build()
            .map_err(|e| OmniError::Transmission(e.to_string()))?;
        Ok(Self {
            client,
            endpoint,
            quota_bytes: BEACON_QUOTA_BYTES,
        })
    }
}

#[async_trait]
impl Transmitter for BeaconTransmitter {
    fn name(&self) -> &'static str {
        "beacon"
    }

    fn priority(&self) -> u8 {
        5
    }

    async fn send(&self, batch: &Batch) -> Result<(), TransmitError> {
        let payload =
            serde_json::to_vec(batch).map_err(|e| TransmitError::Permanent(e.to_string()))?;
        if payload.len() > self.quota_bytes {
            return Err(TransmitError::Permanent(format!(
                "payload of {} bytes exceeds beacon quota",
                payload.len()
            )));
        }

        // Fire-and-forget: success means the payload was handed to the wire.
        // The facility never reports the response status back.
        let response = self
            .client
            .post(self.endpoint.clone())
            .header("content-type", "application/json")
            .body(payload)
            .send()
            .await
            .map_err(|e| TransmitError::Transient(e.to_string()))?;

        debug!(batch_id = %batch.batch_id, status = %response.status(), "beacon dispatched");
        Ok(())
    }
}
