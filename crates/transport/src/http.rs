//! Primary transmitter: JSON POST over a request/response client with a
//! per-request timeout and an exponential-backoff retry budget.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::{debug, warn};
use url::Url;

use omni_core::config::{RetryPolicy, TransportConfig};
use omni_core::error::{OmniError, OmniResult};
use omni_core::events::Batch;

use crate::transmitter::{TransmitError, Transmitter};

pub struct HttpTransmitter {
    client: reqwest::Client,
    endpoint: Url,
    retry: RetryPolicy,
}

impl HttpTransmitter {
    pub fn new(endpoint: &str, transport: &TransportConfig) -> OmniResult<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| OmniError::Config(format!("invalid endpoint url: {e}")))?;
        // The client timeout aborts the in-flight request when it elapses.
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(transport.request_timeout_ms))
            .build()
            .map_err(|e| OmniError::Transmission(e.to_string()))?;
        Ok(Self {
            client,
            endpoint,
            retry: transport.retry.clone(),
        })
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let delay = self.retry.initial_delay_ms as f64
            * self.retry.backoff_multiplier.powi(attempt as i32);
        Duration::from_millis(delay.min(self.retry.max_delay_ms as f64) as u64)
    }

    async fn attempt(&self, batch: &Batch) -> Result<(), TransmitError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(batch)
            .send()
            .await
            .map_err(|e| TransmitError::Transient(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else if is_retryable_status(status) {
            Err(TransmitError::Transient(format!("endpoint returned {status}")))
        } else {
            Err(TransmitError::Permanent(format!("endpoint returned {status}")))
        }
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
}

#[async_trait]
impl Transmitter for HttpTransmitter {
    fn name(&self) -> &'static str {
        "http"
    }

    fn priority(&self) -> u8 {
        10
    }

    async fn send(&self, batch: &Batch) -> Result<(), TransmitError> {
        let mut attempt = 0;
        loop {
            match self.attempt(batch).await {
                Ok(()) => {
                    debug!(batch_id = %batch.batch_id, attempt, "batch accepted");
                    return Ok(());
                }
                Err(e) if e.is_retryable() && attempt < self.retry.max_retries => {
                    let delay = self.backoff_delay(attempt);
                    warn!(
                        batch_id = %batch.batch_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient transmission failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
