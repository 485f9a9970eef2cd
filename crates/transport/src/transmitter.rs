//! The transmitter capability: a strategy that delivers one batch to the
//! ingestion endpoint. The queue walks transmitters in priority order and
//! stops at the first success.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use thiserror::Error;

use omni_core::events::Batch;

#[derive(Debug, Error)]
pub enum TransmitError {
    /// The underlying host facility does not exist. Implementations should
    /// report this through `is_available` rather than failing sends.
    #[error("transmitter unavailable")]
    Unavailable,

    /// Retryable: network failure or a status the endpoint may recover from.
    #[error("transient transmission failure: {0}")]
    Transient(String),

    /// Non-retryable status or a payload the facility rejects outright.
    #[error("permanent transmission failure: {0}")]
    Permanent(String),
}

impl TransmitError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransmitError::Transient(_))
    }
}

#[async_trait]
pub trait Transmitter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether the underlying host facility exists.
    fn is_available(&self) -> bool {
        true
    }

    /// Larger is preferred.
    fn priority(&self) -> u8 {
        0
    }

    async fn send(&self, batch: &Batch) -> Result<(), TransmitError>;
}

/// In-memory transmitter that records batches, for tests. Failures and
/// availability are scriptable.
pub struct CaptureTransmitter {
    name: &'static str,
    priority: u8,
    available: AtomicBool,
    fail_remaining: AtomicUsize,
    batches: Mutex<Vec<Batch>>,
}

impl CaptureTransmitter {
    pub fn new(name: &'static str, priority: u8) -> Arc<Self> {
        Arc::new(Self {
            name,
            priority,
            available: AtomicBool::new(true),
            fail_remaining: AtomicUsize::new(0),
            batches: Mutex::new(Vec::new()),
        })
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Make the next `n` sends fail with a transient error.
    pub fn fail_next(&self, n: usize) {
        self.fail_remaining.store(n, Ordering::SeqCst);
    }

    pub fn batches(&self) -> Vec<Batch> {
        self.batches.lock().expect("capture mutex poisoned").clone()
    }

    pub fn batch_count(&self) -> usize {
        self.batches.lock().expect("capture mutex poisoned").len()
    }

    pub fn event_count(&self) -> usize {
        self.batches
            .lock()
            .expect("capture mutex poisoned")
            .iter()
            .map(Batch::len)
            .sum()
    }
}

#[async_trait]
impl Transmitter for CaptureTransmitter {
    fn name(&self) -> &'static str {
        self.name
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn priority(&self) -> u8 {
        self.priority
    }

    async fn send(&self, batch: &Batch) -> Result<(), TransmitError> {
        let remaining = self.fail_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(TransmitError::Transient("scripted failure".into()));
        }
        self.batches
            .lock()
            .expect("capture mutex poisoned")
            .push(batch.clone());
        Ok(())
    }
}
