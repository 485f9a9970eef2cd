//! Omnilytics transport — strategies that push event batches to the
//! ingestion endpoint, and the batching queue that feeds them.
//!
//! # Modules
//!
//! - [`transmitter`] — The [`Transmitter`] capability, error taxonomy, and an
//!   in-memory capture implementation for tests
//! - [`http`] — Primary request/response transmitter with timeout and
//!   exponential-backoff retry
//! - [`beacon`] — Unload-safe fire-and-forget fallback transmitter
//! - [`queue`] — Bounded in-memory batching with size- and time-triggered
//!   flushing and priority-ordered transmitter selection

pub mod beacon;
pub mod http;
pub mod queue;
pub mod transmitter;

pub use beacon::BeaconTransmitter;
pub use http::HttpTransmitter;
pub use queue::EventQueue;
pub use transmitter::{CaptureTransmitter, TransmitError, Transmitter};
