//! Batching queue — accumulates events, flushes on size or time thresholds,
//! and hands batches to a single dispatcher task so they go out in creation
//! order. Under persistent transmitter failure a batch is discarded at the
//! send site rather than re-enqueued; the queue stays bounded by count and
//! time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use omni_core::config::Configuration;
use omni_core::events::{AnalyticsEvent, Batch};

use crate::transmitter::Transmitter;

struct DispatchJob {
    batch: Batch,
    ack: Option<oneshot::Sender<()>>,
}

struct QueueInner {
    pending: Mutex<Vec<AnalyticsEvent>>,
    batch_size: usize,
    batch_timeout: Duration,
    dispatch_tx: mpsc::UnboundedSender<DispatchJob>,
    timer: Mutex<Option<JoinHandle<()>>>,
    destroyed: AtomicBool,
    enabled: bool,
    debug: bool,
}

#[derive(Clone)]
pub struct EventQueue {
    inner: Arc<QueueInner>,
}

impl EventQueue {
    /// Transmitters are sorted by descending priority once, at construction.
    pub fn new(mut transmitters: Vec<Arc<dyn Transmitter>>, config: &Configuration) -> Self {
        transmitters.sort_by(|a, b| b.priority().cmp(&a.priority()));

        let (dispatch_tx, dispatch_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_dispatcher(dispatch_rx, transmitters));

        Self {
            inner: Arc::new(QueueInner {
                pending: Mutex::new(Vec::new()),
                batch_size: config.batch_size().max(1),
                batch_timeout: Duration::from_millis(config.batch_timeout_ms()),
                dispatch_tx,
                timer: Mutex::new(None),
                destroyed: AtomicBool::new(false),
                enabled: !config.disabled(),
                debug: config.debug(),
            }),
        }
    }

    /// Append an event. Disabled or destroyed queues discard without error.
    /// Reaching the batch-size threshold flushes synchronously; otherwise a
    /// flush timer is armed if none is pending.
    pub fn add(&self, event: AnalyticsEvent) {
        if self.inner.destroyed.load(Ordering::Acquire) || !self.inner.enabled {
            metrics::counter!("events.dropped").increment(1);
            if self.inner.debug {
                debug!(
                    event_type = event.kind.type_name(),
                    "event discarded (queue disabled)"
                );
            }
            return;
        }

        if self.inner.debug {
            debug!(
                event_id = %event.event_id,
                event_type = event.kind.type_name(),
                "event queued"
            );
        }
        metrics::counter!("events.queued").increment(1);

        let should_flush = {
            let mut pending = self.inner.pending.lock().expect("queue mutex poisoned");
            pending.push(event);
            pending.len() >= self.inner.batch_size
        };

        if should_flush {
            self.inner.flush_now(None);
        } else {
            self.ensure_timer();
        }
    }

    /// Flush pending events. No-op when empty. Resolves after the dispatch
    /// attempt completes, success or not; never fails.
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.inner.flush_now(Some(ack_tx)) {
            let _ = ack_rx.await;
        }
    }

    /// Drop pending events without dispatching them.
    pub fn clear(&self) {
        self.inner.pending.lock().expect("queue mutex poisoned").clear();
        self.inner.cancel_timer();
    }

    pub fn queue_size(&self) -> usize {
        self.inner.pending.lock().expect("queue mutex poisoned").len()
    }

    /// Cancel timers and attempt a final best-effort flush. Idempotent;
    /// events added afterwards are discarded.
    pub async fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.cancel_timer();
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.inner.flush_now(Some(ack_tx)) {
            let _ = ack_rx.await;
        }
    }

    fn ensure_timer(&self) {
        let mut timer = self.inner.timer.lock().expect("timer mutex poisoned");
        if timer.as_ref().map(|h| !h.is_finished()).unwrap_or(false) {
            return;
        }
        let weak = Arc::downgrade(&self.inner);
        let timeout = self.inner.batch_timeout;
        *timer = Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(inner) = weak.upgrade() {
                inner.flush_now(None);
            }
        }));
    }
}

impl QueueInner {
    /// Snapshot and clear pending events into a fresh batch and enqueue it
    /// for dispatch. Returns whether a batch was enqueued.
    fn flush_now(&self, ack: Option<oneshot::Sender<()>>) -> bool {
        let events = {
            let mut pending = self.pending.lock().expect("queue mutex poisoned");
            if pending.is_empty() {
                return false;
            }
            std::mem::take(&mut *pending)
        };
        self.cancel_timer();

        let batch = Batch::new(events);
        if self.debug {
            debug!(batch_id = %batch.batch_id, count = batch.len(), "flushing batch");
        }
        if self.dispatch_tx.send(DispatchJob { batch, ack }).is_err() {
            warn!("dispatcher gone, batch dropped");
            return false;
        }
        true
    }

    fn cancel_timer(&self) {
        if let Some(handle) = self.timer.lock().expect("timer mutex poisoned").take() {
            handle.abort();
        }
    }
}

/// Single consumer of the dispatch channel: batches go out strictly in
/// creation order, each through the first available transmitter that accepts
/// it.
async fn run_dispatcher(
    mut rx: mpsc::UnboundedReceiver<DispatchJob>,
    transmitters: Vec<Arc<dyn Transmitter>>,
) {
    while let Some(job) = rx.recv().await {
        let batch_id = job.batch.batch_id;
        let count = job.batch.len();
        let mut delivered = false;

        for transmitter in &transmitters {
            if !transmitter.is_available() {
                continue;
            }
            match transmitter.send(&job.batch).await {
                Ok(()) => {
                    metrics::counter!("batches.sent").increment(1);
                    debug!(
                        batch_id = %batch_id,
                        count,
                        transmitter = transmitter.name(),
                        "batch delivered"
                    );
                    delivered = true;
                    break;
                }
                Err(e) => {
                    warn!(
                        batch_id = %batch_id,
                        transmitter = transmitter.name(),
                        error = %e,
                        "transmitter failed, trying next"
                    );
                }
            }
        }

        if !delivered {
            metrics::counter!("batches.discarded").increment(1);
            error!(
                batch_id = %batch_id,
                count,
                "all transmitters failed, discarding batch"
            );
        }

        if let Some(ack) = job.ack {
            let _ = ack.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    use omni_core::config::SdkConfig;
    use omni_core::events::EventKind;

    use crate::transmitter::CaptureTransmitter;

    fn make_config(batch_size: usize, batch_timeout: u64) -> Configuration {
        let mut config = SdkConfig::new("p1", "https://ingest.example.com/collect");
        config.batch_size = batch_size;
        config.batch_timeout = batch_timeout;
        Configuration::new(config).unwrap()
    }

    fn make_event(name: &str) -> AnalyticsEvent {
        AnalyticsEvent {
            event_id: Uuid::new_v4(),
            project_id: "p1".into(),
            client_id: "anon-1".into(),
            session_id: "session-1700000000000-abc123xyz".into(),
            user_id: None,
            kind: EventKind::Custom { name: name.into() },
            timestamp: 1_700_000_000_000,
            url: "https://example.com/".into(),
            referrer: String::new(),
            page_width: 1440,
            page_height: 4200,
            viewport_width: 1440,
            viewport_height: 900,
            properties: None,
        }
    }

    fn event_names(batches: &[Batch]) -> Vec<String> {
        batches
            .iter()
            .flat_map(|b| b.events.iter())
            .map(|e| match &e.kind {
                EventKind::Custom { name } => name.clone(),
                other => other.type_name().to_string(),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_size_threshold_flushes_in_order() {
        let capture = CaptureTransmitter::new("capture", 10);
        let queue = EventQueue::new(vec![capture.clone()], &make_config(3, 60_000));

        queue.add(make_event("a"));
        queue.add(make_event("b"));
        assert_eq!(queue.queue_size(), 2);
        assert_eq!(capture.batch_count(), 0);

        queue.add(make_event("c"));
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(queue.queue_size(), 0);
        let batches = capture.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(event_names(&batches), vec!["a", "b", "c"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_flushes_after_batch_timeout() {
        let capture = CaptureTransmitter::new("capture", 10);
        let queue = EventQueue::new(vec![capture.clone()], &make_config(50, 10_000));

        queue.add(make_event("a"));
        assert_eq!(capture.batch_count(), 0);

        tokio::time::sleep(Duration::from_millis(10_050)).await;

        assert_eq!(capture.batch_count(), 1);
        assert_eq!(queue.queue_size(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_timeout_flushes_on_next_tick() {
        let capture = CaptureTransmitter::new("capture", 10);
        let queue = EventQueue::new(vec![capture.clone()], &make_config(50, 0));

        queue.add(make_event("a"));
        tokio::time::sleep(Duration::from_millis(5)).await;

        assert_eq!(capture.batch_count(), 1);
    }

    #[tokio::test]
    async fn test_batch_size_one_flushes_every_add() {
        let capture = CaptureTransmitter::new("capture", 10);
        let queue = EventQueue::new(vec![capture.clone()], &make_config(1, 60_000));

        queue.add(make_event("a"));
        queue.add(make_event("b"));
        queue.flush().await;

        assert_eq!(capture.batch_count(), 2);
        assert_eq!(event_names(&capture.batches()), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_flush_empty_queue_is_noop() {
        let capture = CaptureTransmitter::new("capture", 10);
        let queue = EventQueue::new(vec![capture.clone()], &make_config(50, 60_000));

        queue.flush().await;
        assert_eq!(capture.batch_count(), 0);
    }

    #[tokio::test]
    async fn test_events_concatenate_in_dispatch_order() {
        let capture = CaptureTransmitter::new("capture", 10);
        let queue = EventQueue::new(vec![capture.clone()], &make_config(2, 60_000));

        for name in ["e1", "e2", "e3", "e4", "e5"] {
            queue.add(make_event(name));
        }
        queue.flush().await;

        let batches = capture.batches();
        assert_eq!(batches.len(), 3);
        assert_eq!(event_names(&batches), vec!["e1", "e2", "e3", "e4", "e5"]);
    }

    #[tokio::test]
    async fn test_fallback_on_primary_failure_without_duplication() {
        let primary = CaptureTransmitter::new("primary", 10);
        let fallback = CaptureTransmitter::new("fallback", 5);
        primary.fail_next(1);

        let queue = EventQueue::new(
            vec![fallback.clone(), primary.clone()],
            &make_config(50, 60_000),
        );
        queue.add(make_event("a"));
        queue.flush().await;

        assert_eq!(primary.batch_count(), 0);
        assert_eq!(fallback.batch_count(), 1);
        assert_eq!(fallback.event_count(), 1);
    }

    #[tokio::test]
    async fn test_unavailable_transmitter_skipped() {
        let primary = CaptureTransmitter::new("primary", 10);
        let fallback = CaptureTransmitter::new("fallback", 5);
        primary.set_available(false);

        let queue = EventQueue::new(
            vec![primary.clone(), fallback.clone()],
            &make_config(50, 60_000),
        );
        queue.add(make_event("a"));
        queue.flush().await;

        assert_eq!(primary.batch_count(), 0);
        assert_eq!(fallback.batch_count(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_transmitters_discard_batch() {
        let primary = CaptureTransmitter::new("primary", 10);
        let fallback = CaptureTransmitter::new("fallback", 5);
        primary.fail_next(10);
        fallback.fail_next(10);

        let queue = EventQueue::new(
            vec![primary.clone(), fallback.clone()],
            &make_config(50, 60_000),
        );
        queue.add(make_event("lost"));
        queue.flush().await;

        assert_eq!(primary.batch_count(), 0);
        assert_eq!(fallback.batch_count(), 0);
        // The batch is gone, not re-enqueued.
        assert_eq!(queue.queue_size(), 0);

        // The queue keeps working afterwards.
        queue.add(make_event("later"));
        queue.flush().await;
        assert_eq!(fallback.batch_count(), 1);
    }

    #[tokio::test]
    async fn test_disabled_queue_discards_without_error() {
        let capture = CaptureTransmitter::new("capture", 10);
        let mut config = SdkConfig::new("p1", "https://e/");
        config.disabled = true;
        let queue = EventQueue::new(
            vec![capture.clone()],
            &Configuration::new(config).unwrap(),
        );

        queue.add(make_event("a"));
        queue.flush().await;
        assert_eq!(queue.queue_size(), 0);
        assert_eq!(capture.batch_count(), 0);
    }

    #[tokio::test]
    async fn test_destroy_final_flush_and_idempotence() {
        let capture = CaptureTransmitter::new("capture", 10);
        let queue = EventQueue::new(vec![capture.clone()], &make_config(50, 60_000));

        queue.add(make_event("a"));
        queue.destroy().await;
        assert_eq!(capture.batch_count(), 1);

        // Second destroy has no observable effect.
        queue.destroy().await;
        assert_eq!(capture.batch_count(), 1);

        // Adds after destroy are discarded.
        queue.add(make_event("late"));
        queue.flush().await;
        assert_eq!(capture.event_count(), 1);
    }

    #[tokio::test]
    async fn test_clear_drops_pending() {
        let capture = CaptureTransmitter::new("capture", 10);
        let queue = EventQueue::new(vec![capture.clone()], &make_config(50, 60_000));

        queue.add(make_event("a"));
        queue.clear();
        assert_eq!(queue.queue_size(), 0);
        queue.flush().await;
        assert_eq!(capture.batch_count(), 0);
    }
}
