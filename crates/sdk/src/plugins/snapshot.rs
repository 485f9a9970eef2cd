//! Session-snapshot capture: an initial snapshot shortly after startup,
//! mutation-triggered snapshots behind a single debounce timer, and optional
//! periodic snapshots. Non-initial snapshots are emitted only when the layout
//! hash changed since the last capture.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::warn;

use omni_core::error::OmniResult;
use omni_core::events::{MaskMetadata, SnapshotKind};
use omni_dom::layout::layout_hash;
use omni_dom::page::{ListenerId, PageEventKind, Window};
use omni_dom::serializer::{sanitize_and_serialize, SanitizeOptions};
use omni_dom::snapshot::{build_payload, SERIALIZATION_FAILED_PLACEHOLDER};

use crate::plugins::{Plugin, PluginContext};
use crate::tracker::Tracker;

struct SnapshotState {
    tracker: Arc<Tracker>,
    options: SanitizeOptions,
    max_size_bytes: usize,
    last_hash: Mutex<Option<String>>,
    debounce: Mutex<Option<JoinHandle<()>>>,
    paused: AtomicBool,
}

impl SnapshotState {
    fn capture(&self, kind: SnapshotKind) {
        if self.paused.load(Ordering::Acquire) {
            return;
        }

        let window = self.tracker.window();
        let document = window.document();
        let hash = layout_hash(&document);

        if kind != SnapshotKind::Initial {
            let last = self.last_hash.lock().expect("snapshot mutex poisoned");
            if last.as_deref() == Some(hash.as_str()) {
                return;
            }
        }

        let (xml, mask_metadata, failed) = match sanitize_and_serialize(&document, &self.options) {
            Ok(sanitized) => (sanitized.xml, sanitized.mask_metadata, false),
            Err(e) => {
                warn!(error = %e, "snapshot serialization failed, emitting placeholder");
                (
                    SERIALIZATION_FAILED_PLACEHOLDER.to_string(),
                    MaskMetadata::default(),
                    true,
                )
            }
        };

        let mut payload = build_payload(xml, self.max_size_bytes);
        if failed {
            payload.truncated = true;
        }

        *self.last_hash.lock().expect("snapshot mutex poisoned") = Some(hash.clone());
        self.tracker.track_snapshot(kind, hash, payload, mask_metadata);
    }
}

#[derive(Default)]
pub struct SnapshotPlugin {
    state: Mutex<Option<Arc<SnapshotState>>>,
    window: Mutex<Option<Arc<Window>>>,
    listener: Mutex<Option<ListenerId>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SnapshotPlugin {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Plugin for SnapshotPlugin {
    fn name(&self) -> &'static str {
        "session-snapshot"
    }

    fn version(&self) -> &'static str {
        "1.0.0"
    }

    async fn init(&self, context: &PluginContext) -> OmniResult<()> {
        let snapshot_config = context.config.snapshot().clone();
        let privacy = context.config.privacy();
        if !snapshot_config.enabled || privacy.disable_snapshots {
            return Ok(());
        }

        let tracker = context.tracker.clone();
        let window = tracker.window();
        let state = Arc::new(SnapshotState {
            tracker,
            options: SanitizeOptions::from_privacy(privacy),
            max_size_bytes: snapshot_config.max_snapshot_size_bytes,
            last_hash: Mutex::new(None),
            debounce: Mutex::new(None),
            paused: AtomicBool::new(false),
        });

        let mut tasks = Vec::new();

        if snapshot_config.capture_initial {
            let state_initial = state.clone();
            // Deferred so startup work settles first, as an idle callback
            // would in the page.
            tasks.push(tokio::spawn(async move {
                tokio::task::yield_now().await;
                state_initial.capture(SnapshotKind::Initial);
            }));
        }

        if snapshot_config.capture_mutations {
            let state_mutation = state.clone();
            let throttle = Duration::from_millis(snapshot_config.mutation_throttle_ms);
            let listener = window.add_listener(PageEventKind::DomMutation, move |_, _| {
                // One pending debounce timer at most; further mutations
                // within the window ride the scheduled capture.
                let mut debounce = state_mutation
                    .debounce
                    .lock()
                    .expect("snapshot mutex poisoned");
                if debounce.as_ref().map(|h| !h.is_finished()).unwrap_or(false) {
                    return;
                }
                let state_capture = state_mutation.clone();
                *debounce = Some(tokio::spawn(async move {
                    tokio::time::sleep(throttle).await;
                    state_capture.capture(SnapshotKind::Mutation);
                }));
            });
            *self.listener.lock().expect("plugin mutex poisoned") = Some(listener);
        }

        if snapshot_config.capture_periodic {
            let state_periodic = state.clone();
            let period = Duration::from_millis(snapshot_config.periodic_interval_ms.max(1));
            tasks.push(tokio::spawn(async move {
                let mut interval = tokio::time::interval(period);
                interval.tick().await;
                loop {
                    interval.tick().await;
                    state_periodic.capture(SnapshotKind::Periodic);
                }
            }));
        }

        *self.window.lock().expect("plugin mutex poisoned") = Some(window);
        *self.tasks.lock().expect("plugin mutex poisoned") = tasks;
        *self.state.lock().expect("plugin mutex poisoned") = Some(state);
        Ok(())
    }

    async fn destroy(&self) -> OmniResult<()> {
        if let Some(window) = self.window.lock().expect("plugin mutex poisoned").take() {
            if let Some(listener) = self.listener.lock().expect("plugin mutex poisoned").take() {
                window.remove_listener(listener);
            }
        }
        for task in self.tasks.lock().expect("plugin mutex poisoned").drain(..) {
            task.abort();
        }
        if let Some(state) = self.state.lock().expect("plugin mutex poisoned").take() {
            if let Some(debounce) = state.debounce.lock().expect("snapshot mutex poisoned").take() {
                debounce.abort();
            }
        }
        Ok(())
    }

    fn pause(&self) {
        if let Some(state) = self.state.lock().expect("plugin mutex poisoned").as_ref() {
            state.paused.store(true, Ordering::Release);
        }
    }

    fn resume(&self) {
        if let Some(state) = self.state.lock().expect("plugin mutex poisoned").as_ref() {
            state.paused.store(false, Ordering::Release);
        }
    }
}
