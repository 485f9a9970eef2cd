//! The tracker — enriches captured events with identity and page context and
//! feeds them to the batching queue. All `track_*` calls are synchronous and
//! never fail; delivery is fire-and-forget from the caller's viewpoint.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

use omni_core::config::Configuration;
use omni_core::events::{AnalyticsEvent, EventKind, MaskMetadata, SnapshotKind};
use omni_core::identity::SessionManager;
use omni_dom::layout::{screen_class, text_hash};
use omni_dom::selector::{css_path, xpath};
use omni_dom::snapshot::{SnapshotPayload, SNAPSHOT_SCHEMA_VERSION};
use omni_dom::Window;
use omni_transport::EventQueue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    Running,
    Paused,
    Destroyed,
}

const STATE_RUNNING: u8 = 0;
const STATE_PAUSED: u8 = 1;
const STATE_DESTROYED: u8 = 2;

/// Optional overrides for a page-view event. Omitted fields fall back to the
/// current document title and pathname; `is_initial_load` defaults to false.
#[derive(Debug, Clone, Default)]
pub struct PageViewProps {
    pub title: Option<String>,
    pub route: Option<String>,
    pub is_initial_load: bool,
}

/// Per-session aggregate counters.
#[derive(Debug, Clone, Default)]
pub struct SessionCounters {
    pub page_views: u64,
    pub clicks: u64,
    pub custom_events: u64,
    pub snapshots: u64,
    pub total_events: u64,
}

pub struct Tracker {
    config: Arc<Configuration>,
    identity: Arc<SessionManager>,
    window: Arc<Window>,
    queue: EventQueue,
    state: AtomicU8,
    /// Monotonic clamp: capture timestamps never move backwards.
    last_timestamp: Mutex<i64>,
    session_counters: DashMap<String, SessionCounters>,
}

impl Tracker {
    pub fn new(
        config: Arc<Configuration>,
        identity: Arc<SessionManager>,
        window: Arc<Window>,
        queue: EventQueue,
    ) -> Self {
        Self {
            config,
            identity,
            window,
            queue,
            state: AtomicU8::new(STATE_RUNNING),
            last_timestamp: Mutex::new(0),
            session_counters: DashMap::new(),
        }
    }

    pub fn window(&self) -> Arc<Window> {
        self.window.clone()
    }

    pub fn state(&self) -> TrackerState {
        match self.state.load(Ordering::Acquire) {
            STATE_PAUSED => TrackerState::Paused,
            STATE_DESTROYED => TrackerState::Destroyed,
            _ => TrackerState::Running,
        }
    }

    /// Paused trackers accept calls but drop the events.
    pub fn pause(&self) {
        let _ = self.state.compare_exchange(
            STATE_RUNNING,
            STATE_PAUSED,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    pub fn resume(&self) {
        let _ = self.state.compare_exchange(
            STATE_PAUSED,
            STATE_RUNNING,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Terminal.
    pub fn mark_destroyed(&self) {
        self.state.store(STATE_DESTROYED, Ordering::Release);
    }

    pub fn track_page_view(&self, props: Option<PageViewProps>) {
        let props = props.unwrap_or_default();
        let kind = EventKind::PageView {
            title: props.title.unwrap_or_else(|| self.window.title()),
            route: props.route.unwrap_or_else(|| self.window.route()),
            is_initial_load: props.is_initial_load,
        };
        self.emit(kind, None);
    }

    /// Record a click on the node at `target`. Coordinates default to the
    /// center of the element's rect when the caller has none.
    pub fn track_click(&self, target: &[usize], coordinates: Option<(f64, f64)>) {
        let details = self.window.with_document(|doc| {
            let el = doc.resolve(target)?;
            let selector = css_path(doc, target)?;
            let element_xpath = xpath(doc, target);
            let text = el.visible_text();
            Some((
                selector,
                element_xpath,
                el.tag.to_uppercase(),
                if text.is_empty() {
                    None
                } else {
                    Some(text_hash(&text))
                },
                (f64::from(el.width) / 2.0, f64::from(el.height) / 2.0),
            ))
        });

        let Some((selector, element_xpath, tag_name, text_digest, center)) = details else {
            debug!(?target, "click target not resolvable, dropping");
            return;
        };
        let (x, y) = coordinates.unwrap_or(center);

        self.emit(
            EventKind::Click {
                x,
                y,
                selector,
                xpath: element_xpath,
                tag_name,
                text_hash: text_digest,
            },
            None,
        );
    }

    pub fn track_custom(
        &self,
        name: impl Into<String>,
        properties: Option<HashMap<String, serde_json::Value>>,
    ) {
        self.emit(
            EventKind::Custom { name: name.into() },
            properties,
        );
    }

    /// Emit a snapshot event. Used by snapshot capture; available to hosts
    /// that capture on their own schedule.
    pub fn track_snapshot(
        &self,
        kind: SnapshotKind,
        layout_hash: String,
        payload: SnapshotPayload,
        mask_metadata: MaskMetadata,
    ) {
        let (viewport_width, _) = self.window.viewport();
        self.emit(
            EventKind::Snapshot {
                kind,
                screen_class: screen_class(viewport_width),
                layout_hash,
                dom: payload.dom,
                compression: payload.compression,
                original_size: payload.original_size,
                compressed_size: payload.compressed_size,
                truncated: payload.truncated,
                mask_metadata,
                schema_version: SNAPSHOT_SCHEMA_VERSION.to_string(),
            },
            None,
        );
    }

    pub fn set_user_id(&self, user_id: Option<String>) {
        let logging_out = user_id.is_none() && self.config.user_id().is_some();
        self.config.set_user_id(user_id);
        // Logout starts a fresh session so post-logout activity is not
        // attributed to the authenticated one.
        if logging_out {
            self.identity.start_new_session();
        }
    }

    pub fn set_client_id(&self, client_id: impl Into<String>) {
        let client_id = client_id.into();
        self.identity.persist_client_id(&client_id);
        self.config.set_client_id(client_id);
    }

    pub fn session_id(&self) -> String {
        self.identity.session_id()
    }

    pub fn new_session(&self) -> String {
        self.identity.start_new_session()
    }

    pub async fn flush(&self) {
        self.queue.flush().await;
    }

    pub fn session_counters(&self, session_id: &str) -> Option<SessionCounters> {
        self.session_counters.get(session_id).map(|c| c.clone())
    }

    pub fn all_session_counters(&self) -> Vec<(String, SessionCounters)> {
        self.session_counters
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    fn emit(&self, kind: EventKind, properties: Option<HashMap<String, serde_json::Value>>) {
        if self.state.load(Ordering::Acquire) != STATE_RUNNING {
            debug!(event_type = kind.type_name(), "tracker not running, event dropped");
            return;
        }

        self.identity.check_session_expired();
        self.identity.update_activity();
        let session_id = self.identity.session_id();

        {
            let mut counters = self.session_counters.entry(session_id.clone()).or_default();
            counters.total_events += 1;
            match kind {
                EventKind::PageView { .. } => counters.page_views += 1,
                EventKind::Click { .. } => counters.clicks += 1,
                EventKind::Custom { .. } => counters.custom_events += 1,
                EventKind::Snapshot { .. } => counters.snapshots += 1,
            }
        }

        let (viewport_width, viewport_height) = self.window.viewport();
        let (page_width, page_height) = self.window.page_size();

        let event = AnalyticsEvent {
            event_id: Uuid::new_v4(),
            project_id: self.config.project_id().to_string(),
            client_id: self.config.client_id(),
            session_id,
            user_id: self.config.user_id(),
            kind,
            timestamp: self.next_timestamp(),
            url: self.window.url(),
            referrer: self.window.referrer(),
            page_width,
            page_height,
            viewport_width,
            viewport_height,
            properties,
        };

        self.queue.add(event);
    }

    fn next_timestamp(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let mut last = self.last_timestamp.lock().expect("timestamp mutex poisoned");
        let stamped = now.max(*last);
        *last = stamped;
        stamped
    }
}
