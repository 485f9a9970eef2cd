//! Analytics event model — page views, clicks, custom events, and DOM
//! snapshots, plus the batch wire format posted to the ingestion endpoint.

use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single captured event. The `kind` payload is flattened into the object
/// with a `type` discriminator, so the wire shape is one flat JSON record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsEvent {
    pub event_id: Uuid,
    pub project_id: String,
    pub client_id: String,
    pub session_id: String,
    pub user_id: Option<String>,
    #[serde(flatten)]
    pub kind: EventKind,
    /// Millisecond epoch capture time.
    pub timestamp: i64,
    pub url: String,
    pub referrer: String,
    /// Scroll width/height of the full page.
    pub page_width: u32,
    pub page_height: u32,
    /// Inner width/height of the viewport.
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub properties: Option<HashMap<String, serde_json::Value>>,
}

/// Discriminated event payload. Wire tag is `type`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(
    tag = "type",
    rename_all = "lowercase",
    rename_all_fields = "camelCase"
)]
pub enum EventKind {
    #[serde(rename = "pageview")]
    PageView {
        title: String,
        /// Pathname of the viewed route.
        route: String,
        /// Distinguishes the initial document load from SPA navigation.
        is_initial_load: bool,
    },
    Click {
        /// Page-relative coordinates.
        x: f64,
        y: f64,
        /// CSS selector path from the element up to an id'd ancestor or body.
        selector: String,
        xpath: Option<String>,
        /// Uppercase tag name of the target.
        tag_name: String,
        /// Digest of the element's visible text, when any.
        text_hash: Option<String>,
    },
    Custom {
        name: String,
    },
    Snapshot {
        kind: SnapshotKind,
        screen_class: ScreenClass,
        layout_hash: String,
        /// Base64 of the (possibly compressed) serialized DOM.
        dom: String,
        compression: Compression,
        original_size: usize,
        compressed_size: usize,
        truncated: bool,
        mask_metadata: MaskMetadata,
        schema_version: String,
    },
}

impl EventKind {
    /// Wire discriminator, also used for logging and counters.
    pub fn type_name(&self) -> &'static str {
        match self {
            EventKind::PageView { .. } => "pageview",
            EventKind::Click { .. } => "click",
            EventKind::Custom { .. } => "custom",
            EventKind::Snapshot { .. } => "snapshot",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotKind {
    Initial,
    Mutation,
    Periodic,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ScreenClass {
    Mobile,
    Tablet,
    Desktop,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    Gzip,
    Deflate,
    None,
}

/// Record of what the sanitizer masked or removed from a snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MaskMetadata {
    pub masked_selectors: Vec<String>,
    pub blocked_count: u32,
}

/// An ordered group of events dispatched as a single request. Immutable
/// after construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    pub batch_id: Uuid,
    /// Millisecond epoch creation time.
    pub timestamp: i64,
    pub events: Vec<AnalyticsEvent>,
}

impl Batch {
    pub fn new(events: Vec<AnalyticsEvent>) -> Self {
        Self {
            batch_id: Uuid::new_v4(),
            timestamp: Utc::now().timestamp_millis(),
            events,
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_event(kind: EventKind) -> AnalyticsEvent {
        AnalyticsEvent {
            event_id: Uuid::new_v4(),
            project_id: "p1".into(),
            client_id: "anon-1".into(),
            session_id: "session-1700000000000-abc123xyz".into(),
            user_id: None,
            kind,
            timestamp: 1_700_000_000_000,
            url: "https://example.com/products".into(),
            referrer: "https://google.com".into(),
            page_width: 1440,
            page_height: 4200,
            viewport_width: 1440,
            viewport_height: 900,
            properties: None,
        }
    }

    #[test]
    fn test_page_view_wire_shape() {
        let event = make_event(EventKind::PageView {
            title: "Products".into(),
            route: "/products".into(),
            is_initial_load: true,
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "pageview");
        assert_eq!(json["isInitialLoad"], true);
        assert_eq!(json["projectId"], "p1");
        assert!(json["eventId"].is_string());
        assert_eq!(json["viewportWidth"], 1440);
    }

    #[test]
    fn test_click_round_trip() {
        let event = make_event(EventKind::Click {
            x: 450.5,
            y: 320.0,
            selector: "#nav > ul > li:nth-of-type(2) > a".into(),
            xpath: Some("/html[1]/body[1]/nav[1]/ul[1]/li[2]/a[1]".into()),
            tag_name: "A".into(),
            text_hash: Some("9f86d081884c7d65".into()),
        });
        let json = serde_json::to_string(&event).unwrap();
        let parsed: AnalyticsEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.kind, event.kind);
        assert_eq!(parsed.kind.type_name(), "click");
    }

    #[test]
    fn test_snapshot_wire_shape() {
        let event = make_event(EventKind::Snapshot {
            kind: SnapshotKind::Mutation,
            screen_class: ScreenClass::Desktop,
            layout_hash: "sha256:0a1b2c3d".into(),
            dom: "PGh0bWw+".into(),
            compression: Compression::Gzip,
            original_size: 2048,
            compressed_size: 512,
            truncated: false,
            mask_metadata: MaskMetadata {
                masked_selectors: vec!["input[type=\"password\"]".into()],
                blocked_count: 1,
            },
            schema_version: "1".into(),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "snapshot");
        assert_eq!(json["screenClass"], "desktop");
        assert_eq!(json["compression"], "gzip");
        assert_eq!(json["maskMetadata"]["blockedCount"], 1);
    }

    #[test]
    fn test_batch_wire_shape() {
        let batch = Batch::new(vec![make_event(EventKind::Custom { name: "signup".into() })]);
        let json = serde_json::to_value(&batch).unwrap();
        assert!(json["batchId"].is_string());
        assert!(json["timestamp"].is_i64());
        assert_eq!(json["events"].as_array().unwrap().len(), 1);
        assert_eq!(json["events"][0]["type"], "custom");
        assert_eq!(json["events"][0]["name"], "signup");
    }
}
