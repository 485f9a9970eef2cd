//! Omnilytics DOM utilities — element-path selectors, structural layout
//! hashing, privacy-preserving snapshot serialization, and the page host
//! model the auto-capture plugins observe.
//!
//! Everything here is pure of the tracker and the batching queue: these
//! utilities are consumed by click auto-capture and snapshot capture but know
//! nothing about either.
//!
//! # Modules
//!
//! - [`node`] — Owned element tree and node-path addressing
//! - [`selector`] — CSS selector paths, XPaths, and a matcher for configured
//!   block/mask selectors
//! - [`layout`] — Structural layout hash, screen classification, text digests
//! - [`serializer`] — Sanitizing XML-compatible serializer
//! - [`snapshot`] — Size bounding, compression, and encoding of payloads
//! - [`page`] — Window/history/listener host model

pub mod layout;
pub mod node;
pub mod page;
pub mod selector;
pub mod serializer;
pub mod snapshot;

pub use layout::{layout_hash, screen_class, text_hash};
pub use node::{Element, Node, NodePath};
pub use page::{History, ListenerId, PageEvent, PageEventKind, PushStateFn, Window};
pub use selector::{css_path, xpath, SelectorList};
pub use serializer::{
    sanitize_and_serialize, SanitizeOptions, SanitizedDom, MASKED_VALUE, OPT_OUT_ATTR,
    OPT_OUT_VALUE,
};
pub use snapshot::{
    build_payload, SnapshotPayload, SERIALIZATION_FAILED_PLACEHOLDER, SNAPSHOT_SCHEMA_VERSION,
    TRUNCATION_MARKER,
};
