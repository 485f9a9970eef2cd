//! Snapshot payload building: size bounding, gzip compression, and base64
//! encoding of the serialized DOM.

use std::io::Write as _;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use flate2::write::GzEncoder;
use tracing::debug;

use omni_core::events::Compression;

/// Bumped when the snapshot payload shape changes.
pub const SNAPSHOT_SCHEMA_VERSION: &str = "1";

/// Appended where an oversized document was cut.
pub const TRUNCATION_MARKER: &str = "<!-- TRUNCATED -->";

/// Placeholder emitted when serialization itself fails, so the outage is
/// observable server-side.
pub const SERIALIZATION_FAILED_PLACEHOLDER: &str =
    "<html><body><!-- Serialization failed --></body></html>";

#[derive(Debug, Clone)]
pub struct SnapshotPayload {
    /// Base64 of the (possibly compressed) document.
    pub dom: String,
    pub compression: Compression,
    /// Byte size of the serialized document before encoding.
    pub original_size: usize,
    /// Byte size of the encoded payload actually shipped.
    pub compressed_size: usize,
    pub truncated: bool,
}

/// Bound, compress, and encode a serialized document. `truncated` is set when
/// the input exceeded `max_size_bytes` (the caller may also pre-set it via
/// the placeholder path).
pub fn build_payload(xml: String, max_size_bytes: usize) -> SnapshotPayload {
    let mut xml = xml;
    let mut truncated = false;

    if max_size_bytes > 0 && xml.len() > max_size_bytes {
        let keep = max_size_bytes.saturating_sub(TRUNCATION_MARKER.len());
        let mut cut = keep.min(xml.len());
        while cut > 0 && !xml.is_char_boundary(cut) {
            cut -= 1;
        }
        xml.truncate(cut);
        xml.push_str(TRUNCATION_MARKER);
        truncated = true;
    }

    let original_size = xml.len();
    let (dom, compression) = match gzip(xml.as_bytes()) {
        Ok(compressed) => (STANDARD.encode(compressed), Compression::Gzip),
        Err(e) => {
            debug!(error = %e, "gzip failed, shipping uncompressed snapshot");
            (STANDARD.encode(xml.as_bytes()), Compression::None)
        }
    };
    let compressed_size = dom.len();

    SnapshotPayload {
        dom,
        compression,
        original_size,
        compressed_size,
        truncated,
    }
}

fn gzip(raw: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(raw)?;
    encoder.finish()
}
