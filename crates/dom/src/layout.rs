//! Structural layout hashing and viewport classification. The layout hash
//! digests the DOM's skeleton (tags, ids, stable classes, integer rects) so
//! snapshot capture can tell significant layout changes from noise; text
//! content never participates.

use std::fmt::Write as _;

use sha2::{Digest, Sha256};

use omni_core::events::ScreenClass;

use crate::node::Element;

/// Depth bound for the layout walk.
pub const LAYOUT_HASH_MAX_DEPTH: usize = 25;

/// Class prefixes that flip with UI state rather than layout.
const TRANSIENT_CLASS_PREFIXES: [&str; 5] = ["active", "selected", "open", "hidden", "show"];

/// Deterministic 32-bit digest of the DOM skeleton, `sha256:`-prefixed for
/// forward compatibility with longer digests.
pub fn layout_hash(root: &Element) -> String {
    let mut signature = String::new();
    walk(root, 0, &mut signature);

    let digest = Sha256::digest(signature.as_bytes());
    format!(
        "sha256:{:02x}{:02x}{:02x}{:02x}",
        digest[0], digest[1], digest[2], digest[3]
    )
}

fn walk(el: &Element, depth: usize, out: &mut String) {
    if depth >= LAYOUT_HASH_MAX_DEPTH {
        return;
    }

    out.push_str(&el.tag);
    if let Some(id) = el.id() {
        out.push('#');
        out.push_str(id);
    }
    for class in el.classes().filter(|c| !is_transient_class(c)).take(3) {
        out.push('.');
        out.push_str(class);
    }
    let _ = write!(out, "{{{}x{}}};", el.width, el.height);

    for child in el.child_elements() {
        walk(child, depth + 1, out);
    }
}

fn is_transient_class(class: &str) -> bool {
    TRANSIENT_CLASS_PREFIXES
        .iter()
        .any(|prefix| class.starts_with(prefix))
}

/// Coarse viewport classification.
pub fn screen_class(viewport_width: u32) -> ScreenClass {
    if viewport_width < 768 {
        ScreenClass::Mobile
    } else if viewport_width < 1024 {
        ScreenClass::Tablet
    } else {
        ScreenClass::Desktop
    }
}

/// Short digest of an element's visible text, recorded on click events in
/// place of the text itself.
pub fn text_hash(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    digest[..8].iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout_doc_with_text(text: &str) -> Element {
        Element::new("html").with_size(1440, 4200).with_child(
            Element::new("body").with_size(1440, 4200).with_child(
                Element::new("div")
                    .with_id("main")
                    .with_classes("card active featured extra fourth")
                    .with_size(600, 400)
                    .with_text(text),
            ),
        )
    }

    fn layout_doc() -> Element {
        layout_doc_with_text("text is ignored")
    }

    #[test]
    fn test_hash_format() {
        let hash = layout_hash(&layout_doc());
        assert!(hash.starts_with("sha256:"));
        assert_eq!(hash.len(), "sha256:".len() + 8);
    }

    #[test]
    fn test_hash_stable_across_runs() {
        assert_eq!(layout_hash(&layout_doc()), layout_hash(&layout_doc()));
    }

    #[test]
    fn test_hash_ignores_text_changes() {
        assert_eq!(
            layout_hash(&layout_doc_with_text("before")),
            layout_hash(&layout_doc_with_text("entirely different words"))
        );
    }

    #[test]
    fn test_hash_ignores_transient_classes() {
        let base = Element::new("div").with_classes("card").with_size(10, 10);
        let toggled = Element::new("div")
            .with_classes("card active open")
            .with_size(10, 10);
        assert_eq!(layout_hash(&base), layout_hash(&toggled));
    }

    #[test]
    fn test_hash_changes_with_structure() {
        let base = layout_doc();
        let grown = layout_doc().with_child(Element::new("footer").with_size(1440, 80));
        assert_ne!(layout_hash(&base), layout_hash(&grown));
    }

    #[test]
    fn test_hash_changes_with_rect() {
        let narrow = Element::new("div").with_size(100, 50);
        let wide = Element::new("div").with_size(200, 50);
        assert_ne!(layout_hash(&narrow), layout_hash(&wide));
    }

    #[test]
    fn test_screen_class_boundaries() {
        assert_eq!(screen_class(320), ScreenClass::Mobile);
        assert_eq!(screen_class(767), ScreenClass::Mobile);
        assert_eq!(screen_class(768), ScreenClass::Tablet);
        assert_eq!(screen_class(1023), ScreenClass::Tablet);
        assert_eq!(screen_class(1024), ScreenClass::Desktop);
    }

    #[test]
    fn test_text_hash_deterministic() {
        assert_eq!(text_hash("Buy Now"), text_hash("Buy Now"));
        assert_ne!(text_hash("Buy Now"), text_hash("Sign Up"));
        assert_eq!(text_hash("Buy Now").len(), 16);
    }
}
