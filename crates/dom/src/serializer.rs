//! Sanitizing DOM serializer. Operates on a clone of the live tree and
//! produces an XML-compatible string with scripts removed, inline handlers
//! stripped, configured selectors blocked or masked, and default sensitive
//! fields masked.

use std::collections::BTreeSet;

use tracing::warn;

use omni_core::config::PrivacyConfig;
use omni_core::error::{OmniError, OmniResult};
use omni_core::events::MaskMetadata;

use crate::node::{Element, Node};
use crate::selector::SelectorList;

/// Marker attribute suppressing capture of an element's subtree. Doubles as
/// the do-not-track marker for click capture.
pub const OPT_OUT_ATTR: &str = "data-analytics-snapshot";
pub const OPT_OUT_VALUE: &str = "off";

/// Replacement for masked values and text.
pub const MASKED_VALUE: &str = "***MASKED***";

/// Recursion bound; pathological trees fail serialization and the caller
/// substitutes a placeholder document.
const MAX_SERIALIZE_DEPTH: usize = 512;

#[derive(Debug, Clone, Default)]
pub struct SanitizeOptions {
    pub block_selectors: Vec<String>,
    pub mask_selectors: Vec<String>,
    pub max_node_text_length: usize,
}

impl SanitizeOptions {
    pub fn from_privacy(privacy: &PrivacyConfig) -> Self {
        Self {
            block_selectors: privacy.block_selectors.clone(),
            mask_selectors: privacy.mask_selectors.clone(),
            max_node_text_length: privacy.max_node_text_length,
        }
    }

    fn text_cap(&self) -> usize {
        if self.max_node_text_length == 0 {
            200
        } else {
            self.max_node_text_length
        }
    }
}

#[derive(Debug)]
pub struct SanitizedDom {
    pub xml: String,
    pub mask_metadata: MaskMetadata,
}

/// Sanitize a clone of `root` and serialize it. The live tree is never
/// mutated.
pub fn sanitize_and_serialize(root: &Element, options: &SanitizeOptions) -> OmniResult<SanitizedDom> {
    let mut sanitizer = Sanitizer {
        block: parse_selectors(&options.block_selectors),
        mask: parse_selectors(&options.mask_selectors),
        text_cap: options.text_cap(),
        matched_selectors: BTreeSet::new(),
        blocked_count: 0,
    };

    let cleaned = sanitizer.scrub(root.clone(), false, 0)?;

    let mut xml = String::new();
    if let Some(el) = &cleaned {
        write_element(el, &mut xml);
    }

    Ok(SanitizedDom {
        xml,
        mask_metadata: MaskMetadata {
            masked_selectors: sanitizer.matched_selectors.into_iter().collect(),
            blocked_count: sanitizer.blocked_count,
        },
    })
}

fn parse_selectors(raw: &[String]) -> Vec<(String, SelectorList)> {
    raw.iter()
        .filter_map(|s| match SelectorList::parse(s) {
            Some(list) => Some((s.clone(), list)),
            None => {
                warn!(selector = %s, "ignoring unsupported privacy selector");
                None
            }
        })
        .collect()
}

struct Sanitizer {
    block: Vec<(String, SelectorList)>,
    mask: Vec<(String, SelectorList)>,
    text_cap: usize,
    matched_selectors: BTreeSet<String>,
    blocked_count: u32,
}

impl Sanitizer {
    /// Returns `None` when the element is removed outright. `inherited_mask`
    /// is set while inside a masked subtree.
    fn scrub(
        &mut self,
        mut el: Element,
        inherited_mask: bool,
        depth: usize,
    ) -> OmniResult<Option<Element>> {
        if depth > MAX_SERIALIZE_DEPTH {
            return Err(OmniError::Snapshot(format!(
                "DOM exceeds serialization depth limit of {MAX_SERIALIZE_DEPTH}"
            )));
        }

        if el.tag == "script" || el.tag == "noscript" {
            return Ok(None);
        }
        if el.attr(OPT_OUT_ATTR) == Some(OPT_OUT_VALUE) {
            return Ok(None);
        }
        if self.block.iter().any(|(_, list)| list.matches(&el)) {
            self.blocked_count += 1;
            return Ok(None);
        }

        el.attributes.retain(|name, _| !name.starts_with("on"));

        let mut masked = inherited_mask;
        if let Some((label, _)) = self.mask.iter().find(|(_, list)| list.matches(&el)) {
            self.matched_selectors.insert(label.clone());
            masked = true;
        }
        if let Some(label) = sensitive_field_selector(&el) {
            self.matched_selectors.insert(label.to_string());
            masked = true;
        }

        if masked {
            mask_element(&mut el);
        }

        let children = std::mem::take(&mut el.children);
        for node in children {
            match node {
                Node::Text(text) => {
                    let text = if masked {
                        MASKED_VALUE.to_string()
                    } else {
                        truncate_text(&text, self.text_cap)
                    };
                    el.children.push(Node::Text(text));
                }
                Node::Element(child) => {
                    if let Some(cleaned) = self.scrub(child, masked, depth + 1)? {
                        el.children.push(Node::Element(cleaned));
                    }
                }
            }
        }

        Ok(Some(el))
    }
}

/// Default sensitive-field rules, reported under the selector label a host
/// would have written by hand.
fn sensitive_field_selector(el: &Element) -> Option<&'static str> {
    if el.tag != "input" {
        return None;
    }
    match el.attr("type") {
        Some("password") => return Some("input[type=\"password\"]"),
        Some("hidden") => return Some("input[type=\"hidden\"]"),
        _ => {}
    }
    if let Some(autocomplete) = el.attr("autocomplete") {
        if autocomplete.contains("cc-") {
            return Some("input[autocomplete*=\"cc-\"]");
        }
        if autocomplete == "ssn" {
            return Some("input[autocomplete=\"ssn\"]");
        }
    }
    if let Some(name) = el.attr("name") {
        let name = name.to_ascii_lowercase();
        if name.contains("password") {
            return Some("input[name*=\"password\"]");
        }
        if name.contains("token") {
            return Some("input[name*=\"token\"]");
        }
        if name.contains("secret") {
            return Some("input[name*=\"secret\"]");
        }
    }
    None
}

fn mask_element(el: &mut Element) {
    if el.value.is_some() {
        el.value = Some(MASKED_VALUE.to_string());
    }
    if is_form_control(&el.tag) {
        if el.attributes.contains_key("value") {
            el.attributes
                .insert("value".into(), MASKED_VALUE.to_string());
        }
    } else {
        el.attributes.remove("value");
    }
    el.attributes.retain(|name, _| !name.starts_with("data-"));
}

fn is_form_control(tag: &str) -> bool {
    matches!(tag, "input" | "textarea" | "select" | "option")
}

fn truncate_text(text: &str, cap: usize) -> String {
    if text.chars().count() <= cap {
        return text.to_string();
    }
    let mut out: String = text.chars().take(cap).collect();
    out.push('…');
    out
}

fn write_element(el: &Element, out: &mut String) {
    out.push('<');
    out.push_str(&el.tag);
    for (name, value) in &el.attributes {
        out.push(' ');
        out.push_str(name);
        out.push_str("=\"");
        out.push_str(&escape(value));
        out.push('"');
    }

    if el.children.is_empty() {
        out.push_str("/>");
        return;
    }

    out.push('>');
    for node in &el.children {
        match node {
            Node::Text(text) => out.push_str(&escape(text)),
            Node::Element(child) => write_element(child, out),
        }
    }
    out.push_str("</");
    out.push_str(&el.tag);
    out.push('>');
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}
