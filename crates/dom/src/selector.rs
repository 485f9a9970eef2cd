//! Element-path selectors: the CSS selector path and XPath recorded on click
//! events, and a small matcher for the configured block/mask selectors.

use crate::node::{Element, Node};

/// CSS selector path from the node up to the nearest ancestor with an id, or
/// to the body. Same-tag siblings are disambiguated with `:nth-of-type(k)`
/// (1-based).
pub fn css_path(root: &Element, path: &[usize]) -> Option<String> {
    let chain = element_chain(root, path)?;

    let mut segments: Vec<String> = Vec::new();
    for depth in (0..chain.len()).rev() {
        let el = chain[depth];
        if let Some(id) = el.id() {
            segments.push(format!("#{id}"));
            break;
        }
        if el.tag == "body" {
            segments.push("body".into());
            break;
        }
        let segment = if depth == 0 {
            el.tag.clone()
        } else {
            let parent = chain[depth - 1];
            let child_index = path[depth - 1];
            let same_tag = parent
                .child_elements()
                .filter(|c| c.tag == el.tag)
                .count();
            if same_tag > 1 {
                let k = 1 + preceding_same_tag(parent, child_index, &el.tag);
                format!("{}:nth-of-type({})", el.tag, k)
            } else {
                el.tag.clone()
            }
        };
        segments.push(segment);
    }

    segments.reverse();
    Some(segments.join(" > "))
}

/// XPath with positional `tag[k]` indices for every level regardless of ids.
pub fn xpath(root: &Element, path: &[usize]) -> Option<String> {
    let chain = element_chain(root, path)?;

    let mut out = String::new();
    for depth in 0..chain.len() {
        let el = chain[depth];
        let k = if depth == 0 {
            1
        } else {
            1 + preceding_same_tag(chain[depth - 1], path[depth - 1], &el.tag)
        };
        out.push_str(&format!("/{}[{}]", el.tag, k));
    }
    Some(out)
}

fn element_chain<'a>(root: &'a Element, path: &[usize]) -> Option<Vec<&'a Element>> {
    let mut chain = Vec::with_capacity(path.len() + 1);
    let mut current = root;
    chain.push(current);
    for &index in path {
        current = match current.children.get(index)? {
            Node::Element(el) => el,
            Node::Text(_) => return None,
        };
        chain.push(current);
    }
    Some(chain)
}

fn preceding_same_tag(parent: &Element, child_index: usize, tag: &str) -> usize {
    parent.children[..child_index]
        .iter()
        .filter(|node| matches!(node, Node::Element(el) if el.tag == tag))
        .count()
}

/// A parsed comma-separated list of compound selectors. Supported syntax is
/// the subset privacy configs use in practice: `tag`, `#id`, `.class`,
/// `[attr]`, `[attr=value]` and combinations, e.g. `input[type="password"]`.
#[derive(Debug)]
pub struct SelectorList {
    parts: Vec<Compound>,
}

#[derive(Debug, Default)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<(String, Option<String>)>,
}

impl SelectorList {
    /// `None` when the input is empty or uses unsupported syntax.
    pub fn parse(input: &str) -> Option<Self> {
        let mut parts = Vec::new();
        for piece in input.split(',') {
            let piece = piece.trim();
            if piece.is_empty() {
                return None;
            }
            parts.push(parse_compound(piece)?);
        }
        Some(Self { parts })
    }

    pub fn matches(&self, el: &Element) -> bool {
        self.parts.iter().any(|part| part.matches(el))
    }
}

impl Compound {
    fn matches(&self, el: &Element) -> bool {
        if let Some(tag) = &self.tag {
            if &el.tag != tag {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if el.id() != Some(id.as_str()) {
                return false;
            }
        }
        for class in &self.classes {
            if !el.classes().any(|c| c == class) {
                return false;
            }
        }
        for (name, expected) in &self.attrs {
            match (el.attr(name), expected) {
                (Some(actual), Some(expected)) if actual == expected => {}
                (Some(_), None) => {}
                _ => return false,
            }
        }
        true
    }
}

fn parse_compound(input: &str) -> Option<Compound> {
    let bytes = input.as_bytes();
    let mut i = 0;
    let mut out = Compound::default();

    if i < bytes.len() && bytes[i] == b'*' {
        i += 1;
    } else if i < bytes.len() && bytes[i].is_ascii_alphabetic() {
        let (tag, rest) = take_ident(&input[i..])?;
        out.tag = Some(tag.to_ascii_lowercase());
        i += input[i..].len() - rest.len();
    }

    while i < bytes.len() {
        match bytes[i] {
            b'#' => {
                let (id, rest) = take_ident(&input[i + 1..])?;
                i = input.len() - rest.len();
                out.id = Some(id);
            }
            b'.' => {
                let (class, rest) = take_ident(&input[i + 1..])?;
                i = input.len() - rest.len();
                out.classes.push(class);
            }
            b'[' => {
                let close = input[i..].find(']')? + i;
                let inner = &input[i + 1..close];
                let (name, value) = match inner.split_once('=') {
                    Some((name, value)) => (
                        name.trim().to_string(),
                        Some(value.trim().trim_matches(|c| c == '"' || c == '\'').to_string()),
                    ),
                    None => (inner.trim().to_string(), None),
                };
                if name.is_empty() {
                    return None;
                }
                out.attrs.push((name, value));
                i = close + 1;
            }
            _ => return None,
        }
    }

    if out.tag.is_none() && out.id.is_none() && out.classes.is_empty() && out.attrs.is_empty() {
        return None;
    }
    Some(out)
}

fn take_ident(input: &str) -> Option<(String, &str)> {
    let end = input
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'))
        .unwrap_or(input.len());
    if end == 0 {
        return None;
    }
    Some((input[..end].to_string(), &input[end..]))
}
