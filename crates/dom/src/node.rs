//! Owned DOM tree. The host keeps the live document as an [`Element`] tree;
//! capture code addresses nodes by [`NodePath`] (child indices from the root)
//! so no parent back-pointers are needed.

use std::collections::BTreeMap;

/// Child indices from the document root down to a node.
pub type NodePath = Vec<usize>;

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// A single element: tag, attributes, form-control value (the live property,
/// distinct from the `value` attribute), layout rectangle, and children.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub tag: String,
    pub attributes: BTreeMap<String, String>,
    pub value: Option<String>,
    pub width: u32,
    pub height: u32,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into().to_ascii_lowercase(),
            attributes: BTreeMap::new(),
            value: None,
            width: 0,
            height: 0,
            children: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.attributes.insert("id".into(), id.into());
        self
    }

    /// Space-separated class list, as in the `class` attribute.
    pub fn with_classes(mut self, classes: impl Into<String>) -> Self {
        self.attributes.insert("class".into(), classes.into());
        self
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(Node::Text(text.into()));
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(Node::Element(child));
        self
    }

    pub fn id(&self) -> Option<&str> {
        self.attributes.get("id").map(String::as_str)
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.attributes
            .get("class")
            .map(String::as_str)
            .unwrap_or("")
            .split_whitespace()
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(el) => Some(el),
            Node::Text(_) => None,
        })
    }

    /// Resolve a node path. Every index must land on an element.
    pub fn resolve(&self, path: &[usize]) -> Option<&Element> {
        let mut current = self;
        for &index in path {
            current = match current.children.get(index)? {
                Node::Element(el) => el,
                Node::Text(_) => return None,
            };
        }
        Some(current)
    }

    /// Concatenated descendant text, whitespace-normalized.
    pub fn visible_text(&self) -> String {
        let mut parts = Vec::new();
        collect_text(self, &mut parts);
        parts.join(" ")
    }
}

fn collect_text(el: &Element, out: &mut Vec<String>) {
    for node in &el.children {
        match node {
            Node::Text(text) => {
                let trimmed = text.split_whitespace().collect::<Vec<_>>().join(" ");
                if !trimmed.is_empty() {
                    out.push(trimmed);
                }
            }
            Node::Element(child) => collect_text(child, out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_doc() -> Element {
        Element::new("html").with_child(
            Element::new("body").with_child(
                Element::new("div")
                    .with_id("main")
                    .with_classes("card featured")
                    .with_child(Element::new("span").with_text("hello"))
                    .with_child(Element::new("span").with_text("world")),
            ),
        )
    }

    #[test]
    fn test_resolve_path() {
        let doc = sample_doc();
        let div = doc.resolve(&[0, 0]).unwrap();
        assert_eq!(div.id(), Some("main"));
        let second_span = doc.resolve(&[0, 0, 1]).unwrap();
        assert_eq!(second_span.tag, "span");
        assert!(doc.resolve(&[0, 0, 5]).is_none());
    }

    #[test]
    fn test_resolve_rejects_text_node() {
        let doc = Element::new("div").with_text("hi");
        assert!(doc.resolve(&[0]).is_none());
    }

    #[test]
    fn test_visible_text_concatenates() {
        let doc = sample_doc();
        assert_eq!(doc.visible_text(), "hello world");
    }

    #[test]
    fn test_tag_normalized_lowercase() {
        assert_eq!(Element::new("DIV").tag, "div");
    }

    #[test]
    fn test_classes_split() {
        let doc = sample_doc();
        let div = doc.resolve(&[0, 0]).unwrap();
        assert_eq!(div.classes().collect::<Vec<_>>(), vec!["card", "featured"]);
    }
}
