//! Click auto-capture: a single delegated listener on the window. Targets
//! inside a subtree bearing the capture opt-out marker are skipped.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use omni_core::error::OmniResult;
use omni_dom::node::{Element, Node};
use omni_dom::page::{ListenerId, PageEvent, PageEventKind, Window};
use omni_dom::serializer::{OPT_OUT_ATTR, OPT_OUT_VALUE};

use crate::plugins::{Plugin, PluginContext};

#[derive(Default)]
pub struct ClickPlugin {
    window: Mutex<Option<Arc<Window>>>,
    listener: Mutex<Option<ListenerId>>,
}

impl ClickPlugin {
    pub fn new() -> Self {
        Self::default()
    }
}

/// True when the target or any ancestor on its path opts out of tracking.
/// Unresolvable paths are treated as opted out.
fn path_opted_out(doc: &Element, path: &[usize]) -> bool {
    let mut current = doc;
    if has_opt_out(current) {
        return true;
    }
    for &index in path {
        current = match current.children.get(index) {
            Some(Node::Element(el)) => el,
            _ => return true,
        };
        if has_opt_out(current) {
            return true;
        }
    }
    false
}

fn has_opt_out(el: &Element) -> bool {
    el.attr(OPT_OUT_ATTR) == Some(OPT_OUT_VALUE)
}

#[async_trait]
impl Plugin for ClickPlugin {
    fn name(&self) -> &'static str {
        "click-tracking"
    }

    fn version(&self) -> &'static str {
        "1.0.0"
    }

    async fn init(&self, context: &PluginContext) -> OmniResult<()> {
        let tracker = context.tracker.clone();
        let window = tracker.window();

        let listener = window.add_listener(PageEventKind::Click, move |w, event| {
            if let PageEvent::Click { target, x, y } = event {
                if w.with_document(|doc| path_opted_out(doc, target)) {
                    return;
                }
                tracker.track_click(target, Some((*x, *y)));
            }
        });

        *self.window.lock().expect("plugin mutex poisoned") = Some(window);
        *self.listener.lock().expect("plugin mutex poisoned") = Some(listener);
        Ok(())
    }

    async fn destroy(&self) -> OmniResult<()> {
        let window = self.window.lock().expect("plugin mutex poisoned").take();
        if let Some(window) = window {
            if let Some(listener) = self.listener.lock().expect("plugin mutex poisoned").take() {
                window.remove_listener(listener);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opt_out_detection_walks_ancestors() {
        let doc = Element::new("html").with_child(
            Element::new("body")
                .with_child(
                    Element::new("div")
                        .with_attr(OPT_OUT_ATTR, OPT_OUT_VALUE)
                        .with_child(Element::new("button")),
                )
                .with_child(Element::new("button")),
        );
        // Button inside the opted-out div.
        assert!(path_opted_out(&doc, &[0, 0, 0]));
        // Sibling button outside it.
        assert!(!path_opted_out(&doc, &[0, 1]));
        // Unresolvable path.
        assert!(path_opted_out(&doc, &[0, 9]));
    }
}
