//! Page-view auto-capture: one initial event at startup, then SPA route
//! changes via a wrapped history push-state function and a popstate listener.
//! The wrap preserves the original navigation semantics and the saved
//! function reference is restored on destroy, so repeated init/destroy
//! cycles and other libraries patching the same function stay safe.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use omni_core::error::OmniResult;
use omni_dom::page::{ListenerId, PageEvent, PageEventKind, PushStateFn, Window};

use crate::plugins::{Plugin, PluginContext};
use crate::tracker::PageViewProps;

#[derive(Default)]
pub struct PageViewPlugin {
    window: Mutex<Option<Arc<Window>>>,
    listener: Mutex<Option<ListenerId>>,
    saved_push: Mutex<Option<PushStateFn>>,
}

impl PageViewPlugin {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Plugin for PageViewPlugin {
    fn name(&self) -> &'static str {
        "page-view"
    }

    fn version(&self) -> &'static str {
        "1.0.0"
    }

    async fn init(&self, context: &PluginContext) -> OmniResult<()> {
        let tracker = context.tracker.clone();
        let window = tracker.window();

        // The document is interactive once the host hands us its window.
        tracker.track_page_view(Some(PageViewProps {
            is_initial_load: true,
            ..Default::default()
        }));

        // Wrap push-state: run the original, then record the navigation.
        let previous = window.history().current();
        let wrapped_original = previous.clone();
        let tracker_for_push = tracker.clone();
        let saved = window.history().install(Arc::new(move |w: &Window, path: &str| {
            wrapped_original(w, path);
            tracker_for_push.track_page_view(None);
        }));

        let tracker_for_pop = tracker.clone();
        let listener = window.add_listener(PageEventKind::PopState, move |_, event| {
            if let PageEvent::PopState { route } = event {
                tracker_for_pop.track_page_view(Some(PageViewProps {
                    route: Some(route.clone()),
                    ..Default::default()
                }));
            }
        });

        *self.window.lock().expect("plugin mutex poisoned") = Some(window);
        *self.saved_push.lock().expect("plugin mutex poisoned") = Some(saved);
        *self.listener.lock().expect("plugin mutex poisoned") = Some(listener);
        Ok(())
    }

    async fn destroy(&self) -> OmniResult<()> {
        let window = self.window.lock().expect("plugin mutex poisoned").take();
        if let Some(window) = window {
            if let Some(saved) = self.saved_push.lock().expect("plugin mutex poisoned").take() {
                window.history().restore(saved);
            }
            if let Some(listener) = self.listener.lock().expect("plugin mutex poisoned").take() {
                window.remove_listener(listener);
            }
        }
        Ok(())
    }
}
