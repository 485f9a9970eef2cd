//! Page host model — the window the auto-capture plugins observe. Holds the
//! location, document tree, and viewport; dispatches click, popstate, and
//! mutation events to registered listeners; and exposes a history whose
//! push-state function is a swappable reference so instrumentation can wrap
//! navigation and restore the original on teardown.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::debug;
use url::Url;

use omni_core::error::{OmniError, OmniResult};

use crate::node::{Element, NodePath};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageEventKind {
    Click,
    PopState,
    DomMutation,
}

#[derive(Debug, Clone)]
pub enum PageEvent {
    Click { target: NodePath, x: f64, y: f64 },
    PopState { route: String },
    DomMutation,
}

impl PageEvent {
    pub fn kind(&self) -> PageEventKind {
        match self {
            PageEvent::Click { .. } => PageEventKind::Click,
            PageEvent::PopState { .. } => PageEventKind::PopState,
            PageEvent::DomMutation => PageEventKind::DomMutation,
        }
    }
}

type PageCallback = Arc<dyn Fn(&Window, &PageEvent) + Send + Sync>;

/// The history push-state function. Instrumentation swaps this reference and
/// must restore the saved original on teardown; `Arc::ptr_eq` observes both.
pub type PushStateFn = Arc<dyn Fn(&Window, &str) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ListenerId(u64);

struct ListenerEntry {
    id: ListenerId,
    kind: PageEventKind,
    callback: PageCallback,
}

struct PageState {
    location: Url,
    referrer: String,
    title: String,
    viewport: (u32, u32),
    document: Element,
}

pub struct History {
    original: PushStateFn,
    current: Mutex<PushStateFn>,
}

impl History {
    fn new() -> Self {
        let original: PushStateFn = Arc::new(|window: &Window, path: &str| {
            window.apply_navigation(path);
        });
        Self {
            current: Mutex::new(original.clone()),
            original,
        }
    }

    /// Swap in a replacement push-state function, returning the previous one
    /// so the caller can restore it later.
    pub fn install(&self, f: PushStateFn) -> PushStateFn {
        std::mem::replace(
            &mut *self.current.lock().expect("history mutex poisoned"),
            f,
        )
    }

    pub fn restore(&self, f: PushStateFn) {
        *self.current.lock().expect("history mutex poisoned") = f;
    }

    pub fn current(&self) -> PushStateFn {
        self.current.lock().expect("history mutex poisoned").clone()
    }

    /// The built-in navigation behavior this window started with.
    pub fn original(&self) -> PushStateFn {
        self.original.clone()
    }
}

pub struct Window {
    state: Mutex<PageState>,
    listeners: Mutex<Vec<ListenerEntry>>,
    next_listener_id: AtomicU64,
    history: History,
}

impl Window {
    pub fn new(url: &str, document: Element) -> OmniResult<Self> {
        let location =
            Url::parse(url).map_err(|e| OmniError::Config(format!("invalid page url: {e}")))?;
        Ok(Self {
            state: Mutex::new(PageState {
                location,
                referrer: String::new(),
                title: String::new(),
                viewport: (1280, 800),
                document,
            }),
            listeners: Mutex::new(Vec::new()),
            next_listener_id: AtomicU64::new(1),
            history: History::new(),
        })
    }

    pub fn url(&self) -> String {
        self.state().location.to_string()
    }

    /// Pathname of the current location.
    pub fn route(&self) -> String {
        self.state().location.path().to_string()
    }

    pub fn referrer(&self) -> String {
        self.state().referrer.clone()
    }

    pub fn set_referrer(&self, referrer: impl Into<String>) {
        self.state().referrer = referrer.into();
    }

    pub fn title(&self) -> String {
        self.state().title.clone()
    }

    pub fn set_title(&self, title: impl Into<String>) {
        self.state().title = title.into();
    }

    pub fn viewport(&self) -> (u32, u32) {
        self.state().viewport
    }

    pub fn set_viewport(&self, width: u32, height: u32) {
        self.state().viewport = (width, height);
    }

    /// Scroll dimensions of the full page, from the document root's rect.
    pub fn page_size(&self) -> (u32, u32) {
        let state = self.state();
        (state.document.width, state.document.height)
    }

    pub fn document(&self) -> Element {
        self.state().document.clone()
    }

    /// Read the document without cloning the tree.
    pub fn with_document<R>(&self, f: impl FnOnce(&Element) -> R) -> R {
        f(&self.state().document)
    }

    /// Mutate the document and notify mutation listeners.
    pub fn mutate_document(&self, f: impl FnOnce(&mut Element)) {
        f(&mut self.state().document);
        self.dispatch(&PageEvent::DomMutation);
    }

    pub fn set_document(&self, document: Element) {
        self.state().document = document;
        self.dispatch(&PageEvent::DomMutation);
    }

    /// Built-in navigation: resolve `path` against the current location. Does
    /// not notify listeners; push-state wrapping and popstate handle that.
    pub fn apply_navigation(&self, path: &str) {
        let mut state = self.state();
        match state.location.join(path) {
            Ok(location) => state.location = location,
            Err(e) => debug!(path, error = %e, "ignoring unresolvable navigation"),
        }
    }

    /// Programmatic route change through the (possibly wrapped) push-state
    /// function.
    pub fn push_state(&self, path: &str) {
        let push = self.history.current();
        push(self, path);
    }

    /// Back/forward navigation: applies the route and fires popstate.
    pub fn pop_state(&self, path: &str) {
        self.apply_navigation(path);
        let route = self.route();
        self.dispatch(&PageEvent::PopState { route });
    }

    /// A pointer event on the node at `target`.
    pub fn click(&self, target: NodePath, x: f64, y: f64) {
        self.dispatch(&PageEvent::Click { target, x, y });
    }

    pub fn add_listener(
        &self,
        kind: PageEventKind,
        callback: impl Fn(&Window, &PageEvent) + Send + Sync + 'static,
    ) -> ListenerId {
        let id = ListenerId(self.next_listener_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .lock()
            .expect("listener mutex poisoned")
            .push(ListenerEntry {
                id,
                kind,
                callback: Arc::new(callback),
            });
        id
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock().expect("listener mutex poisoned");
        let before = listeners.len();
        listeners.retain(|entry| entry.id != id);
        listeners.len() < before
    }

    /// Number of registered listeners; teardown tests assert this reaches
    /// zero after destroy.
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().expect("listener mutex poisoned").len()
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    fn dispatch(&self, event: &PageEvent) {
        let callbacks: Vec<PageCallback> = {
            let listeners = self.listeners.lock().expect("listener mutex poisoned");
            listeners
                .iter()
                .filter(|entry| entry.kind == event.kind())
                .map(|entry| entry.callback.clone())
                .collect()
        };
        for callback in callbacks {
            callback(self, event);
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, PageState> {
        self.state.lock().expect("window mutex poisoned")
    }
}
