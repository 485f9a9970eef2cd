//! Omnilytics SDK — the container that wires configuration, identity, the
//! batching queue, the tracker, and the auto-capture plugins together.
//!
//! The container is an owner type: [`Sdk::builder`] produces it, [`Sdk::destroy`]
//! tears it down (detaching listeners, restoring the history function, and
//! attempting a final flush). There is no hidden process-global.
//!
//! ```no_run
//! use std::sync::Arc;
//! use omni_core::SdkConfig;
//! use omni_dom::{Element, Window};
//! use omni_sdk::Sdk;
//!
//! # async fn run() -> omni_core::OmniResult<()> {
//! let window = Arc::new(Window::new(
//!     "https://shop.example.com/",
//!     Element::new("html").with_child(Element::new("body")),
//! )?);
//! let sdk = Sdk::builder(SdkConfig::new("p1", "https://ingest.example.com/collect"))
//!     .window(window)
//!     .initialize()
//!     .await?;
//! sdk.tracker().track_custom("signup", None);
//! sdk.destroy().await;
//! # Ok(())
//! # }
//! ```

pub mod plugins;
pub mod tracker;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::info;

use omni_core::config::{Configuration, SdkConfig};
use omni_core::error::{OmniError, OmniResult};
use omni_core::identity::SessionManager;
use omni_core::storage::{memory_store, KeyValueStore};
use omni_dom::Window;
use omni_transport::{BeaconTransmitter, EventQueue, HttpTransmitter, Transmitter};

use plugins::{ClickPlugin, PageViewPlugin, Plugin, PluginContext, PluginRegistry, SnapshotPlugin};
use tracker::Tracker;

pub use plugins::{Plugin as SdkPlugin, PluginContext as SdkPluginContext};
pub use tracker::{PageViewProps, SessionCounters, Tracker as SdkTracker, TrackerState};

pub struct SdkBuilder {
    config: SdkConfig,
    window: Option<Arc<Window>>,
    store: Option<Arc<dyn KeyValueStore>>,
    transmitters: Vec<Arc<dyn Transmitter>>,
    plugins: Vec<Arc<dyn Plugin>>,
}

impl SdkBuilder {
    /// The page to observe. Required.
    pub fn window(mut self, window: Arc<Window>) -> Self {
        self.window = Some(window);
        self
    }

    /// Persistent identity store. Defaults to a volatile in-memory store.
    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Replace the default HTTP + beacon transmitters. May be called multiple
    /// times; all supplied transmitters participate in priority order.
    pub fn transmitter(mut self, transmitter: Arc<dyn Transmitter>) -> Self {
        self.transmitters.push(transmitter);
        self
    }

    /// Register an extension plugin alongside the built-ins.
    pub fn plugin(mut self, plugin: Arc<dyn Plugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    /// Validate configuration, wire the components, and initialize plugins.
    /// Fails synchronously on configuration errors only.
    pub async fn initialize(self) -> OmniResult<Sdk> {
        let explicit_client_id = self.config.client_id.is_some();
        let config = Arc::new(Configuration::new(self.config)?);

        let window = self
            .window
            .ok_or_else(|| OmniError::Config("a window is required".into()))?;
        let store: Arc<dyn KeyValueStore> = self
            .store
            .unwrap_or_else(|| memory_store() as Arc<dyn KeyValueStore>);

        let identity = Arc::new(SessionManager::new(
            store,
            config.session_storage_key(),
            config.session_timeout_ms(),
        ));

        // An explicit client id overrides whatever the store holds; otherwise
        // a previously persisted id wins over the generated one.
        if explicit_client_id {
            identity.persist_client_id(&config.client_id());
        } else if let Some(stored) = identity.load_client_id() {
            config.set_client_id(stored);
        } else {
            identity.persist_client_id(&config.client_id());
        }

        let transmitters = if self.transmitters.is_empty() {
            vec![
                Arc::new(HttpTransmitter::new(config.endpoint(), config.transport())?)
                    as Arc<dyn Transmitter>,
                Arc::new(BeaconTransmitter::new(config.endpoint())?) as Arc<dyn Transmitter>,
            ]
        } else {
            self.transmitters
        };

        let queue = EventQueue::new(transmitters, &config);
        let tracker = Arc::new(Tracker::new(
            config.clone(),
            identity.clone(),
            window.clone(),
            queue.clone(),
        ));

        let registry = PluginRegistry::new();
        registry.register(Arc::new(PageViewPlugin::new()))?;
        registry.register(Arc::new(ClickPlugin::new()))?;
        if config.snapshot().enabled && !config.privacy().disable_snapshots {
            registry.register(Arc::new(SnapshotPlugin::new()))?;
        }
        for plugin in self.plugins {
            registry.register(plugin)?;
        }

        let context = PluginContext {
            tracker: tracker.clone(),
            config: config.clone(),
        };
        registry.initialize(&context).await;

        info!(
            project_id = config.project_id(),
            client_id = %config.client_id(),
            session_id = %identity.session_id(),
            "sdk initialized"
        );

        Ok(Sdk {
            container: Arc::new(Container {
                config,
                window,
                identity,
                queue,
                tracker,
                registry,
                destroyed: AtomicBool::new(false),
            }),
        })
    }
}

struct Container {
    config: Arc<Configuration>,
    window: Arc<Window>,
    identity: Arc<SessionManager>,
    queue: EventQueue,
    tracker: Arc<Tracker>,
    registry: PluginRegistry,
    destroyed: AtomicBool,
}

/// The initialized SDK. Owns every component; dropping it without calling
/// [`Sdk::destroy`] leaves listeners attached to the window.
pub struct Sdk {
    container: Arc<Container>,
}

impl Sdk {
    pub fn builder(config: SdkConfig) -> SdkBuilder {
        SdkBuilder {
            config,
            window: None,
            store: None,
            transmitters: Vec::new(),
            plugins: Vec::new(),
        }
    }

    pub fn tracker(&self) -> Arc<Tracker> {
        self.container.tracker.clone()
    }

    pub fn config(&self) -> Arc<Configuration> {
        self.container.config.clone()
    }

    pub fn window(&self) -> Arc<Window> {
        self.container.window.clone()
    }

    pub fn session_id(&self) -> String {
        self.container.identity.session_id()
    }

    pub async fn flush(&self) {
        self.container.queue.flush().await;
    }

    /// Suspend capture without tearing anything down.
    pub fn pause(&self) {
        self.container.tracker.pause();
        self.container.registry.pause_all();
    }

    pub fn resume(&self) {
        self.container.registry.resume_all();
        self.container.tracker.resume();
    }

    /// Tear down: plugins detach their listeners and restore the history
    /// function, the tracker stops accepting events, and the queue attempts
    /// a final flush. Safe to call more than once.
    pub async fn destroy(&self) {
        if self.container.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.container.registry.destroy().await;
        self.container.tracker.mark_destroyed();
        self.container.queue.destroy().await;
        info!(project_id = self.container.config.project_id(), "sdk destroyed");
    }
}
