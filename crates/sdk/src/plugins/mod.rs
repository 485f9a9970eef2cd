//! Plugin registry — lifecycle for extensions that emit through the tracker.
//! The built-in page-view, click, and snapshot capture are plugins over the
//! same registry; they hold no privileged access beyond [`PluginContext`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{debug, warn};

use omni_core::config::Configuration;
use omni_core::error::{OmniError, OmniResult};

use crate::tracker::Tracker;

pub mod click;
pub mod page_view;
pub mod snapshot;

pub use click::ClickPlugin;
pub use page_view::PageViewPlugin;
pub use snapshot::SnapshotPlugin;

/// What a plugin gets to work with. The ambient `tracing` subscriber serves
/// as the logger.
#[derive(Clone)]
pub struct PluginContext {
    pub tracker: Arc<Tracker>,
    pub config: Arc<Configuration>,
}

#[async_trait]
pub trait Plugin: Send + Sync {
    /// Unique within a registry.
    fn name(&self) -> &'static str;

    /// Semver.
    fn version(&self) -> &'static str;

    async fn init(&self, context: &PluginContext) -> OmniResult<()>;

    async fn destroy(&self) -> OmniResult<()> {
        Ok(())
    }

    fn pause(&self) {}

    fn resume(&self) {}
}

pub struct PluginRegistry {
    plugins: Mutex<Vec<Arc<dyn Plugin>>>,
    initialized: AtomicBool,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self {
            plugins: Mutex::new(Vec::new()),
            initialized: AtomicBool::new(false),
        }
    }

    /// Valid only before `initialize`; duplicate names fail.
    pub fn register(&self, plugin: Arc<dyn Plugin>) -> OmniResult<()> {
        if self.initialized.load(Ordering::Acquire) {
            return Err(OmniError::Plugin(format!(
                "cannot register '{}' after initialization",
                plugin.name()
            )));
        }
        let mut plugins = self.plugins.lock().expect("registry mutex poisoned");
        if plugins.iter().any(|p| p.name() == plugin.name()) {
            return Err(OmniError::Plugin(format!(
                "plugin '{}' already registered",
                plugin.name()
            )));
        }
        plugins.push(plugin);
        Ok(())
    }

    /// Initialize plugins sequentially. A failing plugin is logged and
    /// skipped; the rest still come up.
    pub async fn initialize(&self, context: &PluginContext) {
        let plugins = self.snapshot();
        for plugin in plugins {
            match plugin.init(context).await {
                Ok(()) => debug!(
                    plugin = plugin.name(),
                    version = plugin.version(),
                    "plugin initialized"
                ),
                Err(e) => warn!(
                    plugin = plugin.name(),
                    error = %e,
                    "plugin failed to initialize, continuing without it"
                ),
            }
        }
        self.initialized.store(true, Ordering::Release);
    }

    pub fn pause_all(&self) {
        for plugin in self.snapshot() {
            plugin.pause();
        }
    }

    pub fn resume_all(&self) {
        for plugin in self.snapshot() {
            plugin.resume();
        }
    }

    /// Destroy every plugin, clear the registry, and allow re-registration.
    pub async fn destroy(&self) {
        let plugins = {
            let mut plugins = self.plugins.lock().expect("registry mutex poisoned");
            std::mem::take(&mut *plugins)
        };
        for plugin in plugins {
            if let Err(e) = plugin.destroy().await {
                warn!(plugin = plugin.name(), error = %e, "plugin destroy failed");
            }
        }
        self.initialized.store(false, Ordering::Release);
    }

    pub fn plugin_count(&self) -> usize {
        self.plugins.lock().expect("registry mutex poisoned").len()
    }

    fn snapshot(&self) -> Vec<Arc<dyn Plugin>> {
        self.plugins
            .lock()
            .expect("registry mutex poisoned")
            .clone()
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}
