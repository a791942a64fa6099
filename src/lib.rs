//! # micro-rs: a small request filtering engine
//!
//! micro-rs compiles adblock-style filter text into rules and decides, for
//! each outgoing request of an embedding host (typically a browser shell),
//! whether to let it through, cancel it, or redirect it to a bundled asset.
//! It can also inject bundled scripts into freshly committed documents.
//!
//! ## Architecture
//!
//! - [`pattern`]: adblock pattern to regex compilation
//! - [`filters`]: filter line grammar and rule matching
//! - [`origin`]: domain extraction and party checks
//! - [`assets`]: named payloads served by redirect and inject rules
//! - [`engine`]: request classification over a published snapshot
//! - [`tabs`]: last committed document per tab and frame
//! - [`hooks`]: host traits and the event adapter
//! - [`storage`]: persisted filter and asset text
//! - [`config`]: configuration management and persistence
//! - [`stats`]: decision counters
//!
//! The [`Micro`] facade ties these together into an instance with an
//! init/teardown lifecycle.

#![warn(
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    bad_style,
    dead_code,
    non_shorthand_field_patterns,
    overflowing_literals,
    path_statements,
    patterns_in_fns_without_body,
    unconditional_recursion,
    unused,
    unused_allocation,
    unused_comparisons,
    unused_parens,
    while_true
)]
#![forbid(unsafe_code)]

pub mod assets;
pub mod config;
pub mod engine;
pub mod error;
pub mod filters;
pub mod hooks;
pub mod origin;
pub mod pattern;
pub mod registry;
pub mod stats;
pub mod storage;
pub mod tabs;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{error, info, warn};
use once_cell::sync::Lazy;

use crate::config::{LoggingConfig, MicroConfig};
use crate::engine::{FilterEngine, LoadReport, Verdict};
use crate::error::Result;
use crate::hooks::{
    EventListener, EventSource, ListenerHandle, NetworkHooks, RequestDetails, ScriptInjector,
};
use crate::registry::InstanceRegistry;
use crate::stats::StatsCollector;
use crate::storage::{FileStorage, Storage};
use crate::tabs::{FrameId, TabId, TabStore};

/// Process-wide registry used by [`Micro::new`]
pub static DEFAULT_REGISTRY: Lazy<Arc<InstanceRegistry>> =
    Lazy::new(|| Arc::new(InstanceRegistry::new()));

/// Everything an instance needs from its host
#[derive(Clone)]
pub struct HostBindings {
    /// Persisted filter and asset text
    pub storage: Arc<dyn Storage>,
    /// Script injection into frames
    pub injector: Arc<dyn ScriptInjector>,
    /// Navigation and request events
    pub events: Arc<dyn EventSource>,
}

impl HostBindings {
    /// Bindings that persist text under the configured data directory
    pub fn with_file_storage(
        config: &MicroConfig,
        injector: Arc<dyn ScriptInjector>,
        events: Arc<dyn EventSource>,
    ) -> Self {
        Self {
            storage: Arc::new(FileStorage::new(
                config.storage.data_dir.clone(),
                config.general.name.clone(),
            )),
            injector,
            events,
        }
    }
}

/// One named filtering instance
pub struct Micro {
    name: String,
    config: Arc<MicroConfig>,
    storage: Arc<dyn Storage>,
    engine: Arc<FilterEngine>,
    tabs: Arc<TabStore>,
    stats: Arc<StatsCollector>,
    hooks: Arc<NetworkHooks>,
    listener: ListenerHandle,
    registry: Arc<InstanceRegistry>,
    initialized: AtomicBool,
}

impl Micro {
    /// Create an instance registered in [`DEFAULT_REGISTRY`]
    pub fn new(config: MicroConfig, host: HostBindings) -> Result<Self> {
        Self::with_registry(config, host, Arc::clone(&DEFAULT_REGISTRY))
    }

    /// Create an instance registered in `registry`.
    ///
    /// Fails if the configuration is invalid or another live instance in the
    /// same registry already uses the name.
    pub fn with_registry(
        config: MicroConfig,
        host: HostBindings,
        registry: Arc<InstanceRegistry>,
    ) -> Result<Self> {
        config.validate()?;
        let name = config.general.name.clone();
        registry.claim(&name)?;

        let config = Arc::new(config);
        let stats = Arc::new(StatsCollector::new());
        let engine = Arc::new(FilterEngine::new(Arc::clone(&stats)));
        let tabs = Arc::new(TabStore::new());
        let hooks = Arc::new(NetworkHooks::new(
            Arc::clone(&config),
            Arc::clone(&engine),
            Arc::clone(&tabs),
            Arc::clone(&stats),
            host.injector,
        ));
        let listener = ListenerHandle::new(
            host.events,
            Arc::clone(&hooks) as Arc<dyn EventListener>,
        );

        info!("Created micro-rs instance '{}'", name);
        Ok(Self {
            name,
            config,
            storage: host.storage,
            engine,
            tabs,
            stats,
            hooks,
            listener,
            registry,
            initialized: AtomicBool::new(false),
        })
    }

    /// Instance name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Load persisted text, build the snapshot and attach to host events.
    ///
    /// An already initialized instance is torn down first. Storage failures
    /// are logged and treated as empty text.
    pub fn init(&self) -> LoadReport {
        if self.is_initialized() {
            self.teardown();
        }

        let filter_text = self.storage.load_filter_text().unwrap_or_else(|e| {
            error!("Instance '{}' could not load filters: {}", self.name, e);
            String::new()
        });
        let asset_text = self.storage.load_asset_text().unwrap_or_else(|e| {
            error!("Instance '{}' could not load assets: {}", self.name, e);
            String::new()
        });

        let report = self.engine.rebuild(&filter_text, &asset_text);
        self.hooks.set_active(true);
        self.listener.attach();
        self.initialized.store(true, Ordering::SeqCst);

        if !self.config.general.enabled {
            warn!("Instance '{}' is disabled, allowing every request", self.name);
        }
        info!("Instance '{}' initialized", self.name);
        report
    }

    /// Detach from host events and drop rules, assets and tab state.
    ///
    /// Calling this on an instance that is not initialized does nothing.
    pub fn teardown(&self) {
        if !self.initialized.swap(false, Ordering::SeqCst) {
            return;
        }
        self.listener.detach();
        self.hooks.set_active(false);
        self.engine.clear();
        self.tabs.clear();
        info!("Instance '{}' torn down", self.name);
    }

    /// Persist new filter text; it takes effect on the next [`Micro::init`]
    pub fn set_filters(&self, text: &str) -> Result<()> {
        self.storage.save_filter_text(text)?;
        Ok(())
    }

    /// Persist new asset text; it takes effect on the next [`Micro::init`]
    pub fn set_assets(&self, text: &str) -> Result<()> {
        self.storage.save_asset_text(text)?;
        Ok(())
    }

    /// Decide an intercepted request; uninitialized instances allow it
    pub fn intercept_request(&self, details: &RequestDetails) -> Verdict {
        self.hooks.analyze_request(details)
    }

    /// Record a committed document and return the scripts injected into it
    pub fn on_document_committed(&self, tab: TabId, frame: FrameId, url: &str) -> Vec<Verdict> {
        if !self.is_initialized() {
            return Vec::new();
        }
        self.hooks.document_committed(tab, frame, url)
    }

    /// Forget a closed tab
    pub fn on_tab_removed(&self, tab: TabId) {
        self.hooks.tab_removed(tab);
    }

    /// Last committed document URL of a frame, empty if unknown
    pub fn lookup_requester_url(&self, tab: TabId, frame: FrameId) -> String {
        self.tabs.get(tab, frame)
    }

    /// Whether [`Micro::init`] has run since the last teardown
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Get a reference to the configuration
    pub fn config(&self) -> &Arc<MicroConfig> {
        &self.config
    }

    /// Get a reference to the filter engine
    pub fn engine(&self) -> &Arc<FilterEngine> {
        &self.engine
    }

    /// Get a reference to the stats collector
    pub fn stats(&self) -> &Arc<StatsCollector> {
        &self.stats
    }
}

impl Drop for Micro {
    fn drop(&mut self) {
        self.teardown();
        self.registry.release(&self.name);
    }
}

/// Set up logging from the logging configuration.
///
/// `RUST_LOG` still overrides the configured level. Returns false when a
/// logger was already installed.
pub fn init_logging(config: &LoggingConfig) -> bool {
    let mut builder = env_logger::Builder::new();
    builder
        .parse_filters(&config.level)
        .target(env_logger::Target::Stderr);
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    if !config.timestamps {
        builder.format_timestamp(None);
    }
    builder.try_init().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use parking_lot::Mutex;

    struct NullInjector;

    impl ScriptInjector for NullInjector {
        fn inject_script(&self, _tab: TabId, _frame: FrameId, _source: &str) {}
    }

    #[derive(Default)]
    struct Events {
        listeners: Mutex<Vec<Arc<dyn EventListener>>>,
    }

    impl EventSource for Events {
        fn add_listener(&self, listener: Arc<dyn EventListener>) {
            self.listeners.lock().push(listener);
        }

        fn remove_listener(&self, listener: &Arc<dyn EventListener>) {
            self.listeners.lock().retain(|l| !Arc::ptr_eq(l, listener));
        }
    }

    fn bindings(events: &Arc<Events>) -> HostBindings {
        HostBindings {
            storage: Arc::new(MemoryStorage::new("t")),
            injector: Arc::new(NullInjector),
            events: Arc::clone(events) as Arc<dyn EventSource>,
        }
    }

    fn named(name: &str) -> MicroConfig {
        let mut config = MicroConfig::default();
        config.general.name = name.to_string();
        config
    }

    #[test]
    fn test_lifecycle() {
        let registry = Arc::new(InstanceRegistry::new());
        let events = Arc::new(Events::default());
        let micro = Micro::with_registry(named("life"), bindings(&events), Arc::clone(&registry)).unwrap();

        assert!(!micro.is_initialized());
        micro.set_filters("||ads.com^\n").unwrap();
        let report = micro.init();
        assert_eq!(report.rules_loaded, 1);
        assert!(micro.is_initialized());
        assert_eq!(events.listeners.lock().len(), 1);

        micro.init();
        assert_eq!(events.listeners.lock().len(), 1);

        micro.teardown();
        micro.teardown();
        assert!(events.listeners.lock().is_empty());
        assert!(micro.engine().snapshot().rules.is_empty());
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let registry = Arc::new(InstanceRegistry::new());
        let events = Arc::new(Events::default());
        let first = Micro::with_registry(named("dup"), bindings(&events), Arc::clone(&registry)).unwrap();
        assert!(Micro::with_registry(named("dup"), bindings(&events), Arc::clone(&registry)).is_err());

        drop(first);
        assert!(Micro::with_registry(named("dup"), bindings(&events), registry).is_ok());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let registry = Arc::new(InstanceRegistry::new());
        let events = Arc::new(Events::default());
        let result = Micro::with_registry(named("has space"), bindings(&events), Arc::clone(&registry));
        assert!(result.is_err());
        assert!(!registry.contains("has space"));
    }

    #[test]
    fn test_init_logging_is_repeatable() {
        let config = LoggingConfig::default();
        init_logging(&config);
        assert!(!init_logging(&config));
    }
}
