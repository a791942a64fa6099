//! Host integration hooks for micro-rs
//!
//! The host owns the real event streams and the script-injection mechanism.
//! This module defines the traits it implements, the adapter that turns host
//! request details into classifier input, and the document-blocking policy
//! that belongs to the host side rather than the classifier.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info, log, warn, Level};

use crate::config::MicroConfig;
use crate::engine::{FilterEngine, Injection, Request, Verdict};
use crate::origin::extract_domain;
use crate::stats::StatsCollector;
use crate::tabs::{FrameId, TabId, TabStore};

/// An intercepted request as the host reports it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDetails {
    /// Tab the request belongs to
    pub tab_id: TabId,
    /// Frame the request was made from
    pub frame_id: FrameId,
    /// Requesting document URL, when the host knows it
    pub document_url: Option<String>,
    /// Requested URL
    pub url: String,
    /// Host resource type
    pub resource_type: String,
}

/// Host mechanism that runs a script inside a frame
pub trait ScriptInjector: Send + Sync {
    /// Run `source` in the given frame; fire and forget
    fn inject_script(&self, tab: TabId, frame: FrameId, source: &str);
}

/// Receiver of host navigation and request events
pub trait EventListener: Send + Sync {
    /// A frame committed a new document
    fn on_document_committed(&self, tab: TabId, frame: FrameId, url: &str);

    /// A tab was closed
    fn on_tab_removed(&self, tab: TabId);

    /// A request is about to be sent
    fn on_before_request(&self, details: &RequestDetails) -> Verdict;
}

/// Host event stream that listeners attach to
pub trait EventSource: Send + Sync {
    /// Start delivering events to `listener`
    fn add_listener(&self, listener: Arc<dyn EventListener>);

    /// Stop delivering events to `listener`
    fn remove_listener(&self, listener: &Arc<dyn EventListener>);
}

/// One listener bound to one event source.
///
/// The listener object is created once; attaching and detaching are
/// idempotent so repeated init/teardown cycles never register it twice.
pub struct ListenerHandle {
    source: Arc<dyn EventSource>,
    listener: Arc<dyn EventListener>,
    attached: AtomicBool,
}

impl ListenerHandle {
    /// Bind a listener to a source without attaching it
    pub fn new(source: Arc<dyn EventSource>, listener: Arc<dyn EventListener>) -> Self {
        Self {
            source,
            listener,
            attached: AtomicBool::new(false),
        }
    }

    /// Attach the listener; returns false if it already was
    pub fn attach(&self) -> bool {
        if self.attached.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.source.add_listener(Arc::clone(&self.listener));
        true
    }

    /// Detach the listener; returns false if it was not attached
    pub fn detach(&self) -> bool {
        if !self.attached.swap(false, Ordering::SeqCst) {
            return false;
        }
        self.source.remove_listener(&self.listener);
        true
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.detach();
    }
}

/// Adapter between host events and the filter engine
pub struct NetworkHooks {
    config: Arc<MicroConfig>,
    engine: Arc<FilterEngine>,
    tabs: Arc<TabStore>,
    stats: Arc<StatsCollector>,
    injector: Arc<dyn ScriptInjector>,
    active: AtomicBool,
}

impl NetworkHooks {
    /// Create an inactive adapter
    pub fn new(
        config: Arc<MicroConfig>,
        engine: Arc<FilterEngine>,
        tabs: Arc<TabStore>,
        stats: Arc<StatsCollector>,
        injector: Arc<dyn ScriptInjector>,
    ) -> Self {
        Self {
            config,
            engine,
            tabs,
            stats,
            injector,
            active: AtomicBool::new(false),
        }
    }

    /// Start or stop filtering; inactive hooks allow everything
    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }

    /// Whether requests are currently filtered
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst) && self.config.general.enabled
    }

    /// Requesting document of an intercepted request.
    ///
    /// Falls back to the side table when the host did not supply one.
    pub fn resolve_requester(&self, details: &RequestDetails) -> String {
        match details.document_url.as_deref() {
            Some(url) if !url.is_empty() => url.to_string(),
            _ => self.tabs.get(details.tab_id, details.frame_id),
        }
    }

    /// Classify an intercepted request and apply the host policy
    pub fn analyze_request(&self, details: &RequestDetails) -> Verdict {
        if !self.is_active() {
            return Verdict::Allow;
        }

        let request = Request::new(
            self.resolve_requester(details),
            details.url.as_str(),
            &details.resource_type,
        );
        let verdict = self.engine.classify(&request);
        let verdict = self.apply_document_policy(&request, verdict);

        let domain = extract_domain(&request.destination_url).unwrap_or_default();
        let level = if self.config.general.debug_mode {
            Level::Info
        } else {
            Level::Debug
        };
        match &verdict {
            Verdict::Block => {
                log!(level, "Canceled a request to '{}'", request.destination_url);
            }
            Verdict::Redirect(_) => {
                log!(level, "Redirected a request to '{}'", request.destination_url);
            }
            _ => {}
        }
        self.stats.record_verdict(&domain, &request.resource_type, &verdict);

        verdict
    }

    /// Serve the frame-blocked asset for blocked documents when configured.
    ///
    /// Some hosts cannot cancel document loads; redirecting them to a
    /// placeholder page is the only way to stop them.
    pub fn apply_document_policy(&self, request: &Request, verdict: Verdict) -> Verdict {
        let policy = &self.config.policy;
        if !policy.redirect_blocked_documents || !request.is_document() {
            return verdict;
        }
        if !matches!(verdict, Verdict::Block | Verdict::Redirect(_)) {
            return verdict;
        }

        let snapshot = self.engine.snapshot();
        match snapshot.assets.get(&policy.frame_blocked_asset) {
            Some(asset) => Verdict::Redirect(asset.payload.clone()),
            None => {
                warn!(
                    "Frame blocked asset '{}' not found, canceling '{}'",
                    policy.frame_blocked_asset, request.destination_url
                );
                Verdict::Block
            }
        }
    }

    /// Track a committed document and run matching inject rules in it
    pub fn document_committed(&self, tab: TabId, frame: FrameId, url: &str) -> Vec<Verdict> {
        self.tabs.set(tab, frame, url);
        if !self.is_active() {
            return Vec::new();
        }

        let mut verdicts = Vec::new();
        for injection in self.engine.injections(url) {
            let injected = matches!(injection, Injection::Script { .. });
            self.stats.record_injection(injected);

            if let Injection::Script { asset, source } = &injection {
                debug!("Injecting '{}' into tab {} frame {}", asset, tab, frame);
                self.injector.inject_script(tab, frame, source);
            }
            verdicts.extend(injection.verdict());
        }
        verdicts
    }

    /// Forget a closed tab
    pub fn tab_removed(&self, tab: TabId) {
        self.tabs.remove_tab(tab);
    }
}

impl EventListener for NetworkHooks {
    fn on_document_committed(&self, tab: TabId, frame: FrameId, url: &str) {
        let injected = self.document_committed(tab, frame, url);
        if !injected.is_empty() {
            info!("Injected {} script(s) into '{}'", injected.len(), url);
        }
    }

    fn on_tab_removed(&self, tab: TabId) {
        self.tab_removed(tab);
    }

    fn on_before_request(&self, details: &RequestDetails) -> Verdict {
        self.analyze_request(details)
    }
}
