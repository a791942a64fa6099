//! Rule set and request classifier for micro-rs
//!
//! Rules and assets are compiled into a [`Snapshot`] and published with a
//! single pointer swap, so a classification always sees one consistent
//! rule set together with the assets it was loaded with.

use std::sync::Arc;
use std::time::Instant;

use log::{debug, error, info, warn};
use parking_lot::RwLock;

use crate::assets::AssetStore;
use crate::filters::{is_comment, normalize_type, Rule, RuleAction, MAIN_FRAME, SUB_FRAME};
use crate::origin::{extract_domain, is_http_url};
use crate::stats::StatsCollector;

/// One request to classify
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// URL of the requesting document, possibly empty
    pub requester_url: String,
    /// Requested URL
    pub destination_url: String,
    /// Normalized resource type
    pub resource_type: String,
}

impl Request {
    /// Build a request, normalizing its resource type
    pub fn new(
        requester_url: impl Into<String>,
        destination_url: impl Into<String>,
        resource_type: &str,
    ) -> Self {
        let resource_type = normalize_type(resource_type)
            .map(str::to_string)
            .unwrap_or_else(|| resource_type.to_ascii_lowercase());
        Self {
            requester_url: requester_url.into(),
            destination_url: destination_url.into(),
            resource_type,
        }
    }

    /// Whether this is a top-level document navigation
    pub fn is_main_frame(&self) -> bool {
        self.resource_type == MAIN_FRAME
    }

    /// Whether this loads a document, top-level or embedded
    pub fn is_document(&self) -> bool {
        self.is_main_frame() || self.resource_type == SUB_FRAME
    }
}

/// Decision for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Let the request through
    Allow,
    /// Cancel the request
    Block,
    /// Serve this `data:` URI instead
    Redirect(String),
    /// Run this script in the committed document
    InjectScript(String),
    /// A replace rule matched; not applied, hosts treat it as allow
    Replace(String),
}

impl Verdict {
    /// Whether the host must cancel the request
    pub fn cancels_request(&self) -> bool {
        matches!(self, Verdict::Block)
    }

    /// Whether the request keeps its original destination
    pub fn is_allow(&self) -> bool {
        matches!(self, Verdict::Allow | Verdict::Replace(_))
    }
}

/// Ordered, compiled filter rules
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
    skipped: usize,
}

impl RuleSet {
    /// Create an empty rule set
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse filter text; bad lines are logged, counted and skipped
    pub fn parse(text: &str) -> Self {
        let mut set = Self::new();

        for (index, line) in text.lines().enumerate() {
            let line = line.trim();
            if is_comment(line) {
                continue;
            }

            match Rule::parse(line) {
                Ok(rule) => set.rules.push(rule),
                Err(e) => {
                    warn!("Failed to parse filter on line {}: '{}': {}", index + 1, line, e);
                    set.skipped += 1;
                }
            }
        }

        if set.skipped > 0 {
            error!("Could not parse {} of the filters", set.skipped);
        }
        set
    }

    /// Append a rule with the lowest priority
    pub fn push(&mut self, rule: Rule) {
        self.rules.push(rule);
    }

    /// Rules in evaluation order
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Number of compiled rules
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether no rule is loaded
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Number of lines rejected while parsing
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

/// Rules and assets published together
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    /// Filter rules
    pub rules: RuleSet,
    /// Named assets
    pub assets: AssetStore,
}

impl Snapshot {
    /// Compile filter and asset text
    pub fn build(filter_text: &str, asset_text: &str) -> Self {
        Self {
            rules: RuleSet::parse(filter_text),
            assets: AssetStore::parse(asset_text),
        }
    }

    /// Counts describing this snapshot
    pub fn report(&self) -> LoadReport {
        LoadReport {
            rules_loaded: self.rules.len(),
            rules_skipped: self.rules.skipped(),
            assets_loaded: self.assets.len(),
        }
    }
}

/// Outcome of a snapshot rebuild
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadReport {
    /// Rules compiled
    pub rules_loaded: usize,
    /// Filter lines rejected
    pub rules_skipped: usize,
    /// Assets parsed
    pub assets_loaded: usize,
}

/// Classify a request against a rule set.
///
/// Inject rules never take part here; see [`injections`].
pub fn classify(rules: &RuleSet, assets: &AssetStore, request: &Request) -> Verdict {
    let requester = if !request.requester_url.is_empty() {
        if !is_http_url(&request.requester_url) {
            return Verdict::Allow;
        }
        request.requester_url.as_str()
    } else if request.is_main_frame() {
        request.destination_url.as_str()
    } else {
        ""
    };

    let requester_domain = extract_domain(requester);
    let rule = rules.rules().iter().find(|rule| {
        rule.action() != RuleAction::Inject
            && rule.matches(
                requester_domain.as_deref(),
                &request.destination_url,
                &request.resource_type,
            )
    });

    match rule {
        Some(rule) => resolve(rule, assets, request),
        None => Verdict::Allow,
    }
}

fn resolve(rule: &Rule, assets: &AssetStore, request: &Request) -> Verdict {
    match rule.action() {
        RuleAction::Block => {
            debug!("Blocked request to '{}' by '{}'", request.destination_url, rule);
            Verdict::Block
        }
        RuleAction::Redirect => match assets.resolve(rule.payload()) {
            Ok(asset) => {
                debug!(
                    "Redirected request to '{}' to asset '{}'",
                    request.destination_url, asset.name
                );
                Verdict::Redirect(asset.payload.clone())
            }
            Err(e) => {
                warn!("{} for '{}', blocking instead", e, rule);
                Verdict::Block
            }
        },
        RuleAction::Replace => {
            warn!(
                "Rule '{}' matched '{}' but replace is not supported, allowing",
                rule, request.destination_url
            );
            Verdict::Replace(rule.payload().to_string())
        }
        RuleAction::Inject => Verdict::Allow,
    }
}

/// Scripts to inject into a freshly committed document, in rule order.
///
/// The committed URL is both requester and destination and the type is
/// `main_frame`. Documents that are not HTTP(S) never get scripts. Rules
/// whose asset is missing are logged and skipped.
pub fn injections(rules: &RuleSet, assets: &AssetStore, committed_url: &str) -> Vec<Injection> {
    if !is_http_url(committed_url) {
        return Vec::new();
    }

    let committed_domain = extract_domain(committed_url);
    rules
        .rules()
        .iter()
        .filter(|rule| rule.action() == RuleAction::Inject)
        .filter(|rule| rule.matches(committed_domain.as_deref(), committed_url, MAIN_FRAME))
        .map(|rule| match assets.resolve(rule.payload()) {
            Ok(asset) => Injection::Script {
                asset: asset.name.clone(),
                source: asset.raw.clone(),
            },
            Err(e) => {
                warn!("{} for '{}', skipping injection", e, rule);
                Injection::MissingAsset {
                    asset: rule.payload().to_string(),
                }
            }
        })
        .collect()
}

/// Result of one matching inject rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Injection {
    /// Script source to run
    Script {
        /// Asset name
        asset: String,
        /// Raw asset payload
        source: String,
    },
    /// The rule names an asset that is not loaded
    MissingAsset {
        /// Asset name
        asset: String,
    },
}

impl Injection {
    /// The verdict for a resolved script, `None` when skipped
    pub fn verdict(&self) -> Option<Verdict> {
        match self {
            Injection::Script { source, .. } => Some(Verdict::InjectScript(source.clone())),
            Injection::MissingAsset { .. } => None,
        }
    }
}

/// Filter engine holding the published snapshot
pub struct FilterEngine {
    snapshot: RwLock<Arc<Snapshot>>,
    stats: Arc<StatsCollector>,
}

impl FilterEngine {
    /// Create an engine with an empty snapshot
    pub fn new(stats: Arc<StatsCollector>) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(Snapshot::default())),
            stats,
        }
    }

    /// Compile new text and publish it, replacing rules and assets together
    pub fn rebuild(&self, filter_text: &str, asset_text: &str) -> LoadReport {
        let start = Instant::now();
        let snapshot = Snapshot::build(filter_text, asset_text);
        let report = snapshot.report();
        self.publish(snapshot);

        info!(
            "Loaded {} rules ({} skipped) and {} assets in {:?}",
            report.rules_loaded,
            report.rules_skipped,
            report.assets_loaded,
            start.elapsed()
        );
        report
    }

    /// Publish an already built snapshot
    pub fn publish(&self, snapshot: Snapshot) {
        let report = snapshot.report();
        *self.snapshot.write() = Arc::new(snapshot);
        self.stats.record_load(&report);
    }

    /// Drop all rules and assets
    pub fn clear(&self) {
        self.publish(Snapshot::default());
    }

    /// The currently published snapshot
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshot.read().clone()
    }

    /// Classify a request against the current snapshot
    pub fn classify(&self, request: &Request) -> Verdict {
        let snapshot = self.snapshot();
        classify(&snapshot.rules, &snapshot.assets, request)
    }

    /// Inject rules matching a committed document
    pub fn injections(&self, committed_url: &str) -> Vec<Injection> {
        let snapshot = self.snapshot();
        injections(&snapshot.rules, &snapshot.assets, committed_url)
    }
}
