//! Statistics collection for micro-rs

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::engine::{LoadReport, Verdict};

/// Snapshot of collected statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Stats {
    /// Requests seen by the interception hook
    pub total_requests: u64,
    /// Requests let through, including inert replace matches
    pub allowed_requests: u64,
    /// Requests cancelled
    pub blocked_requests: u64,
    /// Requests redirected to an asset
    pub redirected_requests: u64,
    /// Replace rules that matched and were not applied
    pub replace_noops: u64,
    /// Scripts handed to the injector
    pub injected_scripts: u64,
    /// Inject rules skipped because their asset is missing
    pub skipped_injections: u64,
    /// Rules in the current snapshot
    pub rules_loaded: usize,
    /// Filter lines rejected by the last load
    pub rules_skipped: usize,
    /// Assets in the current snapshot
    pub assets_loaded: usize,
    /// Time of the last snapshot rebuild
    pub last_reload: Option<DateTime<Utc>>,
    /// Blocked or redirected requests per destination domain
    pub domains_blocked: HashMap<String, u64>,
    /// Requests per resource type
    pub request_types: HashMap<String, u64>,
}

/// Thread-safe statistics collector
#[derive(Debug, Default)]
pub struct StatsCollector {
    stats: RwLock<Stats>,
}

impl StatsCollector {
    /// Create a collector with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the verdict for one intercepted request
    pub fn record_verdict(&self, domain: &str, request_type: &str, verdict: &Verdict) {
        match verdict {
            Verdict::Block => self.record_blocked_request(domain, request_type),
            Verdict::Redirect(_) => self.record_redirected_request(domain, request_type),
            Verdict::Replace(_) => {
                self.stats.write().replace_noops += 1;
                self.record_allowed_request(domain, request_type);
            }
            Verdict::Allow | Verdict::InjectScript(_) => {
                self.record_allowed_request(domain, request_type)
            }
        }
    }

    /// Record a cancelled request
    pub fn record_blocked_request(&self, domain: &str, request_type: &str) {
        let mut stats = self.stats.write();
        stats.blocked_requests += 1;
        *stats.domains_blocked.entry(domain.to_string()).or_insert(0) += 1;
        Self::count_request(&mut stats, request_type);
    }

    /// Record a redirected request
    pub fn record_redirected_request(&self, domain: &str, request_type: &str) {
        let mut stats = self.stats.write();
        stats.redirected_requests += 1;
        *stats.domains_blocked.entry(domain.to_string()).or_insert(0) += 1;
        Self::count_request(&mut stats, request_type);
    }

    /// Record a request that was let through
    pub fn record_allowed_request(&self, _domain: &str, request_type: &str) {
        let mut stats = self.stats.write();
        stats.allowed_requests += 1;
        Self::count_request(&mut stats, request_type);
    }

    /// Record the outcome of one inject rule
    pub fn record_injection(&self, injected: bool) {
        let mut stats = self.stats.write();
        if injected {
            stats.injected_scripts += 1;
        } else {
            stats.skipped_injections += 1;
        }
    }

    /// Record a snapshot rebuild
    pub fn record_load(&self, report: &LoadReport) {
        let mut stats = self.stats.write();
        stats.rules_loaded = report.rules_loaded;
        stats.rules_skipped = report.rules_skipped;
        stats.assets_loaded = report.assets_loaded;
        stats.last_reload = Some(Utc::now());
    }

    fn count_request(stats: &mut Stats, request_type: &str) {
        stats.total_requests += 1;
        *stats.request_types.entry(request_type.to_string()).or_insert(0) += 1;
    }

    /// Get a copy of the current statistics
    pub fn get_stats(&self) -> Stats {
        self.stats.read().clone()
    }

    /// Serialize the current statistics to JSON
    pub fn to_json(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string_pretty(&*self.stats.read())?)
    }
}
