//! Navigation side table
//!
//! Remembers the committed URL of every (tab, frame) pair so that requests
//! without a document URL can still be attributed to a requester.

use ahash::AHashMap;
use parking_lot::RwLock;

/// Host tab identifier
pub type TabId = i32;

/// Host frame identifier, `0` is the top-level frame
pub type FrameId = i32;

/// Per-tab, per-frame committed URLs
#[derive(Debug, Default)]
pub struct TabStore {
    tabs: RwLock<AHashMap<TabId, AHashMap<FrameId, String>>>,
}

impl TabStore {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed URL of a frame, empty when unknown
    pub fn get(&self, tab: TabId, frame: FrameId) -> String {
        self.tabs
            .read()
            .get(&tab)
            .and_then(|frames| frames.get(&frame))
            .cloned()
            .unwrap_or_default()
    }

    /// Record the committed URL of a frame
    pub fn set(&self, tab: TabId, frame: FrameId, url: impl Into<String>) {
        self.tabs
            .write()
            .entry(tab)
            .or_default()
            .insert(frame, url.into());
    }

    /// Forget a closed tab and all of its frames
    pub fn remove_tab(&self, tab: TabId) {
        self.tabs.write().remove(&tab);
    }

    /// Forget every tab
    pub fn clear(&self) {
        self.tabs.write().clear();
    }

    /// Number of tracked tabs
    pub fn tab_count(&self) -> usize {
        self.tabs.read().len()
    }
}
