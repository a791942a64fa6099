//! Named asset store
//!
//! Assets are the payloads that redirect and inject rules point at. The text
//! format is a list of blocks separated by blank lines; the first line of a
//! block is `<name> <mime>` and the remaining lines are the raw payload.

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use log::{debug, warn};

use crate::error::AssetError;

/// A named payload usable as redirect target or script source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    /// Unique asset name
    pub name: String,
    /// Declared MIME type, possibly with `;base64`
    pub mime: String,
    /// Payload as written in the asset text
    pub raw: String,
    /// Ready-to-serve `data:` URI
    pub payload: String,
}

impl Asset {
    /// Build an asset and its data URI
    pub fn new(name: impl Into<String>, mime: impl Into<String>, raw: impl Into<String>) -> Self {
        let name = name.into();
        let mime = mime.into();
        let raw = raw.into();
        let payload = data_uri(&mime, &raw);
        Self {
            name,
            mime,
            raw,
            payload,
        }
    }

}

fn data_uri(mime: &str, raw: &str) -> String {
    if mime.contains(";base64") {
        format!("data:{},{}", mime, raw)
    } else {
        format!("data:{};base64,{}", mime, STANDARD.encode(raw))
    }
}

/// Assets keyed by name
#[derive(Debug, Clone, Default)]
pub struct AssetStore {
    assets: HashMap<String, Asset>,
}

impl AssetStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse asset text; malformed blocks are logged and dropped
    pub fn parse(text: &str) -> Self {
        let mut store = Self::new();
        let mut block: Vec<&str> = Vec::new();

        // Trailing sentinel flushes a last block without a blank line after it
        for line in text.lines().chain(std::iter::once("")) {
            let line = line.trim_end();
            if line.trim_start().starts_with('#') {
                continue;
            }

            if !line.trim().is_empty() {
                block.push(line);
                continue;
            }

            if block.is_empty() {
                continue;
            }
            match parse_block(&block) {
                Ok(asset) => store.insert(asset),
                Err(e) => warn!("Skipping asset block: {}", e),
            }
            block.clear();
        }

        store
    }

    /// Add an asset, replacing any previous asset with the same name
    pub fn insert(&mut self, asset: Asset) {
        if let Some(previous) = self.assets.insert(asset.name.clone(), asset) {
            debug!("Asset '{}' redefined, keeping the last definition", previous.name);
        }
    }

    /// Look up an asset by name
    pub fn get(&self, name: &str) -> Option<&Asset> {
        self.assets.get(name)
    }

    /// Look up an asset that a rule depends on
    pub fn resolve(&self, name: &str) -> Result<&Asset, AssetError> {
        self.get(name).ok_or_else(|| AssetError::NotFound {
            name: name.to_string(),
        })
    }

    /// Number of assets
    pub fn len(&self) -> usize {
        self.assets.len()
    }

    /// Whether the store holds no assets
    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}

fn parse_block(block: &[&str]) -> Result<Asset, AssetError> {
    let mut header = block[0].split_whitespace();
    let name = header.next().unwrap_or_default();
    let mime = header.next().ok_or_else(|| AssetError::MissingMime {
        name: name.to_string(),
    })?;
    // Encoded payloads are one token split over lines
    let raw = if mime.contains(";base64") {
        block[1..].iter().map(|line| line.trim()).collect::<String>()
    } else {
        block[1..].join("\n")
    };
    Ok(Asset::new(name, mime, raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_block() {
        let store = AssetStore::parse("foo text/plain\nhello\n\n");
        let asset = store.get("foo").unwrap();
        assert_eq!(asset.name, "foo");
        assert_eq!(asset.mime, "text/plain");
        assert_eq!(asset.raw, "hello");
        assert_eq!(asset.payload, "data:text/plain;base64,aGVsbG8=");
    }

    #[test]
    fn test_last_block_without_blank_line() {
        let store = AssetStore::parse("foo text/plain\nhello");
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("foo").unwrap().raw, "hello");
    }

    #[test]
    fn test_multiple_blocks_and_comments() {
        let text = "# resources\n\
                    noop.js application/javascript\n\
                    (function() {\n\
                    })();\n\
                    \n\
                    \n\
                    # pixel\n\
                    1x1.gif image/gif;base64\n\
                    R0lGODlhAQABAAAAACw=\n";
        let store = AssetStore::parse(text);
        assert_eq!(store.len(), 2);

        let script = store.get("noop.js").unwrap();
        assert_eq!(script.raw, "(function() {\n})();");
        assert!(script.payload.starts_with("data:application/javascript;base64,"));

        let gif = store.get("1x1.gif").unwrap();
        assert_eq!(gif.payload, "data:image/gif;base64,R0lGODlhAQABAAAAACw=");
    }

    #[test]
    fn test_multiline_base64_is_concatenated() {
        let store = AssetStore::parse("px image/gif;base64\nR0lGODlhAQAB\n  AIAAAAAAAP8=\n");
        let asset = store.get("px").unwrap();
        assert_eq!(asset.raw, "R0lGODlhAQABAIAAAAAAAP8=");
        assert_eq!(asset.payload, "data:image/gif;base64,R0lGODlhAQABAIAAAAAAAP8=");
        assert!(!asset.payload.contains('\n'));
    }

    #[test]
    fn test_duplicate_name_last_wins() {
        let store = AssetStore::parse("a text/plain\none\n\na text/plain\ntwo\n");
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("a").unwrap().raw, "two");
    }

    #[test]
    fn test_header_without_mime_is_dropped() {
        let store = AssetStore::parse("broken\nbody\n\nok text/plain\nx\n");
        assert_eq!(store.len(), 1);
        assert!(store.get("broken").is_none());
    }

    #[test]
    fn test_empty_body() {
        let store = AssetStore::parse("empty text/html\n");
        assert_eq!(store.get("empty").unwrap().payload, "data:text/html;base64,");
    }

    #[test]
    fn test_resolve_missing() {
        let store = AssetStore::new();
        assert!(matches!(store.resolve("nope"), Err(AssetError::NotFound { .. })));
    }
}
