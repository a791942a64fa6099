//! Persisted filter and asset text
//!
//! The engine never keeps text around itself; it reads both documents from a
//! [`Storage`] on every initialization. Writes only take effect on the next
//! initialization.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use crate::error::StorageError;

/// Host-provided persistence for filter and asset text
pub trait Storage: Send + Sync {
    /// Read the filter text, empty if none was saved
    fn load_filter_text(&self) -> Result<String, StorageError>;

    /// Read the asset text, empty if none was saved
    fn load_asset_text(&self) -> Result<String, StorageError>;

    /// Persist the filter text
    fn save_filter_text(&self, text: &str) -> Result<(), StorageError>;

    /// Persist the asset text
    fn save_asset_text(&self, text: &str) -> Result<(), StorageError>;
}

const FILTERS_PREFIX: &str = "filters";
const ASSETS_PREFIX: &str = "assets";

fn storage_key(prefix: &str, name: &str) -> String {
    if name.is_empty() {
        prefix.to_string()
    } else {
        format!("{}_{}", prefix, name)
    }
}

/// Text files in a data directory, one pair per instance name
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
    name: String,
}

impl FileStorage {
    /// Storage for the instance `name` under `dir`
    pub fn new(dir: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            name: name.into(),
        }
    }

    /// Path of the filter text file
    pub fn filter_path(&self) -> PathBuf {
        self.dir.join(format!("{}.txt", storage_key(FILTERS_PREFIX, &self.name)))
    }

    /// Path of the asset text file
    pub fn asset_path(&self) -> PathBuf {
        self.dir.join(format!("{}.txt", storage_key(ASSETS_PREFIX, &self.name)))
    }

    fn read(path: &Path) -> Result<String, StorageError> {
        match fs::read_to_string(path) {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(StorageError::ReadFailed {
                key: path.display().to_string(),
                reason: e.to_string(),
            }),
        }
    }

    fn write(&self, path: &Path, text: &str) -> Result<(), StorageError> {
        let result = fs::create_dir_all(&self.dir).and_then(|_| fs::write(path, text));
        result.map_err(|e| StorageError::WriteFailed {
            key: path.display().to_string(),
            reason: e.to_string(),
        })
    }
}

impl Storage for FileStorage {
    fn load_filter_text(&self) -> Result<String, StorageError> {
        Self::read(&self.filter_path())
    }

    fn load_asset_text(&self) -> Result<String, StorageError> {
        Self::read(&self.asset_path())
    }

    fn save_filter_text(&self, text: &str) -> Result<(), StorageError> {
        self.write(&self.filter_path(), text)
    }

    fn save_asset_text(&self, text: &str) -> Result<(), StorageError> {
        self.write(&self.asset_path(), text)
    }
}

/// In-memory storage, mainly for embedding and tests
#[derive(Debug, Default)]
pub struct MemoryStorage {
    name: String,
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStorage {
    /// Empty storage for the instance `name`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn load(&self, prefix: &str) -> String {
        self.entries
            .read()
            .get(&storage_key(prefix, &self.name))
            .cloned()
            .unwrap_or_default()
    }

    fn save(&self, prefix: &str, text: &str) {
        self.entries
            .write()
            .insert(storage_key(prefix, &self.name), text.to_string());
    }
}

impl Storage for MemoryStorage {
    fn load_filter_text(&self) -> Result<String, StorageError> {
        Ok(self.load(FILTERS_PREFIX))
    }

    fn load_asset_text(&self) -> Result<String, StorageError> {
        Ok(self.load(ASSETS_PREFIX))
    }

    fn save_filter_text(&self, text: &str) -> Result<(), StorageError> {
        self.save(FILTERS_PREFIX, text);
        Ok(())
    }

    fn save_asset_text(&self, text: &str) -> Result<(), StorageError> {
        self.save(ASSETS_PREFIX, text);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_storage_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path().join("data"), "main");

        assert_eq!(storage.load_filter_text().unwrap(), "");
        assert_eq!(storage.load_asset_text().unwrap(), "");

        storage.save_filter_text("||a.com^\n").unwrap();
        storage.save_asset_text("a text/plain\nx\n").unwrap();

        assert_eq!(storage.load_filter_text().unwrap(), "||a.com^\n");
        assert_eq!(storage.load_asset_text().unwrap(), "a text/plain\nx\n");
        assert!(storage.filter_path().ends_with("filters_main.txt"));
        assert!(storage.asset_path().ends_with("assets_main.txt"));
    }

    #[test]
    fn test_file_storage_names_are_separate() {
        let temp_dir = TempDir::new().unwrap();
        let first = FileStorage::new(temp_dir.path(), "");
        let second = FileStorage::new(temp_dir.path(), "second");

        first.save_filter_text("||first.com^").unwrap();
        assert_eq!(second.load_filter_text().unwrap(), "");
        assert!(first.filter_path().ends_with("filters.txt"));
    }

    #[test]
    fn test_file_storage_read_error() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path(), "x");
        // A directory where the file should be cannot be read as text
        fs::create_dir_all(storage.filter_path()).unwrap();

        assert!(matches!(
            storage.load_filter_text(),
            Err(StorageError::ReadFailed { .. })
        ));
    }

    #[test]
    fn test_memory_storage() {
        let storage = MemoryStorage::new("t");
        assert_eq!(storage.load_filter_text().unwrap(), "");
        storage.save_filter_text("||a.com^").unwrap();
        storage.save_asset_text("a text/plain\n").unwrap();
        assert_eq!(storage.load_filter_text().unwrap(), "||a.com^");
        assert_eq!(storage.load_asset_text().unwrap(), "a text/plain\n");
    }
}
