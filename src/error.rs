//! Error handling for micro-rs
//!
//! Rule and asset errors are recovered locally by the loaders (the offending
//! line or block is skipped), storage errors degrade to an empty rule set, and
//! only configuration and registry errors reach the caller.

use thiserror::Error;

/// Main error type for micro-rs operations
#[derive(Error, Debug)]
pub enum MicroError {
    /// Filter rule construction errors
    #[error("Rule error: {0}")]
    Rule(#[from] RuleError),

    /// Asset text errors
    #[error("Asset error: {0}")]
    Asset(#[from] AssetError),

    /// Persisted text storage errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Another live instance already uses this name
    #[error("An instance named '{name}' was already constructed")]
    DuplicateName {
        /// The conflicting instance name
        name: String,
    },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors with context
    #[error("Generic error: {message}")]
    Generic {
        /// Error message including its context
        message: String,
    },
}

/// Errors raised while turning one filter line into a rule
#[derive(Error, Debug)]
pub enum RuleError {
    /// `@@` exception rules are not handled
    #[error("Whitelist rules are not supported: {rule}")]
    Whitelist {
        /// Offending filter line
        rule: String,
    },

    /// Unknown or malformed option
    #[error("Option '{option}' is not accepted")]
    InvalidOption {
        /// Offending option token
        option: String,
    },

    /// More than one of `redirect=`, `replace=`, `inject=`
    #[error("Only one of 'redirect=', 'replace=' and 'inject=' is accepted, got '{second}' after '{first}'")]
    ConflictingAction {
        /// The action option seen first
        first: String,
        /// The action option that conflicts with it
        second: String,
    },

    /// An action option without an argument
    #[error("Option '{option}' requires a value")]
    EmptyPayload {
        /// Offending option token
        option: String,
    },

    /// `first-party` together with `third-party`
    #[error("Only one of 'first-party' and 'third-party' is accepted")]
    ConflictingParty,

    /// A party option combined with `domain=` entries on the same side
    #[error("Option '{option}' cannot be combined with 'domain=' entries")]
    PartyWithDomain {
        /// Party option involved in the conflict
        option: &'static str,
    },

    /// Invalid regular expression after pattern translation
    #[error("Failed to compile pattern '{pattern}': {source}")]
    Pattern {
        /// Matcher text as written in the filter
        pattern: String,
        /// Regex compiler diagnostic
        #[source]
        source: regex::Error,
    },
}

/// Asset text and asset lookup errors
#[derive(Error, Debug)]
pub enum AssetError {
    /// Asset header without a MIME type
    #[error("Asset '{name}' does not declare a MIME type")]
    MissingMime {
        /// Asset name from the header line
        name: String,
    },

    /// A rule references an asset that is not loaded
    #[error("Asset not found: {name}")]
    NotFound {
        /// Requested asset name
        name: String,
    },
}

/// Persisted filter/asset text errors
#[derive(Error, Debug)]
pub enum StorageError {
    /// Reading persisted text failed
    #[error("Failed to read '{key}': {reason}")]
    ReadFailed {
        /// Storage key
        key: String,
        /// Underlying reason
        reason: String,
    },

    /// Writing persisted text failed
    #[error("Failed to write '{key}': {reason}")]
    WriteFailed {
        /// Storage key
        key: String,
        /// Underlying reason
        reason: String,
    },
}

/// Configuration-specific errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {value}")]
    InvalidValue {
        /// Dotted configuration key
        key: String,
        /// Rejected value
        value: String,
    },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path that was tried
        path: String,
    },
}

/// Result type alias for micro-rs operations
pub type Result<T> = std::result::Result<T, MicroError>;

/// Helper trait for adding context to errors
pub trait ErrorContext<T> {
    /// Add context to an error
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;

    /// Add static context to an error
    fn context(self, msg: &'static str) -> Result<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: Into<MicroError>,
{
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let original_error = e.into();
            MicroError::Generic {
                message: format!("{}: {}", f(), original_error),
            }
        })
    }

    fn context(self, msg: &'static str) -> Result<T> {
        self.with_context(|| msg.to_string())
    }
}
