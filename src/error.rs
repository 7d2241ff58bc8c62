//! Error types for campus-cache
//!
//! All modules use `CampusResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for campus-cache operations
pub type CampusResult<T> = Result<T, CampusError>;

/// All errors that can occur in campus-cache
#[derive(Error, Debug)]
pub enum CampusError {
    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid origin '{origin}': {reason}")]
    InvalidOrigin { origin: String, reason: String },

    #[error("Invalid scope '{0}': scopes are absolute paths starting with '/'")]
    InvalidScope(String),

    // Request errors
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Unsupported request method: {0}")]
    UnsupportedMethod(String),

    #[error("Network request failed for {url}: {reason}")]
    Network { url: String, reason: String },

    // Lifecycle errors
    #[error("Install failed while precaching {url}: {reason}")]
    InstallFailed { url: String, reason: String },

    #[error("Cache generation {0} has not been installed")]
    NotInstalled(String),

    #[error("Invalid controller transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    // Cache store errors
    #[error("Invalid cache generation name: {0}")]
    InvalidGeneration(String),

    #[error("Failed to write cache entry {key}: {reason}")]
    CacheWrite { key: String, reason: String },

    #[error("Corrupt cache entry at {path}: {reason}")]
    CacheCorrupt { path: PathBuf, reason: String },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl CampusError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a network error for a URL
    pub fn network(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Network {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Check if error is retryable
    ///
    /// Network and install failures are transient from the controller's
    /// point of view; the next page load or deploy tries again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::InstallFailed { .. })
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::Network { .. } => Some("Check connectivity, or pass --offline to use the cache only"),
            Self::InstallFailed { .. } => {
                Some("Verify every [controller].precache URL is reachable, then run: campus-cache install")
            }
            Self::NotInstalled(_) => Some("Run: campus-cache install"),
            Self::InvalidOrigin { .. } => Some("Set [controller].origin to a URL such as https://campus.example"),
            Self::CacheCorrupt { .. } => Some("Run: campus-cache cache clear"),
            _ => None,
        }
    }
}
