//! Configuration schema for campus-cache
//!
//! Configuration is stored at `~/.config/campus-cache/config.toml`

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Offline cache controller settings
    pub controller: ControllerConfig,

    /// Outbound network settings
    pub network: NetworkConfig,

    /// Cache store settings
    pub storage: StorageConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,

    /// Enable audit logging of lifecycle events
    pub audit_log: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
            audit_log: true,
        }
    }
}

/// Offline cache controller configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Origin the controller serves (scheme://host[:port])
    pub origin: String,

    /// Cache generation identifier, bumped on every deployed revision
    pub cache_version: String,

    /// Registration scope
    pub scope: String,

    /// Root of same-origin API routes
    pub api_root: String,

    /// API path prefixes whose responses may be cached
    pub api_allowlist: Vec<String>,

    /// Path prefix of the student section
    pub student_prefix: String,

    /// Path prefix of the auth section
    pub auth_prefix: String,

    /// File extensions treated as static assets
    pub static_extensions: Vec<String>,

    /// Asset manifest pre-populated at install time
    pub precache: Vec<String>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            origin: "http://localhost:3000".to_string(),
            cache_version: "smart-campus-cache-v8".to_string(),
            scope: "/".to_string(),
            api_root: "/api/".to_string(),
            api_allowlist: [
                "/api/quiz",
                "/api/exam",
                "/api/exams",
                "/api/tutor",
                "/api/lessons",
                "/api/exercises",
                "/api/progress",
                "/api/courses",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            student_prefix: "/student".to_string(),
            auth_prefix: "/auth".to_string(),
            static_extensions: [
                "css",
                "js",
                "png",
                "jpg",
                "jpeg",
                "gif",
                "svg",
                "webp",
                "ico",
                "json",
                "webmanifest",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            precache: [
                "/",
                "/student/dashboard",
                "/student/courses",
                "/student/homework",
                "/student/submissions",
                "/student/grades",
                "/student/quiz",
                "/auth",
                "/offline",
                "/manifest.json",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

/// Outbound network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Overall timeout for a single request in seconds (0 = no timeout)
    pub timeout_secs: u64,

    /// User-Agent header sent with every request
    pub user_agent: String,

    /// Largest response body accepted, in bytes
    pub max_body_bytes: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: format!("campus-cache/{}", env!("CARGO_PKG_VERSION")),
            max_body_bytes: 64 * 1024 * 1024,
        }
    }
}

/// Cache store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding cache generations (default: state dir)
    pub dir: Option<PathBuf>,
}
