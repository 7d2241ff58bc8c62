//! Request classification and caching rules

use crate::config::schema::ControllerConfig;
use crate::error::{CampusError, CampusResult};
use url::{Origin, Url};

/// URL schemes of browser-extension resources, never intercepted
const EXTENSION_SCHEMES: &[&str] = &["chrome-extension", "moz-extension", "safari-web-extension"];

/// How a request relates to the controller's origin and API surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestClass {
    /// URL origin equals the controller origin
    pub same_origin: bool,
    /// Same-origin request under the API root
    pub api_path: bool,
    /// API request under an allow-listed prefix
    pub cache_api: bool,
}

/// Caching rules derived from `[controller]` configuration
#[derive(Debug, Clone)]
pub struct CachePolicy {
    origin_url: Url,
    origin: Origin,
    api_root: String,
    api_allowlist: Vec<String>,
    student_prefix: String,
    auth_prefix: String,
    static_extensions: Vec<String>,
}

impl CachePolicy {
    pub fn from_config(config: &ControllerConfig) -> CampusResult<Self> {
        let origin_url = Url::parse(&config.origin).map_err(|e| CampusError::InvalidOrigin {
            origin: config.origin.clone(),
            reason: e.to_string(),
        })?;

        let origin = origin_url.origin();
        if !origin.is_tuple() {
            return Err(CampusError::InvalidOrigin {
                origin: config.origin.clone(),
                reason: "origin must have a scheme and host".to_string(),
            });
        }

        Ok(Self {
            origin_url,
            origin,
            api_root: config.api_root.clone(),
            api_allowlist: config.api_allowlist.clone(),
            student_prefix: config.student_prefix.clone(),
            auth_prefix: config.auth_prefix.clone(),
            static_extensions: config
                .static_extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        })
    }

    /// The controller origin as a string (`scheme://host[:port]`)
    pub fn origin(&self) -> String {
        self.origin.ascii_serialization()
    }

    /// Resolve a path or absolute URL against the controller origin
    pub fn resolve(&self, target: &str) -> CampusResult<Url> {
        self.origin_url.join(target).map_err(|e| CampusError::InvalidUrl {
            url: target.to_string(),
            reason: e.to_string(),
        })
    }

    pub fn is_extension_scheme(url: &Url) -> bool {
        EXTENSION_SCHEMES.contains(&url.scheme())
    }

    /// Classify a request URL. Origin is checked before any API rule.
    pub fn classify(&self, url: &Url) -> RequestClass {
        let same_origin = url.origin() == self.origin;
        let path = url.path();
        let api_path = same_origin && path.starts_with(&self.api_root);
        let cache_api = api_path
            && self
                .api_allowlist
                .iter()
                .any(|prefix| path.starts_with(prefix.as_str()));

        RequestClass {
            same_origin,
            api_path,
            cache_api,
        }
    }

    /// Whether a successful network response for this URL is worth keeping
    pub fn should_store(&self, url: &Url, class: RequestClass) -> bool {
        let path = url.path();
        path.starts_with(&self.student_prefix)
            || path.starts_with(&self.auth_prefix)
            || self.is_static_asset(path)
            || class.cache_api
    }

    fn is_static_asset(&self, path: &str) -> bool {
        let file = path.rsplit('/').next().unwrap_or_default();
        match file.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => {
                let ext = ext.to_ascii_lowercase();
                self.static_extensions.iter().any(|e| *e == ext)
            }
            _ => false,
        }
    }
}
