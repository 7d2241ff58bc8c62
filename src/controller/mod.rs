//! Offline cache controller
//!
//! Network-first request handling with cache fallback:
//!
//! 1. Non-GET and browser-extension requests go straight to the network.
//! 2. GET requests try the network. Matching responses are copied into the
//!    active cache generation on a background task.
//! 3. When the network fails the cached response is served; without one,
//!    allow-listed API calls get `200 []` and everything else a `503`.
//!
//! Install pre-populates the generation from the asset manifest; activate
//! deletes every other generation.

pub mod lifecycle;
pub mod policy;

pub use lifecycle::ControllerState;
pub use policy::{CachePolicy, RequestClass};

use crate::audit::AuditLog;
use crate::config::schema::ControllerConfig;
use crate::error::{CampusError, CampusResult};
use crate::fetch::Fetcher;
use crate::http::{Method, Request, Response};
use crate::store::{validate_generation, CacheEntry, CacheStore};
use futures_util::future::try_join_all;
use lifecycle::Lifecycle;
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

/// Where a served response came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseSource {
    /// Live network response for a cacheable GET
    Network,
    /// Stored response from the active generation
    Cache,
    /// Synthesized `200 []` or `503`
    Fallback,
    /// Request bypassed the cache policy entirely
    Passthrough,
}

impl fmt::Display for ResponseSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => write!(f, "network"),
            Self::Cache => write!(f, "cache"),
            Self::Fallback => write!(f, "fallback"),
            Self::Passthrough => write!(f, "passthrough"),
        }
    }
}

/// A response handed back to the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Served {
    pub response: Response,
    pub source: ResponseSource,
}

impl Served {
    pub(crate) fn new(response: Response, source: ResponseSource) -> Self {
        Self { response, source }
    }
}

/// Outcome of a successful install
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    pub version: String,
    pub cached: usize,
    /// Install always asks to activate without waiting for older instances
    pub skip_waiting: bool,
}

/// Outcome of an activation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActivationReport {
    pub version: String,
    pub evicted: Vec<String>,
    /// Generations that could not be deleted, with the reason
    pub failed: Vec<(String, String)>,
}

/// The offline cache controller for one cache version
pub struct OfflineCacheController {
    id: Uuid,
    version: String,
    manifest: Vec<String>,
    policy: CachePolicy,
    store: Arc<dyn CacheStore>,
    fetcher: Arc<dyn Fetcher>,
    audit: AuditLog,
    lifecycle: Mutex<Lifecycle>,
    pending_writes: Mutex<Vec<JoinHandle<()>>>,
}

impl OfflineCacheController {
    /// Build a controller from `[controller]` configuration
    pub fn new(
        config: &ControllerConfig,
        store: Arc<dyn CacheStore>,
        fetcher: Arc<dyn Fetcher>,
    ) -> CampusResult<Self> {
        validate_generation(&config.cache_version)?;

        Ok(Self {
            id: Uuid::new_v4(),
            version: config.cache_version.clone(),
            manifest: config.precache.clone(),
            policy: CachePolicy::from_config(config)?,
            store,
            fetcher,
            audit: AuditLog::disabled(),
            lifecycle: Mutex::new(Lifecycle::default()),
            pending_writes: Mutex::new(Vec::new()),
        })
    }

    /// Record lifecycle events in an audit log
    pub fn with_audit(mut self, audit: AuditLog) -> Self {
        self.audit = audit;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Cache generation this controller reads from and writes to
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    pub fn manifest(&self) -> &[String] {
        &self.manifest
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    pub fn state(&self) -> ControllerState {
        self.lock_lifecycle().state
    }

    pub fn is_installed(&self) -> bool {
        self.lock_lifecycle().installed
    }

    fn lock_lifecycle(&self) -> std::sync::MutexGuard<'_, Lifecycle> {
        self.lifecycle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Pre-populate the generation with every manifest URL
    ///
    /// All-or-nothing: if one URL fails to fetch or answers non-2xx,
    /// nothing is stored and the error propagates.
    pub async fn install(&self) -> CampusResult<InstallReport> {
        self.install_with_progress(|_| {}).await
    }

    /// Install, calling `on_cached` as each manifest URL is fetched
    pub async fn install_with_progress<F>(&self, on_cached: F) -> CampusResult<InstallReport>
    where
        F: Fn(&Url) + Send + Sync,
    {
        if self.state() != ControllerState::Installing {
            return Err(CampusError::InvalidTransition {
                from: self.state().to_string(),
                to: ControllerState::Installing.to_string(),
            });
        }

        info!("Installing cache generation {} ({} assets)", self.version, self.manifest.len());
        self.store.open(&self.version).await?;

        let requests = self
            .manifest
            .iter()
            .map(|path| {
                self.policy
                    .resolve(path)
                    .map(Request::get)
                    .map_err(|e| CampusError::InstallFailed {
                        url: path.clone(),
                        reason: e.to_string(),
                    })
            })
            .collect::<CampusResult<Vec<_>>>()?;

        let on_cached = &on_cached;
        let entries = try_join_all(requests.iter().map(|request| async move {
            let entry = self.precache_one(request).await?;
            on_cached(&request.url);
            Ok::<_, CampusError>(entry)
        }))
        .await?;
        let cached = entries.len();
        self.store.put_all(&self.version, entries).await?;

        self.lock_lifecycle().installed = true;
        info!("Installed {} with {} precached assets", self.version, cached);
        self.audit
            .log(
                "controller.installed",
                &serde_json::json!({
                    "controller": self.id.to_string(),
                    "version": self.version,
                    "cached": cached,
                }),
            )
            .await;

        Ok(InstallReport {
            version: self.version.clone(),
            cached,
            skip_waiting: true,
        })
    }

    async fn precache_one(&self, request: &Request) -> CampusResult<CacheEntry> {
        let response = self
            .fetcher
            .fetch(request)
            .await
            .map_err(|e| CampusError::InstallFailed {
                url: request.url.to_string(),
                reason: e.to_string(),
            })?;

        if !response.is_ok() {
            return Err(CampusError::InstallFailed {
                url: request.url.to_string(),
                reason: format!("server answered {}", response.status),
            });
        }

        debug!("Precached {}", request.url);
        Ok(CacheEntry::new(request.key(), request.url.as_str(), response))
    }

    /// Delete stale generations and become the active controller
    pub async fn activate(&self) -> CampusResult<ActivationReport> {
        {
            let lifecycle = self.lock_lifecycle();
            if !lifecycle.installed {
                return Err(CampusError::NotInstalled(self.version.clone()));
            }
            lifecycle.state.transition(ControllerState::Active)?;
        }

        let mut report = ActivationReport {
            version: self.version.clone(),
            ..ActivationReport::default()
        };

        match self.store.generations().await {
            Ok(generations) => {
                for generation in generations.into_iter().filter(|g| *g != self.version) {
                    match self.store.delete_generation(&generation).await {
                        Ok(_) => {
                            info!("Evicted stale cache generation {}", generation);
                            self.audit
                                .log(
                                    "generation.evicted",
                                    &serde_json::json!({
                                        "generation": generation,
                                        "active": self.version,
                                    }),
                                )
                                .await;
                            report.evicted.push(generation);
                        }
                        Err(e) => {
                            warn!("Failed to evict cache generation {}: {}", generation, e);
                            report.failed.push((generation, e.to_string()));
                        }
                    }
                }
            }
            Err(e) => warn!("Failed to enumerate cache generations: {}", e),
        }

        {
            let mut lifecycle = self.lock_lifecycle();
            lifecycle.state = lifecycle.state.transition(ControllerState::Active)?;
        }

        info!("Activated {} (controller {})", self.version, self.id);
        self.audit
            .log(
                "controller.activated",
                &serde_json::json!({
                    "controller": self.id.to_string(),
                    "version": self.version,
                    "evicted": report.evicted,
                }),
            )
            .await;

        Ok(report)
    }

    /// Mark this controller as replaced by a newer version
    pub fn supersede(&self) -> CampusResult<()> {
        let mut lifecycle = self.lock_lifecycle();
        lifecycle.state = lifecycle.state.transition(ControllerState::Superseded)?;
        info!("Controller {} for {} superseded", self.id, self.version);
        Ok(())
    }

    /// Adopt a generation populated by an earlier process
    ///
    /// Returns whether a non-empty generation for this version exists. When
    /// it does the controller counts as installed and may be activated.
    pub async fn resume(&self) -> CampusResult<bool> {
        if !self.store.generations().await?.contains(&self.version) {
            return Ok(false);
        }
        if self.store.entries(&self.version).await?.is_empty() {
            return Ok(false);
        }

        self.lock_lifecycle().installed = true;
        debug!("Resumed installed generation {}", self.version);
        Ok(true)
    }

    /// Handle one intercepted request
    ///
    /// GET requests never fail: the worst case is a synthesized fallback.
    /// Errors only surface for pass-through requests.
    pub async fn handle_fetch(&self, request: &Request) -> CampusResult<Served> {
        if request.method != Method::Get || CachePolicy::is_extension_scheme(&request.url) {
            debug!("Pass-through {} {}", request.method, request.url);
            let response = self.fetcher.fetch(request).await?;
            return Ok(Served::new(response, ResponseSource::Passthrough));
        }

        let class = self.policy.classify(&request.url);

        match self.fetcher.fetch(request).await {
            Ok(response) => {
                if self.state() == ControllerState::Superseded {
                    debug!("Superseded controller {} skips caching {}", self.id, request.url);
                } else if self.policy.should_store(&request.url, class) {
                    self.store_in_background(request, response.clone());
                }
                Ok(Served::new(response, ResponseSource::Network))
            }
            Err(e) => {
                debug!("Network failed for {}: {}", request.url, e);
                Ok(self.offline_response(request, class).await)
            }
        }
    }

    async fn offline_response(&self, request: &Request, class: RequestClass) -> Served {
        match self.store.get(&self.version, &request.key()).await {
            Ok(Some(entry)) => {
                debug!("Serving {} from cache", request.url);
                return Served::new(entry.response, ResponseSource::Cache);
            }
            Ok(None) => {}
            Err(e) => warn!("Cache lookup failed for {}: {}", request.url, e),
        }

        if class.cache_api {
            debug!("Serving empty list for uncached API call {}", request.url);
            Served::new(Response::empty_json_array(), ResponseSource::Fallback)
        } else {
            Served::new(Response::offline_unavailable(), ResponseSource::Fallback)
        }
    }

    fn store_in_background(&self, request: &Request, response: Response) {
        let store = Arc::clone(&self.store);
        let version = self.version.clone();
        let entry = CacheEntry::new(request.key(), request.url.as_str(), response);

        let handle = tokio::spawn(async move {
            let key = entry.key.clone();
            match store.put_if_open(&version, entry).await {
                Ok(true) => {}
                Ok(false) => debug!("Generation {} is gone, dropped write for {}", version, key),
                Err(e) => warn!("Cache write for {} failed: {}", key, e),
            }
        });

        let mut pending = self
            .pending_writes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        pending.retain(|h| !h.is_finished());
        pending.push(handle);
    }

    /// Wait for every background cache write scheduled so far
    pub async fn settle(&self) {
        let handles: Vec<JoinHandle<()>> = {
            let mut pending = self
                .pending_writes
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            pending.drain(..).collect()
        };

        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Background cache write panicked: {}", e);
            }
        }
    }
}

impl fmt::Debug for OfflineCacheController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OfflineCacheController")
            .field("id", &self.id)
            .field("version", &self.version)
            .field("state", &self.state())
            .field("fetcher", &self.fetcher.name())
            .finish()
    }
}
