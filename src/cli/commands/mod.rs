//! CLI command implementations

pub mod activate;
pub mod cache;
pub mod completions;
pub mod config;
pub mod fetch;
pub mod install;
pub mod status;

pub use activate::execute as activate;
pub use cache::execute as cache;
pub use completions::execute as completions;
pub use config::execute as config;
pub use fetch::execute as fetch;
pub use install::execute as install;
pub use status::execute as status;

use crate::audit::AuditLog;
use crate::config::{Config, ConfigManager};
use crate::controller::OfflineCacheController;
use crate::error::CampusResult;
use crate::fetch::{Fetcher, HttpFetcher, ScriptedFetcher};
use crate::store::{CacheStore, DiskStore};
use std::sync::Arc;

/// Cache store rooted at the configured storage directory
pub(crate) fn open_store(config: &Config) -> Arc<dyn CacheStore> {
    Arc::new(DiskStore::new(ConfigManager::storage_dir(config)))
}

/// Live HTTP network, or one where every request fails
pub(crate) fn network(config: &Config, offline: bool) -> Arc<dyn Fetcher> {
    if offline {
        Arc::new(ScriptedFetcher::offline())
    } else {
        Arc::new(HttpFetcher::new(&config.network))
    }
}

/// Controller for the configured cache version, backed by the disk store
pub(crate) fn open_controller(
    config: &Config,
    fetcher: Arc<dyn Fetcher>,
) -> CampusResult<OfflineCacheController> {
    Ok(
        OfflineCacheController::new(&config.controller, open_store(config), fetcher)?
            .with_audit(AuditLog::new(config)),
    )
}
