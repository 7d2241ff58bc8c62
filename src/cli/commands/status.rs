//! Status command - show controller and cache state

use super::{network, open_store};
use crate::config::{Config, ConfigManager};
use crate::controller::CachePolicy;
use crate::dispatch::Dispatcher;
use crate::error::CampusResult;
use crate::http::Request;
use crate::store::CacheStore;
use console::{style, Emoji};
use std::collections::HashSet;

static CHECK: Emoji<'_, '_> = Emoji("✓ ", "[OK] ");
static CROSS: Emoji<'_, '_> = Emoji("✗ ", "[MISSING] ");
static WARN: Emoji<'_, '_> = Emoji("⚠ ", "[WARN] ");

/// Execute the status command
pub async fn execute(config: &Config) -> CampusResult<()> {
    let policy = CachePolicy::from_config(&config.controller)?;
    let dispatcher = Dispatcher::from_config(&config.controller, network(config, true))?;
    let store = open_store(config);
    let version = &config.controller.cache_version;

    println!("{}", style("campus-cache Status").bold().cyan());
    println!();

    println!("{}", style("Controller:").bold());
    println!("  Origin:  {}", policy.origin());
    println!("  Scope:   {}", dispatcher.scope());
    println!("  Version: {}", version);
    println!();

    println!("{}", style("Storage:").bold());
    println!("  Store:     {}", ConfigManager::storage_dir(config).display());
    if config.general.audit_log {
        println!("  Audit log: {}", ConfigManager::audit_log_path().display());
    } else {
        println!("  Audit log: {}", style("disabled").dim());
    }
    println!();

    let generations = store.generations().await?;
    println!("{}", style("Generations:").bold());
    if generations.is_empty() {
        println!("  {}Nothing installed - run: campus-cache install", WARN);
    }
    for generation in &generations {
        if generation == version {
            println!("  {}{} (current)", CHECK, generation);
        } else {
            println!("  {}{} (stale, evicted on activate)", WARN, generation);
        }
    }
    println!();

    println!("{}", style("Precache manifest:").bold());
    let (covered, missing) = manifest_coverage(&*store, &policy, config).await?;
    for path in &missing {
        println!("  {}{}", CROSS, path);
    }
    let total = config.controller.precache.len();
    if missing.is_empty() {
        println!("  {}{}/{} assets cached", CHECK, covered, total);
    } else {
        println!(
            "  {}",
            style(format!("{}/{} assets cached", covered, total)).yellow()
        );
    }

    Ok(())
}

/// Count manifest paths present in the current generation
async fn manifest_coverage(
    store: &dyn CacheStore,
    policy: &CachePolicy,
    config: &Config,
) -> CampusResult<(usize, Vec<String>)> {
    let cached: HashSet<_> = store
        .entries(&config.controller.cache_version)
        .await?
        .into_iter()
        .map(|entry| entry.key)
        .collect();

    let mut covered = 0;
    let mut missing = Vec::new();
    for path in &config.controller.precache {
        let key = Request::get(policy.resolve(path)?).key();
        if cached.contains(&key) {
            covered += 1;
        } else {
            missing.push(path.clone());
        }
    }

    Ok((covered, missing))
}
