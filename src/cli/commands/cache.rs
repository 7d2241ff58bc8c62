//! Cache command - inspect and clear cache generations

use super::open_store;
use crate::audit::AuditLog;
use crate::cli::args::{CacheAction, CacheArgs, OutputFormat};
use crate::config::Config;
use crate::error::CampusResult;
use crate::store::{CacheEntry, CacheStore};
use crate::ui::{self, UiContext};
use console::style;
use tracing::debug;

/// Execute the cache command
pub async fn execute(args: CacheArgs, config: &Config) -> CampusResult<()> {
    let store = open_store(config);
    let version = &config.controller.cache_version;

    match args.action {
        CacheAction::List { format } => list_entries(&*store, version, format).await,
        CacheAction::Generations => list_generations(&*store, version).await,
        CacheAction::Clear { yes } => clear_generations(&*store, config, yes).await,
    }
}

/// List entries of the current generation
async fn list_entries(
    store: &dyn CacheStore,
    version: &str,
    format: OutputFormat,
) -> CampusResult<()> {
    let entries = store.entries(version).await?;

    if entries.is_empty() && !matches!(format, OutputFormat::Json) {
        println!("No cached entries in {}.", version);
        return Ok(());
    }

    match format {
        OutputFormat::Table => print_entry_table(&entries),
        OutputFormat::Json => print_entry_json(&entries)?,
        OutputFormat::Plain => print_entry_plain(&entries),
    }

    Ok(())
}

fn print_entry_table(entries: &[CacheEntry]) {
    println!(
        "{:<8} {:<6} {:<10} {:<18} URL",
        "METHOD", "STATUS", "SIZE", "CACHED"
    );
    println!("{}", "-".repeat(80));

    for entry in entries {
        let status = entry.response.status;
        let status_display = if entry.response.is_ok() {
            style(status).green().to_string()
        } else {
            style(status).yellow().to_string()
        };
        let method = entry.key.as_str().split(' ').next().unwrap_or_default();

        println!(
            "{:<8} {:<6} {:<10} {:<18} {}",
            method,
            status_display,
            format_size(entry.response.body.len()),
            entry.cached_at.format("%Y-%m-%d %H:%M"),
            entry.url
        );
    }

    println!();
    println!("Total: {} entr{}", entries.len(), if entries.len() == 1 { "y" } else { "ies" });
}

fn print_entry_json(entries: &[CacheEntry]) -> CampusResult<()> {
    #[derive(serde::Serialize)]
    struct EntryJson<'a> {
        key: &'a str,
        url: &'a str,
        status: u16,
        size: usize,
        content_type: Option<&'a str>,
        cached_at: String,
    }

    let json_entries: Vec<EntryJson<'_>> = entries
        .iter()
        .map(|e| EntryJson {
            key: e.key.as_str(),
            url: &e.url,
            status: e.response.status,
            size: e.response.body.len(),
            content_type: e.response.header("content-type"),
            cached_at: e.cached_at.to_rfc3339(),
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&json_entries)?);
    Ok(())
}

fn print_entry_plain(entries: &[CacheEntry]) {
    for entry in entries {
        println!("{}", entry.key);
    }
}

/// List every generation, marking the current one
async fn list_generations(store: &dyn CacheStore, version: &str) -> CampusResult<()> {
    let generations = store.generations().await?;

    if generations.is_empty() {
        println!("No cache generations found.");
        return Ok(());
    }

    for generation in &generations {
        let count = store.entries(generation).await?.len();
        if generation == version {
            println!(
                "  {} {} ({} entries, current)",
                style("*").green(),
                style(generation).bold(),
                count
            );
        } else {
            println!(
                "  {} {} ({} entries, stale)",
                style("•").dim(),
                generation,
                count
            );
        }
    }

    Ok(())
}

/// Delete every generation
async fn clear_generations(
    store: &dyn CacheStore,
    config: &Config,
    skip_confirm: bool,
) -> CampusResult<()> {
    let ctx = UiContext::detect().with_auto_yes(skip_confirm);
    let generations = store.generations().await?;

    if generations.is_empty() {
        println!("No cache generations to clear.");
        return Ok(());
    }

    println!("This will remove {} cache generation(s):", generations.len());
    for generation in &generations {
        println!("  {} {}", style("•").red(), generation);
    }
    println!();

    if !ui::confirm(&ctx, "Are you sure?", false).await? {
        println!("Aborted.");
        return Ok(());
    }

    let mut removed = Vec::new();
    for generation in generations {
        debug!("Removing cache generation: {}", generation);
        if store.delete_generation(&generation).await? {
            removed.push(generation);
        }
    }

    AuditLog::new(config)
        .log(
            "cache.cleared",
            &serde_json::json!({ "generations": removed }),
        )
        .await;

    println!(
        "{} cleared {} generation(s)",
        style("✓").green(),
        removed.len()
    );

    Ok(())
}

fn format_size(bytes: usize) -> String {
    const KIB: usize = 1024;
    const MIB: usize = KIB * 1024;

    if bytes >= MIB {
        format!("{:.1} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.1} KiB", bytes as f64 / KIB as f64)
    } else {
        format!("{} B", bytes)
    }
}
