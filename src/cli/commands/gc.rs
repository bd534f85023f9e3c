//! Gc command - remove old cache files

use crate::cache::CTIME;
use crate::cli::args::GcArgs;
use crate::config::Config;
use crate::error::{CacheError, CacheResult};
use crate::store::{StoreUnit, EXTENSION};
use chrono::{DateTime, Duration, Utc};
use console::style;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// A cache file past the age limit
#[derive(Debug)]
struct StaleCache {
    path: PathBuf,
    created_at: DateTime<Utc>,
}

/// Execute the gc command
pub fn execute(args: GcArgs, config: &Config) -> CacheResult<()> {
    let gc_days = args.days.unwrap_or(config.cache.gc_days);

    if gc_days == 0 {
        println!("Cache GC is disabled (gc_days = 0)");
        return Ok(());
    }

    let dir = args
        .dir
        .or_else(|| config.cache.directory.clone())
        .ok_or_else(|| {
            CacheError::User("No directory given and cache.directory is not configured".to_string())
        })?;

    let now = Utc::now();
    let to_remove = find_stale(&dir, gc_days, now)?;

    if to_remove.is_empty() {
        println!("No caches older than {} days.", gc_days);
        return Ok(());
    }

    println!(
        "Found {} cache(s) older than {} days:",
        to_remove.len(),
        gc_days
    );

    for cache in &to_remove {
        let age_days = (now - cache.created_at).num_days();
        println!(
            "  {} {} ({} days old)",
            style("•").red(),
            cache.path.display(),
            age_days
        );
    }

    if args.dry_run {
        println!();
        println!("Dry run - no caches removed.");
        return Ok(());
    }

    println!();
    print!("Removing caches... ");
    let _ = io::stdout().flush();

    let mut removed = 0;
    for cache in to_remove {
        debug!("Removing cache: {}", cache.path.display());
        fs::remove_file(&cache.path)
            .map_err(|e| CacheError::io(format!("removing {}", cache.path.display()), e))?;
        removed += 1;
    }

    println!("{} removed {} cache(s)", style("✓").green(), removed);

    Ok(())
}

/// Cache files in `dir` created more than `days` days before `now`, oldest first
///
/// Files that cannot be read or carry no creation time are left alone.
fn find_stale(dir: &Path, days: u32, now: DateTime<Utc>) -> CacheResult<Vec<StaleCache>> {
    if !dir.is_dir() {
        return Err(CacheError::PathNotFound(dir.to_path_buf()));
    }
    let cutoff = now - Duration::days(i64::from(days));

    let listing =
        fs::read_dir(dir).map_err(|e| CacheError::io(format!("reading {}", dir.display()), e))?;

    let mut stale = Vec::new();
    for entry in listing {
        let path = entry
            .map_err(|e| CacheError::io(format!("reading {}", dir.display()), e))?
            .path();
        if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
            continue;
        }

        let created_at = StoreUnit::open(&path)
            .and_then(|unit| unit.load(CTIME))
            .and_then(|value| value.decode::<DateTime<Utc>>());
        match created_at {
            Ok(created_at) if created_at < cutoff => stale.push(StaleCache { path, created_at }),
            Ok(_) => {}
            Err(e) => debug!("Skipping {}: {}", path.display(), e),
        }
    }

    stale.sort_by_key(|c| c.created_at);
    Ok(stale)
}
