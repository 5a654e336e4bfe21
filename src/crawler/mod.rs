//! Crawler module: fetching, queueing, and run orchestration
//!
//! This module contains the core crawling machinery:
//! - HTTP fetching with conditional-request support
//! - The concurrency-safe work queue
//! - Run health (circuit breaker + shutdown flag)
//! - The manager that drives the worker pool
//! - The run lifecycle: seed or resume, crawl, checkpoint

mod fetcher;
mod health;
mod manager;
mod queue;

pub use fetcher::{build_http_client, fetch_book, fetch_page, BookFetch, FetchError};
pub use health::RunHealth;
pub use manager::{Manager, RunMode, RunReport, SessionError};
pub use queue::WorkQueue;

use crate::config::Config;
use crate::model::Session;
use crate::notify::{LogNotifier, Notifier, WebhookNotifier};
use crate::storage::{SqliteStorage, Storage};
use crate::CrawlError;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// How a run begins
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartMode {
    /// Clear stored data and seed from page 1 (fresh-mode runs only)
    Fresh,
    /// Reload the persisted checkpoint and continue the interrupted run
    Resume,
    /// Resume when a checkpoint exists, otherwise start over
    Auto,
}

/// Runs a complete crawl
///
/// This is the single "run a crawl" entry point: when it is invoked (CLI,
/// cron wrapper, test harness) is the caller's concern.
///
/// 1. Open storage and decide between resuming and starting over
/// 2. Fresh starts clear the book/changelog/checkpoint tables and snapshots
/// 3. Seed page 1 or re-enqueue the checkpointed sessions
/// 4. Drive the worker pool until idle, circuit-break, or shutdown
/// 5. Persist the outstanding-session checkpoint
pub async fn run_crawl(
    config: Config,
    mode: RunMode,
    start: StartMode,
) -> Result<RunReport, CrawlError> {
    let storage = Arc::new(Mutex::new(SqliteStorage::new(Path::new(
        &config.output.database_path,
    ))?));
    let notifier = notifier_from(&config);
    run_crawl_with(config, mode, start, storage, notifier).await
}

/// [`run_crawl`] with injected storage and notifier
pub async fn run_crawl_with(
    config: Config,
    mode: RunMode,
    start: StartMode,
    storage: Arc<Mutex<SqliteStorage>>,
    notifier: Arc<dyn Notifier>,
) -> Result<RunReport, CrawlError> {
    let checkpointed: Vec<Session> = storage
        .lock()
        .expect("storage lock poisoned")
        .load_checkpoint()?;

    let resume = match start {
        StartMode::Fresh => false,
        StartMode::Resume => true,
        StartMode::Auto => !checkpointed.is_empty(),
    };

    let snapshot_dir = prepare_snapshot_dir(&config, mode)?;

    if mode == RunMode::Fresh && !resume {
        let mut guard = storage.lock().expect("storage lock poisoned");
        guard.clear_books()?;
        guard.clear_changelog()?;
        guard.clear_checkpoint()?;
        drop(guard);
        tracing::info!("[manager] cleared books, changelog, and checkpoint");

        if let Some(dir) = &snapshot_dir {
            clean_snapshot_dir(dir)?;
        }
    }

    let config = Arc::new(config);
    let manager = Arc::new(Manager::new(
        config,
        mode,
        storage,
        notifier,
        snapshot_dir,
    )?);

    if resume {
        if checkpointed.is_empty() {
            tracing::warn!("[manager] resume requested but checkpoint is empty; seeding page 1");
            manager.seed();
        } else {
            tracing::info!(
                "[manager] resuming {} checkpointed sessions",
                checkpointed.len()
            );
            manager.resume_with(checkpointed);
        }
    } else {
        manager.seed();
    }

    manager.run().await
}

/// Picks the notifier implied by the configuration
pub fn notifier_from(config: &Config) -> Arc<dyn Notifier> {
    match &config.notify.webhook_url {
        Some(url) => Arc::new(WebhookNotifier::new(url.clone())),
        None => Arc::new(LogNotifier),
    }
}

/// Resolves and creates the snapshot directory for this run
///
/// Fresh crawls share one directory; incremental runs get one per day so
/// successive runs keep distinct raw copies.
fn prepare_snapshot_dir(config: &Config, mode: RunMode) -> Result<Option<PathBuf>, CrawlError> {
    let Some(base) = &config.output.snapshot_dir else {
        return Ok(None);
    };

    let dir = match mode {
        RunMode::Fresh => PathBuf::from(base).join("crawler"),
        RunMode::Incremental => PathBuf::from(base)
            .join("incremental")
            .join(chrono::Utc::now().format("%Y%m%d").to_string()),
    };
    std::fs::create_dir_all(&dir)?;
    Ok(Some(dir))
}

/// Removes stale snapshot files from a previous fresh run
fn clean_snapshot_dir(dir: &Path) -> Result<(), CrawlError> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() {
            std::fs::remove_file(path)?;
        }
    }
    Ok(())
}
