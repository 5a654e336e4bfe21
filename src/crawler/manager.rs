//! Crawl manager - worker pool and run orchestration
//!
//! The manager owns the work queue, the checkpoint map, and the run health
//! tracker, and spawns a fixed number of workers that drain the queue until
//! it goes idle or the run is shut down. Workers expand discovered work back
//! into the queue (pages produce more pages and books), apply the retry and
//! circuit-breaker policy, and hand completed records to the storage stage.

use crate::config::Config;
use crate::crawler::fetcher::{fetch_book, fetch_page, BookFetch, FetchError};
use crate::crawler::health::RunHealth;
use crate::crawler::queue::WorkQueue;
use crate::extract::{self, ExtractError};
use crate::model::{
    field_changes, Book, ChangeEvent, ChangelogEntry, CrawlMetadata, CrawlStatus, ResourceKind,
    Session, StoredBook,
};
use crate::notify::Notifier;
use crate::storage::{SqliteStorage, Storage, StorageError, UpsertOutcome};
use crate::CrawlError;
use chrono::Utc;
use reqwest::Client;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinSet;
use url::Url;

/// How a crawl run treats previously stored state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Rebuild the document set from scratch; no change detection
    Fresh,
    /// Diff each fetched record against the stored baseline and emit a changelog
    Incremental,
}

/// Per-session failure, classified at the worker loop boundary
#[derive(Debug, Error)]
pub enum SessionError {
    /// Transport or HTTP-status failure; retryable
    #[error(transparent)]
    Http(#[from] FetchError),

    /// Malformed content; retrying cannot help
    #[error(transparent)]
    Malformed(#[from] ExtractError),

    /// Storage failure; fails the run
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Outcome of successfully processing one session
enum ProcessOutcome {
    Completed,
    /// The server reported the book unmodified; nothing was written
    Unchanged,
}

/// In-memory map of sessions that are queued or in flight
///
/// An entry is added when a session is enqueued and removed exactly when the
/// session completes - successfully or permanently-failed-and-recorded.
/// Whatever remains at run end is persisted as the resume checkpoint.
pub struct CheckpointMap {
    inner: Mutex<HashMap<String, Session>>,
}

impl CheckpointMap {
    fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    fn insert(&self, session: Session) {
        self.inner
            .lock()
            .expect("checkpoint lock poisoned")
            .insert(session.sid.clone(), session);
    }

    fn remove(&self, sid: &str) {
        self.inner
            .lock()
            .expect("checkpoint lock poisoned")
            .remove(sid);
    }

    fn contains(&self, sid: &str) -> bool {
        self.inner
            .lock()
            .expect("checkpoint lock poisoned")
            .contains_key(sid)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("checkpoint lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clones the current outstanding set for persistence
    pub fn snapshot(&self) -> HashMap<String, Session> {
        self.inner
            .lock()
            .expect("checkpoint lock poisoned")
            .clone()
    }
}

/// Summary of a finished (or halted) crawl run
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Sessions that completed successfully (pages and books)
    pub processed: u64,
    /// Books skipped because the server confirmed them unmodified
    pub unchanged: u64,
    /// Sessions that failed permanently
    pub failed: u64,
    /// Total sessions ever enqueued, including retries
    pub sessions_enqueued: u64,
    /// Sessions left outstanding in the checkpoint
    pub outstanding: u64,
    pub duration: Duration,
}

/// Crawl manager: owns the queue, the workers, and the run state
pub struct Manager {
    config: Arc<Config>,
    mode: RunMode,
    client: Client,
    queue: WorkQueue,
    checkpoint: CheckpointMap,
    health: RunHealth,
    storage: Arc<Mutex<SqliteStorage>>,
    /// Previous run's documents, keyed by identity; empty in fresh mode
    baseline: HashMap<i64, StoredBook>,
    notifier: Arc<dyn Notifier>,
    snapshot_dir: Option<PathBuf>,
    processed: AtomicU64,
    unchanged: AtomicU64,
    failed: AtomicU64,
}

impl Manager {
    /// Creates a manager, loading the comparison baseline in incremental mode
    pub fn new(
        config: Arc<Config>,
        mode: RunMode,
        storage: Arc<Mutex<SqliteStorage>>,
        notifier: Arc<dyn Notifier>,
        snapshot_dir: Option<PathBuf>,
    ) -> Result<Self, CrawlError> {
        let client = crate::crawler::build_http_client(
            &config.site,
            config.crawler.request_timeout(),
        )?;

        let baseline = match mode {
            RunMode::Incremental => {
                let books = storage
                    .lock()
                    .expect("storage lock poisoned")
                    .load_all_books()?;
                tracing::info!("[manager] loaded {} stored books as baseline", books.len());
                books
            }
            RunMode::Fresh => HashMap::new(),
        };

        Ok(Self {
            health: RunHealth::new(config.crawler.max_consecutive_failures),
            config,
            mode,
            client,
            queue: WorkQueue::new(),
            checkpoint: CheckpointMap::new(),
            storage,
            baseline,
            notifier,
            snapshot_dir,
            processed: AtomicU64::new(0),
            unchanged: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        })
    }

    /// Seeds the run with the first catalogue page
    pub fn seed(&self) {
        self.discover(Session::page(1, self.config.site.page_url(1)));
    }

    /// Re-enqueues checkpointed sessions, preserving their retry counts
    pub fn resume_with(&self, sessions: Vec<Session>) {
        for session in sessions {
            self.checkpoint.insert(session.clone());
            self.queue.enqueue(session);
        }
    }

    /// Shared run health, for operator-driven shutdown
    pub fn health(&self) -> &RunHealth {
        &self.health
    }

    /// Runs the worker pool to completion and flushes the checkpoint
    pub async fn run(self: &Arc<Self>) -> Result<RunReport, CrawlError> {
        let started = std::time::Instant::now();
        tracing::info!(
            "[manager] starting {} workers ({:?} mode)",
            self.config.crawler.worker_count,
            self.mode
        );

        let mut workers = JoinSet::new();
        for wid in 1..=self.config.crawler.worker_count {
            let manager = self.clone();
            workers.spawn(async move { manager.worker(wid).await });
        }

        // An operator interrupt trips the shutdown flag; workers observe it
        // at the top of their loop, so the checkpoint still reflects the true
        // outstanding work when they stop.
        let interrupt = tokio::signal::ctrl_c();
        tokio::pin!(interrupt);
        let mut interrupted = false;

        loop {
            tokio::select! {
                joined = workers.join_next() => match joined {
                    Some(Err(e)) => tracing::error!("[manager] worker task failed: {}", e),
                    Some(Ok(())) => {}
                    None => break,
                },
                _ = &mut interrupt, if !interrupted => {
                    interrupted = true;
                    if self.health.trip() {
                        tracing::warn!("[manager] interrupt received, shutting down workers");
                    }
                }
            }
        }

        // Persist whatever is still outstanding so the next run can resume.
        let outstanding = self.checkpoint.snapshot();
        self.storage
            .lock()
            .expect("storage lock poisoned")
            .save_checkpoint(&outstanding)?;
        if !outstanding.is_empty() {
            tracing::info!(
                "[manager] checkpointed {} outstanding sessions",
                outstanding.len()
            );
        }

        Ok(RunReport {
            processed: self.processed.load(Ordering::SeqCst),
            unchanged: self.unchanged.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            sessions_enqueued: self.queue.enqueued_total(),
            outstanding: outstanding.len() as u64,
            duration: started.elapsed(),
        })
    }

    /// Records a newly discovered session and queues it
    ///
    /// A sid already present in the checkpoint map is queued or in flight,
    /// so the same logical work is never enqueued twice.
    fn discover(&self, session: Session) {
        if self.checkpoint.contains(&session.sid) {
            tracing::debug!("[manager] already queued: {}", session.sid);
            return;
        }
        self.checkpoint.insert(session.clone());
        self.queue.enqueue(session);
    }

    /// One worker loop: dequeue, process, account - until shutdown
    async fn worker(self: Arc<Self>, wid: u32) {
        let idle_timeout = self.config.crawler.idle_timeout();

        while !self.health.should_stop() {
            let mut session = match self.queue.dequeue(idle_timeout).await {
                Some(session) => session,
                None => {
                    if self.health.trip() {
                        tracing::info!(
                            "[manager] no new queue entry for {}s; run complete, \
                             shutting down workers",
                            idle_timeout.as_secs()
                        );
                    }
                    continue;
                }
            };

            let tag = format!("[w{}][{}][{}]", wid, session.kind, session.sid);
            if session.retry_count == 0 {
                tracing::info!("{} start", tag);
            } else {
                tracing::info!("{} retry {}", tag, session.retry_count);
            }

            match self.process_session(&session).await {
                Ok(outcome) => {
                    self.checkpoint.remove(&session.sid);
                    match outcome {
                        ProcessOutcome::Completed => {
                            self.processed.fetch_add(1, Ordering::SeqCst);
                        }
                        ProcessOutcome::Unchanged => {
                            self.unchanged.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                    self.health.record_outcome(true);
                }
                Err(SessionError::Http(e)) => {
                    tracing::warn!("{} fetch failed: {}", tag, e);
                    if session.retry_count < self.config.crawler.max_retry_count {
                        session.retry_count += 1;
                        // The checkpoint entry follows the session's retry state.
                        self.checkpoint.insert(session.clone());
                        self.queue.enqueue(session);
                        tracing::info!("{} queued for retry", tag);
                    } else {
                        tracing::warn!("{} retry limit reached", tag);
                        self.finish_failed(&session).await;
                    }
                    self.health.record_outcome(false);
                }
                Err(SessionError::Malformed(e)) => {
                    tracing::error!("{} malformed content: {}", tag, e);
                    self.finish_failed(&session).await;
                    self.health.record_outcome(false);
                }
                Err(SessionError::Storage(e)) => {
                    // Storage is assumed available; losing it fails the run.
                    // The checkpoint entry stays, so the session resumes later.
                    tracing::error!("{} storage failure: {}; halting run", tag, e);
                    self.failed.fetch_add(1, Ordering::SeqCst);
                    self.health.trip();
                }
            }

            self.queue.task_done();
        }

        tracing::info!("[manager] worker w{} stopped", wid);
    }

    /// Processes one session; every failure is classified by `SessionError`
    async fn process_session(&self, session: &Session) -> Result<ProcessOutcome, SessionError> {
        match session.kind {
            ResourceKind::Page => self.process_page(session).await,
            ResourceKind::Book => self.process_book(session).await,
        }
    }

    async fn process_page(&self, session: &Session) -> Result<ProcessOutcome, SessionError> {
        let body = fetch_page(&self.client, &session.resource_url).await?;
        let page_url = Url::parse(&session.resource_url)
            .map_err(|e| ExtractError::Page(format!("invalid page url: {}", e)))?;
        let listing = extract::extract_page(&body, &page_url)?;

        // Only the seed page expands the catalogue: it alone knows the total
        // count, and every page lists the same number of books.
        if session.resource_id == 1
            && !self.config.crawler.single_page
            && !listing.book_urls.is_empty()
        {
            let page_count = total_page_count(listing.total_book_count, listing.book_urls.len());
            for n in 2..=page_count {
                self.discover(Session::page(n, self.config.site.page_url(n)));
            }
        }

        for url in &listing.book_urls {
            let book_id = extract::book_id_from_url(url).ok_or_else(|| {
                ExtractError::Page(format!("book link without recognizable id: {}", url))
            })?;
            self.discover(Session::book(book_id, url.clone()));
        }

        Ok(ProcessOutcome::Completed)
    }

    async fn process_book(&self, session: &Session) -> Result<ProcessOutcome, SessionError> {
        // Conditional fetch only when the baseline recorded a validation
        // token for this identity; everything else is fetched and diffed.
        let last_etag = match self.mode {
            RunMode::Incremental => self
                .baseline
                .get(&session.resource_id)
                .and_then(|stored| stored.validation_token())
                .map(str::to_string),
            RunMode::Fresh => None,
        };

        let fetched = fetch_book(
            &self.client,
            session.resource_id,
            &session.resource_url,
            last_etag.as_deref(),
            self.snapshot_dir.as_deref(),
        )
        .await?;

        match fetched {
            BookFetch::NotModified { .. } => {
                tracing::info!("[manager] not modified: {}", session.sid);
                Ok(ProcessOutcome::Unchanged)
            }
            BookFetch::Fetched { etag, body } => {
                let book_url = Url::parse(&session.resource_url)
                    .map_err(|e| ExtractError::Book(format!("invalid book url: {}", e)))?;
                let record = extract::extract_book(&body, session.resource_id, &book_url)?;
                self.push_record(session, etag, Some(record)).await?;
                Ok(ProcessOutcome::Completed)
            }
        }
    }

    /// Terminal failure: record a placeholder where required, then complete
    /// the session so it leaves the checkpoint.
    async fn finish_failed(&self, session: &Session) {
        if session.kind == ResourceKind::Book && self.mode == RunMode::Fresh {
            tracing::info!("[manager] saving {} with failed status", session.sid);
            if let Err(e) = self.push_record(session, None, None).await {
                tracing::error!(
                    "[manager] could not store failure placeholder for {}: {}; halting run",
                    session.sid,
                    e
                );
                // Leave the checkpoint entry so the session resumes later.
                self.health.trip();
                return;
            }
        }
        self.checkpoint.remove(&session.sid);
        self.failed.fetch_add(1, Ordering::SeqCst);
    }

    /// Storage stage: upsert the document and, in incremental mode, classify
    /// the result as add, update, or unchanged and append to the changelog.
    async fn push_record(
        &self,
        session: &Session,
        etag: Option<String>,
        record: Option<Book>,
    ) -> Result<(), StorageError> {
        if self.mode == RunMode::Incremental && record.is_none() {
            // The previously stored version stays authoritative.
            return Ok(());
        }

        let timestamp = Utc::now();
        let stored = StoredBook {
            bts_id: session.resource_id,
            metadata: CrawlMetadata {
                timestamp,
                status: if record.is_some() {
                    CrawlStatus::Success
                } else {
                    CrawlStatus::Failed
                },
                source_url: session.resource_url.clone(),
                etag: etag.unwrap_or_default(),
            },
            record,
        };

        let outcome = self
            .storage
            .lock()
            .expect("storage lock poisoned")
            .upsert_book(&stored)?;

        if self.mode == RunMode::Fresh {
            tracing::info!("[manager] pushed to storage: {}", session.sid);
            return Ok(());
        }

        let old_record = self
            .baseline
            .get(&stored.bts_id)
            .and_then(|old| old.record.as_ref());

        let (event, changes) = match (outcome, old_record, stored.record.as_ref()) {
            // Replacing a failed placeholder is an addition: there is no old
            // record to diff against.
            (UpsertOutcome::Inserted, _, _) | (UpsertOutcome::Replaced, None, _) => {
                (ChangeEvent::Add, BTreeMap::new())
            }
            (UpsertOutcome::Replaced, Some(old), Some(new)) => {
                let changes = field_changes(old, new);
                if changes.is_empty() {
                    tracing::info!("[manager] unchanged: {}", session.sid);
                    return Ok(());
                }
                (ChangeEvent::Update, changes)
            }
            (UpsertOutcome::Replaced, Some(_), None) => unreachable!(
                "incremental push_record is never called without a record"
            ),
        };

        tracing::info!("[manager] book {}: {}", event, session.sid);
        self.storage
            .lock()
            .expect("storage lock poisoned")
            .append_change(&ChangelogEntry {
                bts_id: stored.bts_id,
                event,
                timestamp,
                changes,
            })?;

        // Best effort only; a notification failure must not fail the crawl.
        self.notifier.notify(event, stored.bts_id).await;

        Ok(())
    }
}

/// Number of catalogue pages implied by the seed page's listing
fn total_page_count(total_book_count: u32, books_per_page: usize) -> u32 {
    total_book_count.div_ceil(books_per_page as u32)
}
