//! Storage trait and error types

use crate::model::{ChangeEvent, ChangelogEntry, CrawlStatus, Session, StoredBook};
use crate::storage::{BookQuery, ChangelogQuery, UpsertOutcome};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// All writes are either identity-keyed upserts (idempotent under retry) or
/// pure appends, so at-least-once delivery from the worker pool is safe.
pub trait Storage {
    // ===== Books =====

    /// Replaces the document for this identity, inserting if absent
    ///
    /// Never a plain insert: a previously failed identity retried in a later
    /// run must overwrite its placeholder instead of raising a duplicate-key
    /// error.
    fn upsert_book(&mut self, book: &StoredBook) -> StorageResult<UpsertOutcome>;

    /// Gets the stored document for an identity
    fn get_book(&self, bts_id: i64) -> StorageResult<Option<StoredBook>>;

    /// Loads the entire document set keyed by identity
    ///
    /// This is the comparison baseline for incremental runs; diffing never
    /// re-queries storage per item.
    fn load_all_books(&self) -> StorageResult<HashMap<i64, StoredBook>>;

    /// Filtered/sorted/paginated query over successfully crawled books
    fn query_books(&self, query: &BookQuery) -> StorageResult<Vec<StoredBook>>;

    fn count_books(&self) -> StorageResult<u64>;

    fn count_books_by_status(&self, status: CrawlStatus) -> StorageResult<u64>;

    fn clear_books(&mut self) -> StorageResult<()>;

    // ===== Changelog =====

    /// Appends one changelog entry
    fn append_change(&mut self, entry: &ChangelogEntry) -> StorageResult<()>;

    /// Filtered query over the changelog, ordered by timestamp
    fn query_changelog(&self, query: &ChangelogQuery) -> StorageResult<Vec<ChangelogEntry>>;

    fn count_changes_by_event(&self, event: ChangeEvent) -> StorageResult<u64>;

    fn clear_changelog(&mut self) -> StorageResult<()>;

    // ===== Run checkpoint =====

    /// Replaces the persisted checkpoint with the given outstanding sessions
    fn save_checkpoint(&mut self, sessions: &HashMap<String, Session>) -> StorageResult<()>;

    /// Loads all checkpointed sessions
    fn load_checkpoint(&self) -> StorageResult<Vec<Session>>;

    fn clear_checkpoint(&mut self) -> StorageResult<()>;

    // ===== Statistics =====

    /// Timestamp of the most recent stored crawl, if any
    fn latest_crawl_timestamp(&self) -> StorageResult<Option<DateTime<Utc>>>;
}
