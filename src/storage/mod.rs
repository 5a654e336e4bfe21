//! Storage module for persisting crawl data
//!
//! This module handles all database operations for the crawler, including:
//! - SQLite database initialization and schema management
//! - Book document upserts with insert/replace detection
//! - The append-only changelog
//! - Run-checkpoint persistence and resumption support
//! - The read queries consumed by downstream API layers

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::model::ChangeEvent;
use crate::CrawlError;
use chrono::{DateTime, Utc};
use std::path::Path;

/// Initializes or opens a storage database
pub fn open_storage(path: &Path) -> Result<SqliteStorage, CrawlError> {
    SqliteStorage::new(path)
}

/// Result of an identity-keyed upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No document existed for this identity before
    Inserted,
    /// An existing document was replaced
    Replaced,
}

/// Sort order for book queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BookSort {
    #[default]
    Id,
    PriceAsc,
    PriceDesc,
    RatingDesc,
    ReviewCountDesc,
}

impl BookSort {
    fn order_clause(self) -> &'static str {
        match self {
            Self::Id => "bts_id ASC",
            Self::PriceAsc => "price ASC",
            Self::PriceDesc => "price DESC",
            Self::RatingDesc => "rating DESC, price ASC",
            Self::ReviewCountDesc => "review_count DESC",
        }
    }
}

/// Filtered, sorted, paginated query over stored books
///
/// Only successfully crawled documents are returned; failed placeholders
/// have no record fields to filter on.
#[derive(Debug, Clone, Default)]
pub struct BookQuery {
    pub category: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub min_rating: Option<u8>,
    pub in_stock: Option<bool>,
    pub sort: BookSort,
    pub limit: Option<u32>,
    pub offset: u32,
}

/// Filtered query over the changelog
#[derive(Debug, Clone, Default)]
pub struct ChangelogQuery {
    pub event: Option<ChangeEvent>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
}
