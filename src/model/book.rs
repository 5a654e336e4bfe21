//! Book record, stored document, and changelog entry types

use crate::model::diff::FieldChange;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A harvested book record
///
/// Produced by extracting a book detail page; never mutated in place. Each
/// crawl yields a full replacement candidate for the same `bts_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    /// Catalogue identity, parsed from the book URL
    pub bts_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub url: String,
    pub category: String,
    /// Universal Product Code
    pub upc: String,
    /// Price excluding tax
    pub price: f64,
    pub tax: f64,
    pub in_stock: bool,
    pub stock_count: u32,
    pub review_count: u32,
    pub cover_image_url: String,
    /// Star rating, 1 through 5
    pub rating: u8,
}

/// Outcome status recorded with every stored document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlStatus {
    Success,
    Failed,
}

impl CrawlStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Metadata attached to every stored document
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlMetadata {
    pub timestamp: DateTime<Utc>,
    pub status: CrawlStatus,
    pub source_url: String,
    /// Entity tag from the last fetch; empty when the server sent none
    pub etag: String,
}

/// One document per book identity, as persisted in the books table
///
/// `record` is `None` for the failed-status placeholder written when a book
/// session exhausts its retries in a fresh crawl.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredBook {
    pub bts_id: i64,
    pub record: Option<Book>,
    pub metadata: CrawlMetadata,
}

impl StoredBook {
    /// Validation token for a conditional re-fetch, if one was recorded
    pub fn validation_token(&self) -> Option<&str> {
        if self.metadata.etag.is_empty() {
            None
        } else {
            Some(&self.metadata.etag)
        }
    }
}

/// Kind of detected mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeEvent {
    Add,
    Update,
}

impl ChangeEvent {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Update => "update",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "add" => Some(Self::Add),
            "update" => Some(Self::Update),
            _ => None,
        }
    }
}

impl fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_string())
    }
}

/// One append-only changelog row per detected add/update
#[derive(Debug, Clone, PartialEq)]
pub struct ChangelogEntry {
    pub bts_id: i64,
    pub event: ChangeEvent,
    pub timestamp: DateTime<Utc>,
    /// Field name -> old/new pair; empty for `add` events
    pub changes: BTreeMap<String, FieldChange>,
}
