//! Domain model for the catalogue crawler
//!
//! This module defines the unit of queued work (`Session`), the harvested
//! record (`Book`) with its stored form and crawl metadata, and the flat
//! field-level diff used for change detection.

mod book;
mod diff;
mod session;

pub use book::{Book, ChangeEvent, ChangelogEntry, CrawlMetadata, CrawlStatus, StoredBook};
pub use diff::{field_changes, FieldChange};
pub use session::{ResourceKind, Session};
