//! Statistics generation from the crawl database

use crate::model::{ChangeEvent, CrawlStatus};
use crate::storage::Storage;
use crate::CrawlError;
use chrono::{DateTime, Utc};

/// Crawl statistics summary
#[derive(Debug, Clone)]
pub struct CrawlStatistics {
    /// Total stored documents, failed placeholders included
    pub total_books: u64,

    pub succeeded: u64,
    pub failed: u64,

    /// Changelog entries by event kind
    pub additions: u64,
    pub updates: u64,

    /// Timestamp of the most recent stored crawl
    pub last_crawled_at: Option<DateTime<Utc>>,
}

/// Loads statistics from storage
pub fn load_statistics(storage: &dyn Storage) -> Result<CrawlStatistics, CrawlError> {
    Ok(CrawlStatistics {
        total_books: storage.count_books()?,
        succeeded: storage.count_books_by_status(CrawlStatus::Success)?,
        failed: storage.count_books_by_status(CrawlStatus::Failed)?,
        additions: storage.count_changes_by_event(ChangeEvent::Add)?,
        updates: storage.count_changes_by_event(ChangeEvent::Update)?,
        last_crawled_at: storage.latest_crawl_timestamp()?,
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Crawl Statistics ===\n");

    println!("Books:");
    println!("  Stored: {}", stats.total_books);
    println!("  Succeeded: {}", stats.succeeded);
    println!("  Failed: {}", stats.failed);
    println!();

    println!("Changelog:");
    println!("  Additions: {}", stats.additions);
    println!("  Updates: {}", stats.updates);
    println!();

    match &stats.last_crawled_at {
        Some(timestamp) => println!("Last crawled at: {}", timestamp.to_rfc3339()),
        None => println!("No crawl data recorded yet"),
    }
}
