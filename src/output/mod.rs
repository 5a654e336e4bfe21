//! Reporting over stored crawl data

mod stats;

pub use stats::{load_statistics, print_statistics, CrawlStatistics};
