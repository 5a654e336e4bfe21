use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for shelfsweep
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub site: SiteConfig,
    pub crawler: CrawlerConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
}

/// Target catalogue configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Catalogue root, e.g. "https://books.toscrape.com/catalogue"
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Optional proxy URL for all outgoing requests
    #[serde(default)]
    pub proxy: Option<String>,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Number of concurrent workers draining the queue
    #[serde(rename = "worker-count")]
    pub worker_count: u32,

    /// Maximum retries per session before it fails permanently
    #[serde(rename = "max-retry-count")]
    pub max_retry_count: u32,

    /// Consecutive failures (across all workers) before the run is halted
    #[serde(rename = "max-consecutive-failures")]
    pub max_consecutive_failures: u32,

    /// Per-request timeout in seconds
    #[serde(rename = "request-timeout-secs")]
    pub request_timeout_secs: u64,

    /// Seconds of queue silence before the run is considered complete
    #[serde(rename = "idle-timeout-secs")]
    pub idle_timeout_secs: u64,

    /// Crawl only the seed page, never expanding to further catalogue pages
    #[serde(rename = "single-page", default)]
    pub single_page: bool,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Directory for raw HTML snapshots; no snapshots are written when unset
    #[serde(rename = "snapshot-dir", default)]
    pub snapshot_dir: Option<String>,
}

/// Change-notification configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotifyConfig {
    /// Webhook endpoint to POST add/update events to
    #[serde(rename = "webhook-url", default)]
    pub webhook_url: Option<String>,
}

impl SiteConfig {
    /// Builds the URL of the n-th catalogue page
    pub fn page_url(&self, page: u32) -> String {
        format!("{}/page-{}.html", self.base_url.trim_end_matches('/'), page)
    }
}

impl CrawlerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}
