//! HTTP fetcher implementation
//!
//! This module performs all HTTP requests for the crawler:
//! - Building a client with a fixed browser header profile, timeout, and
//!   optional proxy
//! - Unconditional page fetches
//! - Conditional book fetches via If-None-Match, surfacing 304 as a
//!   distinct non-error outcome
//! - Raw snapshot persistence for fetched book pages

use crate::config::SiteConfig;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Errors from a single fetch; both variants are retryable
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected status {status} for {url}")]
    Status { url: String, status: StatusCode },
}

impl FetchError {
    fn transport(url: &str, source: reqwest::Error) -> Self {
        Self::Transport {
            url: url.to_string(),
            source,
        }
    }
}

/// Result of a conditional book fetch
#[derive(Debug)]
pub enum BookFetch {
    /// Fresh content, with the entity tag the server attached to it
    Fetched { etag: Option<String>, body: String },

    /// The server confirmed the cached version is still current
    NotModified { etag: Option<String> },
}

/// Fixed browser header profile sent with every request
///
/// Accept-Encoding is deliberately absent: reqwest negotiates gzip/brotli
/// itself and transparently decompresses.
fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
        ),
    );
    headers.insert(
        header::ACCEPT_LANGUAGE,
        HeaderValue::from_static("en-US,en;q=0.9"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(
        header::UPGRADE_INSECURE_REQUESTS,
        HeaderValue::from_static("1"),
    );
    headers
}

/// Builds the HTTP client used by all workers
pub fn build_http_client(site: &SiteConfig, timeout: Duration) -> Result<Client, reqwest::Error> {
    let mut builder = Client::builder()
        .user_agent(
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
             (KHTML, like Gecko) Chrome/142.0.0.0 Safari/537.36",
        )
        .default_headers(browser_headers())
        .timeout(timeout)
        .gzip(true)
        .brotli(true);

    if let Some(proxy) = &site.proxy {
        builder = builder.proxy(reqwest::Proxy::all(proxy)?);
    }

    builder.build()
}

/// Fetches a catalogue listing page unconditionally
pub async fn fetch_page(client: &Client, url: &str) -> Result<String, FetchError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| FetchError::transport(url, e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            url: url.to_string(),
            status,
        });
    }

    response
        .text()
        .await
        .map_err(|e| FetchError::transport(url, e))
}

/// Fetches a book detail page, conditionally when a validation token is given
///
/// Sends `If-None-Match: <last_etag>` when a token is supplied; a 304 reply
/// short-circuits to [`BookFetch::NotModified`]. On fresh content, a raw
/// snapshot is written to `<snapshot_dir>/<bts_id>.html` when a directory is
/// configured, a pure side effect whose failure is logged, never propagated.
pub async fn fetch_book(
    client: &Client,
    bts_id: i64,
    url: &str,
    last_etag: Option<&str>,
    snapshot_dir: Option<&Path>,
) -> Result<BookFetch, FetchError> {
    let mut request = client.get(url);
    if let Some(tag) = last_etag {
        request = request.header(header::IF_NONE_MATCH, tag);
    }

    let response = request
        .send()
        .await
        .map_err(|e| FetchError::transport(url, e))?;

    let etag = response
        .headers()
        .get(header::ETAG)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let status = response.status();
    if status == StatusCode::NOT_MODIFIED {
        return Ok(BookFetch::NotModified { etag });
    }
    if !status.is_success() {
        return Err(FetchError::Status {
            url: url.to_string(),
            status,
        });
    }

    let body = response
        .text()
        .await
        .map_err(|e| FetchError::transport(url, e))?;

    if let Some(dir) = snapshot_dir {
        let path = dir.join(format!("{}.html", bts_id));
        if let Err(e) = tokio::fs::write(&path, &body).await {
            tracing::warn!("failed to write snapshot {}: {}", path.display(), e);
        }
    }

    Ok(BookFetch::Fetched { etag, body })
}
