//! HTML field extraction for catalogue and book pages
//!
//! This module turns fetched page bytes into structured data:
//! - a catalogue page yields the total book count and the listed book URLs
//! - a book detail page yields a full [`Book`](crate::model::Book) record
//!
//! Extraction is pure (no state, no I/O). Structural parse failures raise
//! [`ExtractError`], which is distinct from any transport error: malformed
//! content will not change on a retry, so the manager treats it as terminal.

mod book;
mod page;

pub use book::extract_book;
pub use page::{extract_page, PageListing};

use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

/// Structural parse failure for fetched content
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("malformed catalogue page: {0}")]
    Page(String),

    #[error("malformed book page: {0}")]
    Book(String),
}

static BOOK_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_(\d+)/index\.html$").expect("valid book-id regex"));

/// Parses the catalogue book id out of a book URL
///
/// Book URLs end in `..._<id>/index.html`; returns `None` for anything else.
pub fn book_id_from_url(url: &str) -> Option<i64> {
    BOOK_ID_RE
        .captures(url)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}
