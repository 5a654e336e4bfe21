//! Database schema definitions
//!
//! All SQL schema definitions for the shelfsweep database. The compound book
//! indexes cover the filter/sort combinations the read API issues.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- One document per book identity
CREATE TABLE IF NOT EXISTS books (
    bts_id INTEGER PRIMARY KEY,
    name TEXT,
    description TEXT,
    url TEXT,
    category TEXT,
    upc TEXT,
    price REAL,
    tax REAL,
    in_stock INTEGER,
    stock_count INTEGER,
    review_count INTEGER,
    cover_image_url TEXT,
    rating INTEGER,
    crawled_at TEXT NOT NULL,
    crawl_status TEXT NOT NULL,
    source_url TEXT NOT NULL,
    etag TEXT NOT NULL DEFAULT ''
);

CREATE INDEX IF NOT EXISTS idx_books_category_price ON books(category, price, rating, review_count);
CREATE INDEX IF NOT EXISTS idx_books_price ON books(price, rating, review_count);
CREATE INDEX IF NOT EXISTS idx_books_rating ON books(rating, price, review_count);

-- Append-only change log, written in incremental runs
CREATE TABLE IF NOT EXISTS changelog (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    bts_id INTEGER NOT NULL,
    event TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    changes TEXT NOT NULL DEFAULT '{}'
);

CREATE INDEX IF NOT EXISTS idx_changelog_event ON changelog(event, timestamp);
CREATE INDEX IF NOT EXISTS idx_changelog_timestamp ON changelog(timestamp);

-- Outstanding sessions at run end, replaced wholesale
CREATE TABLE IF NOT EXISTS checkpoint (
    sid TEXT PRIMARY KEY,
    kind TEXT NOT NULL,
    resource_id INTEGER NOT NULL,
    resource_url TEXT NOT NULL,
    retry_count INTEGER NOT NULL DEFAULT 0
);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
