//! SQLite storage implementation

use crate::model::{
    Book, ChangeEvent, ChangelogEntry, CrawlMetadata, CrawlStatus, ResourceKind, Session,
    StoredBook,
};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{BookQuery, ChangelogQuery, UpsertOutcome};
use crate::CrawlError;
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;

const BOOK_COLUMNS: &str = "bts_id, name, description, url, category, upc, price, tax, \
     in_stock, stock_count, review_count, cover_image_url, rating, \
     crawled_at, crawl_status, source_url, etag";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Opens (or creates) the database at the given path
    pub fn new(path: &Path) -> Result<Self, CrawlError> {
        let conn = Connection::open(path)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    pub fn new_in_memory() -> Result<Self, CrawlError> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn read_stored(row: &Row<'_>) -> rusqlite::Result<StoredBook> {
        let bts_id: i64 = row.get(0)?;
        let status = CrawlStatus::from_db_string(&row.get::<_, String>(14)?)
            .unwrap_or(CrawlStatus::Failed);

        let name: Option<String> = row.get(1)?;
        let record = match (status, name) {
            (CrawlStatus::Success, Some(name)) => Some(Book {
                bts_id,
                name,
                description: row.get(2)?,
                url: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                category: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                upc: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
                price: row.get::<_, Option<f64>>(6)?.unwrap_or_default(),
                tax: row.get::<_, Option<f64>>(7)?.unwrap_or_default(),
                in_stock: row.get::<_, Option<bool>>(8)?.unwrap_or_default(),
                stock_count: row.get::<_, Option<u32>>(9)?.unwrap_or_default(),
                review_count: row.get::<_, Option<u32>>(10)?.unwrap_or_default(),
                cover_image_url: row.get::<_, Option<String>>(11)?.unwrap_or_default(),
                rating: row.get::<_, Option<u8>>(12)?.unwrap_or_default(),
            }),
            _ => None,
        };

        Ok(StoredBook {
            bts_id,
            record,
            metadata: CrawlMetadata {
                timestamp: row.get(13)?,
                status,
                source_url: row.get(15)?,
                etag: row.get(16)?,
            },
        })
    }
}

impl Storage for SqliteStorage {
    // ===== Books =====

    fn upsert_book(&mut self, book: &StoredBook) -> StorageResult<UpsertOutcome> {
        let existed: bool = self
            .conn
            .query_row(
                "SELECT 1 FROM books WHERE bts_id = ?1",
                params![book.bts_id],
                |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false);

        let record = book.record.as_ref();
        self.conn.execute(
            "INSERT OR REPLACE INTO books (bts_id, name, description, url, category, upc, \
             price, tax, in_stock, stock_count, review_count, cover_image_url, rating, \
             crawled_at, crawl_status, source_url, etag) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
            params![
                book.bts_id,
                record.map(|b| b.name.as_str()),
                record.and_then(|b| b.description.as_deref()),
                record.map(|b| b.url.as_str()),
                record.map(|b| b.category.as_str()),
                record.map(|b| b.upc.as_str()),
                record.map(|b| b.price),
                record.map(|b| b.tax),
                record.map(|b| b.in_stock),
                record.map(|b| b.stock_count),
                record.map(|b| b.review_count),
                record.map(|b| b.cover_image_url.as_str()),
                record.map(|b| b.rating),
                book.metadata.timestamp,
                book.metadata.status.to_db_string(),
                book.metadata.source_url,
                book.metadata.etag,
            ],
        )?;

        Ok(if existed {
            UpsertOutcome::Replaced
        } else {
            UpsertOutcome::Inserted
        })
    }

    fn get_book(&self, bts_id: i64) -> StorageResult<Option<StoredBook>> {
        let sql = format!("SELECT {} FROM books WHERE bts_id = ?1", BOOK_COLUMNS);
        let book = self
            .conn
            .query_row(&sql, params![bts_id], Self::read_stored)
            .optional()?;
        Ok(book)
    }

    fn load_all_books(&self) -> StorageResult<HashMap<i64, StoredBook>> {
        let sql = format!("SELECT {} FROM books", BOOK_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], Self::read_stored)?;

        let mut books = HashMap::new();
        for row in rows {
            let book = row?;
            books.insert(book.bts_id, book);
        }
        Ok(books)
    }

    fn query_books(&self, query: &BookQuery) -> StorageResult<Vec<StoredBook>> {
        let mut clauses = vec!["crawl_status = 'success'".to_string()];
        let mut values: Vec<Value> = Vec::new();

        if let Some(category) = &query.category {
            values.push(Value::Text(category.clone()));
            clauses.push(format!("category = ?{}", values.len()));
        }
        if let Some(min_price) = query.min_price {
            values.push(Value::Real(min_price));
            clauses.push(format!("price >= ?{}", values.len()));
        }
        if let Some(max_price) = query.max_price {
            values.push(Value::Real(max_price));
            clauses.push(format!("price <= ?{}", values.len()));
        }
        if let Some(min_rating) = query.min_rating {
            values.push(Value::Integer(i64::from(min_rating)));
            clauses.push(format!("rating >= ?{}", values.len()));
        }
        if let Some(in_stock) = query.in_stock {
            values.push(Value::Integer(i64::from(in_stock)));
            clauses.push(format!("in_stock = ?{}", values.len()));
        }

        let sql = format!(
            "SELECT {} FROM books WHERE {} ORDER BY {} LIMIT {} OFFSET {}",
            BOOK_COLUMNS,
            clauses.join(" AND "),
            query.sort.order_clause(),
            query.limit.map_or(-1, i64::from),
            query.offset,
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values), Self::read_stored)?;
        let mut books = Vec::new();
        for row in rows {
            books.push(row?);
        }
        Ok(books)
    }

    fn count_books(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM books", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_books_by_status(&self, status: CrawlStatus) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM books WHERE crawl_status = ?1",
            params![status.to_db_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn clear_books(&mut self) -> StorageResult<()> {
        self.conn.execute("DELETE FROM books", [])?;
        Ok(())
    }

    // ===== Changelog =====

    fn append_change(&mut self, entry: &ChangelogEntry) -> StorageResult<()> {
        let changes = serde_json::to_string(&entry.changes)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.conn.execute(
            "INSERT INTO changelog (bts_id, event, timestamp, changes) VALUES (?1, ?2, ?3, ?4)",
            params![
                entry.bts_id,
                entry.event.to_db_string(),
                entry.timestamp,
                changes
            ],
        )?;
        Ok(())
    }

    fn query_changelog(&self, query: &ChangelogQuery) -> StorageResult<Vec<ChangelogEntry>> {
        let mut clauses = vec!["1=1".to_string()];
        let mut values: Vec<Value> = Vec::new();

        if let Some(event) = query.event {
            values.push(Value::Text(event.to_db_string().to_string()));
            clauses.push(format!("event = ?{}", values.len()));
        }
        if let Some(since) = query.since {
            values.push(Value::Text(since.to_rfc3339()));
            clauses.push(format!("timestamp >= ?{}", values.len()));
        }
        if let Some(until) = query.until {
            values.push(Value::Text(until.to_rfc3339()));
            clauses.push(format!("timestamp <= ?{}", values.len()));
        }

        let sql = format!(
            "SELECT bts_id, event, timestamp, changes FROM changelog \
             WHERE {} ORDER BY timestamp, id LIMIT {}",
            clauses.join(" AND "),
            query.limit.map_or(-1, i64::from),
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values), |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, DateTime<Utc>>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (bts_id, event, timestamp, changes) = row?;
            let event = ChangeEvent::from_db_string(&event)
                .ok_or_else(|| StorageError::Serialization(format!("unknown event '{}'", event)))?;
            let changes = serde_json::from_str(&changes)
                .map_err(|e| StorageError::Serialization(e.to_string()))?;
            entries.push(ChangelogEntry {
                bts_id,
                event,
                timestamp,
                changes,
            });
        }
        Ok(entries)
    }

    fn count_changes_by_event(&self, event: ChangeEvent) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM changelog WHERE event = ?1",
            params![event.to_db_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn clear_changelog(&mut self) -> StorageResult<()> {
        self.conn.execute("DELETE FROM changelog", [])?;
        Ok(())
    }

    // ===== Run checkpoint =====

    fn save_checkpoint(&mut self, sessions: &HashMap<String, Session>) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM checkpoint", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO checkpoint (sid, kind, resource_id, resource_url, retry_count) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for session in sessions.values() {
                stmt.execute(params![
                    session.sid,
                    session.kind.to_db_string(),
                    session.resource_id,
                    session.resource_url,
                    session.retry_count,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn load_checkpoint(&self) -> StorageResult<Vec<Session>> {
        let mut stmt = self.conn.prepare(
            "SELECT sid, kind, resource_id, resource_url, retry_count FROM checkpoint",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, u32>(4)?,
            ))
        })?;

        let mut sessions = Vec::new();
        for row in rows {
            let (sid, kind, resource_id, resource_url, retry_count) = row?;
            let kind = ResourceKind::from_db_string(&kind).ok_or_else(|| {
                StorageError::Serialization(format!("unknown resource kind '{}'", kind))
            })?;
            sessions.push(Session {
                sid,
                resource_id,
                kind,
                resource_url,
                retry_count,
            });
        }
        Ok(sessions)
    }

    fn clear_checkpoint(&mut self) -> StorageResult<()> {
        self.conn.execute("DELETE FROM checkpoint", [])?;
        Ok(())
    }

    // ===== Statistics =====

    fn latest_crawl_timestamp(&self) -> StorageResult<Option<DateTime<Utc>>> {
        let latest: Option<DateTime<Utc>> = self
            .conn
            .query_row("SELECT MAX(crawled_at) FROM books", [], |row| row.get(0))?;
        Ok(latest)
    }
}
