//! Session: the unit of queued crawl work
//!
//! A session is either a catalogue page to list or a single book to fetch.
//! Its id is derived from the resource kind and id (`p3`, `b112`), so the
//! same logical work always maps to the same session id no matter how often
//! it is re-discovered or re-enqueued.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What a session fetches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// A catalogue listing page (yields book URLs and, on the seed, the total count)
    Page,
    /// A single book detail page (yields one record)
    Book,
}

impl ResourceKind {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Page => "page",
            Self::Book => "book",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "page" => Some(Self::Page),
            "book" => Some(Self::Book),
            _ => None,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_string())
    }
}

/// A unit of queued crawl work, serializable for the run checkpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Stable session id derived from kind + resource id
    pub sid: String,

    /// Page number or book id
    pub resource_id: i64,

    pub kind: ResourceKind,

    /// Absolute URL of the resource
    pub resource_url: String,

    /// Transient-failure retries so far; incremented on each re-enqueue
    #[serde(default)]
    pub retry_count: u32,
}

impl Session {
    /// Creates a page session (`p{n}`)
    pub fn page(page_number: u32, resource_url: String) -> Self {
        Self {
            sid: format!("p{}", page_number),
            resource_id: i64::from(page_number),
            kind: ResourceKind::Page,
            resource_url,
            retry_count: 0,
        }
    }

    /// Creates a book session (`b{id}`)
    pub fn book(book_id: i64, resource_url: String) -> Self {
        Self {
            sid: format!("b{}", book_id),
            resource_id: book_id,
            kind: ResourceKind::Book,
            resource_url,
            retry_count: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_session_id() {
        let session = Session::page(1, "https://example.com/page-1.html".to_string());
        assert_eq!(session.sid, "p1");
        assert_eq!(session.resource_id, 1);
        assert_eq!(session.kind, ResourceKind::Page);
        assert_eq!(session.retry_count, 0);
    }

    #[test]
    fn test_book_session_id() {
        let session = Session::book(112, "https://example.com/book_112/index.html".to_string());
        assert_eq!(session.sid, "b112");
        assert_eq!(session.kind, ResourceKind::Book);
    }

    #[test]
    fn test_same_resource_same_sid() {
        let a = Session::book(7, "https://example.com/a_7/index.html".to_string());
        let b = Session::book(7, "https://example.com/a_7/index.html".to_string());
        assert_eq!(a.sid, b.sid);
    }

    #[test]
    fn test_resource_kind_roundtrip() {
        for kind in [ResourceKind::Page, ResourceKind::Book] {
            assert_eq!(
                ResourceKind::from_db_string(kind.to_db_string()),
                Some(kind)
            );
        }
        assert_eq!(ResourceKind::from_db_string("invalid"), None);
    }

    #[test]
    fn test_session_serde_roundtrip() {
        let mut session = Session::page(4, "https://example.com/page-4.html".to_string());
        session.retry_count = 2;

        let json = serde_json::to_string(&session).unwrap();
        let back: Session = serde_json::from_str(&json).unwrap();
        assert_eq!(session, back);
    }
}
