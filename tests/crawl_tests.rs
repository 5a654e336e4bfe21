//! Integration tests for the crawler
//!
//! These tests use wiremock to stand in for the catalogue site and run the
//! full crawl cycle end-to-end against a temporary SQLite database.

use shelfsweep::config::{Config, CrawlerConfig, NotifyConfig, OutputConfig, SiteConfig};
use shelfsweep::crawler::{run_crawl, RunMode, StartMode};
use shelfsweep::model::{ChangeEvent, CrawlStatus, Session};
use shelfsweep::storage::{BookQuery, ChangelogQuery, SqliteStorage, Storage};
use std::path::Path;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration pointing at the mock server
fn test_config(base_url: &str, db_path: &Path) -> Config {
    Config {
        site: SiteConfig {
            base_url: format!("{}/catalogue", base_url),
            proxy: None,
        },
        crawler: CrawlerConfig {
            worker_count: 3,
            max_retry_count: 2,
            max_consecutive_failures: 50,
            request_timeout_secs: 5,
            idle_timeout_secs: 1,
            single_page: false,
        },
        output: OutputConfig {
            database_path: db_path.to_string_lossy().into_owned(),
            snapshot_dir: None,
        },
        notify: NotifyConfig::default(),
    }
}

fn open(db_path: &Path) -> SqliteStorage {
    SqliteStorage::new(db_path).expect("failed to open test database")
}

/// A catalogue listing page claiming `total` books and linking the given ids
fn listing_html(total: u32, book_ids: &[i64]) -> String {
    let articles: String = book_ids
        .iter()
        .map(|id| {
            format!(
                r#"<article class="product_pod"><h3><a href="book_{id}/index.html">Book {id}</a></h3></article>"#,
            )
        })
        .collect();
    format!(
        r#"<html><body>
        <form method="get" class="form-horizontal"><strong>{total}</strong> results.</form>
        <section>{articles}</section>
        </body></html>"#,
    )
}

/// A complete book detail page
fn book_html(id: i64, price: f64, stock: u32) -> String {
    format!(
        r#"<html><body>
        <ul class="breadcrumb">
            <li><a href="/">Home</a></li>
            <li><a href="/books">Books</a></li>
            <li><a href="/books/fiction">Fiction</a></li>
            <li class="active">Book {id}</li>
        </ul>
        <article class="product_page">
            <div id="product_gallery"><img src="../../media/{id}.jpg" alt=""/></div>
            <div class="product_main">
                <h1>Book {id}</h1>
                <p class="star-rating Three"></p>
            </div>
            <div id="product_description" class="sub-header"><h2>Product Description</h2></div>
            <p>Description of book {id}.</p>
            <table class="table table-striped">
                <tr><th>UPC</th><td>upc-{id}</td></tr>
                <tr><th>Price (excl. tax)</th><td>£{price}</td></tr>
                <tr><th>Price (incl. tax)</th><td>£{price}</td></tr>
                <tr><th>Tax</th><td>£0.00</td></tr>
                <tr><th>Availability</th><td>In stock ({stock} available)</td></tr>
                <tr><th>Number of reviews</th><td>0</td></tr>
            </table>
        </article>
        </body></html>"#,
    )
}

async fn mount_page(server: &MockServer, page: u32, total: u32, book_ids: &[i64], expect: u64) {
    Mock::given(method("GET"))
        .and(path(format!("/catalogue/page-{}.html", page)))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_html(total, book_ids)))
        .expect(expect)
        .mount(server)
        .await;
}

async fn mount_book(server: &MockServer, id: i64, price: f64, etag: Option<&str>, expect: u64) {
    let mut response = ResponseTemplate::new(200).set_body_string(book_html(id, price, 5));
    if let Some(tag) = etag {
        response = response.insert_header("etag", tag);
    }
    Mock::given(method("GET"))
        .and(path(format!("/catalogue/book_{}/index.html", id)))
        .respond_with(response)
        .expect(expect)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_fresh_crawl_covers_whole_catalogue() {
    let server = MockServer::start().await;
    let tmp = tempfile::tempdir().unwrap();
    let db_path = tmp.path().join("crawl.db");

    // Seed page claims 40 books over two pages of 20
    let first_page: Vec<i64> = (1..=20).collect();
    let second_page: Vec<i64> = (21..=40).collect();
    mount_page(&server, 1, 40, &first_page, 1).await;
    mount_page(&server, 2, 40, &second_page, 1).await;
    for id in 1..=40 {
        mount_book(&server, id, 10.0, None, 1).await;
    }

    let config = test_config(&server.uri(), &db_path);
    let report = run_crawl(config, RunMode::Fresh, StartMode::Fresh)
        .await
        .expect("crawl failed");

    // Exactly 2 page sessions and 40 book sessions, no more, no fewer
    assert_eq!(report.sessions_enqueued, 42);
    assert_eq!(report.processed, 42);
    assert_eq!(report.failed, 0);
    assert_eq!(report.outstanding, 0);

    let storage = open(&db_path);
    assert_eq!(storage.count_books().unwrap(), 40);
    assert_eq!(
        storage.count_books_by_status(CrawlStatus::Success).unwrap(),
        40
    );
    // Fresh mode never writes the changelog
    assert_eq!(storage.count_changes_by_event(ChangeEvent::Add).unwrap(), 0);
    assert!(storage.load_checkpoint().unwrap().is_empty());

    // Per-mock expectations (each page and book fetched exactly once) are
    // verified when the server drops.
}

#[tokio::test]
async fn test_single_page_crawl_never_expands() {
    let server = MockServer::start().await;
    let tmp = tempfile::tempdir().unwrap();
    let db_path = tmp.path().join("crawl.db");

    let first_page: Vec<i64> = (1..=3).collect();
    mount_page(&server, 1, 40, &first_page, 1).await;
    mount_page(&server, 2, 40, &[], 0).await;
    for id in 1..=3 {
        mount_book(&server, id, 10.0, None, 1).await;
    }

    let mut config = test_config(&server.uri(), &db_path);
    config.crawler.single_page = true;

    let report = run_crawl(config, RunMode::Fresh, StartMode::Fresh)
        .await
        .expect("crawl failed");

    assert_eq!(report.sessions_enqueued, 4);
    assert_eq!(open(&db_path).count_books().unwrap(), 3);
}

#[tokio::test]
async fn test_retry_exhaustion_stores_failed_placeholder() {
    let server = MockServer::start().await;
    let tmp = tempfile::tempdir().unwrap();
    let db_path = tmp.path().join("crawl.db");

    mount_page(&server, 1, 2, &[1, 2], 1).await;
    mount_book(&server, 1, 10.0, None, 1).await;
    // Book 2 always fails: initial attempt + max_retry_count retries
    Mock::given(method("GET"))
        .and(path("/catalogue/book_2/index.html"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let config = test_config(&server.uri(), &db_path);
    let report = run_crawl(config, RunMode::Fresh, StartMode::Fresh)
        .await
        .expect("crawl failed");

    assert_eq!(report.failed, 1);
    assert_eq!(report.outstanding, 0);

    let storage = open(&db_path);
    let failed = storage.get_book(2).unwrap().unwrap();
    assert_eq!(failed.metadata.status, CrawlStatus::Failed);
    assert!(failed.record.is_none());
    // The identity is recorded, not silently missing
    assert_eq!(storage.count_books().unwrap(), 2);
    assert!(storage.load_checkpoint().unwrap().is_empty());
}

#[tokio::test]
async fn test_malformed_book_is_never_retried() {
    let server = MockServer::start().await;
    let tmp = tempfile::tempdir().unwrap();
    let db_path = tmp.path().join("crawl.db");

    mount_page(&server, 1, 1, &[1], 1).await;
    // Parses as HTML but has none of the expected structure; exactly one
    // request proves the session was not retried.
    Mock::given(method("GET"))
        .and(path("/catalogue/book_1/index.html"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html><body>nope</body></html>"))
        .expect(1)
        .mount(&server)
        .await;

    let config = test_config(&server.uri(), &db_path);
    let report = run_crawl(config, RunMode::Fresh, StartMode::Fresh)
        .await
        .expect("crawl failed");

    assert_eq!(report.failed, 1);
    let storage = open(&db_path);
    assert_eq!(
        storage.get_book(1).unwrap().unwrap().metadata.status,
        CrawlStatus::Failed
    );
}

#[tokio::test]
async fn test_incremental_not_modified_short_circuits() {
    let server = MockServer::start().await;
    let tmp = tempfile::tempdir().unwrap();
    let db_path = tmp.path().join("crawl.db");

    // First, a fresh crawl stores both books with validation tokens.
    mount_page(&server, 1, 2, &[1, 2], 1).await;
    mount_book(&server, 1, 10.0, Some("\"b1-v1\""), 1).await;
    mount_book(&server, 2, 20.0, Some("\"b2-v1\""), 1).await;

    let config = test_config(&server.uri(), &db_path);
    run_crawl(config.clone(), RunMode::Fresh, StartMode::Fresh)
        .await
        .expect("fresh crawl failed");

    let before = open(&db_path).get_book(1).unwrap().unwrap();
    assert_eq!(before.metadata.etag, "\"b1-v1\"");

    // Incremental run: the server answers both conditional fetches with 304.
    server.reset().await;
    mount_page(&server, 1, 2, &[1, 2], 1).await;
    for (id, tag) in [(1, "\"b1-v1\""), (2, "\"b2-v1\"")] {
        Mock::given(method("GET"))
            .and(path(format!("/catalogue/book_{}/index.html", id)))
            .and(header("if-none-match", tag))
            .respond_with(ResponseTemplate::new(304).insert_header("etag", tag))
            .expect(1)
            .mount(&server)
            .await;
    }

    let report = run_crawl(config, RunMode::Incremental, StartMode::Auto)
        .await
        .expect("incremental crawl failed");

    assert_eq!(report.unchanged, 2);
    assert_eq!(report.failed, 0);
    assert_eq!(report.outstanding, 0);

    let storage = open(&db_path);
    // No storage write: the stored timestamp is untouched
    let after = storage.get_book(1).unwrap().unwrap();
    assert_eq!(after.metadata.timestamp, before.metadata.timestamp);
    // And no changelog entries of any kind
    assert_eq!(storage.count_changes_by_event(ChangeEvent::Add).unwrap(), 0);
    assert_eq!(
        storage.count_changes_by_event(ChangeEvent::Update).unwrap(),
        0
    );
    assert!(storage.load_checkpoint().unwrap().is_empty());
}

#[tokio::test]
async fn test_incremental_classifies_add_update_unchanged() {
    let server = MockServer::start().await;
    let tmp = tempfile::tempdir().unwrap();
    let db_path = tmp.path().join("crawl.db");

    // Fresh crawl: books 1 and 2. Only book 1 gets a validation token, so
    // book 2 will be re-fetched and diffed on the next run.
    mount_page(&server, 1, 2, &[1, 2], 1).await;
    mount_book(&server, 1, 10.0, Some("\"b1-v1\""), 1).await;
    mount_book(&server, 2, 20.0, None, 1).await;

    let config = test_config(&server.uri(), &db_path);
    run_crawl(config.clone(), RunMode::Fresh, StartMode::Fresh)
        .await
        .expect("fresh crawl failed");

    // Incremental run: book 1 unmodified (304), book 2 re-fetched with a new
    // price, book 3 appears in the listing for the first time.
    server.reset().await;
    mount_page(&server, 1, 3, &[1, 2, 3], 1).await;
    Mock::given(method("GET"))
        .and(path("/catalogue/book_1/index.html"))
        .and(header("if-none-match", "\"b1-v1\""))
        .respond_with(ResponseTemplate::new(304).insert_header("etag", "\"b1-v1\""))
        .expect(1)
        .mount(&server)
        .await;
    mount_book(&server, 2, 25.0, None, 1).await;
    mount_book(&server, 3, 30.0, None, 1).await;

    let report = run_crawl(config, RunMode::Incremental, StartMode::Auto)
        .await
        .expect("incremental crawl failed");

    assert_eq!(report.unchanged, 1);

    let storage = open(&db_path);
    assert_eq!(storage.count_changes_by_event(ChangeEvent::Add).unwrap(), 1);
    assert_eq!(
        storage.count_changes_by_event(ChangeEvent::Update).unwrap(),
        1
    );

    let updates = storage
        .query_changelog(&ChangelogQuery {
            event: Some(ChangeEvent::Update),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(updates[0].bts_id, 2);
    assert_eq!(updates[0].changes["price"].old, serde_json::json!(20.0));
    assert_eq!(updates[0].changes["price"].new, serde_json::json!(25.0));

    let adds = storage
        .query_changelog(&ChangelogQuery {
            event: Some(ChangeEvent::Add),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(adds[0].bts_id, 3);
    assert!(adds[0].changes.is_empty());

    assert_eq!(storage.count_books().unwrap(), 3);
}

#[tokio::test]
async fn test_incremental_identical_refetch_is_unchanged() {
    let server = MockServer::start().await;
    let tmp = tempfile::tempdir().unwrap();
    let db_path = tmp.path().join("crawl.db");

    // The server never hands out validation tokens, so every incremental run
    // takes the fetch-and-diff path.
    mount_page(&server, 1, 1, &[1], 1).await;
    mount_book(&server, 1, 10.0, None, 1).await;

    let config = test_config(&server.uri(), &db_path);
    run_crawl(config.clone(), RunMode::Fresh, StartMode::Fresh)
        .await
        .expect("fresh crawl failed");

    server.reset().await;
    mount_page(&server, 1, 1, &[1], 1).await;
    mount_book(&server, 1, 10.0, None, 1).await;

    run_crawl(config, RunMode::Incremental, StartMode::Auto)
        .await
        .expect("incremental crawl failed");

    // Identical content: the document was re-written but no changelog entry
    // was appended.
    let storage = open(&db_path);
    assert_eq!(storage.count_changes_by_event(ChangeEvent::Add).unwrap(), 0);
    assert_eq!(
        storage.count_changes_by_event(ChangeEvent::Update).unwrap(),
        0
    );
}

#[tokio::test]
async fn test_circuit_breaker_halts_run_and_checkpoints() {
    let server = MockServer::start().await;
    let tmp = tempfile::tempdir().unwrap();
    let db_path = tmp.path().join("crawl.db");

    // The seed page always fails; generous retry budget so the breaker, not
    // retry exhaustion, ends the run.
    Mock::given(method("GET"))
        .and(path("/catalogue/page-1.html"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let mut config = test_config(&server.uri(), &db_path);
    // One worker makes the failure sequence strictly ordered
    config.crawler.worker_count = 1;
    config.crawler.max_retry_count = 10;
    config.crawler.max_consecutive_failures = 2;

    let report = run_crawl(config, RunMode::Fresh, StartMode::Fresh)
        .await
        .expect("run should halt, not error");

    // Three consecutive failures trip the breaker (threshold 2), leaving the
    // seed session outstanding with its retry count preserved.
    assert_eq!(report.outstanding, 1);

    let checkpoint = open(&db_path).load_checkpoint().unwrap();
    assert_eq!(checkpoint.len(), 1);
    assert_eq!(checkpoint[0].sid, "p1");
    assert_eq!(checkpoint[0].retry_count, 3);
}

#[tokio::test]
async fn test_resume_continues_from_checkpoint_without_reseeding() {
    let server = MockServer::start().await;
    let tmp = tempfile::tempdir().unwrap();
    let db_path = tmp.path().join("crawl.db");

    // A previous run left one book session outstanding.
    {
        let mut storage = open(&db_path);
        let mut outstanding = std::collections::HashMap::new();
        let mut session = Session::book(
            7,
            format!("{}/catalogue/book_7/index.html", server.uri()),
        );
        session.retry_count = 1;
        outstanding.insert(session.sid.clone(), session);
        storage.save_checkpoint(&outstanding).unwrap();
    }

    mount_page(&server, 1, 1, &[7], 0).await;
    mount_book(&server, 7, 12.0, None, 1).await;

    let config = test_config(&server.uri(), &db_path);
    let report = run_crawl(config, RunMode::Fresh, StartMode::Resume)
        .await
        .expect("resumed crawl failed");

    // Only the checkpointed session ran; the seed page was never fetched.
    assert_eq!(report.sessions_enqueued, 1);
    assert_eq!(report.processed, 1);

    let storage = open(&db_path);
    assert_eq!(storage.count_books().unwrap(), 1);
    assert!(storage.load_checkpoint().unwrap().is_empty());

    let books = storage.query_books(&BookQuery::default()).unwrap();
    assert_eq!(books[0].bts_id, 7);
}

#[tokio::test]
async fn test_fresh_start_clears_previous_data() {
    let server = MockServer::start().await;
    let tmp = tempfile::tempdir().unwrap();
    let db_path = tmp.path().join("crawl.db");

    mount_page(&server, 1, 2, &[1, 2], 1).await;
    mount_book(&server, 1, 10.0, None, 1).await;
    mount_book(&server, 2, 20.0, None, 1).await;

    let config = test_config(&server.uri(), &db_path);
    run_crawl(config.clone(), RunMode::Fresh, StartMode::Fresh)
        .await
        .expect("first crawl failed");
    assert_eq!(open(&db_path).count_books().unwrap(), 2);

    // The catalogue shrank; a fresh start must not keep stale rows.
    server.reset().await;
    mount_page(&server, 1, 1, &[1], 1).await;
    mount_book(&server, 1, 10.0, None, 1).await;

    run_crawl(config, RunMode::Fresh, StartMode::Fresh)
        .await
        .expect("second crawl failed");

    let storage = open(&db_path);
    assert_eq!(storage.count_books().unwrap(), 1);
    assert!(storage.get_book(2).unwrap().is_none());
}
