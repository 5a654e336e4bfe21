//! Catalogue listing-page extraction

use crate::extract::ExtractError;
use scraper::{Html, Selector};
use url::Url;

/// Extracted information from a catalogue listing page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageListing {
    /// Total number of books in the catalogue, as claimed by the page
    pub total_book_count: u32,

    /// Absolute URLs of every book listed on this page
    pub book_urls: Vec<String>,
}

fn selector(css: &str) -> Result<Selector, ExtractError> {
    Selector::parse(css)
        .map_err(|e| ExtractError::Page(format!("invalid selector '{}': {:?}", css, e)))
}

/// Extracts the total book count and all listed book URLs from a page
///
/// # Arguments
///
/// * `html` - The page content
/// * `page_url` - The page's own URL, used to resolve relative book links
pub fn extract_page(html: &str, page_url: &Url) -> Result<PageListing, ExtractError> {
    let document = Html::parse_document(html);

    // The seed page's result count drives catalogue expansion
    let total_selector = selector("form.form-horizontal strong")?;
    let total_book_count = document
        .select(&total_selector)
        .next()
        .map(|el| el.text().collect::<String>())
        .ok_or_else(|| ExtractError::Page("total book count not found".to_string()))?
        .trim()
        .parse::<u32>()
        .map_err(|e| ExtractError::Page(format!("unparsable total book count: {}", e)))?;

    let link_selector = selector("article.product_pod h3 a")?;
    let mut book_urls = Vec::new();
    for anchor in document.select(&link_selector) {
        let href = anchor
            .value()
            .attr("href")
            .ok_or_else(|| ExtractError::Page("book link without href".to_string()))?;
        let absolute = page_url
            .join(href)
            .map_err(|e| ExtractError::Page(format!("bad book link '{}': {}", href, e)))?;
        book_urls.push(absolute.to_string());
    }

    Ok(PageListing {
        total_book_count,
        book_urls,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page_url() -> Url {
        Url::parse("https://example.com/catalogue/page-1.html").unwrap()
    }

    fn listing_html(total: u32, hrefs: &[&str]) -> String {
        let articles: String = hrefs
            .iter()
            .map(|href| {
                format!(
                    r#"<article class="product_pod"><h3><a href="{}" title="Book">Book</a></h3></article>"#,
                    href
                )
            })
            .collect();
        format!(
            r#"<html><body>
            <form method="get" class="form-horizontal"><strong>{}</strong> results.</form>
            <section>{}</section>
            </body></html>"#,
            total, articles
        )
    }

    #[test]
    fn test_extract_total_and_urls() {
        let html = listing_html(1000, &["a-light_1/index.html", "tipping_2/index.html"]);
        let listing = extract_page(&html, &page_url()).unwrap();

        assert_eq!(listing.total_book_count, 1000);
        assert_eq!(
            listing.book_urls,
            vec![
                "https://example.com/catalogue/a-light_1/index.html",
                "https://example.com/catalogue/tipping_2/index.html",
            ]
        );
    }

    #[test]
    fn test_relative_links_resolved_against_page() {
        let html = listing_html(40, &["../catalogue/some-book_3/index.html"]);
        let listing = extract_page(&html, &page_url()).unwrap();
        assert_eq!(
            listing.book_urls,
            vec!["https://example.com/catalogue/some-book_3/index.html"]
        );
    }

    #[test]
    fn test_page_without_books_is_empty_not_malformed() {
        let html = listing_html(0, &[]);
        let listing = extract_page(&html, &page_url()).unwrap();
        assert_eq!(listing.total_book_count, 0);
        assert!(listing.book_urls.is_empty());
    }

    #[test]
    fn test_missing_total_is_malformed() {
        let html = r#"<html><body><article class="product_pod"><h3><a href="b_1/index.html">B</a></h3></article></body></html>"#;
        let err = extract_page(html, &page_url()).unwrap_err();
        assert!(matches!(err, ExtractError::Page(_)));
    }

    #[test]
    fn test_garbage_total_is_malformed() {
        let html = r#"<html><body><form class="form-horizontal"><strong>lots</strong></form></body></html>"#;
        assert!(extract_page(html, &page_url()).is_err());
    }
}
