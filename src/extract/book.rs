//! Book detail-page extraction

use crate::extract::ExtractError;
use crate::model::Book;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;
use url::Url;

static STOCK_COUNT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)").expect("valid stock-count regex"));

fn selector(css: &str) -> Result<Selector, ExtractError> {
    Selector::parse(css)
        .map_err(|e| ExtractError::Book(format!("invalid selector '{}': {:?}", css, e)))
}

fn malformed(message: &str) -> ExtractError {
    ExtractError::Book(message.to_string())
}

fn collect_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// Extracts a full book record from a detail page
///
/// # Arguments
///
/// * `html` - The book page content
/// * `bts_id` - Catalogue identity, already parsed from the book URL
/// * `book_url` - The page's own URL, used to resolve the cover image link
pub fn extract_book(html: &str, bts_id: i64, book_url: &Url) -> Result<Book, ExtractError> {
    let document = Html::parse_document(html);

    let article = document
        .select(&selector("article.product_page")?)
        .next()
        .ok_or_else(|| malformed("product article not found"))?;

    let name = article
        .select(&selector("h1")?)
        .next()
        .map(collect_text)
        .ok_or_else(|| malformed("book name not found"))?;

    // The description paragraph directly follows the #product_description
    // header div; books without one simply lack the div.
    let description = article
        .select(&selector("#product_description ~ p")?)
        .next()
        .map(collect_text)
        .filter(|text| !text.is_empty());

    // Breadcrumb reads Home / Books / <category> / <title>
    let category = document
        .select(&selector("ul.breadcrumb li")?)
        .nth(2)
        .map(collect_text)
        .ok_or_else(|| malformed("category breadcrumb not found"))?;

    let availability = info_field(&article, "Availability")?;
    let (in_stock, stock_count) = parse_availability(&availability);

    let cover_image_url = article
        .select(&selector("#product_gallery img")?)
        .next()
        .and_then(|img| img.value().attr("src"))
        .map(|src| book_url.join(src))
        .transpose()
        .map_err(|e| malformed(&format!("bad cover image link: {}", e)))?
        .ok_or_else(|| malformed("cover image not found"))?
        .to_string();

    let rating_word = article
        .select(&selector("p.star-rating")?)
        .next()
        .and_then(|el| {
            el.value()
                .classes()
                .find(|class| *class != "star-rating")
                .map(str::to_string)
        })
        .ok_or_else(|| malformed("star rating not found"))?;

    Ok(Book {
        bts_id,
        name,
        description,
        url: book_url.to_string(),
        category,
        upc: info_field(&article, "UPC")?,
        price: parse_price(&info_field(&article, "Price (excl. tax)")?)?,
        tax: parse_price(&info_field(&article, "Tax")?)?,
        in_stock,
        stock_count,
        review_count: info_field(&article, "Number of reviews")?
            .parse()
            .map_err(|e| malformed(&format!("unparsable review count: {}", e)))?,
        cover_image_url,
        rating: rating_from_word(&rating_word)?,
    })
}

/// Looks up the td value for the given th label in the product info table
fn info_field(article: &ElementRef<'_>, label: &str) -> Result<String, ExtractError> {
    let row_selector = selector("table tr")?;
    let th_selector = selector("th")?;
    let td_selector = selector("td")?;

    for row in article.select(&row_selector) {
        let header = match row.select(&th_selector).next() {
            Some(th) => collect_text(th),
            None => continue,
        };
        if header == label {
            return row
                .select(&td_selector)
                .next()
                .map(collect_text)
                .ok_or_else(|| malformed(&format!("missing value for '{}'", label)));
        }
    }
    Err(malformed(&format!("missing info row '{}'", label)))
}

/// Parses a currency value like "£51.77", tolerating the currency prefix
fn parse_price(text: &str) -> Result<f64, ExtractError> {
    text.trim_start_matches(|c: char| !c.is_ascii_digit())
        .parse()
        .map_err(|e| malformed(&format!("unparsable price '{}': {}", text, e)))
}

/// Availability text reads "In stock (22 available)" or "Out of stock"
fn parse_availability(text: &str) -> (bool, u32) {
    if !text.starts_with("In stock") {
        return (false, 0);
    }
    let count = STOCK_COUNT_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0);
    (true, count)
}

fn rating_from_word(word: &str) -> Result<u8, ExtractError> {
    match word {
        "One" => Ok(1),
        "Two" => Ok(2),
        "Three" => Ok(3),
        "Four" => Ok(4),
        "Five" => Ok(5),
        other => Err(malformed(&format!("unknown rating '{}'", other))),
    }
}
