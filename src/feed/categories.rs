//! Category target extraction from the feed directory page.
//!
//! The directory page lists one RSS input per news category inside a table
//! whose header row carries a fixed heading ("메인 카테고리"). All knowledge
//! of that layout lives in [`extract_targets`]; if the site changes its
//! markup, this is the only function that needs to follow.

use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use std::time::Duration;
use url::Url;

use super::discovery::discover_feeds;
use super::fetcher::fetch_html;
use crate::collector::CollectError;
use crate::util::{resolve_url, validate_url};

/// Heading text that marks the category table on the directory page.
pub const DEFAULT_CATEGORY_MARKER: &str = "메인 카테고리";

const HEADING_SELECTOR: &str = "h1, h2, h3, h4, h5, h6";
const RSS_INPUT_SELECTOR: &str = r#"input[name="rss"]"#;

/// A category feed to collect: human-readable label plus absolute feed URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedTarget {
    pub category: String,
    pub feed_url: String,
}

/// Resolves the ordered list of category feeds for a site.
///
/// 1. Runs feed discovery on `site_url`; the first hit is taken as the
///    feed directory page.
/// 2. Fetches the directory page.
/// 3. Extracts one [`FeedTarget`] per RSS input in the category table.
///
/// # Errors
///
/// - [`CollectError::Discovery`] if discovery found no feed directory
/// - [`CollectError::Network`] if the directory page cannot be fetched
/// - [`CollectError::Structure`] if the category table is missing or empty
pub async fn get_targets(
    client: &reqwest::Client,
    site_url: &str,
    marker: &str,
    timeout: Duration,
) -> Result<Vec<FeedTarget>, CollectError> {
    let discovered = discover_feeds(client, site_url, timeout).await;
    let Some(directory_url) = discovered.into_iter().next() else {
        tracing::warn!(url = %site_url, "No active RSS directory page found");
        return Err(CollectError::Discovery(format!(
            "no feed directory found at {site_url}"
        )));
    };
    tracing::debug!(directory = %directory_url, "Using first discovered feed directory");

    let html = fetch_html(client, &directory_url, timeout)
        .await
        .map_err(|source| {
            tracing::error!(url = %directory_url, error = %source, "Feed directory page could not be fetched");
            CollectError::Network {
                url: directory_url.clone(),
                source,
            }
        })?;

    let base = Url::parse(&directory_url).map_err(|e| {
        CollectError::Structure(format!("directory URL {directory_url} is invalid: {e}"))
    })?;

    let targets = extract_targets(&html, &base, marker)?;
    tracing::info!(
        directory = %directory_url,
        categories = targets.len(),
        "Extracted category feed list"
    );
    Ok(targets)
}

/// Walks the category table: marker heading → its row → the next row →
/// every RSS input in that row.
///
/// Pure function: no network access.
pub fn extract_targets(
    html: &str,
    base: &Url,
    marker: &str,
) -> Result<Vec<FeedTarget>, CollectError> {
    let document = Html::parse_document(html);
    let headings = selector(HEADING_SELECTOR)?;
    let inputs = selector(RSS_INPUT_SELECTOR)?;
    let cells = selector("td")?;

    let Some(heading) = document
        .select(&headings)
        .find(|h| h.text().collect::<String>().trim() == marker)
    else {
        tracing::error!(marker = %marker, "Category heading not found (site layout changed?)");
        return Err(CollectError::Structure(format!(
            "heading {marker:?} not found on feed directory page"
        )));
    };

    let title_row = enclosing_row(heading).ok_or_else(|| {
        CollectError::Structure(format!("heading {marker:?} is not inside a table row"))
    })?;

    let data_row = next_row(title_row).ok_or_else(|| {
        CollectError::Structure(format!("no data row follows the {marker:?} heading row"))
    })?;

    let mut targets = Vec::new();
    for input in data_row.select(&inputs) {
        let Some(feed_url) = input
            .value()
            .attr("value")
            .and_then(|v| resolve_url(v, base))
            .filter(|u| validate_url(u).is_ok())
        else {
            tracing::warn!(value = ?input.value().attr("value"), "RSS input has no usable feed URL, skipping");
            continue;
        };

        let category = enclosing_row(input)
            .and_then(|row| row.select(&cells).next())
            .map(stripped_text)
            .unwrap_or_default();
        if category.is_empty() {
            tracing::warn!(feed_url = %feed_url, "RSS input has no category label, skipping");
            continue;
        }

        targets.push(FeedTarget { category, feed_url });
    }

    if targets.is_empty() {
        tracing::error!(marker = %marker, "Category heading found but no RSS inputs extracted");
        return Err(CollectError::Structure(format!(
            "no category feeds found under {marker:?}"
        )));
    }

    Ok(targets)
}

fn selector(css: &str) -> Result<Selector, CollectError> {
    Selector::parse(css).map_err(|e| CollectError::Structure(format!("invalid selector {css}: {e}")))
}

fn enclosing_row(element: ElementRef<'_>) -> Option<ElementRef<'_>> {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|e| e.value().name() == "tr")
}

fn next_row(row: ElementRef<'_>) -> Option<ElementRef<'_>> {
    row.next_siblings()
        .filter_map(ElementRef::wrap)
        .find(|e| e.value().name() == "tr")
}

/// Concatenates the element's text nodes, each trimmed.
fn stripped_text(element: ElementRef<'_>) -> String {
    element.text().map(str::trim).collect()
}
