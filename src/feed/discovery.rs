use scraper::{Html, Selector};
use std::collections::HashSet;
use std::time::Duration;
use url::Url;

use super::fetcher::fetch_html;
use crate::util::resolve_url;

/// MIME types accepted on `<link rel="alternate">` tags.
const FEED_TYPES: [&str; 5] = [
    "application/rss+xml",
    "application/atom+xml",
    "application/rdf+xml",
    "text/xml",
    "application/xml",
];

/// Substrings that mark an anchor href as a likely feed link.
const FEED_HREF_KEYWORDS: [&str; 3] = ["rss", "atom", "feed"];
const FEED_HREF_SUFFIXES: [&str; 2] = [".rss", ".xml"];

/// Discovers RSS/Atom feed links on an HTML page.
///
/// Fetches `page_url` and scans it in priority order:
///
/// 1. `<link rel="alternate">` tags with a feed MIME type
/// 2. Only if (1) found nothing: `<a href>` anchors whose href mentions
///    `rss`, `atom` or `feed`, or ends with `.rss` / `.xml`
///
/// Relative hrefs are resolved against `page_url`. The result keeps
/// first-seen order with duplicates removed.
///
/// Discovery failure is a soft signal: any fetch error (timeout, non-2xx,
/// connection refused) is logged and an empty list is returned.
pub async fn discover_feeds(
    client: &reqwest::Client,
    page_url: &str,
    timeout: Duration,
) -> Vec<String> {
    let base = match Url::parse(page_url) {
        Ok(base) => base,
        Err(e) => {
            tracing::warn!(url = %page_url, error = %e, "Discovery URL is not valid");
            return Vec::new();
        }
    };

    let html = match fetch_html(client, page_url, timeout).await {
        Ok(html) => html,
        Err(e) => {
            tracing::warn!(url = %page_url, error = %e, "Feed discovery page could not be fetched");
            return Vec::new();
        }
    };

    let feeds = find_feed_links(&html, &base);
    tracing::debug!(url = %page_url, found = feeds.len(), "Feed discovery finished");
    feeds
}

/// Scans HTML for feed links using the two-tier heuristic.
///
/// Pure function: no network access.
pub fn find_feed_links(html: &str, base: &Url) -> Vec<String> {
    let document = Html::parse_document(html);

    let mut feeds = alternate_links(&document, base);
    if feeds.is_empty() {
        feeds = anchor_links(&document, base);
    }

    dedup_preserving_order(feeds)
}

fn alternate_links(document: &Html, base: &Url) -> Vec<String> {
    let Ok(selector) = Selector::parse("link[rel]") else {
        return Vec::new();
    };

    document
        .select(&selector)
        .filter(|link| {
            link.value()
                .attr("rel")
                .is_some_and(|rel| rel.split_whitespace().any(|t| t.eq_ignore_ascii_case("alternate")))
        })
        .filter(|link| {
            let typ = link.value().attr("type").unwrap_or("").trim().to_lowercase();
            FEED_TYPES.contains(&typ.as_str())
        })
        .filter_map(|link| link.value().attr("href"))
        .filter_map(|href| resolve_url(href, base))
        .collect()
}

fn anchor_links(document: &Html, base: &Url) -> Vec<String> {
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    document
        .select(&selector)
        .filter_map(|a| a.value().attr("href"))
        .filter(|href| looks_like_feed_href(href))
        .filter_map(|href| resolve_url(href, base))
        .collect()
}

fn looks_like_feed_href(href: &str) -> bool {
    let h = href.trim().to_lowercase();
    if h.is_empty() {
        return false;
    }
    FEED_HREF_KEYWORDS.iter().any(|k| h.contains(k))
        || FEED_HREF_SUFFIXES.iter().any(|s| h.ends_with(s))
}

fn dedup_preserving_order(urls: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    urls.into_iter()
        .filter(|u| seen.insert(u.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::fetcher::{build_client, DEFAULT_USER_AGENT};
    use pretty_assertions::assert_eq;

    fn base(url: &str) -> Url {
        Url::parse(url).unwrap()
    }

    // --- HTML link discovery tests ---

    #[test]
    fn test_find_rss_link_in_html() {
        let html = r#"<html><head>
            <link rel="alternate" type="application/rss+xml" href="/feed.xml" title="RSS">
        </head><body></body></html>"#;
        let result = find_feed_links(html, &base("http://site/"));
        assert_eq!(result, vec!["http://site/feed.xml".to_owned()]);
    }

    #[test]
    fn test_all_feed_mime_types_accepted() {
        let html = r#"<html><head>
            <link rel="alternate" type="application/atom+xml" href="/atom">
            <link rel="alternate" type="application/rdf+xml" href="/rdf">
            <link rel="alternate" type=" TEXT/XML " href="/text">
            <link rel="alternate" type="application/xml" href="/app">
            <link rel="alternate" type="text/html" href="/mobile">
        </head></html>"#;
        let result = find_feed_links(html, &base("https://example.com/"));
        assert_eq!(
            result,
            vec![
                "https://example.com/atom",
                "https://example.com/rdf",
                "https://example.com/text",
                "https://example.com/app",
            ]
        );
    }

    #[test]
    fn test_rel_token_matching_is_case_insensitive() {
        let html = r#"<html><head>
            <link rel="Alternate nofollow" type="application/rss+xml" href="/rss">
            <link rel="alternates" type="application/rss+xml" href="/not-a-token">
        </head></html>"#;
        let result = find_feed_links(html, &base("https://example.com/"));
        assert_eq!(result, vec!["https://example.com/rss"]);
    }

    #[test]
    fn test_blank_href_skipped() {
        let html = r#"<html><head>
            <link rel="alternate" type="application/rss+xml" href="   ">
            <link rel="alternate" type="application/rss+xml" href="/real.xml">
        </head></html>"#;
        let result = find_feed_links(html, &base("https://example.com/"));
        assert_eq!(result, vec!["https://example.com/real.xml"]);
    }

    #[test]
    fn test_anchor_fallback_when_no_link_tags() {
        let html = r#"<html><body>
            <a href="/about">About</a>
            <a href="/custom/news_rss.asp">RSS</a>
            <a href="/export/sitemap.XML">Sitemap</a>
            <a href="/news/FEED/">Feed</a>
            <a href="/podcast.rss">Podcast</a>
            <a href="">Empty</a>
        </body></html>"#;
        let result = find_feed_links(html, &base("https://www.boannews.com/"));
        assert_eq!(
            result,
            vec![
                "https://www.boannews.com/custom/news_rss.asp",
                "https://www.boannews.com/export/sitemap.XML",
                "https://www.boannews.com/news/FEED/",
                "https://www.boannews.com/podcast.rss",
            ]
        );
    }

    #[test]
    fn test_anchor_fallback_skipped_when_link_tags_found() {
        let html = r#"<html><head>
            <link rel="alternate" type="application/rss+xml" href="/feed.xml">
        </head><body><a href="/other_rss.asp">RSS</a></body></html>"#;
        let result = find_feed_links(html, &base("https://example.com/"));
        assert_eq!(result, vec!["https://example.com/feed.xml"]);
    }

    #[test]
    fn test_duplicates_removed_in_first_seen_order() {
        let html = r#"<html><body>
            <a href="/rss">one</a>
            <a href="/atom.xml">two</a>
            <a href="https://example.com/rss">dup</a>
        </body></html>"#;
        let result = find_feed_links(html, &base("https://example.com/"));
        assert_eq!(
            result,
            vec!["https://example.com/rss", "https://example.com/atom.xml"]
        );
    }

    #[test]
    fn test_no_feed_links() {
        let html = r#"<html><head>
            <link rel="stylesheet" href="/style.css">
        </head><body><a href="/about">About</a></body></html>"#;
        assert!(find_feed_links(html, &base("https://example.com/")).is_empty());
    }

    // --- Integration tests with wiremock ---

    #[tokio::test]
    async fn test_discover_feeds_from_served_page() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(
                        r#"<html><head><link rel="alternate" type="application/rss+xml" href="/feed.xml"></head></html>"#,
                    )
                    .insert_header("Content-Type", "text/html"),
            )
            .mount(&mock_server)
            .await;

        let client = build_client(DEFAULT_USER_AGENT).unwrap();
        let page = format!("{}/", mock_server.uri());
        let feeds = discover_feeds(&client, &page, Duration::from_secs(5)).await;

        assert_eq!(feeds, vec![format!("{}/feed.xml", mock_server.uri())]);
    }

    #[tokio::test]
    async fn test_discover_timeout_returns_empty() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&mock_server)
            .await;

        let client = build_client(DEFAULT_USER_AGENT).unwrap();
        let feeds = discover_feeds(&client, &mock_server.uri(), Duration::from_millis(100)).await;
        assert!(feeds.is_empty());
    }

    #[tokio::test]
    async fn test_discover_http_error_returns_empty() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let client = build_client(DEFAULT_USER_AGENT).unwrap();
        let feeds = discover_feeds(&client, &mock_server.uri(), Duration::from_secs(5)).await;
        assert!(feeds.is_empty());
    }

    #[tokio::test]
    async fn test_discover_connection_refused_returns_empty() {
        // Bind then drop to get a port with nothing listening
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = build_client(DEFAULT_USER_AGENT).unwrap();
        let feeds = discover_feeds(&client, &format!("http://{}/", addr), Duration::from_secs(5)).await;
        assert!(feeds.is_empty());
    }

    #[tokio::test]
    async fn test_discover_invalid_url_returns_empty() {
        let client = build_client(DEFAULT_USER_AGENT).unwrap();
        let feeds = discover_feeds(&client, "not a url", Duration::from_secs(1)).await;
        assert!(feeds.is_empty());
    }
}
