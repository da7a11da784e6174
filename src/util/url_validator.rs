use thiserror::Error;
use url::Url;

/// Errors that can occur while validating a feed or page URL.
#[derive(Error, Debug)]
pub enum UrlError {
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// The URL has no host component.
    #[error("URL has no host: {0}")]
    MissingHost(String),
}

/// Validates that a string is an absolute HTTP(S) URL.
///
/// Unlike a browser, the collector only ever follows `http` and `https`
/// links; `javascript:`, `mailto:` and `file:` values found in scraped HTML
/// are rejected here.
///
/// # Examples
///
/// ```
/// use boannews_collector::util::validate_url;
///
/// let url = validate_url("https://www.boannews.com/custom/news_rss.asp").unwrap();
/// assert_eq!(url.host_str(), Some("www.boannews.com"));
///
/// assert!(validate_url("file:///etc/passwd").is_err());
/// assert!(validate_url("/relative/path").is_err());
/// ```
pub fn validate_url(url_str: &str) -> Result<Url, UrlError> {
    let url = Url::parse(url_str.trim())?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_owned())),
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(UrlError::MissingHost(url.to_string()));
    }

    Ok(url)
}

/// Resolves a possibly relative `href` against `base`.
///
/// Returns `None` when the href is blank or cannot be joined.
pub fn resolve_url(href: &str, base: &Url) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    base.join(href).ok().map(|u| u.to_string())
}

/// Returns the first non-empty value of query parameter `name`.
///
/// Blank values (`?idx=`) are ignored, so `?idx=&idx=7` yields `"7"`.
pub fn query_param(url: &Url, name: &str) -> Option<String> {
    url.query_pairs()
        .filter(|(key, _)| key == name)
        .map(|(_, value)| value.trim().to_owned())
        .find(|value| !value.is_empty())
}
