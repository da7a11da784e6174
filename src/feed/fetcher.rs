use encoding_rs::{Encoding, UTF_8};
use futures::StreamExt;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;
use thiserror::Error;

/// Identifying header sent with every request.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (RSS-Discovery/1.0)";

/// Size cap for HTML pages (site front page, feed directory).
pub const MAX_PAGE_SIZE: usize = 5 * 1024 * 1024; // 5MB
/// Size cap for feed documents.
pub const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Errors that can occur while fetching a page or feed.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, body decoding)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request plus body read exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,
    /// Response body exceeded the size limit
    #[error("Response too large")]
    ResponseTooLarge,
}

/// Builds the HTTP client shared by every fetch in a run.
pub fn build_client(user_agent: &str) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder().user_agent(user_agent).build()
}

/// Fetches an HTML page and decodes it using the charset the server declares.
///
/// The body is streamed under the page size cap before decoding. A BOM wins
/// over the header; without either the page is read as UTF-8. The timeout
/// covers the whole exchange, headers and body.
pub async fn fetch_html(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Result<String, FetchError> {
    tokio::time::timeout(timeout, async {
        let response = send_checked(client, url).await?;
        let encoding = declared_encoding(&response);
        let bytes = read_limited_bytes(response, MAX_PAGE_SIZE).await?;

        let (text, used, had_errors) = encoding.decode(&bytes);
        if had_errors {
            tracing::debug!(url = %url, encoding = used.name(), "Page had undecodable bytes, replaced");
        }
        Ok(text.into_owned())
    })
    .await
    .map_err(|_| FetchError::Timeout)?
}

/// Fetches raw feed bytes with the feed size limit applied while streaming.
pub async fn fetch_bytes(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Result<Vec<u8>, FetchError> {
    tokio::time::timeout(timeout, async {
        let response = send_checked(client, url).await?;
        read_limited_bytes(response, MAX_FEED_SIZE).await
    })
    .await
    .map_err(|_| FetchError::Timeout)?
}

async fn send_checked(client: &reqwest::Client, url: &str) -> Result<reqwest::Response, FetchError> {
    let response = client.get(url).send().await?;

    if !response.status().is_success() {
        return Err(FetchError::HttpStatus(response.status().as_u16()));
    }

    Ok(response)
}

/// Encoding named by the `charset` parameter of `Content-Type`, UTF-8 when
/// absent or unknown.
fn declared_encoding(response: &reqwest::Response) -> &'static Encoding {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(charset_label)
        .and_then(|label| Encoding::for_label(label.as_bytes()))
        .unwrap_or(UTF_8)
}

fn charset_label(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        name.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches('"').to_owned())
    })
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_fetch_html_success() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<html><body>보안뉴스</body></html>")
                    .insert_header("Content-Type", "text/html; charset=utf-8"),
            )
            .mount(&mock_server)
            .await;

        let client = build_client(DEFAULT_USER_AGENT).unwrap();
        let body = fetch_html(&client, &format!("{}/page", mock_server.uri()), TIMEOUT)
            .await
            .unwrap();
        assert!(body.contains("보안뉴스"));
    }

    #[tokio::test]
    async fn test_fetch_html_decodes_declared_charset() {
        let mock_server = MockServer::start().await;
        let (encoded, _, _) = encoding_rs::EUC_KR.encode("<h1>메인 카테고리</h1>");
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(encoded.into_owned(), "text/html; charset=EUC-KR"),
            )
            .mount(&mock_server)
            .await;

        let client = build_client(DEFAULT_USER_AGENT).unwrap();
        let body = fetch_html(&client, &mock_server.uri(), TIMEOUT).await.unwrap();
        assert_eq!(body, "<h1>메인 카테고리</h1>");
    }

    #[tokio::test]
    async fn test_fetch_html_over_page_cap() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(vec![b'a'; MAX_PAGE_SIZE + 1], "text/html"),
            )
            .mount(&mock_server)
            .await;

        let client = build_client(DEFAULT_USER_AGENT).unwrap();
        let result = fetch_html(&client, &mock_server.uri(), TIMEOUT).await;
        assert!(matches!(result, Err(FetchError::ResponseTooLarge)));
    }

    #[test]
    fn test_charset_label_parsing() {
        assert_eq!(charset_label("text/html; charset=euc-kr").as_deref(), Some("euc-kr"));
        assert_eq!(charset_label("text/html;Charset=\"UTF-8\"").as_deref(), Some("UTF-8"));
        assert_eq!(charset_label("text/html"), None);
    }

    #[tokio::test]
    async fn test_user_agent_header_sent() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("User-Agent", DEFAULT_USER_AGENT))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = build_client(DEFAULT_USER_AGENT).unwrap();
        let body = fetch_bytes(&client, &mock_server.uri(), TIMEOUT).await.unwrap();
        assert_eq!(body, b"ok");
    }

    #[tokio::test]
    async fn test_fetch_404_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let client = build_client(DEFAULT_USER_AGENT).unwrap();
        let result = fetch_bytes(&client, &mock_server.uri(), TIMEOUT).await;
        match result.unwrap_err() {
            FetchError::HttpStatus(404) => {}
            e => panic!("Expected HttpStatus(404), got {:?}", e),
        }
    }

    #[tokio::test]
    async fn test_fetch_500_not_retried() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = build_client(DEFAULT_USER_AGENT).unwrap();
        let result = fetch_html(&client, &mock_server.uri(), TIMEOUT).await;
        assert!(matches!(result, Err(FetchError::HttpStatus(500))));
    }

    #[tokio::test]
    async fn test_fetch_timeout() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("slow")
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&mock_server)
            .await;

        let client = build_client(DEFAULT_USER_AGENT).unwrap();
        let result = fetch_bytes(&client, &mock_server.uri(), Duration::from_millis(100)).await;
        assert!(matches!(result, Err(FetchError::Timeout)));
    }

    #[tokio::test]
    async fn test_fetch_too_large() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![b'a'; MAX_FEED_SIZE + 1]))
            .mount(&mock_server)
            .await;

        let client = build_client(DEFAULT_USER_AGENT).unwrap();
        let result = fetch_bytes(&client, &mock_server.uri(), TIMEOUT).await;
        assert!(matches!(result, Err(FetchError::ResponseTooLarge)));
    }
}
