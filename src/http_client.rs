//! HTTP Read Client (spec §4.7, component C7).
//!
//! No teacher file covers a generic JSON client directly; the retry loop is
//! built in the idiom of `engine/src/retrier.rs`'s exponential backoff
//! (`retry_backoff_seconds · 2^attempt`), simplified to a direct async loop
//! since this client is cloned per-adapter rather than shared through a
//! channel-backed actor.

use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};

use crate::{
    constants::{
        DEFAULT_HTTP_MAX_RETRIES, DEFAULT_HTTP_PAGE_CAP, DEFAULT_HTTP_TIMEOUT, HTTP_RETRY_BACKOFF_BASE,
        MAX_HTTP_PAGE_LIMIT,
    },
    error::AdapterError,
};

/// Rate-limit envelope extracted from response headers (spec §4.7, §6).
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct RateLimit {
    pub limit: Option<u64>,
    pub remaining: Option<u64>,
    pub reset: Option<u64>,
    pub weekly_limit: Option<u64>,
    pub weekly_remaining: Option<u64>,
    pub weekly_reset: Option<u64>,
    pub computing_unit: Option<String>,
}

impl RateLimit {
    fn from_headers(headers: &reqwest::header::HeaderMap) -> Self {
        let parse_u64 = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).and_then(|s| s.parse().ok());
        let parse_str = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string);

        Self {
            limit: parse_u64("x-ratelimit-limit"),
            remaining: parse_u64("x-ratelimit-remaining"),
            reset: parse_u64("x-ratelimit-reset"),
            weekly_limit: parse_u64("x-ratelimit-limit-week"),
            weekly_remaining: parse_u64("x-ratelimit-remaining-week"),
            weekly_reset: parse_u64("x-ratelimit-reset-week"),
            computing_unit: parse_str("x-computing-unit"),
        }
    }
}

/// A fetched page together with its rate-limit envelope and the `next` URL
/// to continue pagination, if any (spec §4.7).
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub body: T,
    pub rate_limit: RateLimit,
    pub next: Option<String>,
}

/// Envelope shape the rate-swap API wraps list responses in: a `data` array
/// plus a `pagination.next` cursor URL. Unknown top-level fields are
/// preserved as `extra` per spec §9's "preserve unknown fields" note.
#[derive(Debug, Clone, serde::Deserialize)]
struct Pagination {
    next: Option<String>,
}

#[derive(Debug, Clone, serde::Deserialize)]
struct PaginatedEnvelope<T> {
    data: T,
    pagination: Option<Pagination>,
}

fn classify_status(status: reqwest::StatusCode) -> Result<(), AdapterError> {
    if status.as_u16() >= 400 {
        return Err(AdapterError::Protocol(format!("HTTP {status}")));
    }
    Ok(())
}

/// Retrying JSON GET client (spec §4.7). Clamps requested page limits to
/// `MAX_HTTP_PAGE_LIMIT` and caps pagination depth at `DEFAULT_HTTP_PAGE_CAP`
/// pages to bound worst-case fan-out.
#[derive(Clone)]
pub struct HttpReadClient {
    client: reqwest::Client,
    max_retries: u32,
}

impl HttpReadClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, AdapterError> {
        let _base_url = base_url.into();
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| AdapterError::config(format!("building HTTP client: {e}")))?;
        Ok(Self { client, max_retries: DEFAULT_HTTP_MAX_RETRIES })
    }

    /// Clamps a caller-supplied page size to what the API tolerates (spec
    /// §4.7: "API servers that enforce `limit ≤ 100`").
    pub fn clamp_page_limit(requested: u32) -> u32 {
        requested.min(MAX_HTTP_PAGE_LIMIT)
    }

    async fn get_once(&self, url: &str) -> Result<reqwest::Response, reqwest::Error> {
        self.client.get(url).header("accept", "application/json").send().await
    }

    /// Posts `body` as JSON and decodes the response as `R`, retrying
    /// transient failures the same way `get_json` does.
    pub async fn post_json<B: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<R, AdapterError> {
        let mut attempt = 0;
        loop {
            match self.client.post(url).header("accept", "application/json").json(body).send().await {
                Ok(response) => {
                    let status = response.status();
                    classify_status(status)?;
                    return response
                        .json()
                        .await
                        .map_err(|e| AdapterError::Schema(format!("decoding JSON body: {e}")));
                },
                Err(err) if attempt < self.max_retries && (err.is_timeout() || err.is_connect()) => {
                    let backoff = HTTP_RETRY_BACKOFF_BASE * 2u32.pow(attempt);
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                },
                Err(err) => return Err(AdapterError::Rpc(format!("HTTP request failed: {err}"))),
            }
        }
    }

    /// Fetches `url` and decodes the response directly as `R`, without the
    /// `{data, pagination}` list envelope `get_json` expects. Used for the
    /// rate-swap venue's single-entity reads and its calldata-building
    /// endpoints, which are plain `GET`s with query parameters rather than
    /// POSTs (spec §4.10).
    pub async fn get_plain<R: DeserializeOwned>(&self, url: &str) -> Result<R, AdapterError> {
        let mut attempt = 0;
        loop {
            match self.get_once(url).await {
                Ok(response) => {
                    let status = response.status();
                    classify_status(status)?;
                    return response
                        .json()
                        .await
                        .map_err(|e| AdapterError::Schema(format!("decoding JSON body: {e}")));
                },
                Err(err) if attempt < self.max_retries && (err.is_timeout() || err.is_connect()) => {
                    let backoff = HTTP_RETRY_BACKOFF_BASE * 2u32.pow(attempt);
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                },
                Err(err) => return Err(AdapterError::Rpc(format!("HTTP request failed: {err}"))),
            }
        }
    }

    /// Fetches one page, retrying transient failures with
    /// `HTTP_RETRY_BACKOFF_BASE * 2^attempt` backoff (spec §4.7).
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<Page<T>, AdapterError> {
        let mut attempt = 0;
        loop {
            match self.get_once(url).await {
                Ok(response) => {
                    let status = response.status();
                    let rate_limit = RateLimit::from_headers(response.headers());
                    classify_status(status)?;

                    let body: PaginatedEnvelope<T> = response
                        .json()
                        .await
                        .map_err(|e| AdapterError::Schema(format!("decoding JSON body: {e}")))?;

                    return Ok(Page {
                        body: body.data,
                        rate_limit,
                        next: body.pagination.and_then(|p| p.next),
                    });
                },
                Err(err) if attempt < self.max_retries && (err.is_timeout() || err.is_connect()) => {
                    let backoff = HTTP_RETRY_BACKOFF_BASE * 2u32.pow(attempt);
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                },
                Err(err) => return Err(AdapterError::Rpc(format!("HTTP request failed: {err}"))),
            }
        }
    }

    /// Follows `pagination.next` until it is empty or `DEFAULT_HTTP_PAGE_CAP`
    /// pages have been fetched, accumulating each page's items via `extend`.
    pub async fn get_all_pages<T, I>(&self, first_url: &str) -> Result<Vec<I>, AdapterError>
    where
        T: DeserializeOwned + IntoIterator<Item = I>,
    {
        let mut items = Vec::new();
        let mut url = first_url.to_string();
        let mut pages_fetched = 0u32;

        loop {
            let page: Page<T> = self.get_json(&url).await?;
            items.extend(page.body);
            pages_fetched += 1;

            match page.next {
                Some(next) if pages_fetched < DEFAULT_HTTP_PAGE_CAP => url = next,
                _ => break,
            }
        }

        Ok(items)
    }
}

pub const fn default_page_timeout() -> Duration {
    DEFAULT_HTTP_TIMEOUT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_page_limit_caps_at_max() {
        assert_eq!(HttpReadClient::clamp_page_limit(500), MAX_HTTP_PAGE_LIMIT);
        assert_eq!(HttpReadClient::clamp_page_limit(10), 10);
    }

    #[tokio::test]
    async fn get_json_follows_pagination_and_extracts_rate_limit() {
        use wiremock::{
            matchers::{method, path},
            Mock, MockServer, ResponseTemplate,
        };

        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/markets"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("x-ratelimit-limit", "100")
                    .insert_header("x-ratelimit-remaining", "99")
                    .set_body_json(serde_json::json!({
                        "data": [{"id": 1}],
                        "pagination": {"next": null}
                    })),
            )
            .mount(&server)
            .await;

        let client = HttpReadClient::new(server.uri()).unwrap();
        let page: Page<Vec<serde_json::Value>> =
            client.get_json(&format!("{}/markets", server.uri())).await.unwrap();

        assert_eq!(page.body.len(), 1);
        assert_eq!(page.rate_limit.limit, Some(100));
        assert_eq!(page.rate_limit.remaining, Some(99));
        assert!(page.next.is_none());
    }

    #[tokio::test]
    async fn non_2xx_status_is_a_protocol_error() {
        use wiremock::{
            matchers::{method, path},
            Mock, MockServer, ResponseTemplate,
        };

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/markets"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = HttpReadClient::new(server.uri()).unwrap();
        let err = client
            .get_json::<Vec<serde_json::Value>>(&format!("{}/markets", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::Protocol(_)));
    }
}
