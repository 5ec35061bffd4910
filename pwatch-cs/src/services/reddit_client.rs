//! Reddit search client (Source Provider)
//!
//! Application-only OAuth (client credentials), `sort=new` search over a
//! subreddit, paginated through the listing `after` cursor. Requests are
//! throttled client side with a `governor` quota.

use super::{SourceError, SourceProvider};
use crate::types::RawDocument;
use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use pwatch_common::config::RedditConfig;
use serde::Deserialize;
use std::num::NonZeroU32;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const REDDIT_AUTH_URL: &str = "https://www.reddit.com/api/v1/access_token";
const REDDIT_API_URL: &str = "https://oauth.reddit.com";
/// Listing page size ceiling imposed by the API
const MAX_PAGE_SIZE: usize = 100;
/// Refresh the token this long before it expires
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);
/// Upper bound on a server-reported token lifetime
const MAX_TOKEN_LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

fn token_expiry(now: Instant, expires_in: u64) -> Instant {
    now + Duration::from_secs(expires_in).min(MAX_TOKEN_LIFETIME)
}

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    after: Option<String>,
    #[serde(default)]
    children: Vec<ListingChild>,
}

#[derive(Debug, Deserialize)]
struct ListingChild {
    data: Submission,
}

#[derive(Debug, Deserialize)]
struct Submission {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    selftext: String,
}

impl From<Submission> for RawDocument {
    fn from(s: Submission) -> Self {
        RawDocument::new(s.title, s.url, s.selftext)
    }
}

struct AccessToken {
    value: String,
    expires_at: Instant,
}

/// Reddit API client
pub struct RedditClient {
    http_client: reqwest::Client,
    client_id: String,
    client_secret: String,
    subreddit: String,
    auth_url: String,
    api_url: String,
    token: Mutex<Option<AccessToken>>,
    rate_limiter: RateLimiter<
        governor::state::NotKeyed,
        governor::state::InMemoryState,
        governor::clock::DefaultClock,
    >,
}

impl RedditClient {
    /// Build a client from the `[reddit]` configuration section
    pub fn new(config: &RedditConfig) -> Result<Self, SourceError> {
        let client_id = config
            .client_id
            .clone()
            .ok_or_else(|| SourceError::Auth("Reddit client id not configured".to_string()))?;
        let client_secret = config
            .client_secret
            .clone()
            .ok_or_else(|| SourceError::Auth("Reddit client secret not configured".to_string()))?;

        let http_client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SourceError::Network(e.to_string()))?;

        let per_minute = NonZeroU32::new(config.requests_per_minute).unwrap_or(NonZeroU32::MIN);

        Ok(Self {
            http_client,
            client_id,
            client_secret,
            subreddit: config.subreddit.clone(),
            auth_url: REDDIT_AUTH_URL.to_string(),
            api_url: REDDIT_API_URL.to_string(),
            token: Mutex::new(None),
            rate_limiter: RateLimiter::direct(Quota::per_minute(per_minute)),
        })
    }

    /// Point the client at different endpoints (local test servers)
    pub fn with_endpoints(mut self, auth_url: impl Into<String>, api_url: impl Into<String>) -> Self {
        self.auth_url = auth_url.into();
        self.api_url = api_url.into();
        self
    }

    /// Cached bearer token, refreshed shortly before expiry
    async fn access_token(&self) -> Result<String, SourceError> {
        let mut token = self.token.lock().await;

        if let Some(current) = token.as_ref() {
            if Instant::now() + TOKEN_EXPIRY_MARGIN < current.expires_at {
                return Ok(current.value.clone());
            }
        }

        self.rate_limiter.until_ready().await;
        tracing::debug!("Requesting Reddit access token");

        let response = self
            .http_client
            .post(&self.auth_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| SourceError::Network(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(SourceError::Auth(format!("token request rejected ({})", status)));
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(SourceError::Api(status.as_u16(), error_text));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| SourceError::Parse(e.to_string()))?;

        let value = body.access_token.clone();
        *token = Some(AccessToken {
            value: body.access_token,
            expires_at: token_expiry(Instant::now(), body.expires_in),
        });
        Ok(value)
    }

    async fn fetch_page(
        &self,
        keyword: &str,
        page_size: usize,
        after: Option<&str>,
    ) -> Result<ListingData, SourceError> {
        let token = self.access_token().await?;
        self.rate_limiter.until_ready().await;

        let url = format!("{}/r/{}/search", self.api_url, self.subreddit);
        let page_size = page_size.to_string();
        let mut params = vec![
            ("q", keyword),
            ("restrict_sr", "1"),
            ("sort", "new"),
            ("limit", page_size.as_str()),
            ("raw_json", "1"),
        ];
        if let Some(after) = after {
            params.push(("after", after));
        }

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(token)
            .query(&params)
            .send()
            .await
            .map_err(|e| SourceError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(SourceError::Api(status.as_u16(), error_text));
        }

        let listing: Listing = response
            .json()
            .await
            .map_err(|e| SourceError::Parse(e.to_string()))?;
        Ok(listing.data)
    }
}

#[async_trait]
impl SourceProvider for RedditClient {
    async fn search(&self, keyword: &str, limit: usize) -> Result<Vec<RawDocument>, SourceError> {
        let mut documents = Vec::with_capacity(limit.min(MAX_PAGE_SIZE));
        let mut after: Option<String> = None;

        while documents.len() < limit {
            let remaining = limit - documents.len();
            let page = self
                .fetch_page(keyword, remaining.min(MAX_PAGE_SIZE), after.as_deref())
                .await?;
            let received = page.children.len();

            documents.extend(
                page.children
                    .into_iter()
                    .take(remaining)
                    .map(|child| RawDocument::from(child.data)),
            );

            tracing::debug!(
                keyword = keyword,
                received = received,
                total = documents.len(),
                "Reddit search page fetched"
            );

            match page.after {
                Some(next) if received > 0 => after = Some(next),
                _ => break,
            }
        }

        tracing::info!(keyword = keyword, documents = documents.len(), "Reddit search complete");
        Ok(documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RedditConfig {
        RedditConfig {
            client_id: Some("id".to_string()),
            client_secret: Some("secret".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_client_creation() {
        assert!(RedditClient::new(&config()).is_ok());
    }

    #[test]
    fn test_missing_credentials_rejected() {
        let result = RedditClient::new(&RedditConfig::default());
        assert!(matches!(result, Err(SourceError::Auth(_))));
    }

    #[test]
    fn test_listing_parse() {
        let json = r#"{
            "kind": "Listing",
            "data": {
                "after": "t3_abc",
                "children": [
                    {"kind": "t3", "data": {"title": "Post", "url": "https://reddit.com/r/x/1", "selftext": "body"}},
                    {"kind": "t3", "data": {"title": "Link post", "url": "https://example.com"}}
                ]
            }
        }"#;
        let listing: Listing = serde_json::from_str(json).unwrap();
        assert_eq!(listing.data.after.as_deref(), Some("t3_abc"));

        let docs: Vec<RawDocument> = listing
            .data
            .children
            .into_iter()
            .map(|c| RawDocument::from(c.data))
            .collect();
        assert_eq!(docs[0].body, "body");
        assert_eq!(docs[1].body, "");
    }

    #[test]
    fn test_token_lifetime_is_clamped() {
        let now = Instant::now();
        assert_eq!(token_expiry(now, 3600), now + Duration::from_secs(3600));
        assert_eq!(token_expiry(now, u64::MAX), now + MAX_TOKEN_LIFETIME);
    }

    #[tokio::test]
    async fn test_search_paginates_until_limit() {
        use axum::extract::Query;
        use axum::http::StatusCode;
        use axum::routing::{get, post};
        use axum::{Json, Router};
        use serde_json::{json, Value};
        use std::collections::HashMap;

        async fn token() -> Json<Value> {
            Json(json!({"access_token": "test-token", "expires_in": 3600}))
        }

        // Two posts per page; the second page is the last
        async fn search(
            Query(params): Query<HashMap<String, String>>,
        ) -> Result<Json<Value>, StatusCode> {
            if params.get("restrict_sr").map(String::as_str) != Some("1") {
                return Err(StatusCode::BAD_REQUEST);
            }
            let (start, after) = match params.get("after").map(String::as_str) {
                Some("page2") => (3, Value::Null),
                _ => (1, Value::from("page2")),
            };
            let children: Vec<Value> = (start..start + 2)
                .map(|i| {
                    json!({"kind": "t3", "data": {
                        "title": format!("Post {}", i),
                        "url": format!("https://reddit.com/r/all/{}", i),
                        "selftext": format!("body {}", i),
                    }})
                })
                .collect();
            Ok(Json(json!({"kind": "Listing", "data": {"after": after, "children": children}})))
        }

        let app = Router::new()
            .route("/token", post(token))
            .route("/r/all/search", get(search));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = RedditClient::new(&config())
            .unwrap()
            .with_endpoints(format!("http://{}/token", addr), format!("http://{}", addr));

        let docs = client.search("ai", 3).await.unwrap();

        let urls: Vec<&str> = docs.iter().map(|d| d.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://reddit.com/r/all/1",
                "https://reddit.com/r/all/2",
                "https://reddit.com/r/all/3",
            ]
        );
        assert_eq!(docs[2].body, "body 3");
    }
}
