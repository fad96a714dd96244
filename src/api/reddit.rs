//! Reddit implementation of the search and description collaborators
//!
//! Uses application-only OAuth (client credentials) and the blocking reqwest
//! client. The token is refreshed shortly before it expires.
//!
//! Reddit reports its request budget in the `x-ratelimit-remaining` and
//! `x-ratelimit-reset` headers. When the budget is spent the client sleeps
//! until the window resets instead of letting the next call fail.

use crate::api::{CommunityDescription, CommunitySearch, DescriptionSource, SearchHit};
use crate::error::{ApiError, ApiResult};
use parking_lot::Mutex;
use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use serde::Deserialize;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";
const API_BASE: &str = "https://oauth.reddit.com";

/// Refresh the token this long before Reddit says it expires
const TOKEN_MARGIN: Duration = Duration::from_secs(60);

/// Upper bound for a single rate-limit sleep
const MAX_RATE_LIMIT_SLEEP: Duration = Duration::from_secs(600);

/// Credentials for the Reddit API
#[derive(Debug, Clone)]
pub struct RedditCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub user_agent: String,
}

#[derive(Debug)]
struct AccessToken {
    value: String,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct RateBudget {
    remaining: Option<f64>,
    reset_at: Option<Instant>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Deserialize)]
struct ListingData {
    children: Vec<Thing>,
}

#[derive(Deserialize)]
struct Thing {
    data: SubredditData,
}

#[derive(Deserialize)]
struct SubredditData {
    display_name: String,
    #[serde(default)]
    over18: bool,
    #[serde(default)]
    subreddit_type: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

/// Blocking Reddit API client
pub struct RedditClient {
    http: Client,
    credentials: RedditCredentials,
    token: Mutex<Option<AccessToken>>,
    budget: Mutex<RateBudget>,
}

impl RedditClient {
    /// Create a new client; no request is made until the first call
    pub fn new(credentials: RedditCredentials) -> ApiResult<Self> {
        let http = Client::builder()
            .user_agent(credentials.user_agent.clone())
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            credentials,
            token: Mutex::new(None),
            budget: Mutex::new(RateBudget::default()),
        })
    }

    /// Return a valid bearer token, fetching a new one if needed
    fn bearer(&self) -> ApiResult<String> {
        let mut token = self.token.lock();
        if let Some(current) = token.as_ref() {
            if Instant::now() + TOKEN_MARGIN < current.expires_at {
                return Ok(current.value.clone());
            }
        }

        let response = self
            .http
            .post(TOKEN_URL)
            .basic_auth(&self.credentials.client_id, Some(&self.credentials.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()?;

        if !response.status().is_success() {
            return Err(ApiError::Auth(format!("token endpoint returned {}", response.status())));
        }

        let body: TokenResponse = response.json()?;
        debug!(expires_in = body.expires_in, "Obtained access token");

        let value = body.access_token.clone();
        *token = Some(AccessToken {
            value: body.access_token,
            expires_at: Instant::now() + Duration::from_secs(body.expires_in),
        });
        Ok(value)
    }

    /// Sleep if the previous response said the budget is exhausted
    fn wait_for_budget(&self) {
        let wait = {
            let budget = self.budget.lock();
            match (budget.remaining, budget.reset_at) {
                (Some(remaining), Some(reset_at)) if remaining < 1.0 => {
                    reset_at.saturating_duration_since(Instant::now())
                }
                _ => Duration::ZERO,
            }
        };

        if !wait.is_zero() {
            let wait = wait.min(MAX_RATE_LIMIT_SLEEP);
            warn!(wait_secs = wait.as_secs(), "Rate limit budget exhausted, waiting");
            thread::sleep(wait);
        }
    }

    fn record_budget(&self, response: &Response) {
        let header = |name: &str| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<f64>().ok())
        };

        let mut budget = self.budget.lock();
        budget.remaining = header("x-ratelimit-remaining");
        budget.reset_at = header("x-ratelimit-reset")
            .map(|secs| Instant::now() + Duration::from_secs_f64(secs.max(0.0)));
    }

    fn get(&self, path: &str, query: &[(&str, String)], name: &str) -> ApiResult<Response> {
        self.wait_for_budget();

        let url = format!("{}{}", API_BASE, path);
        let response = self
            .http
            .get(&url)
            .bearer_auth(self.bearer()?)
            .query(query)
            .send()?;

        self.record_budget(&response);

        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::NOT_FOUND => Err(ApiError::NotFound { name: name.to_string() }),
            StatusCode::FORBIDDEN => Err(ApiError::Private { name: name.to_string() }),
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after_secs = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(60);
                Err(ApiError::RateLimited { retry_after_secs })
            }
            status => Err(ApiError::Status {
                status: status.as_u16(),
                url,
            }),
        }
    }
}

impl CommunitySearch for RedditClient {
    fn search(&self, term: &str, limit: usize) -> ApiResult<Vec<SearchHit>> {
        let response = self.get(
            "/subreddits/search",
            &[("q", term.to_string()), ("limit", limit.to_string())],
            term,
        )?;

        let listing: Listing = response.json()?;
        Ok(listing
            .data
            .children
            .into_iter()
            .take(limit)
            .map(|thing| SearchHit::new(thing.data.display_name, thing.data.over18))
            .collect())
    }
}

impl DescriptionSource for RedditClient {
    fn get_description(&self, name: &str) -> ApiResult<CommunityDescription> {
        let path = format!("/r/{}/about", name);
        let response = self.get(&path, &[], name)?;

        let thing: Thing = response.json()?;
        let data = thing.data;
        Ok(CommunityDescription {
            is_public: data.subreddit_type.as_deref() == Some("public"),
            is_restricted: data.over18,
            description_text: data.description.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_decode() {
        let json = r#"{"kind":"Listing","data":{"children":[
            {"kind":"t5","data":{"display_name":"rust","over18":false,"subreddit_type":"public"}},
            {"kind":"t5","data":{"display_name":"nsfwthing","over18":true}}
        ]}}"#;

        let listing: Listing = serde_json::from_str(json).unwrap();
        assert_eq!(listing.data.children.len(), 2);
        assert_eq!(listing.data.children[0].data.display_name, "rust");
        assert!(listing.data.children[1].data.over18);
        assert!(listing.data.children[1].data.description.is_none());
    }

    #[test]
    fn test_about_decode() {
        let json = r#"{"kind":"t5","data":{"display_name":"rust","over18":false,
            "subreddit_type":"private","description":"see r/learnrust"}}"#;
        let thing: Thing = serde_json::from_str(json).unwrap();
        assert_eq!(thing.data.subreddit_type.as_deref(), Some("private"));
        assert_eq!(thing.data.description.as_deref(), Some("see r/learnrust"));
    }
}
