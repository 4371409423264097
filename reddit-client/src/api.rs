use crossposter_core::{CoreError, FetchError, RedditPost};
use reqwest::{Client, Method, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub const REDDIT_OAUTH_BASE: &str = "https://oauth.reddit.com";
pub const REDDIT_PUBLIC_BASE: &str = "https://www.reddit.com";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListing<T> {
    pub kind: String,
    pub data: RedditListingData<T>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListingData<T> {
    pub children: Vec<RedditListingChild<T>>,
    pub after: Option<String>,
    pub before: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListingChild<T> {
    pub kind: String,
    pub data: T,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RedditPostData {
    pub id: String,
    pub title: String,
    pub selftext: String,
    pub author: String,
    pub subreddit: String,
    pub url: String,
    pub permalink: String,
    pub created_utc: f64,
    pub score: i64,
    pub num_comments: u32,
    pub over_18: bool,
    pub stickied: bool,
    pub upvote_ratio: Option<f64>,
    pub post_hint: Option<String>,
    pub is_self: bool,
}

/// Either a real comment (`t1`) or a "load more" stub, which carries no body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RedditCommentData {
    pub id: String,
    pub author: Option<String>,
    pub body: Option<String>,
    pub score: i64,
    pub stickied: bool,
}

impl RedditCommentData {
    pub fn usable_body(&self) -> Option<&str> {
        let body = self.body.as_deref()?.trim();
        if body.is_empty() || body == "[removed]" || body == "[deleted]" {
            None
        } else {
            Some(body)
        }
    }
}

/// `/comments/{id}` answers with the post listing followed by the comment listing.
pub type CommentsResponse = (
    RedditListing<RedditPostData>,
    RedditListing<RedditCommentData>,
);

#[derive(Debug, Clone)]
pub struct RedditApiClient {
    http_client: Client,
    user_agent: String,
}

impl RedditApiClient {
    pub fn new(user_agent: String) -> Result<Self, CoreError> {
        let http_client = Client::builder()
            .user_agent(&user_agent)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http_client,
            user_agent,
        })
    }

    pub fn http_client(&self) -> &Client {
        &self.http_client
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Issues a request against the OAuth host when a token is supplied, otherwise
    /// against the public host with the `.json` suffix appended.
    pub async fn make_request<F>(
        &self,
        method: Method,
        endpoint: &str,
        access_token: Option<&str>,
        query_params: Option<&[(&str, &str)]>,
        not_found: F,
    ) -> Result<Response, CoreError>
    where
        F: FnOnce() -> FetchError,
    {
        let url = match access_token {
            Some(_) => format!("{}{}", REDDIT_OAUTH_BASE, endpoint),
            None => format!("{}{}.json", REDDIT_PUBLIC_BASE, endpoint),
        };

        let mut request_builder = self.http_client.request(method.clone(), &url);
        if let Some(token) = access_token {
            request_builder = request_builder.bearer_auth(token);
        }
        if let Some(params) = query_params {
            request_builder = request_builder.query(params);
        }

        info!("Making Reddit API request: {} {}", method, endpoint);
        let response = request_builder.send().await.map_err(|e| {
            error!("Network error for {} {}: {}", method, endpoint, e);
            FetchError::NetworkFailure {
                reason: e.to_string(),
            }
        })?;

        let status = response.status();
        if status.is_success() {
            debug!("Request successful: {} {}", status, endpoint);
            return Ok(response);
        }

        error!("Request failed with status: {} for {}", status, endpoint);
        let err = match status.as_u16() {
            429 => {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(60);
                warn!("Rate limited, retry after {} seconds", retry_after);
                FetchError::RateLimitExceeded { retry_after }
            }
            401 => FetchError::InvalidToken,
            403 => FetchError::Forbidden {
                resource: endpoint.to_string(),
            },
            404 => not_found(),
            code if status.is_server_error() => FetchError::ServerError { status_code: code },
            code => FetchError::InvalidResponse {
                details: format!("unexpected status {} for {}", code, endpoint),
            },
        };
        Err(err.into())
    }

    pub async fn get_post_with_comments(
        &self,
        access_token: Option<&str>,
        post_id: &str,
        comment_limit: usize,
    ) -> Result<CommentsResponse, CoreError> {
        let endpoint = format!("/comments/{}", post_id);
        let limit = comment_limit.to_string();
        let params = [("sort", "top"), ("limit", limit.as_str()), ("depth", "1")];

        let response = self
            .make_request(
                Method::GET,
                &endpoint,
                access_token,
                Some(&params[..]),
                || FetchError::PostNotFound {
                    post_id: post_id.to_string(),
                },
            )
            .await?;

        let parsed: CommentsResponse = response.json().await.map_err(|e| {
            error!("Failed to parse comments for {}: {}", post_id, e);
            FetchError::InvalidResponse {
                details: format!("Failed to parse post {}", post_id),
            }
        })?;

        debug!(
            "Retrieved post {} with {} comment entries",
            post_id,
            parsed.1.data.children.len()
        );
        Ok(parsed)
    }

    pub async fn get_top_posts(
        &self,
        access_token: Option<&str>,
        subreddit: &str,
        time_filter: &str,
        limit: u32,
    ) -> Result<RedditListing<RedditPostData>, CoreError> {
        let endpoint = format!("/r/{}/top", subreddit);
        let limit = limit.to_string();
        let params = [("t", time_filter), ("limit", limit.as_str())];

        let response = self
            .make_request(
                Method::GET,
                &endpoint,
                access_token,
                Some(&params[..]),
                || FetchError::SubredditNotFound {
                    subreddit: subreddit.to_string(),
                },
            )
            .await?;

        let listing: RedditListing<RedditPostData> = response.json().await.map_err(|e| {
            error!("Failed to parse subreddit posts: {}", e);
            FetchError::InvalidResponse {
                details: format!("Failed to parse posts for r/{}", subreddit),
            }
        })?;

        info!(
            "Retrieved {} posts from r/{}",
            listing.data.children.len(),
            subreddit
        );
        Ok(listing)
    }
}

impl From<RedditPostData> for RedditPost {
    fn from(post_data: RedditPostData) -> Self {
        Self {
            id: post_data.id,
            title: post_data.title,
            selftext: post_data.selftext,
            url: post_data.url,
            permalink: post_data.permalink,
            subreddit: post_data.subreddit,
            score: post_data.score,
            upvote_ratio: post_data.upvote_ratio.unwrap_or_default(),
            over_18: post_data.over_18,
            stickied: post_data.stickied,
            post_hint: post_data.post_hint,
            created_utc: post_data.created_utc as i64,
            top_comments: Vec::new(),
        }
    }
}

/// Builds a post from a `/comments/{id}` payload keeping at most `limit` comments.
pub fn post_from_comments(
    response: CommentsResponse,
    limit: usize,
) -> Result<RedditPost, FetchError> {
    let (post_listing, comment_listing) = response;
    let post_data = post_listing
        .data
        .children
        .into_iter()
        .next()
        .map(|child| child.data)
        .ok_or_else(|| FetchError::InvalidResponse {
            details: "comments payload has no post".to_string(),
        })?;

    let mut post = RedditPost::from(post_data);
    post.top_comments = comment_listing
        .data
        .children
        .iter()
        .filter(|child| child.kind == "t1" && !child.data.stickied)
        .filter_map(|child| child.data.usable_body())
        .take(limit)
        .map(str::to_string)
        .collect();

    if post.title.trim().is_empty() && post.selftext.trim().is_empty() {
        return Err(FetchError::MissingContent { post_id: post.id });
    }
    Ok(post)
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMMENTS_JSON: &str = r#"[
        {"kind": "Listing", "data": {"after": null, "before": null, "children": [
            {"kind": "t3", "data": {
                "id": "abc", "title": "A great story", "selftext": "Hello world.",
                "subreddit": "test", "url": "https://www.reddit.com/r/test/comments/abc/title/",
                "permalink": "/r/test/comments/abc/title/", "created_utc": 1700000000.0,
                "score": 321, "upvote_ratio": 0.95, "over_18": false, "stickied": false,
                "is_self": true
            }}
        ]}},
        {"kind": "Listing", "data": {"after": null, "before": null, "children": [
            {"kind": "t1", "data": {"id": "c0", "body": "Mod note", "score": 1, "stickied": true}},
            {"kind": "t1", "data": {"id": "c1", "body": "First!", "score": 50}},
            {"kind": "t1", "data": {"id": "c2", "body": "[deleted]", "score": 40}},
            {"kind": "t1", "data": {"id": "c3", "body": "  Second  ", "score": 30}},
            {"kind": "t1", "data": {"id": "c4", "body": "Third", "score": 20}},
            {"kind": "more", "data": {"id": "m1", "count": 12, "children": ["x", "y"]}}
        ]}}
    ]"#;

    #[test]
    fn test_comments_payload_parsing() {
        let response: CommentsResponse = serde_json::from_str(COMMENTS_JSON).unwrap();
        let post = post_from_comments(response, 5).unwrap();

        assert_eq!(post.id, "abc");
        assert_eq!(post.title, "A great story");
        assert_eq!(post.selftext, "Hello world.");
        assert_eq!(post.score, 321);
        assert_eq!(post.top_comments, vec!["First!", "Second", "Third"]);
    }

    #[test]
    fn test_comment_limit_is_applied() {
        let response: CommentsResponse = serde_json::from_str(COMMENTS_JSON).unwrap();
        let post = post_from_comments(response, 2).unwrap();
        assert_eq!(post.top_comments, vec!["First!", "Second"]);
    }

    #[test]
    fn test_post_without_text_is_missing_content() {
        let json = r#"[
            {"kind": "Listing", "data": {"children": [{"kind": "t3", "data": {"id": "e1", "title": "  "}}]}},
            {"kind": "Listing", "data": {"children": []}}
        ]"#;
        let response: CommentsResponse = serde_json::from_str(json).unwrap();
        assert!(matches!(
            post_from_comments(response, 5),
            Err(FetchError::MissingContent { .. })
        ));
    }

    #[test]
    fn test_reddit_post_conversion() {
        let post_data = RedditPostData {
            id: "test123".to_string(),
            title: "Test Post".to_string(),
            url: "https://i.redd.it/test123.jpg".to_string(),
            score: 42,
            upvote_ratio: Some(0.93),
            post_hint: Some("image".to_string()),
            created_utc: 1640995200.0,
            ..Default::default()
        };

        let reddit_post: RedditPost = post_data.into();
        assert_eq!(reddit_post.id, "test123");
        assert_eq!(reddit_post.created_utc, 1640995200);
        assert!(reddit_post.is_still_image());
        assert!(reddit_post.top_comments.is_empty());
    }

    #[tokio::test]
    async fn test_api_client_creation() {
        let client = RedditApiClient::new("test-user-agent/1.0".to_string()).unwrap();
        assert_eq!(client.user_agent(), "test-user-agent/1.0");
    }
}
