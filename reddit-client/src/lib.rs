pub mod api;
pub mod post_url;
pub mod selection;

#[cfg(test)]
mod tests;

use api::RedditApiClient;
use async_trait::async_trait;
use crossposter_core::{CoreError, FetchError, ReelConfig, RedditPost};
use oauth2::basic::BasicClient;
use oauth2::{
    AuthType, AuthUrl, ClientId, ClientSecret, HttpRequest, HttpResponse, ResourceOwnerPassword,
    ResourceOwnerUsername, Scope, TokenResponse, TokenUrl,
};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

pub use post_url::extract_post_id;
pub use selection::{select_best_post, select_image_post};

const REDDIT_AUTHORIZE_URL: &str = "https://www.reddit.com/api/v1/authorize";
const REDDIT_TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";

/// Script-app settings. Without an app id and secret the client reads the
/// public JSON endpoints anonymously.
#[derive(Debug, Clone)]
pub struct RedditOAuth2Config {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub user_agent: String,
    pub comment_limit: usize,
}

impl RedditOAuth2Config {
    pub fn anonymous(user_agent: String) -> Self {
        Self {
            client_id: None,
            client_secret: None,
            username: None,
            password: None,
            user_agent,
            comment_limit: 5,
        }
    }

    pub fn from_reel_config(config: &ReelConfig) -> Self {
        let creds = &config.credentials;
        let (client_id, client_secret) = match creds.reddit_app() {
            Some((id, secret)) => (Some(id.to_string()), Some(secret.to_string())),
            None => (None, None),
        };
        let (username, password) = match creds.reddit_user() {
            Some((user, pass)) => (Some(user.to_string()), Some(pass.to_string())),
            None => (None, None),
        };

        Self {
            client_id,
            client_secret,
            username,
            password,
            user_agent: config.reddit.user_agent.clone(),
            comment_limit: config.reddit.comment_limit,
        }
    }

    pub fn has_app_credentials(&self) -> bool {
        self.client_id.is_some() && self.client_secret.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct RedditToken {
    pub access_token: String,
    pub expires_at: SystemTime,
    pub scope: Vec<String>,
}

impl RedditToken {
    pub fn is_expired(&self) -> bool {
        // Treat tokens within a minute of expiry as already expired.
        SystemTime::now() + Duration::from_secs(60) >= self.expires_at
    }
}

#[derive(Debug, Clone)]
pub enum AuthState {
    Anonymous,
    NotAuthenticated,
    Authenticated { expires_at: SystemTime },
    TokenExpired { expired_at: SystemTime },
}

/// Source of Reddit content for the pipelines.
#[async_trait]
pub trait PostFetcher: Send {
    async fn fetch_post(&mut self, url: &str) -> Result<RedditPost, CoreError>;

    async fn fetch_top_posts(
        &mut self,
        subreddit: &str,
        time_filter: &str,
        limit: u32,
    ) -> Result<Vec<RedditPost>, CoreError>;
}

pub struct RedditClient {
    config: RedditOAuth2Config,
    api: RedditApiClient,
    token: Option<RedditToken>,
}

impl RedditClient {
    pub fn new(config: RedditOAuth2Config) -> Result<Self, CoreError> {
        let api = RedditApiClient::new(config.user_agent.clone())?;
        Ok(Self {
            config,
            api,
            token: None,
        })
    }

    pub fn get_required_scopes() -> Vec<&'static str> {
        vec!["read"]
    }

    pub fn get_auth_state(&self) -> AuthState {
        if !self.config.has_app_credentials() {
            return AuthState::Anonymous;
        }
        match &self.token {
            None => AuthState::NotAuthenticated,
            Some(token) if token.is_expired() => AuthState::TokenExpired {
                expired_at: token.expires_at,
            },
            Some(token) => AuthState::Authenticated {
                expires_at: token.expires_at,
            },
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self.get_auth_state(), AuthState::Authenticated { .. })
    }

    pub fn needs_refresh(&self) -> bool {
        matches!(self.get_auth_state(), AuthState::TokenExpired { .. })
    }

    pub fn set_token(&mut self, token: RedditToken) {
        self.token = Some(token);
    }

    /// Obtains an application token. Uses the password grant when a Reddit
    /// account is configured, the client-credentials grant otherwise.
    pub async fn authenticate(&mut self) -> Result<(), CoreError> {
        let (client_id, client_secret) =
            match (&self.config.client_id, &self.config.client_secret) {
                (Some(id), Some(secret)) => (id.clone(), secret.clone()),
                _ => {
                    return Err(FetchError::AuthenticationFailed {
                        reason: "Reddit client id and secret are not configured".to_string(),
                    }
                    .into())
                }
            };

        let oauth_client = BasicClient::new(
            ClientId::new(client_id),
            Some(ClientSecret::new(client_secret)),
            AuthUrl::new(REDDIT_AUTHORIZE_URL.to_string()).map_err(auth_failed)?,
            Some(TokenUrl::new(REDDIT_TOKEN_URL.to_string()).map_err(auth_failed)?),
        )
        .set_auth_type(AuthType::BasicAuth);

        let http = self.api.http_client().clone();
        let user_agent = self.config.user_agent.clone();
        let scopes: Vec<Scope> = Self::get_required_scopes()
            .into_iter()
            .map(|s| Scope::new(s.to_string()))
            .collect();

        let token = match (&self.config.username, &self.config.password) {
            (Some(user), Some(pass)) => {
                info!("Authenticating with Reddit as u/{}", user);
                let username = ResourceOwnerUsername::new(user.clone());
                let password = ResourceOwnerPassword::new(pass.clone());
                oauth_client
                    .exchange_password(&username, &password)
                    .add_scopes(scopes)
                    .request_async(|req| reddit_http_client(http, user_agent, req))
                    .await
                    .map_err(auth_failed)?
            }
            _ => {
                info!("Authenticating with Reddit using application credentials");
                oauth_client
                    .exchange_client_credentials()
                    .add_scopes(scopes)
                    .request_async(|req| reddit_http_client(http, user_agent, req))
                    .await
                    .map_err(auth_failed)?
            }
        };

        let expires_in = token.expires_in().unwrap_or(Duration::from_secs(3600));
        self.token = Some(RedditToken {
            access_token: token.access_token().secret().clone(),
            expires_at: SystemTime::now() + expires_in,
            scope: token
                .scopes()
                .map(|s| s.iter().map(|scope| scope.as_str().to_string()).collect())
                .unwrap_or_default(),
        });
        debug!("Reddit token valid for {:?}", expires_in);
        Ok(())
    }

    /// Returns a usable access token, authenticating first when needed. `None`
    /// means anonymous access.
    async fn access_token(&mut self) -> Result<Option<String>, CoreError> {
        match self.get_auth_state() {
            AuthState::Anonymous => Ok(None),
            AuthState::Authenticated { .. } => {
                Ok(self.token.as_ref().map(|t| t.access_token.clone()))
            }
            AuthState::NotAuthenticated | AuthState::TokenExpired { .. } => {
                self.authenticate().await?;
                Ok(self.token.as_ref().map(|t| t.access_token.clone()))
            }
        }
    }
}

#[async_trait]
impl PostFetcher for RedditClient {
    async fn fetch_post(&mut self, url: &str) -> Result<RedditPost, CoreError> {
        let post_id = extract_post_id(url)?;
        let token = self.access_token().await?;
        let response = self
            .api
            .get_post_with_comments(token.as_deref(), &post_id, self.config.comment_limit)
            .await?;
        let post = api::post_from_comments(response, self.config.comment_limit)?;

        info!(
            "Fetched post {} from r/{} with {} comments",
            post.id,
            post.subreddit,
            post.top_comments.len()
        );
        Ok(post)
    }

    async fn fetch_top_posts(
        &mut self,
        subreddit: &str,
        time_filter: &str,
        limit: u32,
    ) -> Result<Vec<RedditPost>, CoreError> {
        let token = self.access_token().await?;
        let listing = self
            .api
            .get_top_posts(token.as_deref(), subreddit, time_filter, limit)
            .await?;

        let posts: Vec<RedditPost> = listing
            .data
            .children
            .into_iter()
            .filter(|child| child.kind == "t3")
            .map(|child| child.data.into())
            .collect();
        if posts.is_empty() {
            warn!("r/{} returned no posts for t={}", subreddit, time_filter);
        }
        Ok(posts)
    }
}

fn auth_failed<E: std::fmt::Display>(e: E) -> CoreError {
    FetchError::AuthenticationFailed {
        reason: e.to_string(),
    }
    .into()
}

/// Token requests go through the shared reqwest client so Reddit sees our
/// User-Agent; the stock oauth2 helper sends none and gets throttled.
async fn reddit_http_client(
    client: reqwest::Client,
    user_agent: String,
    request: HttpRequest,
) -> Result<HttpResponse, reqwest::Error> {
    let response = client
        .request(request.method, request.url.as_str())
        .headers(request.headers)
        .header(reqwest::header::USER_AGENT, user_agent)
        .body(request.body)
        .send()
        .await?;

    let status_code = response.status();
    let headers = response.headers().clone();
    let body = response.bytes().await?.to_vec();

    Ok(HttpResponse {
        status_code,
        headers,
        body,
    })
}
