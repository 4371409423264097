#[cfg(test)]
mod tests {
    use crate::{AuthState, PostFetcher, RedditClient, RedditOAuth2Config, RedditToken};
    use crossposter_core::{CoreError, FetchError, ReelConfig};
    use std::time::{Duration, SystemTime};

    fn create_test_config() -> RedditOAuth2Config {
        RedditOAuth2Config {
            client_id: Some("test_client_id".to_string()),
            client_secret: Some("test_client_secret".to_string()),
            username: None,
            password: None,
            user_agent: "crossposter/1.0 by test_user".to_string(),
            comment_limit: 5,
        }
    }

    #[test]
    fn test_config_from_reel_config() {
        let mut reel = ReelConfig::default();
        reel.credentials.reddit_client_id = Some("cid".to_string());
        reel.credentials.reddit_client_secret = Some("secret".to_string());
        reel.credentials.reddit_username = Some("bot".to_string());
        reel.credentials.reddit_password = Some("YOUR_PASSWORD".to_string());
        reel.reddit.comment_limit = 3;

        let config = RedditOAuth2Config::from_reel_config(&reel);
        assert_eq!(config.client_id.as_deref(), Some("cid"));
        assert_eq!(config.client_secret.as_deref(), Some("secret"));
        // Placeholder password means no user login.
        assert!(config.username.is_none());
        assert!(config.password.is_none());
        assert_eq!(config.comment_limit, 3);
        assert!(config.has_app_credentials());
    }

    #[test]
    fn test_client_creation() {
        let client = RedditClient::new(create_test_config()).unwrap();
        assert!(!client.is_authenticated());
        assert!(!client.needs_refresh());
        assert!(matches!(
            client.get_auth_state(),
            AuthState::NotAuthenticated
        ));
    }

    #[test]
    fn test_anonymous_client() {
        let client =
            RedditClient::new(RedditOAuth2Config::anonymous("crossposter/test".to_string()))
                .unwrap();
        assert!(matches!(client.get_auth_state(), AuthState::Anonymous));
        assert!(!client.is_authenticated());
    }

    #[test]
    fn test_required_scopes() {
        assert_eq!(RedditClient::get_required_scopes(), vec!["read"]);
    }

    #[test]
    fn test_token_creation_and_expiry() {
        let now = SystemTime::now();

        let valid_token = RedditToken {
            access_token: "valid_token".to_string(),
            expires_at: now + Duration::from_secs(3600),
            scope: vec!["read".to_string()],
        };
        let nearly_expired = RedditToken {
            access_token: "nearly".to_string(),
            expires_at: now + Duration::from_secs(30),
            scope: vec!["read".to_string()],
        };
        let expired_token = RedditToken {
            access_token: "expired_token".to_string(),
            expires_at: now - Duration::from_secs(3600),
            scope: vec!["read".to_string()],
        };

        let mut client = RedditClient::new(create_test_config()).unwrap();

        client.set_token(valid_token);
        assert!(client.is_authenticated());
        assert!(!client.needs_refresh());

        client.set_token(nearly_expired);
        assert!(client.needs_refresh());

        client.set_token(expired_token);
        assert!(!client.is_authenticated());
        assert!(matches!(
            client.get_auth_state(),
            AuthState::TokenExpired { .. }
        ));
    }

    #[tokio::test]
    async fn test_authenticate_without_credentials_fails() {
        let mut client =
            RedditClient::new(RedditOAuth2Config::anonymous("crossposter/test".to_string()))
                .unwrap();
        let result = client.authenticate().await;
        if let Err(CoreError::Fetch(FetchError::AuthenticationFailed { reason })) = result {
            assert!(reason.contains("not configured"));
        } else {
            panic!("Expected AuthenticationFailed error");
        }
    }

    #[test]
    fn test_fetch_post_rejects_bad_url_before_network() {
        let mut client =
            RedditClient::new(RedditOAuth2Config::anonymous("crossposter/test".to_string()))
                .unwrap();
        let result = tokio_test::block_on(client.fetch_post("https://example.com/not-reddit"));
        assert!(matches!(
            result,
            Err(CoreError::Fetch(FetchError::InvalidUrl { .. }))
        ));
    }
}
