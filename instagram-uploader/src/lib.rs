pub mod transport;

pub use transport::{GraphResponse, GraphTransport, ReqwestTransport};

use async_trait::async_trait;
use crossposter_core::{Credentials, InstagramSettings, ReelConfig, UploadError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How the account's daily publishing quota stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishingLimit {
    pub quota_usage: u64,
    pub quota_total: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LongLivedToken {
    pub access_token: String,
    pub token_type: Option<String>,
    pub expires_in: Option<u64>,
}

/// What the pipelines need from a publishing backend.
#[async_trait]
pub trait MediaPublisher: Send + Sync {
    async fn publish_image(&self, image_url: &str, caption: &str) -> Result<String, UploadError>;

    async fn publish_reel(
        &self,
        video_path: &Path,
        caption: &str,
        share_to_feed: bool,
    ) -> Result<String, UploadError>;
}

enum ContainerState {
    Ready,
    Failed(String),
    Pending(String),
}

pub struct InstagramUploader {
    transport: Box<dyn GraphTransport>,
    settings: InstagramSettings,
    access_token: String,
    user_id: String,
}

impl InstagramUploader {
    pub fn new(
        transport: Box<dyn GraphTransport>,
        settings: InstagramSettings,
        credentials: &Credentials,
    ) -> Result<Self, UploadError> {
        let access_token = credentials
            .instagram_access_token()
            .ok_or_else(|| UploadError::MissingCredentials {
                field: "instagram_access_token".to_string(),
            })?
            .to_string();
        let user_id = credentials
            .instagram_user_id()
            .ok_or_else(|| UploadError::MissingCredentials {
                field: "instagram_user_id".to_string(),
            })?
            .to_string();
        Ok(Self {
            transport,
            settings,
            access_token,
            user_id,
        })
    }

    pub fn from_config(config: &ReelConfig) -> Result<Self, UploadError> {
        Self::new(
            Box::new(ReqwestTransport::new()?),
            config.instagram.clone(),
            &config.credentials,
        )
    }

    /// Publishes an image the Graph API can fetch from `image_url`.
    /// Returns the published media id.
    pub async fn publish_image(&self, image_url: &str, caption: &str) -> Result<String, UploadError> {
        info!("Publishing image {}", image_url);
        let container_id = self
            .create_container(vec![
                ("image_url".to_string(), image_url.to_string()),
                ("caption".to_string(), caption.to_string()),
            ])
            .await?;
        self.wait_for_container(&container_id, self.settings.image_polling_interval_secs)
            .await?;
        let media_id = self.publish_container(&container_id).await?;
        self.log_publishing_limit().await;
        Ok(media_id)
    }

    /// Creates a resumable reel container, uploads the video bytes, waits for
    /// processing and publishes. Returns the published media id.
    pub async fn publish_reel(
        &self,
        video_path: &Path,
        caption: &str,
        share_to_feed: bool,
    ) -> Result<String, UploadError> {
        let bytes = tokio::fs::read(video_path)
            .await
            .map_err(|_| UploadError::MediaNotFound {
                path: video_path.display().to_string(),
            })?;
        info!(
            "Publishing reel {} ({} bytes)",
            video_path.display(),
            bytes.len()
        );

        let container_id = self
            .create_container(vec![
                ("media_type".to_string(), "REELS".to_string()),
                ("upload_type".to_string(), "resumable".to_string()),
                ("caption".to_string(), caption.to_string()),
                ("share_to_feed".to_string(), share_to_feed.to_string()),
            ])
            .await?;
        self.upload_video(&container_id, bytes).await?;
        self.wait_for_container(&container_id, self.settings.reel_polling_interval_secs)
            .await?;
        let media_id = self.publish_container(&container_id).await?;
        self.log_publishing_limit().await;
        Ok(media_id)
    }

    async fn create_container(&self, mut params: Vec<(String, String)>) -> Result<String, UploadError> {
        const STAGE: &str = "container creation";
        params.push(("access_token".to_string(), self.access_token.clone()));
        let url = self.settings.graph_url(&format!("{}/media", self.user_id));
        let response = check(STAGE, self.transport.post_form(&url, params).await)?;
        let id = required_id(STAGE, &response)?;
        info!("Created media container {}", id);
        Ok(id)
    }

    async fn upload_video(&self, container_id: &str, bytes: Vec<u8>) -> Result<(), UploadError> {
        let url = self.settings.rupload_url(container_id);
        let headers = vec![
            ("Authorization".to_string(), format!("OAuth {}", self.access_token)),
            ("offset".to_string(), "0".to_string()),
            ("file_size".to_string(), bytes.len().to_string()),
        ];
        let response = check("video upload", self.transport.post_bytes(&url, headers, bytes).await)?;
        if response.body.get("success").and_then(Value::as_bool) != Some(true) {
            return Err(UploadError::UploadRejected {
                details: response.body.to_string(),
            });
        }
        info!("Uploaded video to container {}", container_id);
        Ok(())
    }

    /// Polls until the container is ready. Failed polls are retried within
    /// the same attempt budget; `ERROR` and `EXPIRED` stop immediately.
    async fn wait_for_container(&self, container_id: &str, interval_secs: u64) -> Result<(), UploadError> {
        let attempts = self.settings.max_polling_attempts.max(1);
        for attempt in 1..=attempts {
            debug!("Polling container {} ({}/{})", container_id, attempt, attempts);
            match self.container_state(container_id).await {
                Ok(ContainerState::Ready) => {
                    info!("Container {} ready after {} polls", container_id, attempt);
                    return Ok(());
                }
                Ok(ContainerState::Failed(status)) => {
                    return Err(UploadError::ContainerFailed {
                        container_id: container_id.to_string(),
                        status,
                    });
                }
                Ok(ContainerState::Pending(status)) => {
                    debug!("Container {} is {}", container_id, status);
                }
                Err(e) => warn!("Status check for {} failed, retrying: {}", container_id, e),
            }
            if attempt < attempts {
                tokio::time::sleep(Duration::from_secs(interval_secs)).await;
            }
        }
        Err(UploadError::PollingExhausted {
            container_id: container_id.to_string(),
            attempts,
        })
    }

    async fn container_state(&self, container_id: &str) -> Result<ContainerState, UploadError> {
        let url = self.settings.graph_url(container_id);
        let params = vec![
            ("fields".to_string(), "status_code,status".to_string()),
            ("access_token".to_string(), self.access_token.clone()),
        ];
        let response = check("status polling", self.transport.get(&url, params).await)?;
        let code = response
            .str_field("status_code")
            .unwrap_or_default()
            .to_ascii_uppercase();
        let detail = response.str_field("status").unwrap_or_default();
        let described = if detail.is_empty() {
            code.clone()
        } else {
            format!("{} ({})", code, detail)
        };
        Ok(match code.as_str() {
            "FINISHED" | "PUBLISHED" => ContainerState::Ready,
            "ERROR" | "EXPIRED" => ContainerState::Failed(described),
            _ => ContainerState::Pending(described),
        })
    }

    async fn publish_container(&self, container_id: &str) -> Result<String, UploadError> {
        const STAGE: &str = "publish";
        let url = self
            .settings
            .graph_url(&format!("{}/media_publish", self.user_id));
        let params = vec![
            ("creation_id".to_string(), container_id.to_string()),
            ("access_token".to_string(), self.access_token.clone()),
        ];
        let response = check(STAGE, self.transport.post_form(&url, params).await)?;
        let media_id = required_id(STAGE, &response)?;
        info!("Published media {}", media_id);
        Ok(media_id)
    }

    pub async fn publishing_limit(&self) -> Result<PublishingLimit, UploadError> {
        const STAGE: &str = "publishing limit";
        let url = self
            .settings
            .graph_url(&format!("{}/content_publishing_limit", self.user_id));
        let params = vec![
            ("fields".to_string(), "quota_usage,config".to_string()),
            ("access_token".to_string(), self.access_token.clone()),
        ];
        let response = check(STAGE, self.transport.get(&url, params).await)?;
        let entry = response
            .body
            .get("data")
            .and_then(|d| d.get(0))
            .ok_or_else(|| UploadError::InvalidResponse {
                stage: STAGE.to_string(),
                details: response.body.to_string(),
            })?;
        Ok(PublishingLimit {
            quota_usage: entry.get("quota_usage").and_then(Value::as_u64).unwrap_or(0),
            quota_total: entry
                .get("config")
                .and_then(|c| c.get("quota_total"))
                .and_then(Value::as_u64)
                .unwrap_or(0),
        })
    }

    async fn log_publishing_limit(&self) {
        match self.publishing_limit().await {
            Ok(limit) => info!(
                "Publishing quota: {}/{} used",
                limit.quota_usage, limit.quota_total
            ),
            Err(e) => warn!("Could not read publishing limit: {}", e),
        }
    }
}

#[async_trait]
impl MediaPublisher for InstagramUploader {
    async fn publish_image(&self, image_url: &str, caption: &str) -> Result<String, UploadError> {
        InstagramUploader::publish_image(self, image_url, caption).await
    }

    async fn publish_reel(
        &self,
        video_path: &Path,
        caption: &str,
        share_to_feed: bool,
    ) -> Result<String, UploadError> {
        InstagramUploader::publish_reel(self, video_path, caption, share_to_feed).await
    }
}

/// Exchanges a token for a long-lived one (`fb_exchange_token` grant).
pub async fn refresh_long_lived_token(
    transport: &dyn GraphTransport,
    settings: &InstagramSettings,
    app_id: &str,
    app_secret: &str,
    access_token: &str,
) -> Result<LongLivedToken, UploadError> {
    const STAGE: &str = "token exchange";
    let url = settings.graph_url("oauth/access_token");
    let params = vec![
        ("grant_type".to_string(), "fb_exchange_token".to_string()),
        ("client_id".to_string(), app_id.to_string()),
        ("client_secret".to_string(), app_secret.to_string()),
        ("fb_exchange_token".to_string(), access_token.to_string()),
    ];
    let response = check(STAGE, transport.get(&url, params).await)?;
    serde_json::from_value(response.body.clone()).map_err(|e| UploadError::InvalidResponse {
        stage: STAGE.to_string(),
        details: e.to_string(),
    })
}

/// Fills in the stage of transport failures and turns non-2xx responses
/// into `HttpStatus`.
fn check(
    stage: &str,
    result: Result<GraphResponse, UploadError>,
) -> Result<GraphResponse, UploadError> {
    let response = result.map_err(|e| match e {
        UploadError::Transport { reason, .. } => UploadError::Transport {
            stage: stage.to_string(),
            reason,
        },
        other => other,
    })?;
    if !response.is_success() {
        return Err(UploadError::HttpStatus {
            stage: stage.to_string(),
            status_code: response.status,
            message: response.error_message(),
        });
    }
    Ok(response)
}

fn required_id(stage: &str, response: &GraphResponse) -> Result<String, UploadError> {
    response
        .str_field("id")
        .map(str::to_string)
        .ok_or_else(|| UploadError::InvalidResponse {
            stage: stage.to_string(),
            details: format!("no id in {}", response.body),
        })
}

#[cfg(test)]
mod tests;
