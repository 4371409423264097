//! Runtime configuration.
//!
//! Settings come from an optional TOML file with every section defaulted, then
//! secrets are layered on top from the process environment (and `.env`).

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Credentials {
    pub reddit_client_id: Option<String>,
    pub reddit_client_secret: Option<String>,
    pub reddit_username: Option<String>,
    pub reddit_password: Option<String>,
    pub instagram_access_token: Option<String>,
    pub instagram_user_id: Option<String>,
    pub fb_app_id: Option<String>,
    pub fb_app_secret: Option<String>,
}

impl Credentials {
    pub fn reddit_app(&self) -> Option<(&str, &str)> {
        match (
            usable(&self.reddit_client_id),
            usable(&self.reddit_client_secret),
        ) {
            (Some(id), Some(secret)) => Some((id, secret)),
            _ => None,
        }
    }

    pub fn reddit_user(&self) -> Option<(&str, &str)> {
        match (usable(&self.reddit_username), usable(&self.reddit_password)) {
            (Some(user), Some(pass)) => Some((user, pass)),
            _ => None,
        }
    }

    pub fn instagram_access_token(&self) -> Option<&str> {
        usable(&self.instagram_access_token)
    }

    pub fn instagram_user_id(&self) -> Option<&str> {
        usable(&self.instagram_user_id)
    }

    pub fn facebook_app(&self) -> Option<(&str, &str)> {
        match (usable(&self.fb_app_id), usable(&self.fb_app_secret)) {
            (Some(id), Some(secret)) => Some((id, secret)),
            _ => None,
        }
    }
}

/// Placeholder values shipped in sample configs count as unset.
pub fn is_placeholder(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.is_empty() || trimmed.starts_with("YOUR_")
}

fn usable(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !is_placeholder(v))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FontConfig {
    pub regular: PathBuf,
    pub bold: PathBuf,
}

impl Default for FontConfig {
    fn default() -> Self {
        Self {
            regular: PathBuf::from("assets/fonts/Roboto-Regular.ttf"),
            bold: PathBuf::from("assets/fonts/Roboto-Bold.ttf"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackgroundConfig {
    pub use_video: bool,
    /// Local path or http(s) URL.
    pub video_source: Option<String>,
    /// Skip the 9:16 center crop.
    pub already_vertical: bool,
    pub use_audio: bool,
    pub audio_source: Option<String>,
    pub audio_volume: f32,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            use_video: true,
            video_source: Some(
                "http://commondatastorage.googleapis.com/gtv-videos-bucket/sample/ForBiggerFun.mp4"
                    .to_string(),
            ),
            already_vertical: false,
            use_audio: true,
            audio_source: Some(
                "http://commondatastorage.googleapis.com/codeskulptor-assets/sounddogs/soundtrack.mp3"
                    .to_string(),
            ),
            audio_volume: 0.10,
        }
    }
}

impl BackgroundConfig {
    pub fn video(&self) -> Option<&str> {
        if self.use_video {
            self.video_source.as_deref().filter(|s| !s.trim().is_empty())
        } else {
            None
        }
    }

    pub fn audio(&self) -> Option<&str> {
        if self.use_audio {
            self.audio_source.as_deref().filter(|s| !s.trim().is_empty())
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub video_codec: String,
    pub audio_codec: String,
    pub preset: String,
    pub ffmpeg_bin: String,
    pub ffprobe_bin: String,
    /// Slide duration used when a synthesized clip reports zero length.
    pub fallback_segment_secs: f64,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            width: 1080,
            height: 1920,
            fps: 30,
            video_codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
            preset: "medium".to_string(),
            ffmpeg_bin: "ffmpeg".to_string(),
            ffprobe_bin: "ffprobe".to_string(),
            fallback_segment_secs: 3.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    /// `gtts` or `piper`.
    pub provider: String,
    pub language: String,
    pub tld: String,
    pub slow: bool,
    pub piper_bin: String,
    pub piper_model: Option<PathBuf>,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            provider: "gtts".to_string(),
            language: "en".to_string(),
            tld: "com".to_string(),
            slow: false,
            piper_bin: "piper".to_string(),
            piper_model: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TextConfig {
    pub max_segment_chars: usize,
    pub max_comments: usize,
    /// Approximate characters per rendered line.
    pub wrap_width: usize,
    pub text_color: String,
    pub background_color: String,
    pub font_size: f32,
    pub title_font_size: f32,
    pub padding: u32,
}

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            max_segment_chars: 200,
            max_comments: 3,
            wrap_width: 25,
            text_color: "#FFFFFF".to_string(),
            background_color: "rgba(20,20,20,0.7)".to_string(),
            font_size: 60.0,
            title_font_size: 70.0,
            padding: 80,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedditSettings {
    pub user_agent: String,
    pub top_time_filter: String,
    pub top_limit: u32,
    pub comment_limit: usize,
    pub allow_nsfw: bool,
    pub image_subreddit: String,
    pub default_subreddits: Vec<String>,
}

impl Default for RedditSettings {
    fn default() -> Self {
        Self {
            user_agent: format!("crossposter/{} (content pipeline)", env!("CARGO_PKG_VERSION")),
            top_time_filter: "day".to_string(),
            top_limit: 25,
            comment_limit: 5,
            allow_nsfw: false,
            image_subreddit: "memes".to_string(),
            default_subreddits: [
                "shortstories",
                "Showerthoughts",
                "LifeProTips",
                "explainlikeimfive",
                "todayilearned",
                "AmItheAsshole",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstagramSettings {
    pub graph_api_base: String,
    pub graph_api_version: String,
    pub rupload_base: String,
    pub max_polling_attempts: u32,
    pub reel_polling_interval_secs: u64,
    pub image_polling_interval_secs: u64,
    pub reel_caption_suffix: String,
    pub image_caption_suffix: String,
}

impl Default for InstagramSettings {
    fn default() -> Self {
        Self {
            graph_api_base: "https://graph.facebook.com".to_string(),
            graph_api_version: "v19.0".to_string(),
            rupload_base: "https://rupload.facebook.com".to_string(),
            max_polling_attempts: 15,
            reel_polling_interval_secs: 60,
            image_polling_interval_secs: 5,
            reel_caption_suffix: String::new(),
            image_caption_suffix: "\n.\n.\n#memes #funny".to_string(),
        }
    }
}

impl InstagramSettings {
    /// `{base}/{version}/{path}`
    pub fn graph_url(&self, path: &str) -> String {
        format!(
            "{}/{}/{}",
            self.graph_api_base.trim_end_matches('/'),
            self.graph_api_version,
            path.trim_start_matches('/')
        )
    }

    /// Resumable upload endpoint for a reel container.
    pub fn rupload_url(&self, container_id: &str) -> String {
        format!(
            "{}/{}/{}",
            self.rupload_base.trim_end_matches('/'),
            self.graph_api_version,
            container_id
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReelConfig {
    pub credentials: Credentials,
    pub fonts: FontConfig,
    pub background: BackgroundConfig,
    pub video: VideoConfig,
    pub tts: TtsConfig,
    pub text: TextConfig,
    pub reddit: RedditSettings,
    pub instagram: InstagramSettings,
    pub temp_dir: PathBuf,
    pub output_dir: PathBuf,
    pub database_url: String,
    pub keep_temp_files: bool,
}

impl Default for ReelConfig {
    fn default() -> Self {
        Self {
            credentials: Credentials::default(),
            fonts: FontConfig::default(),
            background: BackgroundConfig::default(),
            video: VideoConfig::default(),
            tts: TtsConfig::default(),
            text: TextConfig::default(),
            reddit: RedditSettings::default(),
            instagram: InstagramSettings::default(),
            temp_dir: PathBuf::from("assets/temp"),
            output_dir: PathBuf::from("reels_output"),
            database_url: "sqlite://crossposter.db".to_string(),
            keep_temp_files: false,
        }
    }
}

impl ReelConfig {
    /// Loads `.env`, the optional TOML file, then environment overrides, and validates.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Ok(env_file) = dotenvy::dotenv() {
            debug!("Loaded environment from {}", env_file.display());
        }

        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ConfigError::FileNotFound {
                path: path.display().to_string(),
            },
            std::io::ErrorKind::PermissionDenied => ConfigError::PermissionDenied {
                path: path.display().to_string(),
            },
            _ => ConfigError::ValidationFailed {
                reason: format!("failed to read {}: {}", path.display(), e),
            },
        })?;
        info!("Loaded configuration from {}", path.display());
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Environment variables win over file values. Both the descriptive names and
    /// the short legacy ones (`API_KEY`, `INSTA_ID`) are honoured.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let pick = |keys: &[&str]| keys.iter().find_map(|k| lookup(k)).filter(|v| !v.is_empty());

        let creds = &mut self.credentials;
        if let Some(v) = pick(&["REDDIT_CLIENT_ID"]) {
            creds.reddit_client_id = Some(v);
        }
        if let Some(v) = pick(&["REDDIT_CLIENT_SECRET"]) {
            creds.reddit_client_secret = Some(v);
        }
        if let Some(v) = pick(&["REDDIT_USERNAME"]) {
            creds.reddit_username = Some(v);
        }
        if let Some(v) = pick(&["REDDIT_PASSWORD"]) {
            creds.reddit_password = Some(v);
        }
        if let Some(v) = pick(&["INSTAGRAM_ACCESS_TOKEN", "API_KEY"]) {
            creds.instagram_access_token = Some(v);
        }
        if let Some(v) = pick(&["INSTAGRAM_USER_ID", "INSTA_ID"]) {
            creds.instagram_user_id = Some(v);
        }
        if let Some(v) = pick(&["FB_APP_ID"]) {
            creds.fb_app_id = Some(v);
        }
        if let Some(v) = pick(&["FB_APP_SECRET"]) {
            creds.fb_app_secret = Some(v);
        }
        if let Some(v) = pick(&["REDDIT_USER_AGENT"]) {
            self.reddit.user_agent = v;
        }
        if let Some(v) = pick(&["DATABASE_URL"]) {
            self.database_url = v;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.video.width == 0 || self.video.height == 0 {
            return Err(ConfigError::InvalidValue {
                field: "video.width/height".to_string(),
                value: format!("{}x{}", self.video.width, self.video.height),
            });
        }
        if self.video.fps == 0 {
            return Err(ConfigError::InvalidValue {
                field: "video.fps".to_string(),
                value: "0".to_string(),
            });
        }
        if self.text.max_segment_chars == 0 {
            return Err(ConfigError::InvalidValue {
                field: "text.max_segment_chars".to_string(),
                value: "0".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.background.audio_volume) {
            return Err(ConfigError::InvalidValue {
                field: "background.audio_volume".to_string(),
                value: self.background.audio_volume.to_string(),
            });
        }
        if self.instagram.max_polling_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "instagram.max_polling_attempts".to_string(),
                value: "0".to_string(),
            });
        }
        if self.database_url.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "database_url".to_string(),
            });
        }
        if self.reddit.user_agent.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "reddit.user_agent".to_string(),
            });
        }

        if self.credentials.reddit_app().is_none() {
            warn!("Reddit API credentials not configured, falling back to public JSON endpoints");
        }
        if self.credentials.instagram_access_token().is_none() {
            debug!("Instagram access token not configured, uploads will fail");
        }
        Ok(())
    }

    pub fn graph_url(&self, path: &str) -> String {
        self.instagram.graph_url(path)
    }
}
