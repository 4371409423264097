use crate::error::*;
use tracing::{error, info, warn};

pub trait ErrorExt {
    fn log_error(&self) -> &Self;
    fn log_warn(&self) -> &Self;
    fn user_friendly_message(&self) -> String;
    fn error_code(&self) -> String;
}

impl ErrorExt for CoreError {
    fn log_error(&self) -> &Self {
        error!("CoreError: {}", self);
        match self {
            CoreError::Fetch(e) => {
                error!("Fetch error details: {:?}", e);
            }
            CoreError::Tts(e) => {
                error!("TTS error details: {:?}", e);
            }
            CoreError::Render(e) => {
                error!("Render error details: {:?}", e);
            }
            CoreError::Assembly(e) => {
                error!("Assembly error details: {:?}", e);
            }
            CoreError::Upload(e) => {
                error!("Upload error details: {:?}", e);
            }
            CoreError::Database(e) => {
                error!("Database error details: {:?}", e);
            }
            CoreError::Config(e) => {
                error!("Configuration error details: {:?}", e);
            }
            _ => {}
        }
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("CoreError (warning): {}", self);
        self
    }

    fn user_friendly_message(&self) -> String {
        match self {
            CoreError::Fetch(e) => e.user_friendly_message(),
            CoreError::Tts(e) => e.user_friendly_message(),
            CoreError::Render(e) => e.user_friendly_message(),
            CoreError::Assembly(e) => e.user_friendly_message(),
            CoreError::Upload(e) => e.user_friendly_message(),
            CoreError::Database(e) => e.user_friendly_message(),
            CoreError::Config(e) => e.user_friendly_message(),
            CoreError::Io(e) => format!("File system error: {}", e),
            CoreError::Network(_) => {
                "Network connection error. Please check your internet connection.".to_string()
            }
            CoreError::InvalidInput { message } => format!("Invalid input: {}", message),
            _ => "An unexpected error occurred. Please try again later.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            CoreError::Fetch(_) => "FETCH".to_string(),
            CoreError::Tts(_) => "TTS".to_string(),
            CoreError::Render(_) => "RENDER".to_string(),
            CoreError::Assembly(_) => "ASSEMBLY".to_string(),
            CoreError::Upload(_) => "UPLOAD".to_string(),
            CoreError::Database(_) => "DATABASE".to_string(),
            CoreError::Config(_) => "CONFIG".to_string(),
            CoreError::Io(_) => "IO".to_string(),
            CoreError::Serialization(_) => "SERIALIZATION".to_string(),
            CoreError::Network(_) => "NETWORK".to_string(),
            CoreError::InvalidInput { .. } => "INVALID_INPUT".to_string(),
            CoreError::Internal { .. } => "INTERNAL".to_string(),
        }
    }
}

impl ErrorExt for FetchError {
    fn log_error(&self) -> &Self {
        error!("FetchError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("FetchError (warning): {}", self);
        self
    }

    fn user_friendly_message(&self) -> String {
        match self {
            FetchError::AuthenticationFailed { .. } => {
                "Reddit authentication failed. Please check your credentials.".to_string()
            }
            FetchError::RateLimitExceeded { retry_after } => format!(
                "Too many requests. Please wait {} seconds before trying again.",
                retry_after
            ),
            FetchError::Forbidden { resource } => format!(
                "Access denied to {}. You may not have permission to view this content.",
                resource
            ),
            FetchError::SubredditNotFound { subreddit } => {
                format!("Subreddit '{}' not found or is private.", subreddit)
            }
            FetchError::PostNotFound { .. } => {
                "The requested post could not be found.".to_string()
            }
            FetchError::InvalidToken => {
                "Reddit authentication token is invalid. Please re-authenticate.".to_string()
            }
            FetchError::InvalidUrl { url } => {
                format!("'{}' does not look like a Reddit post URL.", url)
            }
            FetchError::MissingContent { post_id } => {
                format!("Post {} has no text to turn into a reel.", post_id)
            }
            FetchError::NoEligiblePost { subreddit } => format!(
                "No new eligible post found in r/{}. Everything on top has been posted already.",
                subreddit
            ),
            FetchError::NetworkFailure { .. } => {
                "Could not reach Reddit. Please check your internet connection.".to_string()
            }
            _ => "Reddit API error occurred. Please try again later.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            FetchError::AuthenticationFailed { .. } => "FETCH_AUTH_FAILED".to_string(),
            FetchError::RateLimitExceeded { .. } => "FETCH_RATE_LIMIT".to_string(),
            FetchError::Forbidden { .. } => "FETCH_FORBIDDEN".to_string(),
            FetchError::SubredditNotFound { .. } => "FETCH_SUBREDDIT_NOT_FOUND".to_string(),
            FetchError::PostNotFound { .. } => "FETCH_POST_NOT_FOUND".to_string(),
            FetchError::InvalidToken => "FETCH_INVALID_TOKEN".to_string(),
            FetchError::InvalidUrl { .. } => "FETCH_INVALID_URL".to_string(),
            FetchError::MissingContent { .. } => "FETCH_MISSING_CONTENT".to_string(),
            FetchError::NoEligiblePost { .. } => "FETCH_NO_ELIGIBLE_POST".to_string(),
            FetchError::NetworkFailure { .. } => "FETCH_NETWORK".to_string(),
            FetchError::InvalidResponse { .. } => "FETCH_INVALID_RESPONSE".to_string(),
            FetchError::ServerError { .. } => "FETCH_SERVER_ERROR".to_string(),
        }
    }
}

impl ErrorExt for TtsError {
    fn log_error(&self) -> &Self {
        error!("TtsError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("TtsError (warning): {}", self);
        self
    }

    fn user_friendly_message(&self) -> String {
        match self {
            TtsError::UnknownProvider { provider } => format!(
                "TTS provider '{}' is not supported. Use 'gtts' or 'piper'.",
                provider
            ),
            TtsError::EngineNotFound { engine } => {
                format!("The '{}' binary is not installed or not on PATH.", engine)
            }
            TtsError::RequestFailed { provider, .. } => {
                format!("Speech synthesis with {} failed. Please try again.", provider)
            }
            TtsError::DurationUnavailable { path, .. } => format!(
                "The narration in '{}' could not be measured. Is ffprobe installed?",
                path
            ),
            _ => "Speech synthesis failed.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            TtsError::UnknownProvider { .. } => "TTS_UNKNOWN_PROVIDER".to_string(),
            TtsError::EmptyText { .. } => "TTS_EMPTY_TEXT".to_string(),
            TtsError::RequestFailed { .. } => "TTS_REQUEST_FAILED".to_string(),
            TtsError::EngineFailed { .. } => "TTS_ENGINE_FAILED".to_string(),
            TtsError::EngineNotFound { .. } => "TTS_ENGINE_NOT_FOUND".to_string(),
            TtsError::DurationUnavailable { .. } => "TTS_DURATION_UNAVAILABLE".to_string(),
        }
    }
}

impl ErrorExt for RenderError {
    fn log_error(&self) -> &Self {
        error!("RenderError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("RenderError (warning): {}", self);
        self
    }

    fn user_friendly_message(&self) -> String {
        match self {
            RenderError::FontNotFound { path } => format!(
                "Font file '{}' does not exist. Please check the fonts section of your config.",
                path
            ),
            RenderError::InvalidFont { path, .. } => {
                format!("Font file '{}' could not be loaded.", path)
            }
            RenderError::InvalidColor { value } => {
                format!("'{}' is not a valid color.", value)
            }
            _ => "Rendering the slide image failed.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            RenderError::FontNotFound { .. } => "RENDER_FONT_NOT_FOUND".to_string(),
            RenderError::InvalidFont { .. } => "RENDER_INVALID_FONT".to_string(),
            RenderError::InvalidColor { .. } => "RENDER_INVALID_COLOR".to_string(),
            RenderError::WriteFailed { .. } => "RENDER_WRITE_FAILED".to_string(),
        }
    }
}

impl ErrorExt for AssemblyError {
    fn log_error(&self) -> &Self {
        error!("AssemblyError: {}", self);
        if let AssemblyError::EncoderFailed { stderr, .. } = self {
            error!("Encoder stderr:\n{}", stderr);
        }
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("AssemblyError (warning): {}", self);
        self
    }

    fn user_friendly_message(&self) -> String {
        match self {
            AssemblyError::EncoderNotFound { binary } => {
                format!("'{}' is not installed or not on PATH.", binary)
            }
            AssemblyError::EncoderFailed { binary, stderr, .. } => {
                let last_line = stderr.lines().rev().find(|l| !l.trim().is_empty());
                match last_line {
                    Some(line) => format!("{} failed: {}", binary, line.trim()),
                    None => format!("{} failed without output.", binary),
                }
            }
            AssemblyError::NoSegments => "There was nothing to put into the reel.".to_string(),
            AssemblyError::BackgroundUnavailable { source_path, .. } => {
                format!("Background media '{}' could not be prepared.", source_path)
            }
            AssemblyError::WorkspaceIo { path, reason } => {
                format!("Could not write the reel working files at {}: {}", path, reason)
            }
            _ => "Assembling the video failed.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            AssemblyError::EncoderNotFound { .. } => "ASSEMBLY_ENCODER_NOT_FOUND".to_string(),
            AssemblyError::EncoderFailed { .. } => "ASSEMBLY_ENCODER_FAILED".to_string(),
            AssemblyError::NoSegments => "ASSEMBLY_NO_SEGMENTS".to_string(),
            AssemblyError::ProbeFailed { .. } => "ASSEMBLY_PROBE_FAILED".to_string(),
            AssemblyError::BackgroundUnavailable { .. } => "ASSEMBLY_BACKGROUND".to_string(),
            AssemblyError::EmptyOutput { .. } => "ASSEMBLY_EMPTY_OUTPUT".to_string(),
            AssemblyError::WorkspaceIo { .. } => "ASSEMBLY_WORKSPACE_IO".to_string(),
        }
    }
}

impl ErrorExt for UploadError {
    fn log_error(&self) -> &Self {
        error!("UploadError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("UploadError (warning): {}", self);
        self
    }

    fn user_friendly_message(&self) -> String {
        match self {
            UploadError::MissingCredentials { field } => format!(
                "Instagram credentials are incomplete: '{}' is not set.",
                field
            ),
            UploadError::MediaNotFound { path } => {
                format!("The file to upload does not exist: {}", path)
            }
            UploadError::HttpStatus { stage, message, .. } => {
                format!("Instagram rejected the {} request: {}", stage, message)
            }
            UploadError::ContainerFailed { status, .. } => {
                format!("Instagram could not process the media (status {}).", status)
            }
            UploadError::PollingExhausted { attempts, .. } => format!(
                "Instagram did not finish processing after {} checks.",
                attempts
            ),
            _ => "Uploading to Instagram failed.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            UploadError::MissingCredentials { .. } => "UPLOAD_MISSING_CREDENTIALS".to_string(),
            UploadError::MediaNotFound { .. } => "UPLOAD_MEDIA_NOT_FOUND".to_string(),
            UploadError::HttpStatus { .. } => "UPLOAD_HTTP_STATUS".to_string(),
            UploadError::UploadRejected { .. } => "UPLOAD_REJECTED".to_string(),
            UploadError::ContainerFailed { .. } => "UPLOAD_CONTAINER_FAILED".to_string(),
            UploadError::PollingExhausted { .. } => "UPLOAD_POLLING_EXHAUSTED".to_string(),
            UploadError::InvalidResponse { .. } => "UPLOAD_INVALID_RESPONSE".to_string(),
            UploadError::Transport { .. } => "UPLOAD_TRANSPORT".to_string(),
        }
    }
}

impl ErrorExt for DatabaseError {
    fn log_error(&self) -> &Self {
        error!("DatabaseError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("DatabaseError (warning): {}", self);
        self
    }

    fn user_friendly_message(&self) -> String {
        match self {
            DatabaseError::ConnectionFailed { .. } => {
                "Database connection failed. Please check DATABASE_URL.".to_string()
            }
            DatabaseError::DuplicatePost { reddit_post_id } => {
                format!("Post {} was already published.", reddit_post_id)
            }
            _ => "Database error occurred. Please try again.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            DatabaseError::ConnectionFailed { .. } => "DB_CONNECTION_FAILED".to_string(),
            DatabaseError::MigrationFailed { .. } => "DB_MIGRATION_FAILED".to_string(),
            DatabaseError::QueryFailed { .. } => "DB_QUERY_FAILED".to_string(),
            DatabaseError::DuplicatePost { .. } => "DB_DUPLICATE_POST".to_string(),
            DatabaseError::Sql(_) => "DB_SQL_ERROR".to_string(),
        }
    }
}

impl ErrorExt for ConfigError {
    fn log_error(&self) -> &Self {
        error!("ConfigError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("ConfigError (warning): {}", self);
        self
    }

    fn user_friendly_message(&self) -> String {
        match self {
            ConfigError::FileNotFound { path } => {
                format!("Configuration file '{}' not found.", path)
            }
            ConfigError::MissingField { field } => {
                format!("Required configuration field '{}' is missing.", field)
            }
            ConfigError::InvalidValue { field, .. } => {
                format!("Invalid value for configuration field '{}'.", field)
            }
            ConfigError::PermissionDenied { .. } => {
                "Permission denied accessing configuration. Please check file permissions."
                    .to_string()
            }
            ConfigError::Parse(e) => format!("Configuration file could not be parsed: {}", e),
            _ => "Configuration error occurred. Please check your settings.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            ConfigError::FileNotFound { .. } => "CONFIG_FILE_NOT_FOUND".to_string(),
            ConfigError::MissingField { .. } => "CONFIG_MISSING_FIELD".to_string(),
            ConfigError::InvalidValue { .. } => "CONFIG_INVALID_VALUE".to_string(),
            ConfigError::ValidationFailed { .. } => "CONFIG_VALIDATION_FAILED".to_string(),
            ConfigError::PermissionDenied { .. } => "CONFIG_PERMISSION_DENIED".to_string(),
            ConfigError::Parse(_) => "CONFIG_PARSE_ERROR".to_string(),
        }
    }
}

/// Logs a failed run with its code and the message shown to the user.
#[derive(Debug, Default, Clone, Copy)]
pub struct ErrorReporter;

impl ErrorReporter {
    pub fn new() -> Self {
        Self
    }

    pub fn report_error(&self, error: &CoreError) {
        error.log_error();
        info!("Error code: {}", error.error_code());
        info!("User message: {}", error.user_friendly_message());
    }
}
