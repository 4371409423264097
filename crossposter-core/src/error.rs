use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("TTS error: {0}")]
    Tts(#[from] TtsError),

    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    #[error("Assembly error: {0}")]
    Assembly(#[from] AssemblyError),

    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Failures while pulling content from Reddit.
#[derive(Error, Debug, Clone)]
pub enum FetchError {
    #[error("Authentication failed: {reason}")]
    AuthenticationFailed { reason: String },

    #[error("Rate limit exceeded. Retry after {retry_after} seconds")]
    RateLimitExceeded { retry_after: u64 },

    #[error("Forbidden access to resource: {resource}")]
    Forbidden { resource: String },

    #[error("Subreddit not found: {subreddit}")]
    SubredditNotFound { subreddit: String },

    #[error("Post not found: {post_id}")]
    PostNotFound { post_id: String },

    #[error("Invalid OAuth token")]
    InvalidToken,

    #[error("Not a Reddit post URL: {url}")]
    InvalidUrl { url: String },

    #[error("Post {post_id} has no usable content")]
    MissingContent { post_id: String },

    #[error("No eligible post found in r/{subreddit}")]
    NoEligiblePost { subreddit: String },

    #[error("Network failure: {reason}")]
    NetworkFailure { reason: String },

    #[error("Invalid API response: {details}")]
    InvalidResponse { details: String },

    #[error("Server error: {status_code}")]
    ServerError { status_code: u16 },
}

#[derive(Error, Debug)]
pub enum TtsError {
    #[error("Unknown TTS provider: {provider}")]
    UnknownProvider { provider: String },

    #[error("Nothing to synthesize for segment {index}")]
    EmptyText { index: usize },

    #[error("TTS request failed for {provider}: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("TTS engine {engine} exited with status {status}: {stderr}")]
    EngineFailed {
        engine: String,
        status: i32,
        stderr: String,
    },

    #[error("TTS engine binary not found: {engine}")]
    EngineNotFound { engine: String },

    #[error("Could not measure the narration length of {path}: {details}")]
    DurationUnavailable { path: String, details: String },
}

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Font file not found: {path}")]
    FontNotFound { path: String },

    #[error("Font could not be loaded from {path}: {reason}")]
    InvalidFont { path: String, reason: String },

    #[error("Invalid color specification: {value}")]
    InvalidColor { value: String },

    #[error("Failed to write image {path}: {reason}")]
    WriteFailed { path: String, reason: String },
}

#[derive(Error, Debug)]
pub enum AssemblyError {
    #[error("Encoder binary not found: {binary}")]
    EncoderNotFound { binary: String },

    #[error("{binary} exited with status {status}: {stderr}")]
    EncoderFailed {
        binary: String,
        status: i32,
        stderr: String,
    },

    #[error("No segments to assemble")]
    NoSegments,

    #[error("Could not determine media duration for {path}: {details}")]
    ProbeFailed { path: String, details: String },

    #[error("Background media unavailable: {source_path}: {reason}")]
    BackgroundUnavailable { source_path: String, reason: String },

    #[error("Encoder produced no output at {path}")]
    EmptyOutput { path: String },

    #[error("Could not prepare {path}: {reason}")]
    WorkspaceIo { path: String, reason: String },
}

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Instagram credentials missing: {field}")]
    MissingCredentials { field: String },

    #[error("Media file not found: {path}")]
    MediaNotFound { path: String },

    #[error("Graph API returned {status_code} during {stage}: {message}")]
    HttpStatus {
        stage: String,
        status_code: u16,
        message: String,
    },

    #[error("Resumable upload rejected: {details}")]
    UploadRejected { details: String },

    #[error("Container {container_id} failed with status {status}")]
    ContainerFailed { container_id: String, status: String },

    #[error("Container {container_id} not ready after {attempts} polling attempts")]
    PollingExhausted { container_id: String, attempts: u32 },

    #[error("Invalid Graph API response during {stage}: {details}")]
    InvalidResponse { stage: String, details: String },

    #[error("Transport failure during {stage}: {reason}")]
    Transport { stage: String, reason: String },
}

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Connection failed: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Migration failed: {migration}")]
    MigrationFailed { migration: String },

    #[error("Query execution failed: {query}")]
    QueryFailed { query: String },

    #[error("Post {reddit_post_id} has already been recorded")]
    DuplicatePost { reddit_post_id: String },

    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("Configuration validation failed: {reason}")]
    ValidationFailed { reason: String },

    #[error("Permission denied accessing config: {path}")]
    PermissionDenied { path: String },

    #[error("Configuration parsing error: {0}")]
    Parse(#[from] toml::de::Error),
}
