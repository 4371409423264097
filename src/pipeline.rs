use crate::cli::{Mode, PostSource, RunOptions};
use crossposter_core::{
    CoreError, DatabaseError, ErrorExt, FetchError, MediaKind, PostRecord, RedditPost, ReelConfig,
};
use database::Database;
use instagram_uploader::{InstagramUploader, MediaPublisher};
use reddit_client::{
    select_best_post, select_image_post, PostFetcher, RedditClient, RedditOAuth2Config,
};
use reel_creator::ReelCreator;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const FALLBACK_OUTPUT_STEM: &str = "generated_reel";
const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "webp"];

/// What a finished run produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub post_id: String,
    pub output: PathBuf,
    pub media_id: Option<String>,
}

/// Fetch, build, publish and record one post.
pub struct Pipeline {
    config: ReelConfig,
    fetcher: Box<dyn PostFetcher>,
    store: Option<Database>,
    publisher: Option<Box<dyn MediaPublisher>>,
    creator: Option<ReelCreator>,
    http: reqwest::Client,
}

impl Pipeline {
    pub fn new(config: ReelConfig, fetcher: Box<dyn PostFetcher>) -> Self {
        Self {
            config,
            fetcher,
            store: None,
            publisher: None,
            creator: None,
            http: reqwest::Client::new(),
        }
    }

    pub fn with_store(mut self, store: Database) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_publisher(mut self, publisher: Box<dyn MediaPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn with_creator(mut self, creator: ReelCreator) -> Self {
        self.creator = Some(creator);
        self
    }

    /// Wires the real Reddit client, and only the collaborators the run
    /// needs: no encoder lookup for image posts, no credentials check when
    /// nothing is uploaded.
    pub fn from_config(
        config: ReelConfig,
        store: Database,
        mode: Mode,
        upload: bool,
    ) -> Result<Self, CoreError> {
        let fetcher = RedditClient::new(RedditOAuth2Config::from_reel_config(&config))?;
        let creator = match mode {
            Mode::Reel => Some(ReelCreator::from_config(config.clone())?),
            Mode::Image => None,
        };
        let publisher = if upload {
            Some(Box::new(InstagramUploader::from_config(&config)?) as Box<dyn MediaPublisher>)
        } else {
            None
        };

        let mut pipeline = Self::new(config, Box::new(fetcher)).with_store(store);
        if let Some(creator) = creator {
            pipeline = pipeline.with_creator(creator);
        }
        if let Some(publisher) = publisher {
            pipeline = pipeline.with_publisher(publisher);
        }
        Ok(pipeline)
    }

    pub async fn run(&mut self, options: &RunOptions) -> Result<RunOutcome, CoreError> {
        let post = self.resolve_post(&options.source, options.mode).await?;
        let caption = self.caption_for(&post, options.caption.as_deref(), options.mode);
        let output = options
            .output_path
            .clone()
            .unwrap_or_else(|| self.default_output(&post, options.mode));
        info!("Processing post {} ({})", post.id, post.title);

        let media_id = match options.mode {
            Mode::Reel => self.run_reel(&post, &output, &caption, options).await?,
            Mode::Image => self.run_image(&post, &output, &caption, options).await?,
        };

        if let Some(media_id) = &media_id {
            let kind = match options.mode {
                Mode::Reel => MediaKind::Reel,
                Mode::Image => MediaKind::Image,
            };
            self.record(&post, media_id, &caption, kind).await?;
        }

        Ok(RunOutcome {
            post_id: post.id,
            output,
            media_id,
        })
    }

    async fn run_reel(
        &self,
        post: &RedditPost,
        output: &Path,
        caption: &str,
        options: &RunOptions,
    ) -> Result<Option<String>, CoreError> {
        let creator = self.creator.as_ref().ok_or_else(|| CoreError::Internal {
            message: "reel mode needs a reel creator".to_string(),
        })?;
        let reel = creator.generate_reel(post, output).await?;
        info!(
            "Reel for {} ready: {} segments, {:.1}s",
            post.id,
            reel.segments.len(),
            reel.duration
        );

        if options.no_upload {
            info!("Skipping upload, reel left at {}", output.display());
            return Ok(None);
        }
        let publisher = self.publisher()?;
        let media_id = publisher
            .publish_reel(output, caption, options.share_to_feed)
            .await?;
        Ok(Some(media_id))
    }

    async fn run_image(
        &self,
        post: &RedditPost,
        output: &Path,
        caption: &str,
        options: &RunOptions,
    ) -> Result<Option<String>, CoreError> {
        if !post.is_still_image() {
            return Err(CoreError::InvalidInput {
                message: format!("post {} is not a still image", post.id),
            });
        }
        self.download(&post.url, output).await?;

        if options.no_upload {
            info!("Skipping upload, image left at {}", output.display());
            return Ok(None);
        }
        let media_id = self.publisher()?.publish_image(&post.url, caption).await?;
        Ok(Some(media_id))
    }

    async fn resolve_post(&mut self, source: &PostSource, mode: Mode) -> Result<RedditPost, CoreError> {
        match source {
            PostSource::Url(url) => {
                let post = self.fetcher.fetch_post(url).await?;
                if let Some(store) = &self.store {
                    if store.is_posted(&post.id).await? {
                        warn!("Post {} was already published, continuing anyway", post.id);
                    }
                }
                Ok(post)
            }
            PostSource::Subreddit(subreddit) => {
                let posted = self.posted_ids().await?;
                let posts = self.top_posts(subreddit).await?;
                let picked = match mode {
                    Mode::Image => select_image_post(&posts, &posted),
                    Mode::Reel => select_best_post(&posts, &posted, self.config.reddit.allow_nsfw),
                }
                .cloned()
                .ok_or_else(|| FetchError::NoEligiblePost {
                    subreddit: subreddit.clone(),
                })?;
                self.with_comments(picked, mode).await
            }
            PostSource::Auto => {
                let subreddits = self.config.reddit.default_subreddits.clone();
                let posted = self.posted_ids().await?;
                let mut posts = Vec::new();
                for subreddit in &subreddits {
                    posts.extend(self.top_posts(subreddit).await?);
                }
                let picked = select_best_post(&posts, &posted, self.config.reddit.allow_nsfw)
                    .cloned()
                    .ok_or_else(|| FetchError::NoEligiblePost {
                        subreddit: subreddits.join("+"),
                    })?;
                self.with_comments(picked, mode).await
            }
        }
    }

    async fn top_posts(&mut self, subreddit: &str) -> Result<Vec<RedditPost>, CoreError> {
        let reddit = &self.config.reddit;
        info!(
            "Fetching top {} posts of r/{} (t={})",
            reddit.top_limit, subreddit, reddit.top_time_filter
        );
        self.fetcher
            .fetch_top_posts(subreddit, &reddit.top_time_filter, reddit.top_limit)
            .await
    }

    /// Listings carry no comments; reels narrate them, so re-fetch the thread.
    async fn with_comments(&mut self, post: RedditPost, mode: Mode) -> Result<RedditPost, CoreError> {
        if mode == Mode::Image || post.permalink.is_empty() {
            return Ok(post);
        }
        let url = format!("https://www.reddit.com{}", post.permalink);
        self.fetcher.fetch_post(&url).await
    }

    async fn posted_ids(&self) -> Result<HashSet<String>, CoreError> {
        match &self.store {
            Some(store) => store.posted_ids().await,
            None => Ok(HashSet::new()),
        }
    }

    async fn record(
        &self,
        post: &RedditPost,
        media_id: &str,
        caption: &str,
        kind: MediaKind,
    ) -> Result<(), CoreError> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        match store
            .record_post(&PostRecord::new(post, media_id, caption, kind))
            .await
        {
            Err(e @ CoreError::Database(DatabaseError::DuplicatePost { .. })) => {
                e.log_warn();
                Ok(())
            }
            other => other,
        }
    }

    fn publisher(&self) -> Result<&dyn MediaPublisher, CoreError> {
        self.publisher
            .as_deref()
            .ok_or_else(|| CoreError::Internal {
                message: "upload requested without a publisher".to_string(),
            })
    }

    fn caption_for(&self, post: &RedditPost, caption: Option<&str>, mode: Mode) -> String {
        let suffix = match mode {
            Mode::Reel => &self.config.instagram.reel_caption_suffix,
            Mode::Image => &self.config.instagram.image_caption_suffix,
        };
        format!("{}{}", caption.unwrap_or(&post.title), suffix)
    }

    fn default_output(&self, post: &RedditPost, mode: Mode) -> PathBuf {
        let stem = if post.id.is_empty() {
            FALLBACK_OUTPUT_STEM
        } else {
            post.id.as_str()
        };
        let extension = match mode {
            Mode::Reel => "mp4".to_string(),
            Mode::Image => image_extension(&post.url),
        };
        self.config
            .output_dir
            .join(format!("{}.{}", stem, extension))
    }

    async fn download(&self, url: &str, output: &Path) -> Result<(), CoreError> {
        info!("Downloading {}", url);
        let bytes = self
            .http
            .get(url)
            .header(reqwest::header::USER_AGENT, &self.config.reddit.user_agent)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(output, &bytes).await?;
        info!("Saved {} bytes to {}", bytes.len(), output.display());
        Ok(())
    }
}

/// File extension of an image link, `jpg` when it has no usable one.
pub fn image_extension(link: &str) -> String {
    url::Url::parse(link)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .and_then(|name| name.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase()))
        .filter(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or_else(|| "jpg".to_string())
}
