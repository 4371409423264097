use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use crossposter_core::CoreError;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "crossposter")]
#[command(about = "Turns Reddit posts into Instagram images and narrated reels")]
#[command(version)]
pub struct Cli {
    /// Reddit post to turn into a reel or image post
    #[arg(short = 'u', long)]
    pub url: Option<String>,

    /// Pick the best unposted entry from this subreddit's top listing
    #[arg(short = 's', long)]
    pub subreddit: Option<String>,

    /// Pick across the configured default subreddits
    #[arg(long)]
    pub auto: bool,

    #[arg(short = 'o', long = "output_path")]
    pub output_path: Option<PathBuf>,

    /// Caption override; the post title is used otherwise
    #[arg(short = 'c', long)]
    pub caption: Option<String>,

    /// Build the media but skip publishing and recording
    #[arg(short = 'n', long = "no_upload")]
    pub no_upload: bool,

    #[arg(long = "share_to_feed", action = ArgAction::Set, default_value_t = true)]
    pub share_to_feed: bool,

    #[arg(long, value_enum, default_value_t = Mode::Reel)]
    pub mode: Mode,

    /// TOML configuration file
    #[arg(long, global = true, env = "CROSSPOSTER_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    Reel,
    Image,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the database schema
    InitDb,
    /// Forget every recorded post
    ClearPosts,
    /// Show recently published posts
    History {
        #[arg(short, long, default_value_t = 10)]
        limit: u32,
    },
    /// Delete leftover reel working directories
    CleanTemp,
    /// Exchange the configured Instagram token for a long-lived one
    RefreshToken,
    /// Publish an image post at fixed daily slots until interrupted
    Schedule {
        #[arg(short, long)]
        subreddit: Option<String>,

        #[arg(long = "slot-hours", default_value_t = 3)]
        slot_hours: u32,
    },
}

/// Where the post for a publish run comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostSource {
    Url(String),
    Subreddit(String),
    Auto,
}

/// Options of a single publish run, independent of clap.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub source: PostSource,
    pub mode: Mode,
    pub output_path: Option<PathBuf>,
    pub caption: Option<String>,
    pub no_upload: bool,
    pub share_to_feed: bool,
}

impl Cli {
    pub fn run_options(&self) -> Result<RunOptions, CoreError> {
        let source = match (&self.url, &self.subreddit, self.auto) {
            (Some(url), None, false) => PostSource::Url(url.clone()),
            (None, Some(subreddit), false) => PostSource::Subreddit(subreddit.clone()),
            (None, None, true) => PostSource::Auto,
            (None, None, false) => {
                return Err(CoreError::InvalidInput {
                    message: "one of --url, --subreddit or --auto is required".to_string(),
                })
            }
            _ => {
                return Err(CoreError::InvalidInput {
                    message: "--url, --subreddit and --auto are mutually exclusive".to_string(),
                })
            }
        };
        if source == PostSource::Auto && self.mode == Mode::Image {
            return Err(CoreError::InvalidInput {
                message: "--auto only works in reel mode".to_string(),
            });
        }
        Ok(RunOptions {
            source,
            mode: self.mode,
            output_path: self.output_path.clone(),
            caption: self.caption.clone(),
            no_upload: self.no_upload,
            share_to_feed: self.share_to_feed,
        })
    }
}
