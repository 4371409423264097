use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RedditPost {
    pub id: String,
    pub title: String,
    pub selftext: String,
    pub url: String,
    pub permalink: String,
    pub subreddit: String,
    pub score: i64,
    pub upvote_ratio: f64,
    pub over_18: bool,
    pub stickied: bool,
    pub post_hint: Option<String>,
    pub created_utc: i64,
    pub top_comments: Vec<String>,
}

impl RedditPost {
    /// True when the post links straight to a still image Instagram accepts.
    pub fn is_still_image(&self) -> bool {
        self.post_hint.as_deref() == Some("image") && !self.url.to_lowercase().ends_with(".gif")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentKind {
    Title,
    Body,
    Comment,
}

impl SegmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentKind::Title => "title",
            SegmentKind::Body => "body",
            SegmentKind::Comment => "comment",
        }
    }
}

/// A piece of narration text before any media has been produced for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSegment {
    pub kind: SegmentKind,
    pub index: usize,
    pub text: String,
}

impl TextSegment {
    /// File stem shared by the segment's audio and image files, e.g. `body_003`.
    pub fn file_stem(&self) -> String {
        format!("{}_{:03}", self.kind.as_str(), self.index)
    }
}

/// A narration segment with its rendered slide and synthesized audio.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub kind: SegmentKind,
    pub text: String,
    pub audio_clip_path: PathBuf,
    pub image_path: PathBuf,
    /// Seconds of audio, which is also how long the slide stays on screen.
    pub duration: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Reel,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Reel => "reel",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "image" => Ok(MediaKind::Image),
            "reel" => Ok(MediaKind::Reel),
            other => Err(format!("unknown media kind '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostRecord {
    pub reddit_post_id: String,
    pub subreddit: String,
    pub title: String,
    pub instagram_media_id: String,
    pub caption: String,
    pub media_kind: MediaKind,
    pub score: i64,
    pub upvote_ratio: f64,
    pub posted_at: DateTime<Utc>,
}

impl PostRecord {
    pub fn new(
        post: &RedditPost,
        instagram_media_id: impl Into<String>,
        caption: impl Into<String>,
        media_kind: MediaKind,
    ) -> Self {
        Self {
            reddit_post_id: post.id.clone(),
            subreddit: post.subreddit.clone(),
            title: post.title.clone(),
            instagram_media_id: instagram_media_id.into(),
            caption: caption.into(),
            media_kind,
            score: post.score,
            upvote_ratio: post.upvote_ratio,
            posted_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_still_image_detection() {
        let mut post = RedditPost {
            id: "abc".to_string(),
            url: "https://i.redd.it/abc.jpg".to_string(),
            post_hint: Some("image".to_string()),
            ..Default::default()
        };
        assert!(post.is_still_image());

        post.url = "https://i.redd.it/abc.GIF".to_string();
        assert!(!post.is_still_image());

        post.url = "https://i.redd.it/abc.png".to_string();
        post.post_hint = Some("link".to_string());
        assert!(!post.is_still_image());
    }

    #[test]
    fn test_segment_file_stem() {
        let segment = TextSegment {
            kind: SegmentKind::Comment,
            index: 7,
            text: "hi".to_string(),
        };
        assert_eq!(segment.file_stem(), "comment_007");
    }

    #[test]
    fn test_media_kind_parsing() {
        assert_eq!("REEL".parse::<MediaKind>().unwrap(), MediaKind::Reel);
        assert_eq!("image".parse::<MediaKind>().unwrap(), MediaKind::Image);
        assert!("story".parse::<MediaKind>().is_err());
    }
}
