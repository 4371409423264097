use crossposter_core::RedditPost;
use std::collections::HashSet;
use tracing::debug;

/// First post in listing order that is a still image and has not been posted.
///
/// Listings come back ranked, so the first survivor is the top-ranked candidate.
pub fn select_image_post<'a>(
    posts: &'a [RedditPost],
    already_posted: &HashSet<String>,
) -> Option<&'a RedditPost> {
    posts.iter().find(|post| {
        if post.stickied {
            debug!("Skipping stickied post {}", post.id);
            return false;
        }
        if already_posted.contains(&post.id) {
            debug!("Skipping already posted {}", post.id);
            return false;
        }
        post.is_still_image()
    })
}

/// Highest scoring post that is not stickied, not posted yet and within the NSFW policy.
pub fn select_best_post<'a>(
    posts: &'a [RedditPost],
    already_posted: &HashSet<String>,
    allow_nsfw: bool,
) -> Option<&'a RedditPost> {
    posts
        .iter()
        .filter(|post| !post.stickied)
        .filter(|post| allow_nsfw || !post.over_18)
        .filter(|post| !already_posted.contains(&post.id))
        .fold(None, |best: Option<&RedditPost>, post| match best {
            Some(current) if current.score >= post.score => Some(current),
            _ => Some(post),
        })
}
