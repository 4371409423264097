use crossposter_core::FetchError;
use url::Url;

/// Pulls the post id out of a Reddit link.
///
/// Accepts `/r/<sub>/comments/<id>/<slug>` style links on any reddit host as
/// well as `redd.it/<id>` short links.
pub fn extract_post_id(link: &str) -> Result<String, FetchError> {
    let invalid = || FetchError::InvalidUrl {
        url: link.to_string(),
    };

    let parsed = Url::parse(link.trim()).map_err(|_| invalid())?;
    let host = parsed.host_str().ok_or_else(invalid)?.to_ascii_lowercase();
    let segments: Vec<&str> = parsed
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();

    let candidate = if host == "redd.it" {
        segments.first().copied()
    } else if host == "reddit.com" || host.ends_with(".reddit.com") {
        segments
            .iter()
            .position(|seg| *seg == "comments")
            .and_then(|idx| segments.get(idx + 1).copied())
    } else {
        None
    };

    match candidate {
        Some(id) if is_post_id(id) => Ok(id.to_ascii_lowercase()),
        _ => Err(invalid()),
    }
}

fn is_post_id(candidate: &str) -> bool {
    !candidate.is_empty() && candidate.chars().all(|c| c.is_ascii_alphanumeric())
}
