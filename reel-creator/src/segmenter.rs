use crossposter_core::{RedditPost, SegmentKind, TextSegment};
use tracing::{debug, info};

/// Splits a post into narration segments: title, then body, then the first
/// `max_comments` comments. No segment is longer than `max_chars` characters.
pub fn segment_post(post: &RedditPost, max_chars: usize, max_comments: usize) -> Vec<TextSegment> {
    let mut segments = Vec::new();
    let mut push_all = |kind: SegmentKind, text: &str| {
        for piece in split_text(text, max_chars) {
            let index = segments.len();
            segments.push(TextSegment {
                kind,
                index,
                text: piece,
            });
        }
    };

    push_all(SegmentKind::Title, &post.title);
    push_all(SegmentKind::Body, &post.selftext);
    for comment in post.top_comments.iter().take(max_comments) {
        push_all(SegmentKind::Comment, comment);
    }

    info!(
        "Post {} split into {} segments (max {} chars)",
        post.id,
        segments.len(),
        max_chars
    );
    segments
}

/// Greedily packs whole sentences into chunks of at most `max_chars`
/// characters. Oversized sentences fall back to word boundaries, oversized
/// words to character boundaries. Only whitespace is ever dropped or added.
pub fn split_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();

    for sentence in sentences(text) {
        for piece in fit_sentence(&sentence, max_chars) {
            let needed = if current.is_empty() {
                char_len(&piece)
            } else {
                char_len(&current) + 1 + char_len(&piece)
            };
            if needed <= max_chars {
                if !current.is_empty() {
                    current.push(' ');
                }
                current.push_str(&piece);
            } else {
                chunks.push(std::mem::take(&mut current));
                current = piece;
            }
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }

    debug!("Split {} chars into {} chunks", char_len(text), chunks.len());
    chunks
}

/// Sentences end after a run of `.`, `!` or `?` that is followed by
/// whitespace or the end of the text. Internal whitespace is normalised.
fn sentences(text: &str) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    let mut sentences = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for word in words {
        current.push(word);
        if word.ends_with(&['.', '!', '?'][..]) {
            sentences.push(current.join(" "));
            current.clear();
        }
    }
    if !current.is_empty() {
        sentences.push(current.join(" "));
    }
    sentences
}

fn fit_sentence(sentence: &str, max_chars: usize) -> Vec<String> {
    if char_len(sentence) <= max_chars {
        return vec![sentence.to_string()];
    }

    let mut pieces = Vec::new();
    let mut current = String::new();
    for word in sentence.split_whitespace() {
        let word_len = char_len(word);
        if word_len > max_chars {
            if !current.is_empty() {
                pieces.push(std::mem::take(&mut current));
            }
            let chars: Vec<char> = word.chars().collect();
            let mut parts: Vec<String> = chars
                .chunks(max_chars)
                .map(|c| c.iter().collect())
                .collect();
            // The tail may still share a piece with following words.
            current = parts.pop().unwrap_or_default();
            pieces.extend(parts);
            continue;
        }

        if current.is_empty() {
            current.push_str(word);
        } else if char_len(&current) + 1 + word_len <= max_chars {
            current.push(' ');
            current.push_str(word);
        } else {
            pieces.push(std::mem::replace(&mut current, word.to_string()));
        }
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}
