use std::{ops::Range, sync::LazyLock};

use regex::{Captures, Regex};

static RE_TWITTER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https?://(?:www\.|mobile\.)?(?:twitter|x)\.com/([A-Za-z0-9_]+)/status/(\d+)[^\s>]*")
        .expect("twitter link pattern is valid")
});
static RE_BLUESKY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https?://(?:www\.)?bsky\.app/profile/([^/\s]+)/post/([A-Za-z0-9]+)[^\s>]*")
        .expect("bluesky link pattern is valid")
});

/// Which upstream a post lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Twitter,
    Bluesky,
}

/// Identifier of a post on its provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostRef {
    Twitter { id: String },
    /// Bluesky posts are addressed by author (handle or DID) plus record key.
    Bluesky { actor: String, rkey: String },
}

/// First post link found in a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkMatch {
    pub post: PostRef,
    /// Byte range of the whole link inside the message.
    pub span: Range<usize>,
}

impl PostRef {
    pub fn provider(&self) -> Provider {
        match self {
            Self::Twitter { .. } => Provider::Twitter,
            Self::Bluesky { .. } => Provider::Bluesky,
        }
    }
}

impl LinkMatch {
    /// Whatever the poster wrote around the link.
    pub fn surrounding_text(&self, content: &str) -> String {
        let (before, after) = (&content[..self.span.start], &content[self.span.end..]);
        format!("{before}{after}").trim().to_owned()
    }
}

/// Span of the whole link, widened over `<...>` when the poster suppressed
/// the embed that way.
fn link_span(text: &str, cap: &Captures<'_>) -> Range<usize> {
    let Some(m) = cap.get(0) else {
        return Range::default();
    };
    let span = m.range();
    if text[..span.start].ends_with('<') && text[span.end..].starts_with('>') {
        span.start - 1..span.end + 1
    } else {
        span
    }
}

/// Finds the earliest supported post link in `text`. Later links are ignored.
pub fn find_link(text: &str) -> Option<LinkMatch> {
    let twitter = RE_TWITTER.captures(text).map(|cap| LinkMatch {
        post: PostRef::Twitter {
            id: cap[2].to_owned(),
        },
        span: link_span(text, &cap),
    });
    let bluesky = RE_BLUESKY.captures(text).map(|cap| LinkMatch {
        post: PostRef::Bluesky {
            actor: cap[1].to_owned(),
            rkey: cap[2].to_owned(),
        },
        span: link_span(text, &cap),
    });

    match (twitter, bluesky) {
        (Some(t), Some(b)) => Some(if b.span.start < t.span.start { b } else { t }),
        (t, b) => t.or(b),
    }
}
