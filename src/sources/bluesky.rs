use reqwest::Client;
use serde::Deserialize;

use crate::{link::Provider, media::MediaPartition};

use super::{get_json, FetchError, Post};

/// `app.bsky.feed.getPostThread` output. Only the root post matters.
#[derive(Debug, Deserialize)]
pub struct Thread {
    thread: ThreadNode,
}

#[derive(Debug, Deserialize)]
struct ThreadNode {
    post: PostView,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostView {
    uri: String,
    author: Author,
    record: Record,
    #[serde(default)]
    like_count: u64,
    #[serde(default)]
    repost_count: u64,
    #[serde(default)]
    quote_count: u64,
    #[serde(default)]
    reply_count: u64,
    #[serde(default)]
    embed: Option<Embed>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Author {
    handle: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    avatar: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Record {
    #[serde(default)]
    text: String,
    #[serde(default)]
    langs: Vec<String>,
}

/// Any embed view. Only image embeds carry `images`; external cards,
/// quotes and videos leave it absent.
#[derive(Debug, Deserialize)]
struct Embed {
    #[serde(default)]
    images: Option<Vec<EmbedImage>>,
}

#[derive(Debug, Deserialize)]
struct EmbedImage {
    fullsize: String,
}

pub(super) async fn fetch(
    client: &Client,
    base: &str,
    actor: &str,
    rkey: &str,
) -> Result<Thread, FetchError> {
    let uri = format!("at://{actor}/app.bsky.feed.post/{rkey}");
    let request = client
        .get(format!("{base}/xrpc/app.bsky.feed.getPostThread"))
        .query(&[("uri", uri.as_str()), ("depth", "0"), ("parentHeight", "0")]);

    get_json(request).await
}

/// Public web link for a post. The record key is the last segment of the
/// `at://` uri.
fn post_url(handle: &str, uri: &str) -> String {
    let rkey = uri.rsplit('/').next().unwrap_or_default();
    format!("https://bsky.app/profile/{handle}/post/{rkey}")
}

impl From<Thread> for Post {
    fn from(Thread { thread }: Thread) -> Self {
        let PostView {
            uri,
            author,
            record,
            like_count,
            repost_count,
            quote_count,
            reply_count,
            embed,
        } = thread.post;

        let images = embed
            .and_then(|e| e.images)
            .map(|images| images.into_iter().map(|i| i.fullsize).collect())
            .unwrap_or_default();

        Post {
            provider: Provider::Bluesky,
            post_url: post_url(&author.handle, &uri),
            author_display_name: author
                .display_name
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| author.handle.clone()),
            author_handle: author.handle,
            author_icon_url: author.avatar,
            text: record.text,
            language: record
                .langs
                .into_iter()
                .next()
                .unwrap_or_else(|| "und".to_owned()),
            translated: false,
            likes: like_count,
            // Quotes count as reposts for display.
            reposts: repost_count.saturating_add(quote_count),
            replies: reply_count,
            media: MediaPartition::images_only(images),
        }
    }
}
