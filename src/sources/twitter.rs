use reqwest::Client;
use serde::Deserialize;

use crate::{
    link::Provider,
    media::{MediaKind, MediaPartition},
};

use super::{get_json, FetchError, Post};

/// Status as returned by the scrape API.
#[derive(Debug, Deserialize)]
pub struct Status {
    text: String,
    #[serde(default)]
    lang: Option<String>,
    user_name: String,
    user_screen_name: String,
    #[serde(default)]
    user_profile_image_url: Option<String>,
    #[serde(rename = "tweetURL")]
    tweet_url: String,
    #[serde(default)]
    likes: u64,
    #[serde(default)]
    retweets: u64,
    #[serde(default)]
    replies: u64,
    #[serde(default)]
    media_extended: Vec<StatusMedia>,
}

#[derive(Debug, Deserialize)]
struct StatusMedia {
    r#type: MediaKind,
    url: String,
}

pub(super) async fn fetch(client: &Client, base: &str, id: &str) -> Result<Status, FetchError> {
    get_json(client.get(format!("{base}/{id}"))).await
}

impl From<Status> for Post {
    fn from(status: Status) -> Self {
        Post {
            provider: Provider::Twitter,
            author_handle: status.user_screen_name,
            author_display_name: status.user_name,
            author_icon_url: status.user_profile_image_url,
            post_url: status.tweet_url,
            text: status.text,
            language: status.lang.unwrap_or_else(|| "und".to_owned()),
            translated: false,
            likes: status.likes,
            reposts: status.retweets,
            replies: status.replies,
            media: MediaPartition::from_tagged(
                status.media_extended.into_iter().map(|m| (m.r#type, m.url)),
            ),
        }
    }
}
