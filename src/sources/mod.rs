use reqwest::{Client, StatusCode};
use tracing::{debug, info, warn};

use crate::{
    link::{PostRef, Provider},
    media::MediaPartition,
};

pub mod bluesky;
pub mod twitter;

/// Provider-agnostic post, built fresh for every message.
#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    pub provider: Provider,

    pub author_handle: String,
    pub author_display_name: String,
    /// Avatar url. Bluesky accounts may have none
    pub author_icon_url: Option<String>,

    /// Canonical link to the source post.
    pub post_url: String,
    /// Post body, original or translated. May be empty
    pub text: String,
    /// Source language code as reported upstream.
    pub language: String,
    /// Set only after a successful translation of non-English text.
    pub translated: bool,

    pub likes: u64,
    pub reposts: u64,
    pub replies: u64,

    pub media: MediaPartition,
}

/// Upstream response, one variant per provider.
#[derive(Debug)]
pub enum RawPost {
    Twitter(twitter::Status),
    Bluesky(bluesky::Thread),
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("upstream answered {0}")]
    Status(StatusCode),
    #[error("unexpected upstream shape: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Read-only client for both upstream APIs.
pub struct PostFetcher {
    client: Client,
    twitter_api: String,
    bluesky_api: String,
}

impl Provider {
    pub fn post_name(self) -> &'static str {
        match self {
            Self::Twitter => "Tweet",
            Self::Bluesky => "Post",
        }
    }

    pub fn profile_url(self, handle: &str) -> String {
        match self {
            Self::Twitter => format!("https://twitter.com/{handle}"),
            Self::Bluesky => format!("https://bsky.app/profile/{handle}"),
        }
    }
}

impl RawPost {
    pub fn into_post(self) -> Post {
        match self {
            Self::Twitter(status) => status.into(),
            Self::Bluesky(thread) => thread.into(),
        }
    }
}

impl PostFetcher {
    pub fn new(client: Client, twitter_api: impl Into<String>, bluesky_api: impl Into<String>) -> Self {
        Self {
            client,
            twitter_api: twitter_api.into().trim_end_matches('/').to_owned(),
            bluesky_api: bluesky_api.into().trim_end_matches('/').to_owned(),
        }
    }

    /// Fetches and decodes the referenced post. Every failure collapses into
    /// `None`: the caller drops the message without saying anything.
    pub async fn fetch(&self, post: &PostRef) -> Option<RawPost> {
        let res = match post {
            PostRef::Twitter { id } => twitter::fetch(&self.client, &self.twitter_api, id)
                .await
                .map(RawPost::Twitter),
            PostRef::Bluesky { actor, rkey } => {
                bluesky::fetch(&self.client, &self.bluesky_api, actor, rkey)
                    .await
                    .map(RawPost::Bluesky)
            }
        };

        match res {
            Ok(raw) => {
                debug!(?post, "post data obtained");
                Some(raw)
            }
            Err(FetchError::Status(status)) => {
                info!(?post, %status, "post unavailable upstream");
                None
            }
            Err(error) => {
                warn!(?post, %error, "failed to fetch post");
                None
            }
        }
    }
}

/// Shared GET-and-decode used by both providers. Anything at or above 400
/// is reported as [`FetchError::Status`].
async fn get_json<T: serde::de::DeserializeOwned>(
    request: reqwest::RequestBuilder,
) -> Result<T, FetchError> {
    let res = request.send().await?;
    let status = res.status();
    if status.as_u16() >= 400 {
        return Err(FetchError::Status(status));
    }

    let body = res.text().await?;
    Ok(serde_json::from_str(&body)?)
}
