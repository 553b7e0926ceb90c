use std::{fmt::Display, time::Duration};

use serde::Deserialize;

#[derive(Deserialize)]
pub struct Config {
    pub discord_token: String,
    pub deepl_key: String,

    #[serde(default = "defaults::twitter_api")]
    pub twitter_api: String,
    #[serde(default = "defaults::bluesky_api")]
    pub bluesky_api: String,
    #[serde(default = "defaults::discord_api")]
    pub discord_api: String,
    /// Translation host. Derived from the key when not set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deepl_api: Option<String>,

    /// Media larger than this many bytes is sent as a bare link.
    #[serde(default = "defaults::attachment_limit")]
    pub attachment_limit: u64,
    #[serde(default = "defaults::http_timeout_secs")]
    pub http_timeout_secs: u64,
}

mod defaults {
    pub fn twitter_api() -> String {
        "https://api.vxtwitter.com/Twitter/status".to_owned()
    }
    pub fn bluesky_api() -> String {
        "https://public.api.bsky.app".to_owned()
    }
    pub fn discord_api() -> String {
        "https://discord.com/api/v10".to_owned()
    }
    pub fn attachment_limit() -> u64 {
        8_000_000
    }
    pub fn http_timeout_secs() -> u64 {
        30
    }
}

/// Represents an ID that is either [`u64`] or [`String`].
/// Discord sends snowflakes as strings, relays sometimes as numbers.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum Snowflake {
    Number(u64),
    String(String),
}

impl Config {
    /// Translation API base. Free-tier keys carry a `:fx` suffix and only
    /// work against the free host.
    pub fn deepl_base(&self) -> String {
        match &self.deepl_api {
            Some(base) => base.clone(),
            None if self.deepl_key.ends_with(":fx") => "https://api-free.deepl.com".to_owned(),
            None => "https://api.deepl.com".to_owned(),
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

impl Display for Snowflake {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(v) => v.fmt(f),
            Self::String(s) => s.fmt(f),
        }
    }
}

impl From<u64> for Snowflake {
    fn from(v: u64) -> Self {
        Self::Number(v)
    }
}

impl PartialEq<u64> for Snowflake {
    fn eq(&self, other: &u64) -> bool {
        match self {
            Self::Number(v) => v == other,
            Self::String(s) => s.parse().ok().map(|v: u64| v == *other).unwrap_or_default(),
        }
    }
}
