use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::sources::Post;

const TARGET_LANG: &str = "EN-US";

#[derive(Debug, thiserror::Error)]
pub enum TranslateError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("translation API answered {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("unexpected translation response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("translation API returned no translations")]
    Empty,
}

/// Successful translation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translation {
    pub text: String,
    /// Language the service detected, if it reported one.
    pub detected_source_language: Option<String>,
}

/// Machine translation into English.
#[async_trait]
pub trait Translator: Send + Sync {
    /// `source_lang` is a hint only. Line breaks in `text` are preserved.
    async fn translate(
        &self,
        text: &str,
        source_lang: Option<&str>,
    ) -> Result<Translation, TranslateError>;
}

/// DeepL v2 client.
pub struct DeepL {
    client: Client,
    base: String,
    key: String,
}

#[derive(Serialize)]
struct TranslateRequest<'a> {
    text: [&'a str; 1],
    target_lang: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_lang: Option<String>,
    /// Split on punctuation only, never on newlines.
    split_sentences: &'static str,
}

#[derive(Deserialize)]
struct TranslateResponse {
    translations: Vec<TranslatedText>,
}

#[derive(Deserialize)]
struct TranslatedText {
    #[serde(default)]
    detected_source_language: Option<String>,
    text: String,
}

impl DeepL {
    pub fn new(client: Client, base: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            client,
            base: base.into().trim_end_matches('/').to_owned(),
            key: key.into(),
        }
    }
}

#[async_trait]
impl Translator for DeepL {
    async fn translate(
        &self,
        text: &str,
        source_lang: Option<&str>,
    ) -> Result<Translation, TranslateError> {
        let req = TranslateRequest {
            text: [text],
            target_lang: TARGET_LANG,
            source_lang: source_lang.map(str::to_uppercase),
            split_sentences: "nonewlines",
        };

        let res = self
            .client
            .post(format!("{}/v2/translate", self.base))
            .header("Authorization", format!("DeepL-Auth-Key {}", self.key))
            .json(&req)
            .send()
            .await?;

        let status = res.status();
        let body = res.text().await?;
        if !status.is_success() {
            return Err(TranslateError::Status { status, body });
        }

        let res: TranslateResponse = serde_json::from_str(&body)?;
        let translated = res
            .translations
            .into_iter()
            .next()
            .ok_or(TranslateError::Empty)?;

        Ok(Translation {
            text: translated.text,
            detected_source_language: translated.detected_source_language,
        })
    }
}

/// Translates non-English posts in place. Any failure leaves the post as it
/// was; it is logged and never surfaced to the caller.
pub async fn translate_post(translator: &dyn Translator, mut post: Post) -> Post {
    if post.language == "en" {
        return post;
    }

    // The upstream tag is unreliable, let the service detect the language.
    match translator.translate(&post.text, None).await {
        Ok(translation) => {
            info!(
                url = %post.post_url,
                from = %post.language,
                detected = ?translation.detected_source_language,
                "translated post"
            );
            post.text = translation.text;
            post.translated = true;
        }
        Err(error) => {
            warn!(url = %post.post_url, %error, "failed to translate post");
        }
    }

    post
}
