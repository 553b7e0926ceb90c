use serde::Serialize;

use crate::sources::Post;

const COLOR: u32 = 0x0099ff;

const LIKES: &str = "❤️";
const REPOSTS: &str = "🔁";
const REPLIES: &str = "💬";

/// Discord rejects empty field values.
const BLANK: &str = "\u{200b}";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Embed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<EmbedAuthor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<EmbedImage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedAuthor {
    pub name: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedImage {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedFooter {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
}

/// Main preview for `post`, credited to whoever shared it.
pub fn post_embed(post: &Post, poster: &str, poster_icon: Option<&str>) -> Embed {
    let name = post.provider.post_name();
    let title = if post.translated {
        format!("{name} (Translated)")
    } else {
        name.to_owned()
    };

    Embed {
        color: Some(COLOR),
        author: Some(EmbedAuthor {
            name: format!("{} (@{})", post.author_display_name, post.author_handle),
            url: post.provider.profile_url(&post.author_handle),
            icon_url: post.author_icon_url.clone(),
        }),
        title: Some(title),
        url: Some(post.post_url.clone()),
        description: (!post.text.is_empty()).then(|| post.text.clone()),
        fields: vec![EmbedField {
            name: format!(
                "{LIKES} {}    {REPOSTS} {}    {REPLIES} {}",
                post.likes, post.reposts, post.replies
            ),
            value: BLANK.to_owned(),
        }],
        image: post.media.images.first().map(|url| EmbedImage { url: url.clone() }),
        footer: Some(EmbedFooter {
            text: format!("Posted by {poster}"),
            icon_url: poster_icon.map(str::to_owned),
        }),
    }
}

/// Extra images beyond the first. Discord groups embeds sharing a url into
/// one gallery.
pub fn image_embeds(post: &Post) -> Vec<Embed> {
    post.media
        .images
        .iter()
        .skip(1)
        .map(|url| Embed {
            url: Some(post.post_url.clone()),
            image: Some(EmbedImage { url: url.clone() }),
            ..Default::default()
        })
        .collect()
}
