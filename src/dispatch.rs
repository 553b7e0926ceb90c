use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, warn};

use crate::{
    config::Snowflake,
    discord::{DiscordError, IncomingMessage},
    embed::{image_embeds, post_embed, Embed},
    link::LinkMatch,
    media::{Delivery, SizeProbe},
    sources::Post,
};

/// Outbound side of the chat platform.
#[async_trait]
pub trait ChatOutbound: Send + Sync {
    /// Replies to `message` without pinging its author.
    async fn reply(
        &self,
        channel: &Snowflake,
        message: &Snowflake,
        embeds: &[Embed],
    ) -> Result<(), DiscordError>;
    async fn send(&self, channel: &Snowflake, embeds: &[Embed]) -> Result<(), DiscordError>;
    async fn send_link(&self, channel: &Snowflake, url: &str) -> Result<(), DiscordError>;
    /// Uploads the file behind `url` as an attachment. Gives up with
    /// [`DiscordError::TooLarge`] once the download passes `limit` bytes.
    async fn send_file(&self, channel: &Snowflake, url: &str, limit: u64)
        -> Result<(), DiscordError>;
    async fn suppress_embeds(&self, channel: &Snowflake, message: &Snowflake)
        -> Result<(), DiscordError>;
    async fn delete(&self, channel: &Snowflake, message: &Snowflake) -> Result<(), DiscordError>;
}

/// Everything about the triggering message the dispatcher needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchContext {
    pub channel_id: Snowflake,
    pub message_id: Snowflake,
    /// What the poster wrote besides the link.
    pub trailing_text: String,
    /// `nickname (display name)`, or just the display name.
    pub poster_name: String,
    pub poster_icon: Option<String>,
}

/// Where the preview goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presentation {
    /// Keep the original message, hide its embeds and reply to it.
    Reply,
    /// Delete the original message and post the preview in its place.
    Replace,
}

pub struct Dispatcher {
    outbound: Arc<dyn ChatOutbound>,
    probe: Arc<dyn SizeProbe>,
    attachment_limit: u64,
}

impl DispatchContext {
    pub fn new(message: &IncomingMessage, link: &LinkMatch) -> Self {
        let author = &message.author;
        let member = message.member.as_ref();

        let poster_name = match member.and_then(|m| m.nickname.as_deref()) {
            Some(nick) => format!("{nick} ({})", author.display_name()),
            None => author.display_name().to_owned(),
        };
        let poster_icon = member
            .and_then(|m| m.avatar_url.clone())
            .or_else(|| author.avatar_url.clone());

        Self {
            channel_id: message.channel_id.clone(),
            message_id: message.id.clone(),
            trailing_text: link.surrounding_text(&message.content),
            poster_name,
            poster_icon,
        }
    }

    pub fn presentation(&self) -> Presentation {
        if self.trailing_text.is_empty() {
            Presentation::Replace
        } else {
            Presentation::Reply
        }
    }
}

impl Dispatcher {
    pub fn new(outbound: Arc<dyn ChatOutbound>, probe: Arc<dyn SizeProbe>, attachment_limit: u64) -> Self {
        Self {
            outbound,
            probe,
            attachment_limit,
        }
    }

    /// Posts the preview, then the first video and first gif as follow-ups.
    /// Fails only if the preview itself could not be posted.
    pub async fn dispatch(&self, ctx: &DispatchContext, post: &Post) -> Result<(), DiscordError> {
        let mut embeds = vec![post_embed(post, &ctx.poster_name, ctx.poster_icon.as_deref())];
        embeds.extend(image_embeds(post));

        let channel = &ctx.channel_id;
        match ctx.presentation() {
            Presentation::Reply => {
                if let Err(error) = self.outbound.suppress_embeds(channel, &ctx.message_id).await {
                    warn!(%error, "failed to suppress embeds on original message");
                }
                self.outbound.reply(channel, &ctx.message_id, &embeds).await?;
            }
            Presentation::Replace => {
                if let Err(error) = self.outbound.delete(channel, &ctx.message_id).await {
                    warn!(%error, "failed to delete original message");
                }
                self.outbound.send(channel, &embeds).await?;
            }
        }
        debug!(presentation = ?ctx.presentation(), embeds = embeds.len(), "preview posted");

        // Anything past the first video and first gif is dropped.
        let candidates = [post.media.videos.first(), post.media.gifs.first()];
        let deliveries = join_all(
            candidates
                .into_iter()
                .flatten()
                .map(|url| Delivery::resolve(self.probe.as_ref(), url, self.attachment_limit)),
        )
        .await;

        for delivery in deliveries {
            let res = match &delivery {
                Delivery::Attachment(url) => {
                    match self.outbound.send_file(channel, url, self.attachment_limit).await {
                        Err(DiscordError::TooLarge { .. }) => {
                            debug!(url, "media exceeded the upload limit, sending link");
                            self.outbound.send_link(channel, url).await
                        }
                        res => res,
                    }
                }
                Delivery::Link(url) => self.outbound.send_link(channel, url).await,
            };
            if let Err(error) = res {
                warn!(url = delivery.url(), %error, "failed to send media");
            }
        }

        Ok(())
    }
}
