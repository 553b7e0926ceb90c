use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{
    discord::IncomingMessage,
    dispatch::{DispatchContext, Dispatcher},
    link::find_link,
    sources::PostFetcher,
    translate::{translate_post, Translator},
};

/// Long-lived service handles shared by every message task. Nothing in
/// here is mutated after startup.
pub struct Pipeline {
    fetcher: PostFetcher,
    translator: Arc<dyn Translator>,
    dispatcher: Dispatcher,
}

impl Pipeline {
    pub fn new(fetcher: PostFetcher, translator: Arc<dyn Translator>, dispatcher: Dispatcher) -> Self {
        Self {
            fetcher,
            translator,
            dispatcher,
        }
    }

    /// Runs one message through link detection, fetch, normalization,
    /// translation and dispatch. Failures end the run quietly.
    pub async fn handle(&self, message: IncomingMessage) {
        if message.author.bot {
            return;
        }
        let Some(link) = find_link(&message.content) else {
            return;
        };
        debug!(
            message = %message.id,
            provider = ?link.post.provider(),
            post = ?link.post,
            "post link found"
        );

        let Some(raw) = self.fetcher.fetch(&link.post).await else {
            return;
        };
        let post = raw.into_post();
        info!(
            url = %post.post_url,
            lang = %post.language,
            has_media = !post.media.is_empty(),
            images = post.media.images.len(),
            videos = post.media.videos.len(),
            gifs = post.media.gifs.len(),
            "post normalized"
        );

        let post = translate_post(self.translator.as_ref(), post).await;

        let ctx = DispatchContext::new(&message, &link);
        if let Err(error) = self.dispatcher.dispatch(&ctx, &post).await {
            warn!(message = %message.id, %error, "failed to post preview");
        }
    }
}
