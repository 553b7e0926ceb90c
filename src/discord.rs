use std::time::Duration;

use async_trait::async_trait;
use reqwest::{
    multipart::{Form, Part},
    Client, RequestBuilder, StatusCode,
};
use serde::{Deserialize, Serialize};

use crate::{config::Snowflake, dispatch::ChatOutbound, embed::Embed};

/// Discord message flag hiding link previews.
const SUPPRESS_EMBEDS: u64 = 1 << 2;

pub struct DiscordClient {
    client: Client,
    token: String,
    base: String,
}

#[derive(Debug, thiserror::Error)]
pub enum DiscordError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Scheme(#[from] serde_json::Error),
    #[error("API returned {status} (code {code}): {message}")]
    Server {
        status: StatusCode,
        code: u64,
        message: String,
    },
    #[error("ratelimited for {} seconds", .timeout.as_secs_f64())]
    RateLimited { timeout: Duration },
    #[error("failed to download {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} is larger than the {limit} byte upload limit")]
    TooLarge { url: String, limit: u64 },
}

/// `MESSAGE_CREATE` payload as forwarded by the gateway relay.
#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    pub id: Snowflake,
    pub channel_id: Snowflake,
    #[allow(dead_code)]
    #[serde(default)]
    pub guild_id: Option<Snowflake>,
    #[serde(default)]
    pub content: String,
    pub author: Author,
    /// Guild member data, absent in DMs.
    #[serde(default)]
    pub member: Option<Member>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Author {
    #[allow(dead_code)]
    pub id: Snowflake,
    pub username: String,
    #[serde(default)]
    pub global_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub bot: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Member {
    #[serde(default, alias = "nick")]
    pub nickname: Option<String>,
    /// Guild-specific avatar.
    #[serde(default)]
    pub avatar_url: Option<String>,
}

#[derive(Serialize, Default)]
struct CreateMessage<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<&'a str>,
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    embeds: &'a [Embed],
    #[serde(skip_serializing_if = "Option::is_none")]
    message_reference: Option<MessageReference>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<Attachment>,
    allowed_mentions: AllowedMentions,
}

#[derive(Serialize)]
struct MessageReference {
    message_id: String,
    fail_if_not_exists: bool,
}

#[derive(Serialize)]
struct Attachment {
    id: u32,
    filename: String,
}

/// Never ping anyone, including the author of the replied-to message.
#[derive(Serialize, Default)]
struct AllowedMentions {
    parse: [&'static str; 0],
    replied_user: bool,
}

#[derive(Serialize)]
struct EditFlags {
    flags: u64,
}

#[derive(Deserialize)]
struct ApiError {
    #[serde(default)]
    code: u64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    retry_after: Option<f64>,
}

impl Author {
    pub fn display_name(&self) -> &str {
        self.global_name.as_deref().unwrap_or(&self.username)
    }
}

/// File name for an upload, taken from the last path segment of `url`.
fn file_name(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    match path.rsplit('/').next() {
        Some(name) if !name.is_empty() => name.to_owned(),
        _ => "media".to_owned(),
    }
}

impl DiscordClient {
    pub fn new(client: Client, token: impl Into<String>, base: impl Into<String>) -> Self {
        Self {
            client,
            token: token.into(),
            base: base.into().trim_end_matches('/').to_owned(),
        }
    }

    fn messages_url(&self, channel: &Snowflake) -> String {
        format!("{}/channels/{channel}/messages", self.base)
    }

    fn message_url(&self, channel: &Snowflake, message: &Snowflake) -> String {
        format!("{}/channels/{channel}/messages/{message}", self.base)
    }

    async fn execute(&self, req: RequestBuilder) -> Result<(), DiscordError> {
        let res = req
            .header("Authorization", format!("Bot {}", self.token))
            .send()
            .await?;

        let status = res.status();
        if status.is_success() {
            return Ok(());
        }

        let body = res.text().await?;
        let err = serde_json::from_str::<ApiError>(&body).unwrap_or(ApiError {
            code: 0,
            message: body,
            retry_after: None,
        });

        match (status, err.retry_after) {
            (StatusCode::TOO_MANY_REQUESTS, Some(retry_after)) => Err(DiscordError::RateLimited {
                timeout: Duration::from_secs_f64(retry_after.max(0.0)),
            }),
            _ => Err(DiscordError::Server {
                status,
                code: err.code,
                message: err.message,
            }),
        }
    }

    async fn create_message(&self, channel: &Snowflake, msg: &CreateMessage<'_>) -> Result<(), DiscordError> {
        self.execute(self.client.post(self.messages_url(channel)).json(msg))
            .await
    }
}

#[async_trait]
impl ChatOutbound for DiscordClient {
    async fn reply(
        &self,
        channel: &Snowflake,
        message: &Snowflake,
        embeds: &[Embed],
    ) -> Result<(), DiscordError> {
        let msg = CreateMessage {
            embeds,
            message_reference: Some(MessageReference {
                message_id: message.to_string(),
                fail_if_not_exists: false,
            }),
            ..Default::default()
        };

        self.create_message(channel, &msg).await
    }

    async fn send(&self, channel: &Snowflake, embeds: &[Embed]) -> Result<(), DiscordError> {
        let msg = CreateMessage {
            embeds,
            ..Default::default()
        };

        self.create_message(channel, &msg).await
    }

    async fn send_link(&self, channel: &Snowflake, url: &str) -> Result<(), DiscordError> {
        let msg = CreateMessage {
            content: Some(url),
            ..Default::default()
        };

        self.create_message(channel, &msg).await
    }

    async fn send_file(&self, channel: &Snowflake, url: &str, limit: u64) -> Result<(), DiscordError> {
        let download = |source| DiscordError::Download {
            url: url.to_owned(),
            source,
        };
        let too_large = || DiscordError::TooLarge {
            url: url.to_owned(),
            limit,
        };

        let mut res = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(download)?;
        if res.content_length().is_some_and(|len| len > limit) {
            return Err(too_large());
        }

        // Servers may omit or misreport the length, count while reading.
        let mut bytes = Vec::new();
        while let Some(chunk) = res.chunk().await.map_err(download)? {
            if (bytes.len() + chunk.len()) as u64 > limit {
                return Err(too_large());
            }
            bytes.extend_from_slice(&chunk);
        }

        let filename = file_name(url);
        let payload = CreateMessage {
            attachments: vec![Attachment {
                id: 0,
                filename: filename.clone(),
            }],
            ..Default::default()
        };
        let form = Form::new()
            .text("payload_json", serde_json::to_string(&payload)?)
            .part("files[0]", Part::bytes(bytes).file_name(filename));

        self.execute(self.client.post(self.messages_url(channel)).multipart(form))
            .await
    }

    async fn suppress_embeds(
        &self,
        channel: &Snowflake,
        message: &Snowflake,
    ) -> Result<(), DiscordError> {
        let req = self
            .client
            .patch(self.message_url(channel, message))
            .json(&EditFlags {
                flags: SUPPRESS_EMBEDS,
            });

        self.execute(req).await
    }

    async fn delete(&self, channel: &Snowflake, message: &Snowflake) -> Result<(), DiscordError> {
        self.execute(self.client.delete(self.message_url(channel, message)))
            .await
    }
}

#[cfg(test)]
mod tests {
    use mockito::Matcher;
    use serde_json::json;

    use super::*;

    fn client(server: &mockito::Server) -> DiscordClient {
        DiscordClient::new(Client::new(), "tok", server.url())
    }

    #[test]
    fn parses_gateway_message() {
        let msg: IncomingMessage = serde_json::from_value(json!({
            "id": "1100",
            "channel_id": "1200",
            "guild_id": "1300",
            "content": "https://x.com/u/status/1",
            "author": { "id": "1400", "username": "poster", "global_name": null, "bot": false },
            "member": { "nick": "nick" }
        }))
        .unwrap();

        assert_eq!(msg.id, 1100u64);
        assert_eq!(msg.author.display_name(), "poster");
        assert_eq!(msg.member.unwrap().nickname.as_deref(), Some("nick"));
    }

    #[test]
    fn upload_file_names() {
        assert_eq!(file_name("https://video.twimg.com/a/b/clip.mp4?tag=12"), "clip.mp4");
        assert_eq!(file_name("https://example.com/"), "media");
    }

    #[tokio::test]
    async fn reply_does_not_ping() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/channels/20/messages")
            .match_header("authorization", "Bot tok")
            .match_body(Matcher::PartialJson(json!({
                "embeds": [{ "title": "Tweet" }],
                "message_reference": { "message_id": "10", "fail_if_not_exists": false },
                "allowed_mentions": { "parse": [], "replied_user": false }
            })))
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let embed = Embed {
            title: Some("Tweet".to_owned()),
            ..Default::default()
        };
        client(&server)
            .reply(&Snowflake::from(20), &Snowflake::from(10), &[embed])
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn link_is_plain_content() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/channels/20/messages")
            .match_body(Matcher::Json(json!({
                "content": "https://video.example/v.mp4",
                "allowed_mentions": { "parse": [], "replied_user": false }
            })))
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        client(&server)
            .send_link(&Snowflake::from(20), "https://video.example/v.mp4")
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn suppress_and_delete() {
        let mut server = mockito::Server::new_async().await;
        let patch = server
            .mock("PATCH", "/channels/20/messages/10")
            .match_body(Matcher::Json(json!({ "flags": 4 })))
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;
        let delete = server
            .mock("DELETE", "/channels/20/messages/10")
            .with_status(204)
            .create_async()
            .await;

        let discord = client(&server);
        let (channel, message) = (Snowflake::from(20), Snowflake::from(10));
        discord.suppress_embeds(&channel, &message).await.unwrap();
        discord.delete(&channel, &message).await.unwrap();

        patch.assert_async().await;
        delete.assert_async().await;
    }

    #[tokio::test]
    async fn uploads_downloaded_file() {
        let mut server = mockito::Server::new_async().await;
        let media = server
            .mock("GET", "/media/clip.mp4")
            .with_status(200)
            .with_body("not really a video")
            .create_async()
            .await;
        let upload = server
            .mock("POST", "/channels/20/messages")
            .match_header("content-type", Matcher::Regex("^multipart/form-data".to_owned()))
            .match_body(Matcher::Regex("not really a video".to_owned()))
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let url = format!("{}/media/clip.mp4", server.url());
        client(&server).send_file(&Snowflake::from(20), &url, 1024).await.unwrap();

        media.assert_async().await;
        upload.assert_async().await;
    }

    #[tokio::test]
    async fn missing_media_is_download_error() {
        let mut server = mockito::Server::new_async().await;
        let _media = server
            .mock("GET", "/media/gone.mp4")
            .with_status(404)
            .create_async()
            .await;

        let url = format!("{}/media/gone.mp4", server.url());
        let err = client(&server)
            .send_file(&Snowflake::from(20), &url, 1024)
            .await
            .unwrap_err();

        assert!(matches!(err, DiscordError::Download { .. }));
    }

    /// Serves `body` once with no length header, ending it by closing the
    /// connection.
    async fn serve_unsized(body: &'static [u8]) -> String {
        use tokio::{
            io::{AsyncReadExt, AsyncWriteExt},
            net::TcpListener,
        };

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await.unwrap();
            let _ = socket
                .write_all(b"HTTP/1.1 200 OK\r\nconnection: close\r\n\r\n")
                .await;
            let _ = socket.write_all(body).await;
            let _ = socket.shutdown().await;
        });

        format!("http://{addr}/media/clip.mp4")
    }

    #[tokio::test]
    async fn unsized_download_stops_at_limit() {
        let mut server = mockito::Server::new_async().await;
        let upload = server
            .mock("POST", "/channels/20/messages")
            .expect(0)
            .create_async()
            .await;

        let url = serve_unsized(&[7u8; 64 * 1024]).await;
        let err = client(&server)
            .send_file(&Snowflake::from(20), &url, 1024)
            .await
            .unwrap_err();

        assert!(matches!(err, DiscordError::TooLarge { limit: 1024, .. }), "{err}");
        upload.assert_async().await;
    }

    #[tokio::test]
    async fn unsized_download_within_limit_is_uploaded() {
        let mut server = mockito::Server::new_async().await;
        let upload = server
            .mock("POST", "/channels/20/messages")
            .match_body(Matcher::Regex("small clip".to_owned()))
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let url = serve_unsized(b"small clip").await;
        client(&server)
            .send_file(&Snowflake::from(20), &url, 1024)
            .await
            .unwrap();

        upload.assert_async().await;
    }

    #[tokio::test]
    async fn rate_limit_is_reported() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/channels/20/messages")
            .with_status(429)
            .with_body(json!({ "message": "You are being rate limited.", "retry_after": 1.5, "global": false }).to_string())
            .create_async()
            .await;

        let err = client(&server)
            .send(&Snowflake::from(20), &[])
            .await
            .unwrap_err();

        match err {
            DiscordError::RateLimited { timeout } => assert_eq!(timeout, Duration::from_millis(1500)),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn api_error_carries_code() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("DELETE", "/channels/20/messages/10")
            .with_status(403)
            .with_body(json!({ "message": "Missing Permissions", "code": 50013 }).to_string())
            .create_async()
            .await;

        let err = client(&server)
            .delete(&Snowflake::from(20), &Snowflake::from(10))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "API returned 403 Forbidden (code 50013): Missing Permissions");
    }
}
