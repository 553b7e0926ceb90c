use async_trait::async_trait;
use reqwest::{header::CONTENT_LENGTH, Client};
use serde::Deserialize;
use tracing::{debug, warn};

/// Media type tag as reported upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Gif,
    /// Anything else (audio, unknown). Never lands in a partition.
    #[serde(other)]
    Other,
}

/// A post's media split by type. Each url lands in exactly one list and
/// upstream order is kept inside every list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaPartition {
    pub images: Vec<String>,
    pub videos: Vec<String>,
    pub gifs: Vec<String>,
}

/// How a video or gif ends up in the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Uploaded as a file.
    Attachment(String),
    /// Sent as a bare url, the platform renders its own preview.
    Link(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("probe answered {0}")]
    Status(reqwest::StatusCode),
}

/// Learns the byte size of a remote media file without downloading it.
#[async_trait]
pub trait SizeProbe: Send + Sync {
    /// `Ok(None)` when the server did not report a length.
    async fn content_length(&self, url: &str) -> Result<Option<u64>, ProbeError>;
}

/// [`SizeProbe`] issuing a HEAD request.
pub struct HeadProbe {
    client: Client,
}

impl MediaPartition {
    /// Buckets `(kind, url)` pairs by kind.
    pub fn from_tagged(items: impl IntoIterator<Item = (MediaKind, String)>) -> Self {
        let mut partition = Self::default();
        for (kind, url) in items {
            match kind {
                MediaKind::Image => partition.images.push(url),
                MediaKind::Video => partition.videos.push(url),
                MediaKind::Gif => partition.gifs.push(url),
                MediaKind::Other => {}
            }
        }

        partition
    }

    /// For providers that only expose images.
    pub fn images_only(images: Vec<String>) -> Self {
        Self {
            images,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty() && self.videos.is_empty() && self.gifs.is_empty()
    }
}

impl Delivery {
    /// Files strictly larger than `limit` bytes go out as links. An unknown
    /// size is attempted as an upload, which enforces the limit while
    /// downloading.
    pub fn for_size(url: String, size: Option<u64>, limit: u64) -> Self {
        match size {
            Some(size) if size > limit => Self::Link(url),
            _ => Self::Attachment(url),
        }
    }

    /// Probes `url` and picks a delivery. A failed probe falls back to a
    /// link so the platform can still try to render it.
    pub async fn resolve(probe: &dyn SizeProbe, url: &str, limit: u64) -> Self {
        match probe.content_length(url).await {
            Ok(size) => {
                let delivery = Self::for_size(url.to_owned(), size, limit);
                debug!(url, ?size, ?delivery, "media probed");
                delivery
            }
            Err(error) => {
                warn!(url, %error, "media probe failed, sending link");
                Self::Link(url.to_owned())
            }
        }
    }

    pub fn url(&self) -> &str {
        match self {
            Self::Attachment(url) | Self::Link(url) => url,
        }
    }
}

impl HeadProbe {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SizeProbe for HeadProbe {
    async fn content_length(&self, url: &str) -> Result<Option<u64>, ProbeError> {
        let res = self.client.head(url).send().await?;
        if !res.status().is_success() {
            return Err(ProbeError::Status(res.status()));
        }

        // `Response::content_length` reflects the body, which a HEAD never has.
        Ok(res
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_is_disjoint_and_complete() {
        let items = vec![
            (MediaKind::Gif, "g1".to_owned()),
            (MediaKind::Image, "i1".to_owned()),
            (MediaKind::Other, "o1".to_owned()),
            (MediaKind::Video, "v1".to_owned()),
            (MediaKind::Image, "i2".to_owned()),
        ];
        let p = MediaPartition::from_tagged(items);

        assert_eq!(p.images, ["i1", "i2"]);
        assert_eq!(p.videos, ["v1"]);
        assert_eq!(p.gifs, ["g1"]);
        assert_eq!(p.images.len() + p.videos.len() + p.gifs.len(), 4);
    }

    #[test]
    fn unknown_kind_deserializes_as_other() {
        let kinds: Vec<MediaKind> = serde_json::from_str(r#"["image","video","gif","audio"]"#).unwrap();
        assert_eq!(
            kinds,
            [MediaKind::Image, MediaKind::Video, MediaKind::Gif, MediaKind::Other]
        );
    }

    #[test]
    fn size_threshold() {
        let limit = 8_000_000;
        let d = |size| Delivery::for_size("u".to_owned(), size, limit);

        assert_eq!(d(Some(500_000)), Delivery::Attachment("u".to_owned()));
        assert_eq!(d(Some(8_000_000)), Delivery::Attachment("u".to_owned()));
        assert_eq!(d(Some(8_000_001)), Delivery::Link("u".to_owned()));
        assert_eq!(d(Some(10_000_000)), Delivery::Link("u".to_owned()));
        assert_eq!(d(None), Delivery::Attachment("u".to_owned()));
    }

    /// Serves one canned HEAD response with the given length header.
    async fn serve_head(content_length: &'static str) -> String {
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
            let res = format!(
                "HTTP/1.1 200 OK\r\ncontent-length: {content_length}\r\nconnection: close\r\n\r\n"
            );
            socket.write_all(res.as_bytes()).await.unwrap();
        });

        format!("http://{addr}/video.mp4")
    }

    #[tokio::test]
    async fn head_probe_reads_content_length() {
        let url = serve_head("10000000").await;
        let probe = HeadProbe::new(Client::new());

        assert_eq!(probe.content_length(&url).await.unwrap(), Some(10_000_000));
    }

    #[tokio::test]
    async fn oversized_video_is_sent_as_link() {
        let url = serve_head("10000000").await;
        let probe = HeadProbe::new(Client::new());

        let delivery = Delivery::resolve(&probe, &url, 8_000_000).await;
        assert_eq!(delivery, Delivery::Link(url));
    }

    #[tokio::test]
    async fn small_video_is_attached() {
        let url = serve_head("500000").await;
        let probe = HeadProbe::new(Client::new());

        let delivery = Delivery::resolve(&probe, &url, 8_000_000).await;
        assert_eq!(delivery, Delivery::Attachment(url));
    }

    #[tokio::test]
    async fn failed_probe_sends_link() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("HEAD", "/gone.mp4")
            .with_status(404)
            .create_async()
            .await;

        let probe = HeadProbe::new(Client::new());
        let url = format!("{}/gone.mp4", server.url());

        assert!(probe.content_length(&url).await.is_err());
        let delivery = Delivery::resolve(&probe, &url, 8_000_000).await;
        assert_eq!(delivery, Delivery::Link(url));
    }
}
