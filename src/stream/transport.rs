use std::fmt;

use async_trait::async_trait;
use futures::TryStreamExt as _;
use reqwest::{Client as ReqwestClient, StatusCode};
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;
use url::Url;

use super::traits::Transport;

/// Incrementally readable response body.
pub type FeedBody = Box<dyn AsyncRead + Send + Unpin>;

/// Head and body of a feed response.
#[non_exhaustive]
pub struct FeedResponse {
    pub status: StatusCode,
    body: FeedBody,
}

impl FeedResponse {
    pub fn new<B: AsyncRead + Send + Unpin + 'static>(status: StatusCode, body: B) -> Self {
        Self {
            status,
            body: Box::new(body),
        }
    }

    /// Hand over the body. Dropping it closes the underlying connection.
    #[must_use]
    pub fn into_body(self) -> FeedBody {
        self.body
    }
}

impl fmt::Debug for FeedResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedResponse")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// [`Transport`] backed by a [`reqwest::Client`], streaming the body chunk by chunk.
#[derive(Clone, Debug, Default)]
pub struct HttpTransport {
    client: ReqwestClient,
}

impl HttpTransport {
    #[must_use]
    pub fn new(client: ReqwestClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            level = "debug",
            skip(self, url),
            fields(url = %url, status_code = tracing::field::Empty)
        )
    )]
    async fn get(&self, url: &Url) -> crate::Result<FeedResponse> {
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();

        #[cfg(feature = "tracing")]
        tracing::Span::current().record("status_code", status.as_u16());

        let chunks = response.bytes_stream().map_err(std::io::Error::other);
        Ok(FeedResponse::new(status, StreamReader::new(Box::pin(chunks))))
    }
}
