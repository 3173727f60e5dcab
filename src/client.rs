//! Client for the Gitter streaming API.
//!
//! # Example
//!
//! ```no_run
//! use gitter_stream::client::{Client, Config};
//! use secrecy::SecretString;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let token = SecretString::from(std::env::var("GITTER_TOKEN")?);
//! let client = Client::new(&token, Config::default())?;
//!
//! let mut stream = client.stream("53307860c3599d1de448e19d")?;
//! stream.spawn()?;
//!
//! while let Some(message) = stream.recv().await {
//!     println!("{:?}: {:?}", message.from_user.and_then(|u| u.username), message.text);
//! }
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::Arc;

use bon::Builder;
use reqwest::{
    Client as ReqwestClient,
    header::{HeaderMap, HeaderValue},
};
use secrecy::{ExposeSecret as _, SecretString};
use url::Url;

use crate::error::Error;
use crate::stream::{Config as StreamConfig, HttpTransport, JsonLines, Stream, Transport};
use crate::types::Message;
use crate::{Result, STREAM_API};

const USER_AGENT: &str = "gitter-stream";

/// Configuration for [`Client`]
#[derive(Clone, Debug, Default, Builder)]
pub struct Config {
    /// Override for the stream API host. Defaults to [`STREAM_API`].
    /// This is primarily useful for testing.
    #[builder(into)]
    stream_host: Option<String>,
    /// `User-Agent` header sent with every request. Defaults to `gitter-stream`.
    #[builder(into)]
    user_agent: Option<String>,
    /// Settings applied to every stream opened by [`Client::stream`]
    #[builder(default)]
    stream: StreamConfig,
}

/// Opens room streams against the Gitter streaming API.
///
/// Cheap to clone; every clone shares the same HTTP connection pool.
pub struct Client<T: Transport = HttpTransport> {
    inner: Arc<ClientInner<T>>,
}

struct ClientInner<T: Transport> {
    /// Base of every stream URL, always ending in `/`
    stream_host: Url,
    stream_config: StreamConfig,
    transport: Arc<T>,
}

impl Client<HttpTransport> {
    /// Create a client authenticating with a personal access token.
    ///
    /// # Errors
    ///
    /// Returns an error if the host is not a valid URL or the HTTP client cannot be built.
    pub fn new(token: &SecretString, config: Config) -> Result<Self> {
        let mut headers = HeaderMap::new();

        let mut authorization =
            HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))?;
        authorization.set_sensitive(true);
        headers.insert("Authorization", authorization);
        let user_agent = config.user_agent.as_deref().unwrap_or(USER_AGENT);
        headers.insert("User-Agent", HeaderValue::from_str(user_agent)?);
        headers.insert("Accept", HeaderValue::from_static("application/json"));
        headers.insert("Connection", HeaderValue::from_static("keep-alive"));
        let client = ReqwestClient::builder().default_headers(headers).build()?;

        Self::with_transport(HttpTransport::new(client), config)
    }
}

impl<T: Transport> Client<T> {
    /// Create a client that issues its requests through `transport`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured host is not a valid URL.
    pub fn with_transport(transport: T, config: Config) -> Result<Self> {
        let host = config.stream_host.as_deref().unwrap_or(STREAM_API);

        let mut stream_host = Url::parse(host)?;
        if !stream_host.path().ends_with('/') {
            let path = format!("{}/", stream_host.path());
            stream_host.set_path(&path);
        }

        Ok(Self {
            inner: Arc::new(ClientInner {
                stream_host,
                stream_config: config.stream,
                transport: Arc::new(transport),
            }),
        })
    }

    /// Returns the base URL of the stream API.
    #[must_use]
    pub fn stream_host(&self) -> &Url {
        &self.inner.stream_host
    }

    /// The feed URL for `room_id`: `<stream-host>/rooms/<room_id>/chatMessages`.
    ///
    /// # Errors
    ///
    /// Returns an error if `room_id` is empty, is a dot segment, or would not form a single
    /// path segment.
    pub fn stream_url(&self, room_id: &str) -> Result<Url> {
        if room_id.is_empty() {
            return Err(Error::validation("room id must not be empty"));
        }
        if matches!(room_id, "." | "..")
            || room_id.contains(['/', '\\', '?', '#', '%'])
            || room_id.contains(char::is_whitespace)
        {
            return Err(Error::validation(format!(
                "room id {room_id:?} contains characters not allowed in a path segment"
            )));
        }

        let host = &self.inner.stream_host;
        let url = host.join(&format!("rooms/{room_id}/chatMessages"))?;

        // The host path ends in an empty segment that the join replaces.
        let expected = host.path_segments().map_or(0, Iterator::count) + 2;
        let is_room_feed = url.path_segments().is_some_and(|segments| {
            let segments: Vec<&str> = segments.collect();
            segments.len() == expected && segments.ends_with(&["rooms", room_id, "chatMessages"])
        });
        if !is_room_feed {
            return Err(Error::validation(format!(
                "room id {room_id:?} is not a single path segment"
            )));
        }

        Ok(url)
    }

    /// Create a closed stream of chat messages for `room_id` using the client's stream
    /// settings. Call [`Stream::spawn`] to start receiving.
    ///
    /// # Errors
    ///
    /// Returns an error if `room_id` is not a valid room identifier.
    pub fn stream(&self, room_id: &str) -> Result<Stream<Message, T>> {
        self.stream_with_config(room_id, self.inner.stream_config.clone())
    }

    /// Like [`stream`](Self::stream), with settings for this stream only.
    ///
    /// # Errors
    ///
    /// Returns an error if `room_id` is not a valid room identifier.
    pub fn stream_with_config(
        &self,
        room_id: &str,
        config: StreamConfig,
    ) -> Result<Stream<Message, T>> {
        let url = self.stream_url(room_id)?;

        #[cfg(feature = "tracing")]
        tracing::debug!(%url, room_id, "creating room stream");

        Ok(Stream::new(
            url,
            Arc::clone(&self.inner.transport),
            config,
            JsonLines,
        ))
    }
}

impl<T: Transport> fmt::Debug for Client<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("stream_host", &self.inner.stream_host.as_str())
            .field("stream_config", &self.inner.stream_config)
            .finish_non_exhaustive()
    }
}

impl<T: Transport> Clone for Client<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}
