use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use url::Url;

use super::config::Config;
use super::connection::{ConnectionManager, ConnectionState};
use super::error::StreamError;
use super::traits::{JsonLines, MessageParser, Transport};
use super::transport::HttpTransport;
use crate::Result;
use crate::types::Message;

/// Read loop of a [`Stream`]: reads the feed line by line and publishes decoded messages.
///
/// Usually started with [`Stream::spawn`]. [`Stream::take_listener`] hands it out for
/// callers that want to drive [`run`](Self::run) on a task of their own.
pub struct Listener<M, T: Transport, P = JsonLines> {
    connection: Arc<ConnectionManager<T>>,
    parser: P,
    sender: mpsc::Sender<M>,
    read_timeout: Option<Duration>,
}

impl<M, T, P> Listener<M, T, P>
where
    M: Send + 'static,
    T: Transport,
    P: MessageParser<M>,
{
    /// Run until the stream is closed or gives up reconnecting.
    ///
    /// Messages are sent in the order their lines were read. The send waits while the
    /// delivery channel is full, so a slow consumer slows down reading. When this returns
    /// the sender is dropped and the consumer sees the channel close.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "debug", skip(self), fields(url = %self.connection.url()))
    )]
    pub async fn run(self) {
        let connection = &self.connection;
        let mut line = Vec::new();

        connection.connect().await;

        while !connection.is_closed() {
            line.clear();

            if let Err(e) = connection.read_line(&mut line, self.read_timeout).await {
                if matches!(e, StreamError::Closed) {
                    break;
                }

                #[cfg(feature = "tracing")]
                tracing::warn!(error = %e, "Stream read failed, reconnecting");
                #[cfg(not(feature = "tracing"))]
                let _: &StreamError = &e;

                connection.connect().await;
                continue;
            }

            let message = match self.parser.parse(&line) {
                Ok(Some(message)) => message,
                Ok(None) => {
                    #[cfg(feature = "tracing")]
                    tracing::trace!("Received keep-alive");
                    continue;
                }
                Err(e) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        line = %String::from_utf8_lossy(&line),
                        error = %e,
                        "Dropping undecodable line"
                    );
                    #[cfg(not(feature = "tracing"))]
                    let _: &crate::error::Error = &e;
                    continue;
                }
            };

            tokio::select! {
                biased;
                () = connection.closed() => break,
                sent = self.sender.send(message) => {
                    if sent.is_err() {
                        #[cfg(feature = "tracing")]
                        tracing::info!("Message receiver dropped, closing stream");
                        connection.close().await;
                        break;
                    }
                }
            }
        }

        #[cfg(feature = "tracing")]
        tracing::info!(state = ?connection.state(), "Listening was completed");
    }
}

/// A subscription to one room's live message feed.
///
/// Created closed. Start the read loop with [`spawn`](Self::spawn), then receive
/// messages with [`recv`](Self::recv) or through the [`futures::Stream`] implementation.
/// The stream ends when it is [closed](Self::close) or when reconnecting fails
/// `max_retries` times in a row. Dropping it stops the read loop as well.
pub struct Stream<M = Message, T: Transport = HttpTransport, P = JsonLines> {
    url: Url,
    connection: Arc<ConnectionManager<T>>,
    messages: mpsc::Receiver<M>,
    listener: Option<Listener<M, T, P>>,
}

impl<M, T, P> Stream<M, T, P>
where
    M: Send + 'static,
    T: Transport,
    P: MessageParser<M>,
{
    /// Create a closed stream reading `url` through `transport`.
    #[must_use]
    pub fn new(url: Url, transport: Arc<T>, config: Config, parser: P) -> Self {
        let connection = Arc::new(ConnectionManager::new(
            url.clone(),
            config.reconnect,
            transport,
        ));
        let (sender, messages) = mpsc::channel(config.channel_capacity.max(1));

        let listener = Listener {
            connection: Arc::clone(&connection),
            parser,
            sender,
            read_timeout: config.read_timeout,
        };

        Self {
            url,
            connection,
            messages,
            listener: Some(listener),
        }
    }

    /// Start the read loop on a background task.
    ///
    /// # Errors
    ///
    /// Fails if the read loop was already started or handed out.
    pub fn spawn(&mut self) -> Result<JoinHandle<()>> {
        let listener = self.take_listener().ok_or(StreamError::AlreadyListening)?;
        Ok(tokio::spawn(listener.run()))
    }

    /// Take the read loop to run it elsewhere. Returns `None` once taken.
    pub fn take_listener(&mut self) -> Option<Listener<M, T, P>> {
        self.listener.take()
    }

    /// Receive the next message, or `None` once the stream has ended.
    pub async fn recv(&mut self) -> Option<M> {
        self.messages.recv().await
    }

    /// The delivery channel, for use with `tokio::select!` and friends.
    pub fn messages(&mut self) -> &mut mpsc::Receiver<M> {
        &mut self.messages
    }

    /// A cloneable handle that can close this stream from another task.
    #[must_use]
    pub fn handle(&self) -> StreamHandle<T> {
        StreamHandle {
            connection: Arc::clone(&self.connection),
        }
    }

    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Stop delivery and release the connection. Safe to call more than once.
    pub async fn close(&self) {
        self.connection.close().await;
    }

    /// Whether the stream is closed, exhausted, or not connected yet.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.connection.is_closed()
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.connection.state_receiver()
    }

    /// Consecutive failed connection attempts since the last success.
    #[must_use]
    pub fn current_retries(&self) -> u32 {
        self.connection.current_retries()
    }
}

impl<M, T: Transport, P> Drop for Stream<M, T, P> {
    fn drop(&mut self) {
        self.connection.cancel();
    }
}

impl<M, T: Transport, P: Unpin> futures::Stream for Stream<M, T, P> {
    type Item = M;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<M>> {
        self.get_mut().messages.poll_recv(cx)
    }
}

impl<M, T: Transport, P> fmt::Debug for Stream<M, T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("url", &self.url.as_str())
            .field("state", &self.connection.state())
            .field("listening", &self.listener.is_none())
            .finish_non_exhaustive()
    }
}

/// Closes a [`Stream`] from anywhere, e.g. a shutdown signal handler.
pub struct StreamHandle<T: Transport = HttpTransport> {
    connection: Arc<ConnectionManager<T>>,
}

impl<T: Transport> StreamHandle<T> {
    pub async fn close(&self) {
        self.connection.close().await;
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.connection.is_closed()
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }
}

impl<T: Transport> Clone for StreamHandle<T> {
    fn clone(&self) -> Self {
        Self {
            connection: Arc::clone(&self.connection),
        }
    }
}
