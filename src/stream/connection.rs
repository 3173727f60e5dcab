#![expect(
    clippy::module_name_repetitions,
    reason = "Connection types expose their domain in the name for clarity"
)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use reqwest::StatusCode;
use tokio::io::{AsyncBufReadExt as _, BufReader};
use tokio::sync::{Mutex, watch};
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use url::Url;

use super::config::ReconnectConfig;
use super::error::StreamError;
use super::traits::Transport;
use super::transport::{FeedBody, FeedResponse};
use crate::Result;
use crate::error::Error;

/// Connection state tracking.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Never connected
    Disconnected,
    /// Waiting before the next connection attempt
    Reconnecting {
        /// Number of consecutive failed attempts so far
        attempt: u32,
    },
    /// Reading from a live response
    Connected {
        /// When the connection was established
        since: Instant,
    },
    /// Gave up after reaching the retry ceiling
    Exhausted,
    /// Closed by the owner of the stream
    Closed,
}

impl ConnectionState {
    /// Check if the connection is currently active.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    /// Whether this state counts as closed for the dispatch loop.
    #[must_use]
    pub const fn is_closed(self) -> bool {
        matches!(self, Self::Disconnected | Self::Exhausted | Self::Closed)
    }
}

/// Owns the transport connection of one stream and reconnects it with a linear backoff.
///
/// A manager starts out closed. [`connect`](Self::connect) makes consecutive attempts,
/// waiting `wait_base * n` after the `n`-th failure, until one succeeds or `max_retries`
/// failures have accumulated. Reaching the ceiling is terminal. A successful attempt
/// resets the counter.
///
/// The active body lives behind an async mutex shared by `connect`, the line reader and
/// [`close`](Self::close). `close` first cancels whatever is in flight (a pending read,
/// request or backoff sleep) and then releases the body, so it never waits on the network.
pub struct ConnectionManager<T: Transport> {
    url: Url,
    config: ReconnectConfig,
    transport: Arc<T>,
    /// Buffered reader over the live body; `None` whenever the stream is not connected
    body: Mutex<Option<BufReader<FeedBody>>>,
    /// Only written while `body` is locked
    current_retries: AtomicU32,
    state_tx: watch::Sender<ConnectionState>,
    /// Cancelled by `close` and on exhaustion
    shutdown: CancellationToken,
}

impl<T: Transport> ConnectionManager<T> {
    /// Create a manager in the closed state. No I/O happens until [`connect`](Self::connect).
    #[must_use]
    pub fn new(url: Url, config: ReconnectConfig, transport: Arc<T>) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);

        Self {
            url,
            config,
            transport,
            body: Mutex::new(None),
            current_retries: AtomicU32::new(0),
            state_tx,
            shutdown: CancellationToken::new(),
        }
    }

    /// Establish the connection, retrying with backoff.
    ///
    /// Returns once connected, once the retry ceiling is reached, or as soon as the
    /// manager is closed. Failures are only reported through logging and the state.
    ///
    /// A body left over from a failed read is released before the first attempt, so it
    /// is not held open through the backoff.
    pub async fn connect(&self) {
        let mut body = self.body.lock().await;
        drop(body.take());

        loop {
            if self.shutdown.is_cancelled() {
                return;
            }

            let retries = self.current_retries.load(Ordering::Acquire);
            if retries >= self.config.max_retries {
                *body = None;
                self.shutdown.cancel();
                self.state_tx.send_replace(ConnectionState::Exhausted);

                #[cfg(feature = "tracing")]
                tracing::error!(
                    url = %self.url,
                    error = %StreamError::RetriesExhausted { attempts: retries },
                    "We are done here"
                );
                return;
            }

            let outcome = tokio::select! {
                biased;
                () = self.shutdown.cancelled() => return,
                outcome = self.transport.get(&self.url) => outcome,
            };

            match outcome.and_then(|response| self.accept(response)) {
                Ok(response) => {
                    *body = Some(BufReader::new(response.into_body()));
                    self.current_retries.store(0, Ordering::Release);
                    self.state_tx.send_replace(ConnectionState::Connected {
                        since: Instant::now(),
                    });

                    #[cfg(feature = "tracing")]
                    tracing::info!(url = %self.url, "Successfully connected");
                    return;
                }
                Err(e) => {
                    let attempt = retries + 1;
                    self.current_retries.store(attempt, Ordering::Release);
                    self.state_tx
                        .send_replace(ConnectionState::Reconnecting { attempt });

                    let delay = self.config.delay_for_attempt(attempt);
                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        url = %self.url,
                        attempt,
                        delay = ?delay,
                        error = %e,
                        "Failed to get response, trying reconnect"
                    );
                    #[cfg(not(feature = "tracing"))]
                    let _: &Error = &e;

                    tokio::select! {
                        biased;
                        () = self.shutdown.cancelled() => return,
                        () = sleep(delay) => {}
                    }
                }
            }
        }
    }

    fn accept(&self, response: FeedResponse) -> Result<FeedResponse> {
        if response.status == StatusCode::OK {
            Ok(response)
        } else {
            Err(Error::status(response.status, &self.url))
        }
    }

    /// Read one line, newline included, from the active body into `buf`.
    ///
    /// End of body and an elapsed `read_timeout` are reported as errors, as is a close
    /// that happens while the read is pending. A trailing fragment without a newline is
    /// discarded and reported as end of body.
    pub async fn read_line(
        &self,
        buf: &mut Vec<u8>,
        read_timeout: Option<Duration>,
    ) -> std::result::Result<usize, StreamError> {
        let mut body = self.body.lock().await;
        if self.shutdown.is_cancelled() {
            return Err(StreamError::Closed);
        }
        let reader = body.as_mut().ok_or(StreamError::NotConnected)?;

        let read = async {
            let line = reader.read_until(b'\n', buf);
            let read = match read_timeout {
                Some(limit) => match timeout(limit, line).await {
                    Ok(read) => read,
                    Err(_elapsed) => return Err(StreamError::ReadTimeout(limit)),
                },
                None => line.await,
            };
            match read {
                Ok(n) if buf.last() == Some(&b'\n') => Ok(n),
                Ok(_) => Err(StreamError::EndOfStream),
                Err(e) => Err(StreamError::Read(e)),
            }
        };

        tokio::select! {
            biased;
            () = self.shutdown.cancelled() => Err(StreamError::Closed),
            read = read => read,
        }
    }

    /// Close the connection and stop any reconnection in progress.
    ///
    /// Releases the active body and resets the retry counter. Calling it again is a no-op.
    pub async fn close(&self) {
        self.shutdown.cancel();

        let mut body = self.body.lock().await;
        if body.take().is_some() {
            #[cfg(feature = "tracing")]
            tracing::info!(url = %self.url, "Stream connection was closed");
        }
        self.current_retries.store(0, Ordering::Release);
        self.state_tx.send_replace(ConnectionState::Closed);
    }

    /// Signal shutdown without waiting for the body to be released.
    ///
    /// In-flight reads, requests and backoff sleeps return promptly; the body is dropped
    /// together with the manager.
    pub fn cancel(&self) {
        self.shutdown.cancel();
    }

    /// Completes once the manager has been closed or has given up.
    pub async fn closed(&self) {
        self.shutdown.cancelled().await;
    }

    /// Whether the stream is closed, exhausted, or not yet connected.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled() || self.state_tx.borrow().is_closed()
    }

    /// Get the current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Subscribe to connection state changes.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Consecutive failed attempts since the last successful connect.
    #[must_use]
    pub fn current_retries(&self) -> u32 {
        self.current_retries.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    #[must_use]
    pub fn config(&self) -> &ReconnectConfig {
        &self.config
    }

    /// Whether a response body is currently held.
    pub async fn has_response(&self) -> bool {
        self.body.lock().await.is_some()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::AsyncWriteExt as _;
    use tokio::time::Instant as TokioInstant;

    use super::*;
    use crate::stream::testing::{Outcome, ScriptedTransport};

    fn manager(
        transport: &Arc<ScriptedTransport>,
        wait_ms: u64,
        max_retries: u32,
    ) -> ConnectionManager<ScriptedTransport> {
        ConnectionManager::new(
            Url::parse("http://feed.test/rooms/abc/chatMessages").unwrap(),
            ReconnectConfig::new(Duration::from_millis(wait_ms), max_retries),
            Arc::clone(transport),
        )
    }

    #[tokio::test]
    async fn starts_closed() {
        let transport = Arc::new(ScriptedTransport::new(vec![]));
        let connection = manager(&transport, 10, 5);

        assert!(connection.is_closed());
        assert_eq!(connection.state(), ConnectionState::Disconnected);
        assert_eq!(connection.current_retries(), 0);
        assert!(!connection.has_response().await);
    }

    #[tokio::test]
    async fn connect_success_opens() {
        let transport = Arc::new(ScriptedTransport::new(vec![Outcome::body("")]));
        let connection = manager(&transport, 10, 5);

        connection.connect().await;

        assert!(!connection.is_closed());
        assert!(connection.state().is_connected());
        assert!(connection.has_response().await);
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_grows_linearly_until_exhausted() {
        let transport = Arc::new(ScriptedTransport::new(vec![]));
        let connection = manager(&transport, 100, 5);

        let started = TokioInstant::now();
        connection.connect().await;
        let elapsed = started.elapsed();

        let gaps: Vec<u128> = transport
            .call_times()
            .windows(2)
            .map(|pair| (pair[1] - pair[0]).as_millis())
            .collect();

        assert_eq!(transport.calls(), 5);
        assert_eq!(gaps, vec![100, 200, 300, 400]);
        assert_eq!(elapsed, Duration::from_millis(1500));
        assert_eq!(connection.state(), ConnectionState::Exhausted);
        assert_eq!(connection.current_retries(), 5);
        assert!(connection.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_is_permanent() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Outcome::Status(StatusCode::SERVICE_UNAVAILABLE),
            Outcome::TransportError,
            Outcome::body(""),
        ]));
        let connection = manager(&transport, 10, 2);

        connection.connect().await;
        assert_eq!(connection.state(), ConnectionState::Exhausted);

        // The transport would now succeed, but no further attempt is made.
        connection.connect().await;

        assert_eq!(transport.calls(), 2);
        assert!(connection.is_closed());
        assert!(connection.current_retries() <= connection.config().max_retries);
        assert!(!connection.has_response().await);
    }

    #[tokio::test(start_paused = true)]
    async fn success_resets_retries() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Outcome::Status(StatusCode::BAD_GATEWAY),
            Outcome::TransportError,
            Outcome::body("{}\n"),
            Outcome::Status(StatusCode::BAD_GATEWAY),
            Outcome::body("{}\n"),
        ]));
        let connection = manager(&transport, 10, 3);

        connection.connect().await;
        assert!(connection.state().is_connected());
        assert_eq!(connection.current_retries(), 0);

        // A second outage starts the ramp from the first step again.
        connection.connect().await;
        assert!(connection.state().is_connected());
        assert_eq!(connection.current_retries(), 0);

        let times = transport.call_times();
        assert_eq!((times[4] - times[3]).as_millis(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_retries_never_connects() {
        let transport = Arc::new(ScriptedTransport::new(vec![Outcome::body("")]));
        let connection = manager(&transport, 10, 0);

        connection.connect().await;

        assert_eq!(transport.calls(), 0);
        assert_eq!(connection.state(), ConnectionState::Exhausted);
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let transport = Arc::new(ScriptedTransport::new(vec![Outcome::body("{}\n")]));
        let connection = manager(&transport, 10, 5);
        connection.connect().await;

        connection.close().await;
        let once = (
            connection.is_closed(),
            connection.state(),
            connection.current_retries(),
            connection.has_response().await,
        );
        connection.close().await;
        let twice = (
            connection.is_closed(),
            connection.state(),
            connection.current_retries(),
            connection.has_response().await,
        );

        assert_eq!(once, (true, ConnectionState::Closed, 0, false));
        assert_eq!(once, twice);
    }

    #[tokio::test]
    async fn close_before_connect_is_safe() {
        let transport = Arc::new(ScriptedTransport::new(vec![Outcome::body("")]));
        let connection = manager(&transport, 10, 5);

        connection.close().await;
        connection.connect().await;

        assert!(connection.is_closed());
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn close_preempts_backoff() {
        let transport = Arc::new(ScriptedTransport::new(vec![]));
        let connection = Arc::new(manager(&transport, 60_000, 5));

        let task = tokio::spawn({
            let connection = Arc::clone(&connection);
            async move { connection.connect().await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        connection.close().await;
        task.await.unwrap();

        assert_eq!(transport.calls(), 1);
        assert_eq!(connection.state(), ConnectionState::Closed);
        assert_eq!(connection.current_retries(), 0);
    }

    #[tokio::test]
    async fn read_line_reports_end_of_stream() {
        let transport = Arc::new(ScriptedTransport::new(vec![Outcome::body("{\"a\":1}\n")]));
        let connection = manager(&transport, 10, 5);
        connection.connect().await;

        let mut line = Vec::new();
        let read = connection.read_line(&mut line, None).await.unwrap();
        assert_eq!(read, 8);
        assert_eq!(line, b"{\"a\":1}\n");

        line.clear();
        let err = connection.read_line(&mut line, None).await.unwrap_err();
        assert!(matches!(err, StreamError::EndOfStream));
    }

    #[tokio::test]
    async fn unterminated_last_line_is_end_of_stream() {
        let transport = Arc::new(ScriptedTransport::new(vec![Outcome::body(
            "{\"a\":1}\n{\"b\":",
        )]));
        let connection = manager(&transport, 10, 5);
        connection.connect().await;

        let mut line = Vec::new();
        connection.read_line(&mut line, None).await.unwrap();
        assert_eq!(line, b"{\"a\":1}\n");

        line.clear();
        let err = connection.read_line(&mut line, None).await.unwrap_err();
        assert!(matches!(err, StreamError::EndOfStream));
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_releases_failed_body_before_backoff() {
        let (mut writer, reader) = tokio::io::duplex(64);
        let transport = Arc::new(ScriptedTransport::new(vec![Outcome::Pending(reader)]));
        let connection = Arc::new(manager(&transport, 60_000, 5));
        connection.connect().await;

        // The script is spent, so this attempt fails and parks in a long backoff.
        let task = tokio::spawn({
            let connection = Arc::clone(&connection);
            async move { connection.connect().await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        let write = writer.write_all(b"{}\n").await;
        assert!(write.is_err(), "the old body should be dropped");
        assert_eq!(connection.state(), ConnectionState::Reconnecting { attempt: 1 });

        connection.close().await;
        task.await.unwrap();
    }

    #[tokio::test]
    async fn read_line_without_connection() {
        let transport = Arc::new(ScriptedTransport::new(vec![]));
        let connection = manager(&transport, 10, 5);

        let err = connection.read_line(&mut Vec::new(), None).await.unwrap_err();

        assert!(matches!(err, StreamError::NotConnected));
    }

    #[tokio::test(start_paused = true)]
    async fn read_line_times_out() {
        let (_writer, reader) = tokio::io::duplex(64);
        let transport = Arc::new(ScriptedTransport::new(vec![Outcome::Pending(reader)]));
        let connection = manager(&transport, 10, 5);
        connection.connect().await;

        let err = connection
            .read_line(&mut Vec::new(), Some(Duration::from_secs(30)))
            .await
            .unwrap_err();

        assert!(matches!(err, StreamError::ReadTimeout(_)));
    }

    #[tokio::test]
    async fn close_interrupts_blocked_read() {
        let (_writer, reader) = tokio::io::duplex(64);
        let transport = Arc::new(ScriptedTransport::new(vec![Outcome::Pending(reader)]));
        let connection = Arc::new(manager(&transport, 10, 5));
        connection.connect().await;

        let read = tokio::spawn({
            let connection = Arc::clone(&connection);
            async move { connection.read_line(&mut Vec::new(), None).await }
        });
        tokio::task::yield_now().await;

        connection.close().await;

        let err = read.await.unwrap().unwrap_err();
        assert!(matches!(err, StreamError::Closed));
        assert!(connection.is_closed());
        assert!(!connection.has_response().await);
    }
}
