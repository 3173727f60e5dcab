#![allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    reason = "Do not need additional syntax for setting up tests"
)]
#![allow(
    unused,
    reason = "Not every test binary uses every helper"
)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use gitter_stream::client::{Client, Config};
use gitter_stream::error::StatusCode;
use gitter_stream::stream::{Config as StreamConfig, FeedResponse, ReconnectConfig, Transport};
use httpmock::MockServer;
use secrecy::SecretString;
use tokio::io::DuplexStream;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;
use url::Url;

pub const TOKEN: &str = "a1b2c3d4e5f6";
pub const ROOM_ID: &str = "53307860c3599d1de448e19d";

#[must_use]
pub fn feed_path() -> String {
    format!("/rooms/{ROOM_ID}/chatMessages")
}

pub fn init_tracing() {
    drop(
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init(),
    );
}

#[must_use]
pub fn stream_config(wait_ms: u64, max_retries: u32) -> StreamConfig {
    StreamConfig::builder()
        .reconnect(ReconnectConfig::new(
            Duration::from_millis(wait_ms),
            max_retries,
        ))
        .build()
}

pub fn client(server: &MockServer, stream: StreamConfig) -> anyhow::Result<Client> {
    init_tracing();

    let config = Config::builder()
        .stream_host(server.base_url())
        .stream(stream)
        .build();
    Ok(Client::new(&SecretString::from(TOKEN.to_owned()), config)?)
}

/// Write halves of the pipes opened by [`PipeTransport`], in request order
pub type Writers = mpsc::UnboundedReceiver<DuplexStream>;

/// Transport whose every response body is the read half of a fresh in-memory pipe.
///
/// The write halves are handed to the test in request order.
pub struct PipeTransport {
    writers: mpsc::UnboundedSender<DuplexStream>,
    calls: AtomicUsize,
}

impl PipeTransport {
    #[must_use]
    pub fn pair() -> (Self, Writers) {
        let (writers, rx) = mpsc::unbounded_channel();
        (
            Self {
                writers,
                calls: AtomicUsize::new(0),
            },
            rx,
        )
    }

    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for PipeTransport {
    async fn get(&self, _url: &Url) -> gitter_stream::Result<FeedResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (writer, reader) = tokio::io::duplex(4096);
        drop(self.writers.send(writer));
        Ok(FeedResponse::new(StatusCode::OK, reader))
    }
}
