//! Scripted transport for exercising reconnection without a network.

use std::collections::VecDeque;
use std::io::{self, Cursor};
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::StatusCode;
use tokio::io::DuplexStream;
use tokio::time::Instant;
use url::Url;

use super::traits::Transport;
use super::transport::FeedResponse;
use crate::error::{Error, Kind};

pub(crate) enum Outcome {
    /// `200 OK` with a body that ends after these bytes
    Body(Vec<u8>),
    /// Any status with an empty body
    Status(StatusCode),
    /// The request never produced a response
    TransportError,
    /// `200 OK` with a body that only yields what is written to the other end
    Pending(DuplexStream),
}

impl Outcome {
    pub(crate) fn body(lines: &str) -> Self {
        Self::Body(lines.as_bytes().to_vec())
    }
}

/// Plays back outcomes in order; once the script runs out every request fails.
pub(crate) struct ScriptedTransport {
    script: Mutex<VecDeque<Outcome>>,
    call_times: Mutex<Vec<Instant>>,
}

impl ScriptedTransport {
    pub(crate) fn new(script: Vec<Outcome>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            call_times: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.call_times.lock().expect("lock").len()
    }

    pub(crate) fn call_times(&self) -> Vec<Instant> {
        self.call_times.lock().expect("lock").clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn get(&self, _url: &Url) -> crate::Result<FeedResponse> {
        self.call_times.lock().expect("lock").push(Instant::now());
        let next = self
            .script
            .lock()
            .expect("lock")
            .pop_front()
            .unwrap_or(Outcome::TransportError);

        match next {
            Outcome::Body(bytes) => Ok(FeedResponse::new(StatusCode::OK, Cursor::new(bytes))),
            Outcome::Status(status) => Ok(FeedResponse::new(status, Cursor::new(Vec::new()))),
            Outcome::TransportError => Err(Error::with_source(
                Kind::Internal,
                io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused"),
            )),
            Outcome::Pending(reader) => Ok(FeedResponse::new(StatusCode::OK, reader)),
        }
    }
}
