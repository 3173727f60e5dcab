//! Room message streaming.
//!
//! A [`Stream`] keeps one long-lived GET open against a room's feed and turns the
//! newline-delimited JSON body into messages on a channel. Connection failures are retried
//! with a linear backoff (`wait_base * attempt`) until `max_retries` consecutive attempts
//! have failed, after which the stream closes for good.
//!
//! # Architecture
//!
//! - [`ConnectionManager`]: connection state, backoff and the active response body
//! - [`Listener`]: the read loop that decodes lines and publishes messages
//! - [`Transport`]: the GET capability, implemented over `reqwest` by [`HttpTransport`]
//! - [`MessageParser`]: turns a line into a message; [`JsonLines`] by default
//!
//! # Example
//!
//! ```ignore
//! let mut stream = Stream::new(url, Arc::new(HttpTransport::default()), Config::default(), JsonLines);
//! stream.spawn()?;
//!
//! while let Some(message) = stream.recv().await {
//!     println!("{:?}", message.text);
//! }
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod listener;
#[cfg(test)]
pub(crate) mod testing;
pub mod traits;
pub mod transport;

pub use config::{Config, ReconnectConfig};
pub use connection::{ConnectionManager, ConnectionState};
#[expect(
    clippy::module_name_repetitions,
    reason = "StreamError includes module name for clarity when used outside this module"
)]
pub use error::StreamError;
pub use listener::{Listener, Stream, StreamHandle};
pub use traits::{JsonLines, MessageParser, Transport};
pub use transport::{FeedBody, FeedResponse, HttpTransport};
