//! Seams between the stream core and its collaborators.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use url::Url;

use super::transport::FeedResponse;
use crate::serde_helpers::{decode_line, is_keep_alive};

/// Issues the long-lived GET request a stream reads from.
///
/// Implementations must return as soon as the response head is available; the body is
/// read incrementally by the stream afterwards. Any status is returned as-is, the
/// connection manager decides what counts as success.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn get(&self, url: &Url) -> crate::Result<FeedResponse>;
}

/// Message parser trait for converting one feed line into a message.
///
/// # Example
///
/// ```ignore
/// pub struct Uppercase;
///
/// impl MessageParser<String> for Uppercase {
///     fn parse(&self, line: &[u8]) -> crate::Result<Option<String>> {
///         Ok(Some(String::from_utf8_lossy(line).trim().to_uppercase()))
///     }
/// }
/// ```
pub trait MessageParser<M>: Send + Sync + 'static {
    /// Parse one line, newline included.
    ///
    /// Returns `None` for lines that carry no message, such as keep-alives.
    fn parse(&self, line: &[u8]) -> crate::Result<Option<M>>;
}

/// Decodes each non-blank line as one JSON document.
#[expect(
    clippy::exhaustive_structs,
    reason = "Unit parser is constructed directly by callers"
)]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonLines;

impl<M: DeserializeOwned> MessageParser<M> for JsonLines {
    fn parse(&self, line: &[u8]) -> crate::Result<Option<M>> {
        if is_keep_alive(line) {
            return Ok(None);
        }
        decode_line(line).map(Some)
    }
}
