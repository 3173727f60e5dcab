#![expect(
    clippy::module_name_repetitions,
    reason = "Error types include the module name to indicate their scope"
)]

use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;

/// Streaming error variants.
#[non_exhaustive]
#[derive(Debug)]
pub enum StreamError {
    /// Reading from the response body failed
    Read(std::io::Error),
    /// The server ended the response body
    EndOfStream,
    /// No line arrived within the configured read timeout
    ReadTimeout(Duration),
    /// A line could not be decoded as a message
    Decode(serde_json::Error),
    /// The stream has no active response to read from
    NotConnected,
    /// Consecutive connection failures reached the configured ceiling
    RetriesExhausted {
        /// Number of failed attempts
        attempts: u32,
    },
    /// The stream was closed
    Closed,
    /// The dispatch loop was already started for this stream
    AlreadyListening,
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read(e) => write!(f, "Stream read error: {e}"),
            Self::EndOfStream => write!(f, "Stream ended by server"),
            Self::ReadTimeout(d) => write!(f, "No data received within {d:?}"),
            Self::Decode(e) => write!(f, "Failed to decode stream message: {e}"),
            Self::NotConnected => write!(f, "Stream is not connected"),
            Self::RetriesExhausted { attempts } => {
                write!(f, "Gave up reconnecting after {attempts} attempts")
            }
            Self::Closed => write!(f, "Stream closed"),
            Self::AlreadyListening => write!(f, "Stream listener already started"),
        }
    }
}

impl StdError for StreamError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Read(e) => Some(e),
            Self::Decode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StreamError> for crate::error::Error {
    fn from(e: StreamError) -> Self {
        crate::error::Error::with_source(crate::error::Kind::Stream, e)
    }
}
