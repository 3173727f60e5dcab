#![cfg_attr(doc, doc = include_str!("../README.md"))]

pub mod client;
pub mod error;
pub(crate) mod serde_helpers;
pub mod stream;
pub mod types;

use crate::error::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Base URL of the Gitter streaming API
pub const STREAM_API: &str = "https://stream.gitter.im/v1/";

/// Environment variable the demos read the personal access token from
pub const TOKEN_VAR: &str = "GITTER_TOKEN";

pub use client::Client;
pub use stream::{Stream, StreamHandle};
pub use types::Message;
