//! Line decoding for the message feed.
//!
//! When the `tracing` feature is enabled, unknown fields and the path of a failed
//! field are logged, which helps spot schema drift in the feed.

use serde::de::DeserializeOwned;

use crate::stream::error::StreamError;

/// Decode one feed line into `T`, accepting unknown fields.
///
/// Unknown fields never fail the decode; with `tracing` they are reported at `debug`.
#[cfg(feature = "tracing")]
pub fn decode_line<T: DeserializeOwned>(line: &[u8]) -> crate::Result<T> {
    use std::any::type_name;

    let mut unknown_paths: Vec<String> = Vec::new();

    let mut track = |path: serde_ignored::Path<'_>| unknown_paths.push(path.to_string());

    let jd = &mut serde_json::Deserializer::from_slice(line);
    let result: std::result::Result<T, _> =
        serde_path_to_error::deserialize(serde_ignored::Deserializer::new(&mut *jd, &mut track));

    let value = result.map_err(|path_err| {
        tracing::warn!(
            type_name = %type_name::<T>(),
            path = %path_err.path(),
            error = %path_err.inner(),
            line = %String::from_utf8_lossy(line),
            "stream line failed to decode"
        );
        StreamError::Decode(path_err.into_inner())
    })?;
    jd.end().map_err(StreamError::Decode)?;

    for path in unknown_paths {
        tracing::debug!(
            type_name = %type_name::<T>(),
            field = %path,
            "unknown field in stream message"
        );
    }

    Ok(value)
}

/// Pass-through decoding when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub fn decode_line<T: DeserializeOwned>(line: &[u8]) -> crate::Result<T> {
    Ok(serde_json::from_slice(line).map_err(StreamError::Decode)?)
}

/// A line with nothing but whitespace, as sent by the feed to keep the connection open.
pub fn is_keep_alive(line: &[u8]) -> bool {
    line.iter().all(u8::is_ascii_whitespace)
}
