//! Follows a Gitter room and logs every message as it arrives.
//!
//! The token is read from `GITTER_TOKEN`, the room id from the first argument:
//! ```sh
//! GITTER_TOKEN=... RUST_LOG=info,gitter_stream=debug cargo run --example stream_room --features tracing -- <room-id> [count]
//! ```

use std::env;
use std::time::Duration;

use anyhow::Context as _;
use gitter_stream::TOKEN_VAR;
use gitter_stream::client::{Client, Config};
use gitter_stream::stream::{Config as StreamConfig, ReconnectConfig};
use secrecy::SecretString;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let token = env::var(TOKEN_VAR).with_context(|| format!("{TOKEN_VAR} must be set"))?;
    let mut args = env::args().skip(1);
    let room_id = args.next().context("usage: stream_room <room-id> [count]")?;
    let limit = args.next().map(|n| n.parse::<usize>()).transpose()?;

    let config = Config::builder()
        .stream(
            StreamConfig::builder()
                .reconnect(ReconnectConfig::new(Duration::from_secs(3), 5))
                .read_timeout(Duration::from_secs(120))
                .build(),
        )
        .build();
    let client = Client::new(&SecretString::from(token), config)?;

    let mut stream = client.stream(&room_id)?;
    let mut states = stream.state_receiver();
    let listener = stream.spawn()?;

    tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = *states.borrow_and_update();
            info!(?state, "connection state changed");
        }
    });

    let mut received = 0_usize;
    while let Some(message) = stream.recv().await {
        let from = message
            .from_user
            .as_ref()
            .and_then(|user| user.username.as_deref())
            .unwrap_or("<unknown>");
        info!(
            id = message.id.as_deref().unwrap_or_default(),
            from,
            sent = ?message.sent,
            text = message.text.as_deref().unwrap_or_default(),
        );

        received += 1;
        if limit.is_some_and(|limit| received >= limit) {
            break;
        }
    }

    if !stream.is_closed() {
        stream.close().await;
    }
    if let Err(e) = listener.await {
        warn!(error = %e, "listener task failed");
    }
    info!(received, state = ?stream.state(), "done");

    Ok(())
}
