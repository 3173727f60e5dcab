#![expect(
    clippy::module_name_repetitions,
    reason = "Configuration types intentionally mirror the module name for clarity"
)]

use std::time::Duration;

use bon::Builder;

const DEFAULT_WAIT_BASE_DURATION: Duration = Duration::from_millis(3000);
const DEFAULT_MAX_RETRIES: u32 = 5;
const DEFAULT_CHANNEL_CAPACITY: usize = 1;

/// Configuration for a single room stream.
#[non_exhaustive]
#[derive(Debug, Clone, Builder)]
pub struct Config {
    /// Reconnection strategy configuration
    #[builder(default)]
    pub reconnect: ReconnectConfig,
    /// Maximum time to wait for the next line before treating the connection as dead.
    /// `None` waits indefinitely.
    pub read_timeout: Option<Duration>,
    /// Capacity of the delivery channel. The dispatcher suspends while it is full.
    #[builder(default = DEFAULT_CHANNEL_CAPACITY)]
    pub channel_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            reconnect: ReconnectConfig::default(),
            read_timeout: None,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Configuration for automatic reconnection behavior.
#[non_exhaustive]
#[derive(Debug, Clone, Builder)]
pub struct ReconnectConfig {
    /// Backoff unit. The wait before retry `n` is `wait_base * n`.
    #[builder(default = DEFAULT_WAIT_BASE_DURATION)]
    pub wait_base: Duration,
    /// Consecutive failed attempts tolerated before the stream gives up.
    #[builder(default = DEFAULT_MAX_RETRIES)]
    pub max_retries: u32,
}

impl ReconnectConfig {
    #[must_use]
    pub fn new(wait_base: Duration, max_retries: u32) -> Self {
        Self {
            wait_base,
            max_retries,
        }
    }

    /// Delay to wait after the `attempt`-th consecutive failure (1-based).
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.wait_base.saturating_mul(attempt)
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self::new(DEFAULT_WAIT_BASE_DURATION, DEFAULT_MAX_RETRIES)
    }
}
