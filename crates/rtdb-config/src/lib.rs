// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! Tunable knobs for the streaming engine, with defaults matching the values
//! the reference implementation hard-coded.

use std::time::Duration;

/// The ingress channel is always single-slot: this is the contract the
/// coalescing `push` relies on, expressed as a named constant rather than a
/// magic `1` scattered through `rtdb-stream`.
pub const INGRESS_CAPACITY: usize = 1;

/// Exponential-backoff tuning for the upstream driver's reconnect loop.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    /// Delay before the first retry.
    pub initial_interval: Duration,
    /// Upper bound a single retry delay is clamped to.
    pub max_interval: Duration,
    /// Multiplier applied to the delay after each retry.
    pub multiplier: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(60),
            multiplier: 1.5,
        }
    }
}

/// Top-level configuration for a [`Stream`](https://docs.rs/rtdb-stream).
#[derive(Debug, Clone, PartialEq)]
pub struct StreamConfig {
    /// How long the upstream driver waits for *any* event — including a
    /// keep-alive — before treating the connection as dead.
    pub keep_alive_timeout: Duration,
    /// Backoff tuning for upstream reconnects.
    pub backoff: BackoffConfig,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            keep_alive_timeout: Duration::from_secs(40),
            backoff: BackoffConfig::default(),
        }
    }
}

impl StreamConfig {
    /// Start building a config from the defaults.
    #[must_use]
    pub fn builder() -> StreamConfigBuilder {
        StreamConfigBuilder::default()
    }
}

/// Builder for [`StreamConfig`].
#[derive(Debug, Clone, Default)]
pub struct StreamConfigBuilder {
    config: StreamConfig,
}

impl StreamConfigBuilder {
    /// Override the keep-alive timeout.
    #[must_use]
    pub fn keep_alive_timeout(mut self, timeout: Duration) -> Self {
        self.config.keep_alive_timeout = timeout;
        self
    }

    /// Override the backoff tuning.
    #[must_use]
    pub fn backoff(mut self, backoff: BackoffConfig) -> Self {
        self.config.backoff = backoff;
        self
    }

    /// Finish building.
    #[must_use]
    pub fn build(self) -> StreamConfig {
        self.config
    }
}
