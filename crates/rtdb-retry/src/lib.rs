// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! Unbounded exponential-backoff retry, modeled on the upstream driver's
//! reconnect loop: every failure is recoverable, there is no total elapsed
//! time budget, and each retry is reported to a `notify` hook before the
//! delay is slept out.

use std::future::Future;
use std::time::Duration;

use rtdb_config::BackoffConfig;

/// Stateful backoff delay generator.
///
/// Each call to [`Backoff::next_delay`] returns the delay to wait before the
/// next attempt and advances the internal state by `multiplier`, clamped to
/// `max_interval`. [`Backoff::reset`] returns it to `initial_interval`,
/// matching the reference implementation's rearm-on-success behavior.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    next: Duration,
}

impl Backoff {
    /// Create a new backoff generator from `config`.
    #[must_use]
    pub fn new(config: BackoffConfig) -> Self {
        let next = config.initial_interval;
        Self { config, next }
    }

    /// Return the delay for the next attempt and advance state.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        let scaled = self.next.as_secs_f64() * self.config.multiplier;
        self.next = Duration::from_secs_f64(scaled).min(self.config.max_interval);
        delay
    }

    /// Reset to the initial interval.
    pub fn reset(&mut self) {
        self.next = self.config.initial_interval;
    }
}

/// Run `operation` in a loop until it succeeds, sleeping an exponentially
/// growing delay between attempts and calling `notify` with each failure and
/// the delay about to be slept.
///
/// There is no bound on total elapsed time or attempt count — matching the
/// upstream driver's contract that it never gives up and only `shutdown`
/// (via cooperative cancellation around the call site) stops it.
pub async fn retry_notify<Op, Fut, T, E, N>(config: BackoffConfig, mut operation: Op, mut notify: N) -> T
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    N: FnMut(&E, Duration),
{
    let mut backoff = Backoff::new(config);
    loop {
        match operation().await {
            Ok(value) => return value,
            Err(err) => {
                let delay = backoff.next_delay();
                notify(&err, delay);
                tracing::warn!(delay_ms = delay.as_millis() as u64, "retrying after failure");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_and_clamps() {
        let config = BackoffConfig {
            initial_interval: Duration::from_millis(100),
            max_interval: Duration::from_millis(250),
            multiplier: 2.0,
        };
        let mut backoff = Backoff::new(config);
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
        assert_eq!(backoff.next_delay(), Duration::from_millis(200));
        assert_eq!(backoff.next_delay(), Duration::from_millis(250));
        assert_eq!(backoff.next_delay(), Duration::from_millis(250));
    }

    #[test]
    fn reset_returns_to_initial() {
        let config = BackoffConfig::default();
        let mut backoff = Backoff::new(config.clone());
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.next_delay(), config.initial_interval);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_notify_retries_until_success() {
        let mut attempts = 0;
        let mut notified = 0;
        let config = BackoffConfig {
            initial_interval: Duration::from_millis(10),
            max_interval: Duration::from_millis(40),
            multiplier: 2.0,
        };

        let result = retry_notify(
            config,
            || {
                attempts += 1;
                let this_attempt = attempts;
                async move {
                    if this_attempt < 3 {
                        Err("not yet")
                    } else {
                        Ok("done")
                    }
                }
            },
            |_err, _delay| notified += 1,
        )
        .await;

        assert_eq!(result, "done");
        assert_eq!(attempts, 3);
        assert_eq!(notified, 2);
    }
}
