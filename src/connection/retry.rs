//! Reconnect with growing back-off.

use std::time::Duration;

use tracing::{Instrument, error, info, warn};

use super::Connection;
use super::loops::shutdown_signal;
use crate::error::{ConnectionError, ConnectionResult};
use crate::telemetry::spans;

/// Upper bound on the pause between attempts, in seconds.
pub const MAX_RETRY_DELAY_SECS: u64 = 300;
/// Linear growth per failed attempt, in seconds.
const RETRY_STEP_SECS: u64 = 5;

/// Delay before the attempt following failure number `retry_count`
/// (zero-based), given the previous delay.
///
/// Grows as `retry_count * 5 + previous`: 0, 5, 15, 30, 50, ... capped at
/// [`MAX_RETRY_DELAY_SECS`].
pub fn retry_delay(retry_count: u32, previous_secs: u64) -> u64 {
    (u64::from(retry_count) * RETRY_STEP_SECS + previous_secs).min(MAX_RETRY_DELAY_SECS)
}

impl Connection {
    /// Connect and wait, retrying failed sessions with back-off.
    ///
    /// Returns `Ok` once a session ends by quitting. Gives up with
    /// [`ConnectionError::MaxRetriesExceeded`] after `max_retries` retries,
    /// or [`ConnectionError::Interrupted`] if a shutdown signal arrives
    /// while waiting to retry.
    pub async fn connect_and_wait_with_retry(&self, max_retries: u32) -> ConnectionResult {
        let mut retry_count: u32 = 0;
        let mut delay_secs: u64 = 0;

        loop {
            let span = spans::attempt(&self.client().server, retry_count + 1);
            let err = match self.connect_and_wait().instrument(span).await {
                Ok(()) => return Ok(()),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => e,
            };

            if retry_count >= max_retries {
                error!(attempts = retry_count + 1, error = %err, "Giving up on connection");
                return Err(ConnectionError::MaxRetriesExceeded {
                    attempts: retry_count + 1,
                    last: Box::new(err),
                });
            }

            delay_secs = retry_delay(retry_count, delay_secs);
            retry_count += 1;
            warn!(
                error = %err,
                retry = retry_count,
                max_retries,
                delay_secs,
                "Connection failed, retrying"
            );

            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(delay_secs)) => {}
                _ = shutdown_signal(self.options().handle_signals) => {
                    info!("Interrupted while waiting to reconnect");
                    return Err(ConnectionError::Interrupted);
                }
            }
        }
    }
}
