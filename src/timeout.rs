//! Idle-connection timer: reset on every I/O event, fires a soft close on
//! expiry, and escalates to abort if the close does not complete within
//! [`CLOSE_TIMEOUT`].
use crate::limits::IdleLimits;
use std::time::{Duration, Instant};
use tokio::time::sleep;

/// Grace period allowed for a soft close to complete before the transport
/// is aborted outright.
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(3);

pub struct IdleTimeout {
    limits: IdleLimits,
    last_change: Instant,
}

impl IdleTimeout {
    pub fn new(limits: IdleLimits) -> Self {
        IdleTimeout {
            limits,
            last_change: Instant::now(),
        }
    }

    pub fn reset(&mut self) {
        self.last_change = Instant::now();
    }

    pub fn enabled(&self) -> bool {
        self.limits.timeout > Duration::ZERO
    }

    /// Resolves once the connection has been idle for `timeout`, measured
    /// from the last `reset()`. Never resolves if the timer is disabled.
    /// Intended to be raced inside a `tokio::select!` alongside the
    /// connection's read, so each loop iteration re-evaluates `last_change`.
    pub async fn wait_expired(&self) {
        if !self.enabled() {
            std::future::pending::<()>().await;
            return;
        }
        loop {
            let elapsed = self.last_change.elapsed();
            if elapsed >= self.limits.timeout {
                return;
            }
            sleep(self.limits.timeout - elapsed).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn fires_after_timeout_and_resets_on_activity() {
        let mut idle = IdleTimeout::new(IdleLimits {
            timeout: Duration::from_millis(100),
            ..Default::default()
        });

        tokio::time::advance(Duration::from_millis(50)).await;
        idle.reset();
        tokio::time::advance(Duration::from_millis(60)).await;

        // Still within 100ms of the reset; should not have expired yet.
        let not_yet = tokio::time::timeout(Duration::from_millis(1), idle.wait_expired()).await;
        assert!(not_yet.is_err());

        tokio::time::advance(Duration::from_millis(100)).await;
        idle.wait_expired().await;
    }

    #[tokio::test]
    async fn disabled_timer_never_resolves() {
        let idle = IdleTimeout::new(IdleLimits {
            timeout: Duration::ZERO,
            ..Default::default()
        });
        let result = tokio::time::timeout(Duration::from_millis(10), idle.wait_expired()).await;
        assert!(result.is_err());
    }
}
