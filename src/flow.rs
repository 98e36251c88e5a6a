//! Write-side backpressure: pause a connection's writer once the
//! connection-owned pending-write buffer crosses `FlowLimits::high_limit`,
//! resume once it drains below `low_limit`.
use crate::limits::FlowLimits;
use std::sync::Arc;
use tokio::sync::Notify;

/// Result of observing the buffer after a write.
pub enum WriteOutcome {
    /// The buffer is below the high watermark; no backpressure applied.
    Drained,
    /// The buffer crossed the high watermark; `.wait()` the returned waiter
    /// before writing more.
    Pending(WriteWaiter),
}

/// Resolves once the buffer has drained below `FlowLimits::low_limit`.
pub struct WriteWaiter {
    notify: Arc<Notify>,
}

impl WriteWaiter {
    pub async fn wait(self) {
        self.notify.notified().await;
    }
}

/// Tracks pause/resume state for one connection's writer.
pub struct FlowControl {
    limits: FlowLimits,
    paused: bool,
    waiter: Option<Arc<Notify>>,
}

impl FlowControl {
    pub fn new(limits: FlowLimits) -> Self {
        FlowControl {
            limits,
            paused: false,
            waiter: None,
        }
    }

    pub fn paused(&self) -> bool {
        self.paused
    }

    /// Called after every change to the pending-write buffer's length.
    pub fn observe(&mut self, buffered: usize) -> WriteOutcome {
        if buffered >= self.limits.high_limit && !self.paused {
            self.paused = true;
            let notify = Arc::new(Notify::new());
            self.waiter = Some(notify.clone());
            return WriteOutcome::Pending(WriteWaiter { notify });
        }
        if buffered <= self.limits.low_limit && self.paused {
            self.paused = false;
            if let Some(notify) = self.waiter.take() {
                notify.notify_waiters();
            }
        }
        WriteOutcome::Drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pauses_above_high_and_resumes_at_or_below_low() {
        let mut flow = FlowControl::new(FlowLimits {
            high_limit: 100,
            low_limit: 10,
            ..Default::default()
        });

        assert!(!flow.paused());
        assert!(matches!(flow.observe(50), WriteOutcome::Drained));
        assert!(matches!(flow.observe(100), WriteOutcome::Pending(_)));
        assert!(flow.paused());

        // Still above low_limit: stays paused, no new waiter churn.
        assert!(matches!(flow.observe(50), WriteOutcome::Drained));
        assert!(flow.paused());

        assert!(matches!(flow.observe(10), WriteOutcome::Drained));
        assert!(!flow.paused());
    }

    #[tokio::test]
    async fn waiter_resolves_after_drain() {
        let mut flow = FlowControl::new(FlowLimits::default());
        let high = flow.limits.high_limit;
        let low = flow.limits.low_limit;

        let waiter = match flow.observe(high) {
            WriteOutcome::Pending(w) => w,
            WriteOutcome::Drained => panic!("expected pending"),
        };

        flow.observe(low);
        waiter.wait().await;
    }
}
