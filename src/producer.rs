//! Factory and registry shared by every protocol a server mints: builds
//! protocols/consumers, counts sessions, and exposes introspection data.
use crate::limits::ProducerLimits;
use std::sync::atomic::{AtomicU64, Ordering};

/// Aggregate counters for one producer. Shared via `Arc` with every
/// connection task the producer spawns — the only cross-task state besides
/// immutable configuration.
#[derive(Default)]
pub struct ProducerState {
    sessions: AtomicU64,
    requests_processed: AtomicU64,
}

impl ProducerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mints the next session id. Monotonic, starts at 1.
    pub fn next_session(&self) -> u64 {
        self.sessions.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn sessions(&self) -> u64 {
        self.sessions.load(Ordering::SeqCst)
    }

    pub fn record_processed(&self, count: u64) {
        self.requests_processed.fetch_add(count, Ordering::SeqCst);
    }

    pub fn requests_processed(&self) -> u64 {
        self.requests_processed.load(Ordering::SeqCst)
    }

    /// Whether this producer has minted at least as many sessions as
    /// `limits.max_requests` allows. Existing connections are unaffected;
    /// this only gates whether a *new* one should be minted.
    pub fn at_capacity(&self, limits: &ProducerLimits) -> bool {
        match limits.max_requests {
            Some(max) => self.sessions() >= max,
            None => false,
        }
    }
}

/// Implemented by anything that mints protocols/consumers and tracks
/// aggregate counters across them — `TcpServer` and `DatagramServer` both
/// embed a `ProducerState` and implement this trait over it.
pub trait Producer {
    fn state(&self) -> &ProducerState;
    fn limits(&self) -> &ProducerLimits;

    fn sessions(&self) -> u64 {
        self.state().sessions()
    }

    fn requests_processed(&self) -> u64 {
        self.state().requests_processed()
    }

    fn max_requests_reached(&self) -> bool {
        self.state().at_capacity(self.limits())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sessions_are_monotonic_starting_at_one() {
        let state = ProducerState::new();
        assert_eq!(state.next_session(), 1);
        assert_eq!(state.next_session(), 2);
        assert_eq!(state.sessions(), 2);
    }

    #[test]
    fn at_capacity_respects_max_requests() {
        let state = ProducerState::new();
        let limits = ProducerLimits {
            max_requests: Some(2),
            ..Default::default()
        };
        assert!(!state.at_capacity(&limits));
        state.next_session();
        state.next_session();
        assert!(state.at_capacity(&limits));
    }
}
