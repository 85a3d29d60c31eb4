//! Synchronization primitives.
//!
//! Async-aware primitives are re-exported from `tokio::sync`; cancellation
//! comes from `tokio_util`. [`OperationGate`] adds last-write-wins
//! supersession on top: every new operation takes a [`Ticket`], and any
//! completion whose ticket is no longer current is discarded.
//!
//! # Examples
//!
//! ```rust
//! use core_async::sync::OperationGate;
//!
//! let gate = OperationGate::new();
//! let first = gate.begin();
//! let second = gate.begin();
//! assert!(!gate.is_current(&first));
//! assert!(gate.is_current(&second));
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

pub use tokio::sync::{
    broadcast, mpsc, oneshot, watch, Mutex, MutexGuard, Notify, RwLock, RwLockReadGuard,
    RwLockWriteGuard, Semaphore, SemaphorePermit,
};
pub use tokio_util::sync::{CancellationToken, DropGuard, WaitForCancellationFuture};

/// Generation counter used to suppress superseded async completions.
#[derive(Debug, Default)]
pub struct OperationGate {
    generation: AtomicU64,
}

/// Proof that an operation was started at a particular generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

impl OperationGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new operation, invalidating every ticket issued before.
    pub fn begin(&self) -> Ticket {
        Ticket(self.generation.fetch_add(1, Ordering::AcqRel) + 1)
    }

    /// Invalidates all outstanding tickets without starting a new operation.
    pub fn supersede(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Whether `ticket` still belongs to the most recent operation.
    pub fn is_current(&self, ticket: &Ticket) -> bool {
        self.generation.load(Ordering::Acquire) == ticket.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supersede_invalidates_outstanding_ticket() {
        let gate = OperationGate::new();
        let ticket = gate.begin();
        assert!(gate.is_current(&ticket));

        gate.supersede();
        assert!(!gate.is_current(&ticket));
    }

    #[test]
    fn latest_ticket_wins() {
        let gate = OperationGate::new();
        let tickets: Vec<_> = (0..5).map(|_| gate.begin()).collect();
        let (last, stale) = tickets.split_last().unwrap();
        assert!(gate.is_current(last));
        assert!(stale.iter().all(|t| !gate.is_current(t)));
    }
}
