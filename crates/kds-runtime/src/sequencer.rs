//! Fetch sequencer.
//!
//! Every page load takes a ticket. Taking a ticket cancels the previous
//! ticket's token and makes every older ticket stale. A stale load must not
//! write anything; it ends silently.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use kds_client::CancellationToken;

#[derive(Debug, Clone)]
pub struct FetchTicket {
    id: u64,
    token: CancellationToken,
}

impl FetchTicket {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

#[derive(Debug, Default)]
pub struct FetchSequencer {
    seq: AtomicU64,
    current: Mutex<Option<CancellationToken>>,
}

impl FetchSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Abort the in-flight load (if any) and issue the next ticket.
    pub fn begin(&self) -> FetchTicket {
        let token = CancellationToken::new();
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(prev) = current.replace(token.clone()) {
            prev.cancel();
        }
        let id = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        FetchTicket { id, token }
    }

    pub fn is_current(&self, ticket: &FetchTicket) -> bool {
        self.seq.load(Ordering::SeqCst) == ticket.id
    }

    pub fn latest(&self) -> u64 {
        self.seq.load(Ordering::SeqCst)
    }

    /// Teardown: abort the in-flight load without issuing a new ticket.
    pub fn cancel_all(&self) {
        let current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(token) = current.as_ref() {
            token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newer_ticket_supersedes_and_cancels_older() {
        let s = FetchSequencer::new();
        let a = s.begin();
        assert!(s.is_current(&a));

        let b = s.begin();
        assert!(!s.is_current(&a));
        assert!(a.token().is_cancelled());
        assert!(s.is_current(&b));
        assert!(!b.token().is_cancelled());
        assert_eq!(b.id(), a.id() + 1);
    }

    #[test]
    fn cancel_all_keeps_sequence() {
        let s = FetchSequencer::new();
        let a = s.begin();
        s.cancel_all();
        assert!(a.token().is_cancelled());
        assert!(s.is_current(&a));
        assert_eq!(s.latest(), 1);
    }
}
