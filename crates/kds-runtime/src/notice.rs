//! Notification bus.
//!
//! Whatever renders the board subscribes here for success / failure toasts.
//! Publishing never fails: with no subscribers the notice is dropped.

use kds_reconcile::ReconciliationResult;
use serde::Serialize;
use tokio::sync::broadcast;

pub const NOTICE_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notice {
    Success {
        order_id: String,
        message: String,
    },
    Failure {
        order_id: Option<String>,
        message: String,
    },
    /// Submission was accepted but the re-read order does not show the target.
    VerificationMismatch {
        order_id: String,
        target: String,
        observed: ReconciliationResult,
    },
}

#[derive(Debug, Clone)]
pub struct NoticeBus {
    tx: broadcast::Sender<Notice>,
}

impl Default for NoticeBus {
    fn default() -> Self {
        Self::new(NOTICE_CAPACITY)
    }
}

impl NoticeBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, notice: Notice) {
        let _ = self.tx.send(notice);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.tx.subscribe()
    }
}
