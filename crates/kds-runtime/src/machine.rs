//! Optimistic order state machine.
//!
//! # Protocol
//!
//! Every transition runs the same three phases, serialized per order:
//!
//! 1. **Snapshot** the order and its position (deep copy).
//! 2. **Apply** the new local state immediately, so readers of the board see
//!    it before any network round-trip.
//! 3. **Submit** the status batch, then **verify** by re-reading the order.
//!
//! A rejected submission puts the snapshot of that one order back where it
//! was and publishes [`Notice::Failure`]. Other orders, and any page load
//! committed meanwhile, are left alone. A verification mismatch is
//! advisory: it is logged and published as [`Notice::VerificationMismatch`],
//! and only rolls back when `strict_verification` is set. An inconclusive
//! verification (order not readable) is never a failure.
//!
//! # Transitions
//!
//! ```text
//!   NotStarted --primary--> Cooking --(all lines checked)--> ReadyToComplete
//!        ^                     |                                   |
//!        +------revert---------+                               primary
//!                              ^                                   v
//!                              +-------------undo-------------- Completed
//! ```

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use kds_config::{SyncConfig, UndoTarget};
use kds_orders::{build_rows, MutationError};
use kds_reconcile::{judge, ReconciliationResult, Verdict};
use kds_schemas::{ItemState, Order, TargetStatus, UiStatus};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::backend::OrderBackend;
use crate::board::{Collection, OrderBoard};
use crate::locks::OrderLocks;
use crate::notice::{Notice, NoticeBus};

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineSettings {
    /// Roll back when the re-read order does not show the target.
    pub strict_verification: bool,
    /// Status sent when a completed order is undone.
    pub undo_target: TargetStatus,
}

impl Default for MachineSettings {
    fn default() -> Self {
        Self {
            strict_verification: false,
            undo_target: TargetStatus::New,
        }
    }
}

impl MachineSettings {
    pub fn from_config(cfg: &SyncConfig) -> Self {
        Self {
            strict_verification: cfg.strict_verification,
            undo_target: match cfg.undo_target {
                UndoTarget::New => TargetStatus::New,
                UndoTarget::Inproc => TargetStatus::Inproc,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Transition / outcome / error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    StartCooking,
    Complete,
    Undo,
    Revert,
}

impl Transition {
    fn success_message(self, order_id: &str) -> String {
        match self {
            Transition::StartCooking => format!("Order #{order_id} started cooking"),
            Transition::Complete => format!("Order #{order_id} completed"),
            Transition::Undo => format!("Order #{order_id}: undone to active"),
            Transition::Revert => format!("Order #{order_id} reverted to not started"),
        }
    }

    fn failure_message(self) -> &'static str {
        match self {
            Transition::StartCooking | Transition::Complete => "Status update failed",
            Transition::Undo => "Undo failed",
            Transition::Revert => "Revert failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionOutcome {
    pub order_id: String,
    pub transition: Transition,
    pub target: TargetStatus,
    pub verdict: Verdict,
    pub observed: Option<ReconciliationResult>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    /// The order is not in the collection the action starts from.
    NotFound {
        order_id: String,
        expected: Collection,
    },
    /// Upstream rejected the status batch; local state was rolled back.
    Submit {
        order_id: String,
        source: MutationError,
    },
    /// Strict mode only: accepted upstream but not visible on re-read; local
    /// state was rolled back.
    VerificationMismatch {
        order_id: String,
        target: TargetStatus,
    },
}

impl fmt::Display for TransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransitionError::NotFound { order_id, expected } => {
                write!(f, "order {order_id} not found in {expected:?} orders")
            }
            TransitionError::Submit { order_id, source } => {
                write!(f, "status update for order {order_id} failed: {source}")
            }
            TransitionError::VerificationMismatch { order_id, target } => {
                write!(f, "order {order_id} did not reach {target} upstream")
            }
        }
    }
}

impl std::error::Error for TransitionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransitionError::Submit { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// The order as it was before the optimistic write, and where it sat.
struct Pending {
    before: Order,
    origin: Collection,
    index: usize,
    transition: Transition,
    target: TargetStatus,
}

// ---------------------------------------------------------------------------
// Machine
// ---------------------------------------------------------------------------

pub struct OptimisticOrderMachine {
    board: Arc<RwLock<OrderBoard>>,
    backend: Arc<dyn OrderBackend>,
    bus: NoticeBus,
    locks: OrderLocks,
    settings: MachineSettings,
}

impl OptimisticOrderMachine {
    pub fn new(
        board: Arc<RwLock<OrderBoard>>,
        backend: Arc<dyn OrderBackend>,
        bus: NoticeBus,
        settings: MachineSettings,
    ) -> Self {
        Self {
            board,
            backend,
            bus,
            locks: OrderLocks::new(),
            settings,
        }
    }

    pub fn board(&self) -> Arc<RwLock<OrderBoard>> {
        Arc::clone(&self.board)
    }

    pub async fn snapshot(&self) -> OrderBoard {
        self.board.read().await.clone()
    }

    pub fn settings(&self) -> &MachineSettings {
        &self.settings
    }

    /// Start cooking, or complete when every line is checked.
    pub async fn primary_action(&self, order_id: &str) -> Result<TransitionOutcome, TransitionError> {
        let _guard = self.locks.acquire(order_id).await;
        let pending = {
            let mut board = self.board.write().await;
            let idx = board.active_index(order_id).ok_or_else(|| TransitionError::NotFound {
                order_id: order_id.to_string(),
                expected: Collection::Active,
            })?;
            let before = board.active[idx].clone();

            if before.all_lines_checked() {
                let mut done = board.active.remove(idx);
                done.status = UiStatus::Completed;
                done.cooking = false;
                board.completed.push(done);
                Pending {
                    before,
                    origin: Collection::Active,
                    index: idx,
                    transition: Transition::Complete,
                    target: TargetStatus::Approved,
                }
            } else {
                let o = &mut board.active[idx];
                o.status = UiStatus::Active;
                o.cooking = true;
                if o.cooking_started_at.is_none() {
                    o.cooking_started_at = Some(Utc::now());
                }
                Pending {
                    before,
                    origin: Collection::Active,
                    index: idx,
                    transition: Transition::StartCooking,
                    target: TargetStatus::Inproc,
                }
            }
        };
        self.settle(pending).await
    }

    /// Move a completed order back to the front of the active collection.
    pub async fn undo(&self, order_id: &str) -> Result<TransitionOutcome, TransitionError> {
        let _guard = self.locks.acquire(order_id).await;
        let pending = {
            let mut board = self.board.write().await;
            let idx = board.completed_index(order_id).ok_or_else(|| TransitionError::NotFound {
                order_id: order_id.to_string(),
                expected: Collection::Completed,
            })?;
            let before = board.completed[idx].clone();

            let mut back = board.completed.remove(idx);
            back.status = UiStatus::Active;
            back.cooking = true;
            back.cooking_started_at = Some(Utc::now());
            board.active.insert(0, back);
            Pending {
                before,
                origin: Collection::Completed,
                index: idx,
                transition: Transition::Undo,
                target: self.settings.undo_target.clone(),
            }
        };
        self.settle(pending).await
    }

    /// Abandon cooking: back to not started.
    pub async fn revert(&self, order_id: &str) -> Result<TransitionOutcome, TransitionError> {
        let _guard = self.locks.acquire(order_id).await;
        let pending = {
            let mut board = self.board.write().await;
            let idx = board.active_index(order_id).ok_or_else(|| TransitionError::NotFound {
                order_id: order_id.to_string(),
                expected: Collection::Active,
            })?;
            let before = board.active[idx].clone();

            let o = &mut board.active[idx];
            o.status = UiStatus::Pending;
            o.cooking = false;
            o.cooking_started_at = None;
            Pending {
                before,
                origin: Collection::Active,
                index: idx,
                transition: Transition::Revert,
                target: TargetStatus::New,
            }
        };
        self.settle(pending).await
    }

    /// Cycle a line's mark on an active order. Local only; completed orders
    /// are left alone (`None`).
    pub async fn toggle_item(&self, order_id: &str, line_id: &str) -> Option<ItemState> {
        let mut board = self.board.write().await;
        let idx = board.active_index(order_id)?;
        let line = board.active[idx].line_mut(line_id)?;
        line.item_state = line.item_state.next();
        Some(line.item_state)
    }

    async fn settle(&self, p: Pending) -> Result<TransitionOutcome, TransitionError> {
        let order_id = p.before.id.clone();
        let rows = build_rows(&p.before, &p.target);

        let submitted = self.backend.submit_status(&rows).await;
        if let Err(source) = submitted.into_result() {
            self.rollback(&p, &source.message).await;
            return Err(TransitionError::Submit { order_id, source });
        }

        let observed = self.backend.verify(&p.before).await;
        let verdict = judge(&p.target, observed.as_ref());
        if let (Verdict::Mismatch, Some(obs)) = (verdict, observed) {
            warn!(order = %order_id, target = %p.target, ?obs, "verification mismatch");
            self.bus.publish(Notice::VerificationMismatch {
                order_id: order_id.clone(),
                target: p.target.to_string(),
                observed: obs,
            });
            if self.settings.strict_verification {
                self.rollback(&p, "verification mismatch").await;
                return Err(TransitionError::VerificationMismatch {
                    order_id,
                    target: p.target,
                });
            }
        }

        info!(order = %order_id, transition = ?p.transition, target = %p.target, ?verdict, "transition committed");
        self.bus.publish(Notice::Success {
            order_id: order_id.clone(),
            message: p.transition.success_message(&order_id),
        });
        Ok(TransitionOutcome {
            order_id,
            transition: p.transition,
            target: p.target,
            verdict,
            observed,
        })
    }

    async fn rollback(&self, p: &Pending, reason: &str) {
        let restored = self
            .board
            .write()
            .await
            .restore(p.before.clone(), p.origin, p.index);
        warn!(order = %p.before.id, transition = ?p.transition, restored, reason, "transition rolled back");
        self.bus.publish(Notice::Failure {
            order_id: Some(p.before.id.clone()),
            message: p.transition.failure_message().to_string(),
        });
    }
}
