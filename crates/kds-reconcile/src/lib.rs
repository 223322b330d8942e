//! kds-reconcile
//!
//! After a status batch is accepted, re-read the order and check that its
//! lines actually moved.
//!
//! - [`evaluate`] is pure: line statuses in, three booleans out.
//! - [`Verifier`] does the re-read. Any failure to read is *inconclusive*
//!   (`None`), never an error.
//! - [`converge_status`] is the auto-healing loop: resubmit until the order's
//!   header status matches, or give up after a bounded number of rounds.

mod converge;
mod evaluate;
mod verifier;

pub use converge::{converge_status, Convergence};
pub use evaluate::{evaluate, evaluate_order, judge, Expectation, ReconciliationResult, Verdict};
pub use verifier::Verifier;
