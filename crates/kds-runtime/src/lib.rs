//! kds-runtime
//!
//! Owns the order board and everything that writes to it:
//! - [`machine`]: optimistic transitions with snapshot/rollback and
//!   post-write verification
//! - [`loader`]: paged loads with stale-fetch suppression
//! - [`notice`]: broadcast bus for success / failure notices
//! - [`wiring`]: assembly from a loaded config
//!
//! Upstream access goes through [`OrderBackend`] so the machine and loader
//! can be driven by an in-memory fake in tests.

pub mod backend;
pub mod board;
pub mod loader;
pub mod locks;
pub mod machine;
pub mod notice;
pub mod sequencer;
pub mod wiring;

pub use backend::{OrderBackend, RemoteBackend};
pub use board::{Collection, OrderBoard, OrderPhase};
pub use loader::{total_pages, LoadOutcome, PageLoader, PageState, Tab};
pub use locks::OrderLocks;
pub use machine::{MachineSettings, OptimisticOrderMachine, Transition, TransitionError, TransitionOutcome};
pub use notice::{Notice, NoticeBus};
pub use sequencer::{FetchSequencer, FetchTicket};
pub use wiring::{retry_policy, Engine};
