//! kds-testkit
//!
//! Test-only support: an in-memory [`FakeBackend`] for driving the runtime
//! without a network, and builders for orders and upstream payloads.
//! Scenario tests for the whole engine live under `tests/`.

pub mod fake_backend;
pub mod fixtures;

pub use fake_backend::{FakeBackend, CallHold, SubmitMode};
