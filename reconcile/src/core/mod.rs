//! Deterministic, pure logic shared by the reconciliation runtime.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod diff;
pub mod invariants;
pub mod json;
pub mod registry;
pub mod state;
pub mod types;
