//! Declarative state reconciliation with guarded action execution.
//!
//! Agents report observed state and register lazily evaluated checks and plan
//! steps; the [`runtime`] reconciles them against a desired profile. The
//! [`dispatch`] layer runs only catalogued, allowlisted actions.
//!
//! - **[`core`]**: Pure, deterministic logic (JSON values, state, diff, invariants).
//!   No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (config, stores, receipts, processes).
//!
//! [`workspace`] coordinates core logic with I/O to implement CLI commands.

pub mod agent;
pub mod agents;
pub mod catalog;
pub mod core;
pub mod dispatch;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod render;
pub mod runtime;
pub mod setup;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod workspace;
