//! I/O helpers for reconcile commands.

pub mod config;
pub mod files;
pub mod handlers;
pub mod init;
pub mod process;
pub mod profile_store;
pub mod receipt;
pub mod state_store;
