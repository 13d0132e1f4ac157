//! flowctl core library providing the building blocks shared by every flowctl crate.
//!
//! This crate contains preference and environment configuration, the per-call request
//! context that replaces process-wide output toggles, and the small traits that clients
//! and long-running operations implement.

/// Client connection trait for remote services.
pub mod client;
/// Preferences file and environment settings.
pub mod config;
/// Per-call request context threaded through transport and engine calls.
pub mod context;
/// Execution framework for bulk operations.
pub mod task {
    /// Base runner trait for all bulk operations.
    pub mod runner;
}
