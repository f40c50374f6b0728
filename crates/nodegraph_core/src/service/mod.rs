//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate record store calls into graph-level operations.
//! - Keep callers decoupled from storage details.

pub mod graph_store;
pub mod placement;
