//! Record store abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the record store contract the graph service depends on.
//! - Isolate SQLite query details from graph invariants and orchestration.
//!
//! # Invariants
//! - Writes are staged and become durable only through `commit`.
//! - Store APIs report transport and data errors; they never swallow them.

pub mod record_store;
pub mod sqlite_store;
