//! Graph domain model.
//!
//! # Responsibility
//! - Define the node and connection records shared by store and service layers.
//!
//! # Invariants
//! - Every node and connection is identified by a stable string id.
//! - Connections are undirected; `EdgeKey` is their orientation-free identity.

pub mod connection;
pub mod node;
