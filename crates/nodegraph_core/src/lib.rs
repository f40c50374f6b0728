//! Core graph logic for nodegraph.
//! This crate is the single source of truth for graph invariants.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{ConfigError, GraphConfig};
pub use logging::{
    default_log_level, init_logging, init_logging_from_config, logging_status, LoggingError,
};
pub use model::connection::{Connection, ConnectionId, ConnectionValidationError, EdgeKey};
pub use model::node::{Node, NodeId, Position};
pub use repo::record_store::{
    ConnectionFilter, ConnectionSort, NodeFilter, NodeSort, RecordStore, StagedChange,
    StoreError, StoreResult,
};
pub use repo::sqlite_store::SqliteRecordStore;
pub use service::graph_store::{GraphStore, ObserverId};
pub use service::placement::{centroid, default_position, DEFAULT_ANCHOR};

/// Minimal health-check API for host integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
