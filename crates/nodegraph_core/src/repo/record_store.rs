//! Record store contract used by the graph service.
//!
//! # Responsibility
//! - Describe the minimal durable-persistence surface the graph needs.
//! - Define the filter/sort vocabulary for fetches and predicate deletes.
//!
//! # Invariants
//! - Writes are staged; nothing is durable until `commit` succeeds.
//! - `commit` is all-or-nothing: on failure no staged change is durable.
//! - Fetches return committed state only, in the requested order.

use crate::db::DbError;
use crate::model::connection::{ConnectionId, ConnectionValidationError};
use crate::model::{connection::Connection, node::Node, node::NodeId};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by record store implementations.
#[derive(Debug)]
pub enum StoreError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// A staged or persisted connection breaks connection rules.
    Validation(ConnectionValidationError),
    /// Persisted data cannot be converted to a valid record.
    InvalidData(String),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Required column is missing from expected table.
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted graph data: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "record store requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "record store requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "record store requires column `{column}` in table `{table}`"
            ),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Validation(err) => Some(err),
            Self::InvalidData(_) => None,
            Self::UninitializedConnection { .. } => None,
            Self::MissingRequiredTable(_) => None,
            Self::MissingRequiredColumn { .. } => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<ConnectionValidationError> for StoreError {
    fn from(value: ConnectionValidationError) -> Self {
        Self::Validation(value)
    }
}

/// Node selection for fetches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum NodeFilter {
    #[default]
    All,
    Id(NodeId),
}

/// Node ordering for fetches. Ties are always broken by id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NodeSort {
    #[default]
    Name,
    Id,
}

/// Connection selection for fetches and predicate deletes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConnectionFilter {
    #[default]
    All,
    Id(ConnectionId),
    /// Connections with either endpoint equal to the node id.
    Touching(NodeId),
    /// Connections joining the two nodes, in either direction.
    Between(NodeId, NodeId),
}

impl ConnectionFilter {
    pub fn matches(&self, connection: &Connection) -> bool {
        match self {
            Self::All => true,
            Self::Id(id) => connection.id == *id,
            Self::Touching(node_id) => connection.touches(node_id),
            Self::Between(a, b) => connection.joins(a, b),
        }
    }
}

/// Connection ordering for fetches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionSort {
    #[default]
    Id,
}

/// One write waiting for the next commit.
#[derive(Debug, Clone, PartialEq)]
pub enum StagedChange {
    /// Insert, or replace the record with the same id.
    PutNode(Node),
    PutConnection(Connection),
    DeleteNode(NodeId),
    DeleteConnections(ConnectionFilter),
}

/// Durable record store the graph service persists through.
pub trait RecordStore {
    /// Stages an insert; an existing node with the same id is replaced.
    fn insert_node(&mut self, node: Node);
    /// Stages an insert; an existing connection with the same id is replaced.
    fn insert_connection(&mut self, connection: Connection);
    fn delete_node(&mut self, id: &str);
    fn delete_connection(&mut self, id: &str) {
        self.delete_connections_matching(ConnectionFilter::Id(id.to_string()));
    }
    /// Stages deletion of every connection matching `filter`.
    fn delete_connections_matching(&mut self, filter: ConnectionFilter);
    /// Reads committed nodes.
    fn fetch_nodes(&self, filter: &NodeFilter, sort: NodeSort) -> StoreResult<Vec<Node>>;
    /// Reads committed connections.
    fn fetch_connections(
        &self,
        filter: &ConnectionFilter,
        sort: ConnectionSort,
    ) -> StoreResult<Vec<Connection>>;
    fn has_pending_changes(&self) -> bool;
    /// Makes all staged changes durable, atomically.
    ///
    /// Staged changes are kept on failure; callers decide whether to discard.
    fn commit(&mut self) -> StoreResult<()>;
    fn discard_pending(&mut self);
}
