//! Connection (edge) domain model.
//!
//! # Responsibility
//! - Define the undirected edge record between two nodes.
//! - Provide the canonical `EdgeKey` used for de-duplication and lookup.
//!
//! # Invariants
//! - Endpoints are distinct and non-empty.
//! - Connections built by `Connection::between` are stored with
//!   `from_node_id < to_node_id`.
//! - Two connections denote the same edge iff their `EdgeKey`s are equal.

use crate::model::node::NodeId;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier of a connection.
pub type ConnectionId = String;

/// Validation failures for connection records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionValidationError {
    /// Both endpoints name the same node.
    SelfLoop(NodeId),
    /// One of the endpoint ids is empty.
    EmptyEndpoint,
}

impl Display for ConnectionValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SelfLoop(id) => write!(f, "connection endpoints must differ, got `{id}` twice"),
            Self::EmptyEndpoint => write!(f, "connection endpoint id must not be empty"),
        }
    }
}

impl Error for ConnectionValidationError {}

/// Orientation-free identity of an edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeKey {
    low: NodeId,
    high: NodeId,
}

impl EdgeKey {
    pub fn new(a: &str, b: &str) -> Self {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        Self {
            low: low.to_string(),
            high: high.to_string(),
        }
    }

    pub fn low(&self) -> &str {
        &self.low
    }

    pub fn high(&self) -> &str {
        &self.high
    }
}

/// Undirected edge between two distinct nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub id: ConnectionId,
    pub from_node_id: NodeId,
    pub to_node_id: NodeId,
}

impl Connection {
    /// Creates a connection with a generated id and canonical orientation.
    pub fn between(a: &str, b: &str) -> Self {
        let key = EdgeKey::new(a, b);
        Self {
            id: Uuid::new_v4().to_string(),
            from_node_id: key.low,
            to_node_id: key.high,
        }
    }

    /// Creates a connection exactly as given, without reorienting endpoints.
    ///
    /// Used for seeding and when reading persisted rows back.
    pub fn with_id(
        id: impl Into<ConnectionId>,
        from_node_id: impl Into<NodeId>,
        to_node_id: impl Into<NodeId>,
    ) -> Self {
        Self {
            id: id.into(),
            from_node_id: from_node_id.into(),
            to_node_id: to_node_id.into(),
        }
    }

    pub fn key(&self) -> EdgeKey {
        EdgeKey::new(&self.from_node_id, &self.to_node_id)
    }

    /// Returns whether either endpoint is `node_id`.
    pub fn touches(&self, node_id: &str) -> bool {
        self.from_node_id == node_id || self.to_node_id == node_id
    }

    /// Returns whether this edge joins `a` and `b`, in either direction.
    pub fn joins(&self, a: &str, b: &str) -> bool {
        (self.from_node_id == a && self.to_node_id == b)
            || (self.from_node_id == b && self.to_node_id == a)
    }

    /// Returns the endpoint opposite to `node_id`, if this edge touches it.
    pub fn opposite(&self, node_id: &str) -> Option<&str> {
        if self.from_node_id == node_id {
            Some(self.to_node_id.as_str())
        } else if self.to_node_id == node_id {
            Some(self.from_node_id.as_str())
        } else {
            None
        }
    }

    pub fn validate(&self) -> Result<(), ConnectionValidationError> {
        if self.from_node_id.is_empty() || self.to_node_id.is_empty() {
            return Err(ConnectionValidationError::EmptyEndpoint);
        }
        if self.from_node_id == self.to_node_id {
            return Err(ConnectionValidationError::SelfLoop(self.from_node_id.clone()));
        }
        Ok(())
    }
}
