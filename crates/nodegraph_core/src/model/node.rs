//! Node domain model.
//!
//! # Responsibility
//! - Define the labeled 3-D point persisted as a graph node.
//! - Provide functional update helpers for read-modify-write flows.
//!
//! # Invariants
//! - `id` is stable and never reused for another node.
//! - Update helpers never change `id`.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier of a graph node.
///
/// Generated ids are UUID v4 renderings; imported ids may be any string.
pub type NodeId = String;

/// Point in 3-D space, single precision.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Position {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Short coordinate summary shown next to node names.
    pub fn description(&self) -> String {
        format!("x: {:.2}, y: {:.2}, z: {:.2}", self.x, self.y, self.z)
    }

    /// `false` when any coordinate is NaN or infinite.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl Display for Position {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Graph node record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Stable global ID used by connections and selection.
    pub id: NodeId,
    /// Display name.
    pub name: String,
    /// Free-text description.
    pub detail: String,
    pub position: Position,
}

impl Node {
    /// Creates a node with a freshly generated id.
    pub fn new(name: impl Into<String>, detail: impl Into<String>, position: Position) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), name, detail, position)
    }

    /// Creates a node with a caller-provided id.
    ///
    /// Used by import and seeding paths where identity already exists.
    pub fn with_id(
        id: impl Into<NodeId>,
        name: impl Into<String>,
        detail: impl Into<String>,
        position: Position,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            detail: detail.into(),
            position,
        }
    }

    /// Returns a copy with name and detail replaced; position is kept.
    pub fn with_details(&self, name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            id: self.id.clone(),
            name: name.into(),
            detail: detail.into(),
            position: self.position,
        }
    }

    /// Returns a copy moved to `position`.
    pub fn with_position(&self, position: Position) -> Self {
        Self {
            position,
            ..self.clone()
        }
    }

    /// Returns a copy carrying every field of `replacement` except identity.
    pub fn replaced_by(&self, replacement: &Node) -> Self {
        Self {
            id: self.id.clone(),
            ..replacement.clone()
        }
    }

    /// Convenience for list rendering.
    pub fn position_description(&self) -> String {
        self.position.description()
    }
}
