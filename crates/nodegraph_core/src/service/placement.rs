//! Default placement for nodes created without an explicit position.

use crate::model::node::{Node, Position};

/// Anchor used for the first node of an empty graph: eye height, in front of
/// the viewer.
pub const DEFAULT_ANCHOR: Position = Position::new(0.0, 1.0, -1.5);

/// Component-wise mean of all node positions.
///
/// Sums are accumulated in `f64`, so large finite coordinates do not
/// overflow. Returns `None` for an empty slice or when the mean is not a
/// finite `f32` position (for example when stored rows hold infinities).
pub fn centroid(nodes: &[Node]) -> Option<Position> {
    if nodes.is_empty() {
        return None;
    }

    let (x, y, z) = nodes.iter().fold((0.0f64, 0.0f64, 0.0f64), |acc, node| {
        (
            acc.0 + f64::from(node.position.x),
            acc.1 + f64::from(node.position.y),
            acc.2 + f64::from(node.position.z),
        )
    });
    let count = nodes.len() as f64;
    let mean = Position::new(
        (x / count) as f32,
        (y / count) as f32,
        (z / count) as f32,
    );
    mean.is_finite().then_some(mean)
}

/// Position for a new node: centroid of `nodes`, or `anchor` when there is
/// no finite centroid.
pub fn default_position(nodes: &[Node], anchor: Position) -> Position {
    centroid(nodes).unwrap_or(anchor)
}
