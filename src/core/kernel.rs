//! Bilinear shape functions for four-node quadrilateral cells.
//!
//! Local node order is counter-clockwise from the cell's lower-left corner.

use serde::{Deserialize, Serialize};

use crate::math::{Real, Vector, zero_vector};

use super::grid::NodeId;

pub const NODES_PER_CELL: usize = 4;

/// Natural coordinates of the local nodes.
const NODE_NATURAL: [(Real, Real); NODES_PER_CELL] =
    [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];

/// Shape-function values and spatial gradients of one point in its cell.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShapeFunctions {
    pub nodes: [NodeId; NODES_PER_CELL],
    pub weights: [Real; NODES_PER_CELL],
    pub gradients: [Vector; NODES_PER_CELL],
}

impl Default for ShapeFunctions {
    fn default() -> Self {
        Self {
            nodes: [0; NODES_PER_CELL],
            weights: [0.0; NODES_PER_CELL],
            gradients: [zero_vector(); NODES_PER_CELL],
        }
    }
}

impl ShapeFunctions {
    /// Iterator over `(node, weight, gradient)` triples.
    #[inline(always)]
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, Real, Vector)> + '_ {
        (0..NODES_PER_CELL).map(move |k| (self.nodes[k], self.weights[k], self.gradients[k]))
    }

    /// Interpolates a nodal field at the point.
    #[inline]
    pub fn interpolate<T, F>(&self, mut field: F) -> T
    where
        T: Default + std::ops::Add<Output = T> + std::ops::Mul<Real, Output = T>,
        F: FnMut(NodeId) -> T,
    {
        self.iter()
            .fold(T::default(), |acc, (node, weight, _)| acc + field(node) * weight)
    }
}

#[inline]
pub fn bilinear(xi: Vector) -> [Real; NODES_PER_CELL] {
    NODE_NATURAL.map(|(a, b)| 0.25 * (1.0 + a * xi.x) * (1.0 + b * xi.y))
}

/// Spatial gradients for an axis-aligned cell of width `spacing`.
#[inline]
pub fn bilinear_gradients(xi: Vector, spacing: Real) -> [Vector; NODES_PER_CELL] {
    let jacobian_inv = 2.0 / spacing;
    NODE_NATURAL.map(|(a, b)| {
        Vector::new(
            0.25 * a * (1.0 + b * xi.y) * jacobian_inv,
            0.25 * b * (1.0 + a * xi.x) * jacobian_inv,
        )
    })
}
