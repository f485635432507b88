//! Background grid for the two-phase stepper
//!
//! Structured quadrilateral mesh with phase-indexed node accumulators stored
//! as separate arrays, so concurrent stages can borrow disjoint fields.

use serde::{Deserialize, Serialize};

use crate::error::{MpmError, MpmResult};
use crate::math::{Real, Vector, zero_vector};

use super::kernel::{NODES_PER_CELL, ShapeFunctions, bilinear, bilinear_gradients};

pub type NodeId = usize;
pub type CellId = usize;

/// Node accumulator phase.
///
/// The solid slot's force accumulators carry mixture totals (skeleton plus
/// pore fluid); its mass and momentum are the skeleton's alone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Solid = 0,
    Liquid = 1,
}

impl Phase {
    pub const ALL: [Phase; 2] = [Phase::Solid, Phase::Liquid];

    #[inline(always)]
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Per-node state. Transient: rebuilt every step.
#[derive(Clone, Debug, Default)]
pub struct NodeFields {
    pub mass: [Vec<Real>; 2],
    pub momentum: [Vec<Vector>; 2],
    pub velocity: [Vec<Vector>; 2],
    pub acceleration: [Vec<Vector>; 2],
    pub external_force: [Vec<Vector>; 2],
    pub internal_force: [Vec<Vector>; 2],
    pub pressure: [Vec<Real>; 2],
    pub drag_coefficient: Vec<Real>,
    pub active: Vec<bool>,
}

impl NodeFields {
    fn new(count: usize) -> Self {
        let scalars = || [vec![0.0; count], vec![0.0; count]];
        let vectors = || [vec![zero_vector(); count], vec![zero_vector(); count]];
        Self {
            mass: scalars(),
            momentum: vectors(),
            velocity: vectors(),
            acceleration: vectors(),
            external_force: vectors(),
            internal_force: vectors(),
            pressure: scalars(),
            drag_coefficient: vec![0.0; count],
            active: vec![false; count],
        }
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Zero every accumulator and deactivate every node.
    pub fn reset(&mut self) {
        for phase in 0..2 {
            self.mass[phase].fill(0.0);
            self.momentum[phase].fill(zero_vector());
            self.velocity[phase].fill(zero_vector());
            self.acceleration[phase].fill(zero_vector());
            self.external_force[phase].fill(zero_vector());
            self.internal_force[phase].fill(zero_vector());
            self.pressure[phase].fill(0.0);
        }
        self.drag_coefficient.fill(0.0);
        self.active.fill(false);
    }

    pub fn active_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.active
            .iter()
            .enumerate()
            .filter_map(|(node, &active)| active.then_some(node))
    }

    pub fn total_momentum(&self, phase: Phase) -> Vector {
        self.momentum[phase.index()]
            .iter()
            .fold(zero_vector(), |acc, m| acc + *m)
    }

    pub fn total_mass(&self, phase: Phase) -> Real {
        self.mass[phase.index()].iter().sum()
    }
}

/// Mesh topology, coordinates and cell ownership. Never touched by the
/// per-step accumulation stages.
#[derive(Clone, Debug)]
pub struct GridGeometry {
    origin: Vector,
    spacing: Real,
    cells_x: usize,
    cells_y: usize,
    cell_owner: Vec<usize>,
}

impl GridGeometry {
    pub fn origin(&self) -> Vector {
        self.origin
    }

    pub fn spacing(&self) -> Real {
        self.spacing
    }

    pub fn cells_x(&self) -> usize {
        self.cells_x
    }

    pub fn cells_y(&self) -> usize {
        self.cells_y
    }

    pub fn cell_count(&self) -> usize {
        self.cells_x * self.cells_y
    }

    pub fn node_count(&self) -> usize {
        (self.cells_x + 1) * (self.cells_y + 1)
    }

    pub fn node_position(&self, node: NodeId) -> Vector {
        let row = self.cells_x + 1;
        let (i, j) = (node % row, node / row);
        self.origin + Vector::new(i as Real, j as Real) * self.spacing
    }

    pub fn cell_nodes(&self, cell: CellId) -> [NodeId; NODES_PER_CELL] {
        let row = self.cells_x + 1;
        let (i, j) = (cell % self.cells_x, cell / self.cells_x);
        let base = j * row + i;
        [base, base + 1, base + row + 1, base + row]
    }

    /// Cell containing `position`, or `None` when it lies outside the mesh.
    /// Points on the upper boundary belong to the last row/column of cells.
    pub fn locate(&self, position: Vector) -> Option<CellId> {
        if !position.is_finite() {
            return None;
        }
        let local = (position - self.origin) / self.spacing;
        let index = |coord: Real, cells: usize| -> Option<usize> {
            if coord < 0.0 || coord > cells as Real {
                return None;
            }
            Some((coord.floor() as usize).min(cells - 1))
        };
        let i = index(local.x, self.cells_x)?;
        let j = index(local.y, self.cells_y)?;
        Some(j * self.cells_x + i)
    }

    pub fn shape_functions(&self, cell: CellId, position: Vector) -> ShapeFunctions {
        let nodes = self.cell_nodes(cell);
        let lower_left = self.node_position(nodes[0]);
        let xi = (position - lower_left) / self.spacing * 2.0 - Vector::ONE;
        ShapeFunctions {
            nodes,
            weights: bilinear(xi),
            gradients: bilinear_gradients(xi, self.spacing),
        }
    }

    /// Cells sharing an edge with `cell`.
    pub fn cell_neighbors(&self, cell: CellId) -> Vec<CellId> {
        let (i, j) = (cell % self.cells_x, cell / self.cells_x);
        let mut neighbors = Vec::with_capacity(4);
        if i > 0 {
            neighbors.push(cell - 1);
        }
        if i + 1 < self.cells_x {
            neighbors.push(cell + 1);
        }
        if j > 0 {
            neighbors.push(cell - self.cells_x);
        }
        if j + 1 < self.cells_y {
            neighbors.push(cell + self.cells_x);
        }
        neighbors
    }

    /// Cells touching `node`.
    pub fn node_cells(&self, node: NodeId) -> Vec<CellId> {
        let row = self.cells_x + 1;
        let (i, j) = (node % row, node / row);
        let mut cells = Vec::with_capacity(4);
        for cj in j.saturating_sub(1)..=j {
            for ci in i.saturating_sub(1)..=i {
                if ci < self.cells_x && cj < self.cells_y {
                    cells.push(cj * self.cells_x + ci);
                }
            }
        }
        cells
    }

    pub fn cell_owner(&self, cell: CellId) -> usize {
        self.cell_owner[cell]
    }

    pub fn cell_owners(&self) -> &[usize] {
        &self.cell_owner
    }

    /// Ranks owning at least one cell adjacent to `node`, ascending.
    pub fn node_owner_ranks(&self, node: NodeId) -> Vec<usize> {
        let mut ranks: Vec<usize> = self
            .node_cells(node)
            .into_iter()
            .map(|cell| self.cell_owner[cell])
            .collect();
        ranks.sort_unstable();
        ranks.dedup();
        ranks
    }

    /// The rank responsible for node-level loads that must be counted once.
    pub fn primary_rank(&self, node: NodeId) -> usize {
        self.node_owner_ranks(node).first().copied().unwrap_or(0)
    }

    pub fn owned_cells(&self, rank: usize) -> impl Iterator<Item = CellId> + '_ {
        self.cell_owner
            .iter()
            .enumerate()
            .filter_map(move |(cell, &owner)| (owner == rank).then_some(cell))
    }
}

#[derive(Clone, Debug)]
pub struct Grid {
    geometry: GridGeometry,
    nodes: NodeFields,
}

impl Grid {
    /// Uniform `cells_x × cells_y` mesh of square cells, all owned by rank 0.
    pub fn uniform(origin: Vector, spacing: Real, cells_x: usize, cells_y: usize) -> MpmResult<Self> {
        if !(spacing.is_finite() && spacing > 0.0) {
            return Err(MpmError::InvalidState(format!(
                "cell spacing must be positive, got {spacing}"
            )));
        }
        if cells_x == 0 || cells_y == 0 {
            return Err(MpmError::InvalidState(format!(
                "mesh needs at least one cell, got {cells_x}x{cells_y}"
            )));
        }
        let geometry = GridGeometry {
            origin,
            spacing,
            cells_x,
            cells_y,
            cell_owner: vec![0; cells_x * cells_y],
        };
        let nodes = NodeFields::new(geometry.node_count());
        Ok(Self { geometry, nodes })
    }

    pub fn geometry(&self) -> &GridGeometry {
        &self.geometry
    }

    pub fn nodes(&self) -> &NodeFields {
        &self.nodes
    }

    pub fn nodes_mut(&mut self) -> &mut NodeFields {
        &mut self.nodes
    }

    /// Borrow topology and node accumulators independently.
    pub fn split_mut(&mut self) -> (&GridGeometry, &mut NodeFields) {
        (&self.geometry, &mut self.nodes)
    }

    pub fn set_cell_owners(&mut self, owners: Vec<usize>, ranks: usize) -> MpmResult<()> {
        if owners.len() != self.geometry.cell_count() {
            return Err(MpmError::Partition(format!(
                "partition covers {} cells, mesh has {}",
                owners.len(),
                self.geometry.cell_count()
            )));
        }
        if let Some(bad) = owners.iter().find(|&&owner| owner >= ranks) {
            return Err(MpmError::Partition(format!(
                "cell assigned to rank {bad}, only {ranks} ranks exist"
            )));
        }
        self.geometry.cell_owner = owners;
        Ok(())
    }
}

/// Reset accumulators, then activate the nodes of every occupied cell.
pub fn reset_and_activate(
    geometry: &GridGeometry,
    nodes: &mut NodeFields,
    occupied: impl IntoIterator<Item = CellId>,
) {
    nodes.reset();
    for cell in occupied {
        for node in geometry.cell_nodes(cell) {
            nodes.active[node] = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> Grid {
        Grid::uniform(Vector::new(0.0, 0.0), 0.5, 4, 2).unwrap()
    }

    #[test]
    fn locate_inside_and_on_boundary() {
        let g = grid();
        let geo = g.geometry();
        assert_eq!(geo.locate(Vector::new(0.1, 0.1)), Some(0));
        assert_eq!(geo.locate(Vector::new(1.9, 0.9)), Some(7));
        assert_eq!(geo.locate(Vector::new(2.0, 1.0)), Some(7));
        assert_eq!(geo.locate(Vector::new(2.01, 0.5)), None);
        assert_eq!(geo.locate(Vector::new(0.5, -0.01)), None);
        assert_eq!(geo.locate(Vector::new(Real::NAN, 0.5)), None);
    }

    #[test]
    fn cell_nodes_are_counter_clockwise() {
        let g = grid();
        let geo = g.geometry();
        let nodes = geo.cell_nodes(5);
        assert_eq!(nodes, [6, 7, 12, 11]);
        assert_eq!(geo.node_position(nodes[0]), Vector::new(0.5, 0.5));
        assert_eq!(geo.node_position(nodes[2]), Vector::new(1.0, 1.0));
    }

    #[test]
    fn shape_functions_interpolate_node_positions() {
        let g = grid();
        let geo = g.geometry();
        let p = Vector::new(1.3, 0.7);
        let cell = geo.locate(p).unwrap();
        let sf = geo.shape_functions(cell, p);
        let x = sf.interpolate(|node| geo.node_position(node));
        assert!((x - p).length() < 1e-12);
    }

    #[test]
    fn node_owner_ranks_spans_partition_boundary() {
        let mut g = grid();
        g.set_cell_owners(vec![0, 0, 1, 1, 0, 0, 1, 1], 2).unwrap();
        let geo = g.geometry();
        // node at x = 1.0, y = 0.5 touches cells 1, 2, 5, 6
        assert_eq!(geo.node_owner_ranks(7), vec![0, 1]);
        assert_eq!(geo.node_owner_ranks(0), vec![0]);
        assert_eq!(geo.primary_rank(7), 0);
    }

    #[test]
    fn set_cell_owners_rejects_bad_partitions() {
        let mut g = grid();
        assert!(g.set_cell_owners(vec![0; 3], 1).is_err());
        assert!(g.set_cell_owners(vec![2; 8], 2).is_err());
    }

    #[test]
    fn reset_activates_only_occupied_cells() {
        let mut g = grid();
        let (geo, nodes) = g.split_mut();
        nodes.mass[0][3] = 4.0;
        reset_and_activate(geo, nodes, [0]);
        assert_eq!(nodes.mass[0][3], 0.0);
        assert_eq!(nodes.active_nodes().collect::<Vec<_>>(), vec![0, 1, 5, 6]);
    }
}
