//! Domain decomposition and point migration.

use std::sync::Arc;

use bevy::log::{debug, info};

use crate::core::{CellId, Grid, GridGeometry, ParticleSet};
use crate::error::{MpmError, MpmResult};

use super::comm::{Communicator, Packet, all_reduce_counts, any_rank};
use super::halo::HaloExchange;

/// Cell adjacency with per-cell work weights.
#[derive(Clone, Debug, PartialEq)]
pub struct CellGraph {
    pub adjacency: Vec<Vec<CellId>>,
    pub weights: Vec<u64>,
}

impl CellGraph {
    /// Edge-adjacent cells, weighted by point count plus one so that empty
    /// cells still get spread out.
    pub fn from_geometry(geometry: &GridGeometry, counts: &[u64]) -> Self {
        let cells = geometry.cell_count();
        Self {
            adjacency: (0..cells).map(|cell| geometry.cell_neighbors(cell)).collect(),
            weights: (0..cells).map(|cell| counts.get(cell).copied().unwrap_or(0) + 1).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}

/// Assigns every cell of a graph to one of `parts` partitions.
///
/// Must be deterministic: every rank computes the partition independently
/// from identical input.
pub trait GraphPartitioner: Send + Sync {
    fn partition(&self, graph: &CellGraph, parts: usize) -> MpmResult<Vec<usize>>;
}

/// Contiguous row-major blocks of roughly equal weight.
#[derive(Clone, Copy, Debug, Default)]
pub struct BlockPartitioner;

impl GraphPartitioner for BlockPartitioner {
    fn partition(&self, graph: &CellGraph, parts: usize) -> MpmResult<Vec<usize>> {
        if parts == 0 {
            return Err(MpmError::Partition("cannot split into zero parts".to_string()));
        }
        let total: u64 = graph.weights.iter().sum();
        let mut owners = Vec::with_capacity(graph.len());
        let mut part = 0;
        let mut accumulated = 0;
        for &weight in &graph.weights {
            // move on once this part has reached its share of the total
            while part + 1 < parts && accumulated * parts as u64 >= total * (part as u64 + 1) {
                part += 1;
            }
            owners.push(part);
            accumulated += weight;
        }
        Ok(owners)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DecompositionSummary {
    pub owned_cells: usize,
    pub owned_points: usize,
    pub migrated_out: usize,
    pub migrated_in: usize,
}

pub struct DomainDecomposer {
    comm: Arc<dyn Communicator>,
    partitioner: Box<dyn GraphPartitioner>,
}

impl DomainDecomposer {
    pub fn new(comm: Arc<dyn Communicator>, partitioner: Box<dyn GraphPartitioner>) -> Self {
        Self { comm, partitioner }
    }

    /// Recompute cell ownership and move points to their new owners.
    ///
    /// With `full_reset` every rank must hold the complete initial point set;
    /// each keeps the points in its own cells and discards the rest. Otherwise
    /// the point sets are disjoint and points leaving a rank are migrated.
    pub fn redecompose(
        &self,
        full_reset: bool,
        grid: &mut Grid,
        particles: &mut ParticleSet,
        halo: &mut HaloExchange,
    ) -> MpmResult<DecompositionSummary> {
        let (rank, size) = (self.comm.rank(), self.comm.size());
        let geometry = grid.geometry();
        for point in particles.points_mut() {
            point.cell = geometry.locate(point.position);
        }
        let lost = particles
            .points()
            .iter()
            .find(|p| p.cell.is_none())
            .map(|p| MpmError::ParticleOutsideDomain {
                id: p.id,
                position: p.position,
            });
        // disjoint point sets: the other ranks must learn about the failure
        // before they block in the next collective
        let remote_failure = !full_reset && any_rank(self.comm.as_ref(), lost.is_some())?;
        if let Some(err) = lost {
            return Err(err);
        }
        if remote_failure {
            return Err(MpmError::RemoteAbort);
        }

        let local_counts = particles.cell_counts(geometry.cell_count());
        let counts = if full_reset {
            local_counts
        } else {
            all_reduce_counts(self.comm.as_ref(), local_counts)?
        };
        let graph = CellGraph::from_geometry(geometry, &counts);
        let owners = self.partitioner.partition(&graph, size)?;
        grid.set_cell_owners(owners, size)?;
        halo.rebuild(grid.geometry());

        let mut summary = DecompositionSummary::default();
        if full_reset {
            let geometry = grid.geometry();
            particles.extract_where(|p| p.cell.is_some_and(|cell| geometry.cell_owner(cell) != rank));
        } else {
            let (out, incoming) = self.transfer_migrated(grid.geometry(), particles)?;
            summary.migrated_out = out;
            summary.migrated_in = incoming;
        }
        summary.owned_cells = grid.geometry().owned_cells(rank).count();
        summary.owned_points = particles.len();
        info!(
            "rank {rank}: {} decomposition, {} cells, {} points",
            if full_reset { "initial" } else { "rebalanced" },
            summary.owned_cells,
            summary.owned_points
        );
        Ok(summary)
    }

    /// Send every point located in a cell owned by another rank to that rank.
    ///
    /// Collective. Returns `(sent, received)`.
    pub fn transfer_migrated(
        &self,
        geometry: &GridGeometry,
        particles: &mut ParticleSet,
    ) -> MpmResult<(usize, usize)> {
        let rank = self.comm.rank();
        if self.comm.size() == 1 {
            return Ok((0, 0));
        }
        let outgoing: Vec<(usize, _)> = particles
            .extract_where(|p| p.cell.is_some_and(|cell| geometry.cell_owner(cell) != rank))
            .into_iter()
            .filter_map(|p| p.cell.map(|cell| (geometry.cell_owner(cell), p)))
            .collect();
        let sent = outgoing.len();

        let mut incoming = Vec::new();
        for (source, packet) in self.comm.all_gather(Packet::Points(outgoing))?.into_iter().enumerate() {
            let Packet::Points(points) = packet else {
                return Err(MpmError::Communication(format!(
                    "rank {source} sent a non-point packet during migration"
                )));
            };
            if source == rank {
                continue;
            }
            incoming.extend(points.into_iter().filter(|(dest, _)| *dest == rank).map(|(_, p)| p));
        }
        let received = incoming.len();
        particles.insert_batch(incoming);
        if sent + received > 0 {
            debug!("rank {rank}: migrated {sent} points out, {received} in");
        }
        Ok((sent, received))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{MaterialPoint, SolidState};
    use crate::math::Vector;
    use crate::parallel::comm::SingleRank;

    #[test]
    fn block_partition_is_contiguous_and_balanced() {
        let graph = CellGraph {
            adjacency: vec![Vec::new(); 8],
            weights: vec![1; 8],
        };
        let owners = BlockPartitioner.partition(&graph, 4).unwrap();
        assert_eq!(owners, vec![0, 0, 1, 1, 2, 2, 3, 3]);
        assert!(owners.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn heavy_cells_get_their_own_part() {
        let graph = CellGraph {
            adjacency: vec![Vec::new(); 4],
            weights: vec![9, 1, 1, 1],
        };
        let owners = BlockPartitioner.partition(&graph, 2).unwrap();
        assert_eq!(owners, vec![0, 1, 1, 1]);
    }

    #[test]
    fn graph_from_geometry_uses_edge_neighbours() {
        let grid = Grid::uniform(Vector::ZERO, 1.0, 3, 2).unwrap();
        let graph = CellGraph::from_geometry(grid.geometry(), &[2, 0, 0, 0, 0, 5]);
        assert_eq!(graph.adjacency[4], vec![3, 5, 1]);
        assert_eq!(graph.weights, vec![3, 1, 1, 1, 1, 6]);
    }

    #[test]
    fn single_rank_owns_everything() {
        let mut grid = Grid::uniform(Vector::ZERO, 1.0, 2, 2).unwrap();
        let comm: Arc<dyn Communicator> = Arc::new(SingleRank);
        let decomposer = DomainDecomposer::new(comm.clone(), Box::new(BlockPartitioner));
        let mut halo = HaloExchange::new(comm);
        let mut set = ParticleSet::from_points(
            (0..4)
                .map(|i| {
                    MaterialPoint::solid(
                        i,
                        Vector::new(0.5 + (i % 2) as f64, 0.5 + (i / 2) as f64),
                        1.0,
                        0.3,
                        SolidState::new(0, 2000.0),
                    )
                })
                .collect(),
        );
        let summary = decomposer.redecompose(true, &mut grid, &mut set, &mut halo).unwrap();
        assert_eq!(summary.owned_cells, 4);
        assert_eq!(summary.owned_points, 4);
        assert!(set.points().iter().all(|p| p.cell.is_some()));
    }

    #[test]
    fn redecompose_rejects_points_outside_the_mesh() {
        let mut grid = Grid::uniform(Vector::ZERO, 1.0, 1, 1).unwrap();
        let comm: Arc<dyn Communicator> = Arc::new(SingleRank);
        let decomposer = DomainDecomposer::new(comm.clone(), Box::new(BlockPartitioner));
        let mut halo = HaloExchange::new(comm);
        let mut set = ParticleSet::from_points(vec![MaterialPoint::solid(
            9,
            Vector::new(3.0, 0.5),
            1.0,
            0.3,
            SolidState::new(0, 2000.0),
        )]);
        let err = decomposer.redecompose(true, &mut grid, &mut set, &mut halo).unwrap_err();
        assert!(matches!(err, MpmError::ParticleOutsideDomain { id: 9, .. }));
    }
}
