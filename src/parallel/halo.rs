//! Cross-partition reduction of shared node quantities.
//!
//! A node is shared when cells owned by two or more ranks touch it. After a
//! synchronisation every owner holds the sum of all owners' contributions,
//! added in rank order so that all owners agree to the last bit.

use std::collections::HashMap;
use std::sync::Arc;

use bevy::log::debug;
use indexmap::IndexMap;

use crate::core::{GridGeometry, NodeFields, NodeId, Phase};
use crate::error::{MpmError, MpmResult};
use crate::math::Real;

use super::comm::{Communicator, Packet};

/// A node field that can be reduced across partitions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeQuantity {
    Mass(Phase),
    Momentum(Phase),
    ExternalForce(Phase),
    InternalForce(Phase),
    DragCoefficient,
    Pressure(Phase),
}

/// Accessor and mutator of one node quantity.
pub trait HaloField {
    fn key(&self) -> NodeQuantity;

    /// Values per node.
    fn width(&self) -> usize;

    fn read(&self, node: NodeId, out: &mut [Real]);

    fn write(&mut self, node: NodeId, values: &[Real]);
}

/// [`HaloField`] view of one quantity of the node accumulators.
pub struct NodeFieldView<'a> {
    nodes: &'a mut NodeFields,
    quantity: NodeQuantity,
}

impl<'a> NodeFieldView<'a> {
    pub fn new(nodes: &'a mut NodeFields, quantity: NodeQuantity) -> Self {
        Self { nodes, quantity }
    }
}

impl HaloField for NodeFieldView<'_> {
    fn key(&self) -> NodeQuantity {
        self.quantity
    }

    fn width(&self) -> usize {
        match self.quantity {
            NodeQuantity::Mass(_) | NodeQuantity::DragCoefficient | NodeQuantity::Pressure(_) => 1,
            NodeQuantity::Momentum(_)
            | NodeQuantity::ExternalForce(_)
            | NodeQuantity::InternalForce(_) => 2,
        }
    }

    fn read(&self, node: NodeId, out: &mut [Real]) {
        let n = &*self.nodes;
        match self.quantity {
            NodeQuantity::Mass(phase) => out[0] = n.mass[phase.index()][node],
            NodeQuantity::DragCoefficient => out[0] = n.drag_coefficient[node],
            NodeQuantity::Pressure(phase) => out[0] = n.pressure[phase.index()][node],
            NodeQuantity::Momentum(phase) => out.copy_from_slice(&n.momentum[phase.index()][node].to_array()),
            NodeQuantity::ExternalForce(phase) => {
                out.copy_from_slice(&n.external_force[phase.index()][node].to_array())
            }
            NodeQuantity::InternalForce(phase) => {
                out.copy_from_slice(&n.internal_force[phase.index()][node].to_array())
            }
        }
    }

    fn write(&mut self, node: NodeId, values: &[Real]) {
        let n = &mut *self.nodes;
        match self.quantity {
            NodeQuantity::Mass(phase) => n.mass[phase.index()][node] = values[0],
            NodeQuantity::DragCoefficient => n.drag_coefficient[node] = values[0],
            NodeQuantity::Pressure(phase) => n.pressure[phase.index()][node] = values[0],
            NodeQuantity::Momentum(phase) => {
                n.momentum[phase.index()][node] = [values[0], values[1]].into()
            }
            NodeQuantity::ExternalForce(phase) => {
                n.external_force[phase.index()][node] = [values[0], values[1]].into()
            }
            NodeQuantity::InternalForce(phase) => {
                n.internal_force[phase.index()][node] = [values[0], values[1]].into()
            }
        }
    }
}

/// What this rank last contributed and received for one node.
#[derive(Clone, Debug)]
struct LedgerEntry {
    local: Vec<Real>,
    total: Vec<Real>,
}

pub struct HaloExchange {
    comm: Arc<dyn Communicator>,
    /// Shared node -> owning ranks, ascending by node id.
    shared: IndexMap<NodeId, Vec<usize>>,
    ledger: HashMap<NodeQuantity, HashMap<NodeId, LedgerEntry>>,
}

impl HaloExchange {
    pub fn new(comm: Arc<dyn Communicator>) -> Self {
        Self {
            comm,
            shared: IndexMap::new(),
            ledger: HashMap::new(),
        }
    }

    pub fn rank(&self) -> usize {
        self.comm.rank()
    }

    pub fn size(&self) -> usize {
        self.comm.size()
    }

    pub fn shared_nodes(&self) -> impl Iterator<Item = (NodeId, &[usize])> + '_ {
        self.shared.iter().map(|(&node, ranks)| (node, ranks.as_slice()))
    }

    /// Recompute the shared nodes after a change of cell ownership.
    pub fn rebuild(&mut self, geometry: &GridGeometry) {
        let rank = self.rank();
        self.shared.clear();
        self.ledger.clear();
        if self.size() == 1 {
            return;
        }
        for node in 0..geometry.node_count() {
            let owners = geometry.node_owner_ranks(node);
            if owners.len() >= 2 && owners.contains(&rank) {
                self.shared.insert(node, owners);
            }
        }
        debug!("rank {rank}: {} halo nodes", self.shared.len());
    }

    /// Forget every previous contribution. Call whenever the node
    /// accumulators are reset.
    pub fn reset_ledger(&mut self) {
        self.ledger.clear();
    }

    /// Forget previous contributions of one quantity, e.g. after the field
    /// was overwritten with something that is not a sum.
    pub fn forget(&mut self, quantity: NodeQuantity) {
        self.ledger.remove(&quantity);
    }

    pub fn sync_quantity(&mut self, nodes: &mut NodeFields, quantity: NodeQuantity) -> MpmResult<()> {
        self.synchronize(&mut NodeFieldView::new(nodes, quantity))
    }

    /// Sum `field` over the owners of every shared node.
    ///
    /// Collective: every rank must call it with the same quantity, even when
    /// it holds no shared nodes. Repeating the call without touching the
    /// field leaves it unchanged.
    pub fn synchronize(&mut self, field: &mut impl HaloField) -> MpmResult<()> {
        if self.size() == 1 {
            return Ok(());
        }
        let (key, width) = (field.key(), field.width());
        let ledger = self.ledger.entry(key).or_default();

        let mut current = vec![0.0; width];
        let mut nodes = Vec::with_capacity(self.shared.len());
        let mut values = Vec::with_capacity(self.shared.len() * width);
        for &node in self.shared.keys() {
            field.read(node, &mut current);
            let local = match ledger.get(&node) {
                Some(entry) if entry.total == current => entry.local.clone(),
                // the field was modified since the last exchange
                Some(entry) => current
                    .iter()
                    .zip(entry.total.iter().zip(&entry.local))
                    .map(|(c, (total, local))| c - (total - local))
                    .collect(),
                None => current.clone(),
            };
            nodes.push(node);
            values.extend_from_slice(&local);
        }

        let gathered = self.comm.all_gather(Packet::NodeValues {
            width,
            nodes,
            values,
        })?;

        let mut totals: IndexMap<NodeId, Vec<Real>> =
            self.shared.keys().map(|&node| (node, vec![0.0; width])).collect();
        let mut locals: HashMap<NodeId, Vec<Real>> = HashMap::with_capacity(self.shared.len());
        for (source, packet) in gathered.into_iter().enumerate() {
            let Packet::NodeValues {
                width: w,
                nodes,
                values,
            } = packet
            else {
                return Err(MpmError::Communication(format!(
                    "rank {source} sent a non-node packet during halo exchange"
                )));
            };
            if w != width {
                return Err(MpmError::Communication(format!(
                    "rank {source} synchronised width {w}, expected {width} for {key:?}"
                )));
            }
            for (node, chunk) in nodes.iter().zip(values.chunks_exact(width)) {
                if source == self.comm.rank() {
                    locals.insert(*node, chunk.to_vec());
                }
                if let Some(total) = totals.get_mut(node) {
                    for (t, v) in total.iter_mut().zip(chunk) {
                        *t += v;
                    }
                }
            }
        }

        for (node, total) in totals {
            field.write(node, &total);
            let local = locals.remove(&node).unwrap_or_else(|| vec![0.0; width]);
            ledger.insert(node, LedgerEntry { local, total });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Grid;
    use crate::math::Vector;
    use crate::parallel::comm::{SingleRank, ThreadGroup};

    #[test]
    fn single_rank_is_a_no_op() {
        let mut grid = Grid::uniform(Vector::ZERO, 1.0, 2, 1).unwrap();
        let mut halo = HaloExchange::new(Arc::new(SingleRank));
        halo.rebuild(grid.geometry());
        grid.nodes_mut().mass[0][1] = 3.0;
        halo.sync_quantity(grid.nodes_mut(), NodeQuantity::Mass(Phase::Solid)).unwrap();
        assert_eq!(grid.nodes().mass[0][1], 3.0);
        assert_eq!(halo.shared_nodes().count(), 0);
    }

    #[test]
    fn two_ranks_sum_shared_nodes_idempotently() {
        let comms = ThreadGroup::communicators(2);
        let results: Vec<Vec<Real>> = std::thread::scope(|s| {
            let handles: Vec<_> = comms
                .into_iter()
                .map(|comm| {
                    s.spawn(move || {
                        let rank = comm.rank();
                        let mut grid = Grid::uniform(Vector::ZERO, 1.0, 2, 1).unwrap();
                        grid.set_cell_owners(vec![0, 1], 2).unwrap();
                        let mut halo = HaloExchange::new(Arc::new(comm));
                        halo.rebuild(grid.geometry());
                        // nodes 1 and 4 lie on the partition boundary
                        let nodes = grid.nodes_mut();
                        nodes.mass[0][1] = 1.0 + rank as Real;
                        nodes.mass[0][4] = 10.0 * (rank + 1) as Real;
                        nodes.mass[0][0] = 7.0;
                        let quantity = NodeQuantity::Mass(Phase::Solid);
                        halo.sync_quantity(nodes, quantity).unwrap();
                        let first = nodes.mass[0].clone();
                        halo.sync_quantity(nodes, quantity).unwrap();
                        assert_eq!(first, nodes.mass[0]);
                        nodes.mass[0].clone()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        for mass in &results {
            assert_eq!(mass[1], 3.0);
            assert_eq!(mass[4], 30.0);
            assert_eq!(mass[0], 7.0);
        }
    }

    #[test]
    fn local_changes_after_exchange_are_added_once() {
        let comms = ThreadGroup::communicators(2);
        let results: Vec<Vector> = std::thread::scope(|s| {
            let handles: Vec<_> = comms
                .into_iter()
                .map(|comm| {
                    s.spawn(move || {
                        let rank = comm.rank();
                        let mut grid = Grid::uniform(Vector::ZERO, 1.0, 2, 1).unwrap();
                        grid.set_cell_owners(vec![0, 1], 2).unwrap();
                        let mut halo = HaloExchange::new(Arc::new(comm));
                        halo.rebuild(grid.geometry());
                        let nodes = grid.nodes_mut();
                        let quantity = NodeQuantity::Momentum(Phase::Liquid);
                        nodes.momentum[1][1] = Vector::new(1.0, 2.0);
                        halo.sync_quantity(nodes, quantity).unwrap();
                        if rank == 1 {
                            nodes.momentum[1][1] += Vector::new(0.5, 0.0);
                        }
                        halo.sync_quantity(nodes, quantity).unwrap();
                        nodes.momentum[1][1]
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        for momentum in results {
            assert_eq!(momentum, Vector::new(2.5, 4.0));
        }
    }
}
