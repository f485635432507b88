//! Boundary conditions and applied loads.

use serde::{Deserialize, Serialize};

use crate::core::{NodeFields, NodeId, Phase, PointId};
use crate::math::Real;

/// Coordinate axis of a load or constraint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
}

impl Axis {
    #[inline(always)]
    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
        }
    }
}

/// Distributed surface load carried by a point, scaled by `sqrt(V)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParticleTraction {
    pub point: PointId,
    pub phase: Phase,
    pub axis: Axis,
    pub traction: Real,
}

/// Concentrated force on a single node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodalForce {
    pub node: NodeId,
    pub phase: Phase,
    pub axis: Axis,
    pub force: Real,
}

/// Prescribed nodal velocity component; zero fixes the node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodalVelocityConstraint {
    pub node: NodeId,
    pub phase: Phase,
    pub axis: Axis,
    pub velocity: Real,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointSelection {
    All,
    Ids(Vec<PointId>),
}

/// Prescribed point velocity component.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParticleVelocityConstraint {
    pub points: PointSelection,
    pub phase: Phase,
    pub axis: Axis,
    pub velocity: Real,
}

impl ParticleVelocityConstraint {
    pub fn selects(&self, id: PointId) -> bool {
        match &self.points {
            PointSelection::All => true,
            PointSelection::Ids(ids) => ids.contains(&id),
        }
    }
}

/// Every load and constraint of an analysis.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadSet {
    #[serde(default)]
    pub tractions: Vec<ParticleTraction>,
    #[serde(default)]
    pub nodal_forces: Vec<NodalForce>,
    #[serde(default)]
    pub nodal_velocity_constraints: Vec<NodalVelocityConstraint>,
    #[serde(default)]
    pub particle_velocity_constraints: Vec<ParticleVelocityConstraint>,
}

impl LoadSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_traction(mut self, traction: ParticleTraction) -> Self {
        self.tractions.push(traction);
        self
    }

    pub fn with_nodal_force(mut self, force: NodalForce) -> Self {
        self.nodal_forces.push(force);
        self
    }

    pub fn with_nodal_constraint(mut self, constraint: NodalVelocityConstraint) -> Self {
        self.nodal_velocity_constraints.push(constraint);
        self
    }

    pub fn with_particle_constraint(mut self, constraint: ParticleVelocityConstraint) -> Self {
        self.particle_velocity_constraints.push(constraint);
        self
    }

    /// Fix both axes of both phases on every listed node.
    pub fn fix_nodes(mut self, nodes: impl IntoIterator<Item = NodeId>) -> Self {
        for node in nodes {
            for phase in Phase::ALL {
                for axis in [Axis::X, Axis::Y] {
                    self.nodal_velocity_constraints.push(NodalVelocityConstraint {
                        node,
                        phase,
                        axis,
                        velocity: 0.0,
                    });
                }
            }
        }
        self
    }

    /// First node id that does not exist in a mesh of `node_count` nodes.
    pub fn check_nodes(&self, node_count: usize) -> Result<(), NodeId> {
        let nodes = self
            .nodal_forces
            .iter()
            .map(|f| f.node)
            .chain(self.nodal_velocity_constraints.iter().map(|c| c.node));
        for node in nodes {
            if node >= node_count {
                return Err(node);
            }
        }
        Ok(())
    }
}

/// Impose nodal velocity constraints on active nodes.
///
/// Momentum follows the constrained velocity. With `zero_acceleration` the
/// constrained acceleration component is cleared as well.
pub fn apply_velocity_constraints(
    nodes: &mut NodeFields,
    constraints: &[NodalVelocityConstraint],
    zero_acceleration: bool,
) {
    for constraint in constraints {
        let (node, ph, axis) = (constraint.node, constraint.phase.index(), constraint.axis.index());
        if node >= nodes.len() || !nodes.active[node] {
            continue;
        }
        nodes.velocity[ph][node][axis] = constraint.velocity;
        nodes.momentum[ph][node][axis] = nodes.mass[ph][node] * constraint.velocity;
        if zero_acceleration {
            nodes.acceleration[ph][node][axis] = 0.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Grid;
    use crate::math::Vector;

    #[test]
    fn constraints_touch_only_active_nodes() {
        let mut grid = Grid::uniform(Vector::ZERO, 1.0, 1, 1).unwrap();
        let nodes = grid.nodes_mut();
        nodes.active[0] = true;
        nodes.mass[0][0] = 2.0;
        nodes.velocity[0][0] = Vector::new(1.0, -3.0);
        nodes.velocity[0][1] = Vector::new(1.0, -3.0);
        nodes.acceleration[0][0] = Vector::new(5.0, 5.0);

        let loads = LoadSet::new().fix_nodes([0, 1]);
        apply_velocity_constraints(nodes, &loads.nodal_velocity_constraints, true);

        assert_eq!(nodes.velocity[0][0], Vector::ZERO);
        assert_eq!(nodes.acceleration[0][0], Vector::ZERO);
        assert_eq!(nodes.momentum[0][0], Vector::ZERO);
        // node 1 is inactive
        assert_eq!(nodes.velocity[0][1], Vector::new(1.0, -3.0));
    }

    #[test]
    fn prescribed_velocity_sets_momentum() {
        let mut grid = Grid::uniform(Vector::ZERO, 1.0, 1, 1).unwrap();
        let nodes = grid.nodes_mut();
        nodes.active[2] = true;
        nodes.mass[1][2] = 4.0;
        let constraint = NodalVelocityConstraint {
            node: 2,
            phase: Phase::Liquid,
            axis: Axis::X,
            velocity: 0.5,
        };
        apply_velocity_constraints(nodes, &[constraint], false);
        assert_eq!(nodes.velocity[1][2], Vector::new(0.5, 0.0));
        assert_eq!(nodes.momentum[1][2], Vector::new(2.0, 0.0));
    }

    #[test]
    fn loads_parse_from_json() {
        let json = r#"{
            "nodal_forces": [{ "node": 3, "phase": "solid", "axis": "y", "force": -10.0 }],
            "particle_velocity_constraints": [
                { "points": "all", "phase": "liquid", "axis": "x", "velocity": 0.0 },
                { "points": { "ids": [1, 2] }, "phase": "solid", "axis": "y", "velocity": 1.0 }
            ]
        }"#;
        let loads: LoadSet = serde_json::from_str(json).unwrap();
        assert_eq!(loads.nodal_forces[0].axis, Axis::Y);
        assert!(loads.particle_velocity_constraints[0].selects(99));
        assert!(loads.particle_velocity_constraints[1].selects(2));
        assert!(!loads.particle_velocity_constraints[1].selects(3));
        assert_eq!(loads.check_nodes(4), Ok(()));
        assert_eq!(loads.check_nodes(3), Err(3));
    }
}
