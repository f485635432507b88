//! Particle-to-Grid (P2G) transfer operations
//!
//! Additive scatters of point quantities onto the nodes of their cells.
//! Points are visited in id order, so a fixed partition produces the same
//! sums on every run.

use crate::core::{GridGeometry, MaterialPoint, NodeFields, Phase, ShapeFunctions};
use crate::materials::families;
use crate::math::{Real, Vector};

use super::loads::{NodalForce, ParticleTraction};
use super::phase_table::ops;

/// Located points paired with their shape functions.
#[inline]
fn located<'a>(
    points: &'a [MaterialPoint],
    cache: &'a [ShapeFunctions],
) -> impl Iterator<Item = (&'a MaterialPoint, &'a ShapeFunctions)> + 'a {
    points
        .iter()
        .zip(cache.iter())
        .filter(|(point, _)| point.cell.is_some())
}

/// Scatter phase mass and momentum.
pub fn map_mass_momentum(points: &[MaterialPoint], cache: &[ShapeFunctions], nodes: &mut NodeFields) {
    for (point, sf) in located(points, cache) {
        for &phase in ops(point.phase()).node_phases {
            let ph = phase.index();
            let mass = point.phase_mass(phase);
            let momentum = point.momentum(phase);
            for (node, weight, _) in sf.iter() {
                nodes.mass[ph][node] += weight * mass;
                nodes.momentum[ph][node] += momentum * weight;
            }
        }
    }
}

/// Body force `m g` into each carried phase slot.
///
/// Liquid weight also loads the mixture slot, which balances the whole
/// saturated column.
pub fn map_body_force(
    points: &[MaterialPoint],
    cache: &[ShapeFunctions],
    gravity: Vector,
    external_force: &mut [Vec<Vector>; 2],
) {
    for (point, sf) in located(points, cache) {
        let solid_weight = gravity * point.phase_mass(Phase::Solid);
        let liquid_weight = gravity * point.phase_mass(Phase::Liquid);
        for (node, weight, _) in sf.iter() {
            external_force[Phase::Solid.index()][node] += (solid_weight + liquid_weight) * weight;
            external_force[Phase::Liquid.index()][node] += liquid_weight * weight;
        }
    }
}

/// Point tractions, scaled by the point's edge length `sqrt(V)`.
pub fn map_tractions(
    points: &[MaterialPoint],
    cache: &[ShapeFunctions],
    tractions: &[ParticleTraction],
    external_force: &mut [Vec<Vector>; 2],
) {
    for traction in tractions {
        let Ok(index) = points.binary_search_by_key(&traction.point, |p| p.id) else {
            // owned by another partition
            continue;
        };
        let point = &points[index];
        if point.cell.is_none() || !point.carries(traction.phase) {
            continue;
        }
        let mut force = Vector::ZERO;
        force[traction.axis.index()] = traction.traction * point.volume.sqrt();
        for (node, weight, _) in cache[index].iter() {
            external_force[traction.phase.index()][node] += force * weight;
            if traction.phase == Phase::Liquid {
                external_force[Phase::Solid.index()][node] += force * weight;
            }
        }
    }
}

/// Concentrated nodal forces. Only the node's primary rank applies them, so
/// the halo sum counts each force once.
pub fn apply_nodal_forces(
    geometry: &GridGeometry,
    forces: &[NodalForce],
    rank: usize,
    external_force: &mut [Vec<Vector>; 2],
) {
    for force in forces {
        if geometry.primary_rank(force.node) != rank {
            continue;
        }
        external_force[force.phase.index()][force.node][force.axis.index()] += force.force;
    }
}

/// Internal forces of every point through the phase table.
pub fn map_internal_force(
    points: &[MaterialPoint],
    cache: &[ShapeFunctions],
    internal_force: &mut [Vec<Vector>; 2],
) {
    for (point, sf) in located(points, cache) {
        (ops(point.phase()).internal_force)(point, sf, internal_force);
    }
}

/// Darcy drag coefficient of liquid-carrying points.
pub fn map_drag(
    points: &[MaterialPoint],
    cache: &[ShapeFunctions],
    drag_coefficient: &mut [Real],
) {
    for (point, sf) in located(points, cache) {
        let Some(liquid) = point.liquid_state() else {
            continue;
        };
        let coefficient = families::drag_coefficient(
            point.porosity,
            liquid.density,
            liquid.permeability,
        ) * point.volume;
        if coefficient == 0.0 {
            continue;
        }
        for (node, weight, _) in sf.iter() {
            drag_coefficient[node] += weight * coefficient;
        }
    }
}

/// Mass-weighted pressure of `phase`.
pub fn map_pressure(
    points: &[MaterialPoint],
    cache: &[ShapeFunctions],
    phase: Phase,
    pressure: &mut [Real],
) {
    for (point, sf) in located(points, cache) {
        let Some(p) = point.pressure(phase) else {
            continue;
        };
        let weighted = point.phase_mass(phase) * p;
        for (node, weight, _) in sf.iter() {
            pressure[node] += weight * weighted;
        }
    }
}
