//! Nodal pressure smoothing.
//!
//! Low-order point-to-grid mapping lets neighbouring points settle into a
//! checkerboard pressure pattern. Smoothing projects the point pressures of
//! one phase onto the nodes (mass-weighted) and interpolates them back.

use crate::config::MASS_TOLERANCE;
use crate::core::{NodeFields, ParticleSet, Phase};
use crate::error::MpmResult;
use crate::parallel::{HaloExchange, NodeQuantity};

use super::p2g::map_pressure;

pub fn smooth_pressure(
    phase: Phase,
    nodes: &mut NodeFields,
    particles: &mut ParticleSet,
    halo: &mut HaloExchange,
) -> MpmResult<()> {
    let ph = phase.index();
    let quantity = NodeQuantity::Pressure(phase);

    nodes.pressure[ph].fill(0.0);
    halo.forget(quantity);
    let (points, cache) = particles.points_and_cache();
    map_pressure(points, cache, phase, &mut nodes.pressure[ph]);
    halo.sync_quantity(nodes, quantity)?;

    for node in 0..nodes.len() {
        let mass = nodes.mass[ph][node];
        nodes.pressure[ph][node] = if mass > MASS_TOLERANCE {
            nodes.pressure[ph][node] / mass
        } else {
            0.0
        };
    }
    // the field now holds averages, not sums
    halo.forget(quantity);

    let (points, cache) = particles.points_mut_and_cache();
    for (point, sf) in points.iter_mut().zip(cache.iter()) {
        if point.cell.is_none() || !point.carries(phase) {
            continue;
        }
        let smoothed = sf.interpolate(|node| nodes.pressure[ph][node]);
        point.set_pressure(phase, smoothed);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Grid, LiquidState, MaterialPoint, compute_shape_functions};
    use crate::materials::FluidParams;
    use crate::math::{Real, Vector};
    use crate::parallel::{Communicator, SingleRank};
    use crate::solver::p2g::map_mass_momentum;
    use std::sync::Arc;

    #[test]
    fn checkerboard_pressure_is_averaged() {
        let mut grid = Grid::uniform(Vector::ZERO, 1.0, 1, 1).unwrap();
        let fluid = FluidParams::water();
        let corners = [(0.25, 0.25), (0.75, 0.25), (0.75, 0.75), (0.25, 0.75)];
        let pressures = [10.0, -10.0, 10.0, -10.0];
        let mut set = ParticleSet::from_points(
            corners
                .iter()
                .zip(pressures)
                .enumerate()
                .map(|(i, (&(x, y), p))| {
                    MaterialPoint::liquid(
                        i as u64,
                        Vector::new(x, y),
                        0.25,
                        1.0,
                        LiquidState::new(&fluid).with_pore_pressure(p),
                    )
                })
                .collect(),
        );
        for point in set.points_mut() {
            point.cell = grid.geometry().locate(point.position);
        }
        let (geometry, nodes) = grid.split_mut();
        {
            let (points, cache) = set.points_and_cache_mut();
            compute_shape_functions(geometry, points, cache);
        }
        let (points, cache) = set.points_and_cache();
        map_mass_momentum(points, cache, nodes);

        let comm: Arc<dyn Communicator> = Arc::new(SingleRank);
        let mut halo = HaloExchange::new(comm);
        smooth_pressure(Phase::Liquid, nodes, &mut set, &mut halo).unwrap();

        let total: Real = set
            .points()
            .iter()
            .filter_map(|p| p.pressure(Phase::Liquid))
            .map(Real::abs)
            .sum();
        assert!(total < 10.0 * 4.0 * 0.5);
    }
}
