//! Pressure-coupled stress-strain update.
//!
//! Runs strictly in sequence: strain, volume, porosity, optional skeleton
//! pressure smoothing, effective stress, pore pressure, optional pore
//! pressure smoothing.

use crate::core::{Grid, MaterialPoint, NodeFields, ParticleSet, Phase, ShapeFunctions};
use crate::error::MpmResult;
use crate::materials::{MaterialTable, families};
use crate::math::{Real, outer_product, symmetric_part, zero_matrix};
use crate::parallel::HaloExchange;

use super::phase_table::ops;
use super::smoothing::smooth_pressure;

pub struct StressStrainUpdate<'a> {
    pub dt: Real,
    pub materials: &'a MaterialTable,
    pub pressure_smoothing: bool,
    pub pore_pressure_smoothing: bool,
}

impl StressStrainUpdate<'_> {
    pub fn run(
        &self,
        grid: &mut Grid,
        particles: &mut ParticleSet,
        halo: &mut HaloExchange,
    ) -> MpmResult<()> {
        let nodes = grid.nodes_mut();
        {
            let (points, cache) = particles.points_mut_and_cache();
            compute_strain(points, cache, nodes, self.dt);
            update_volume(points);
            update_porosity(points);
        }
        if self.pressure_smoothing {
            smooth_pressure(Phase::Solid, nodes, particles, halo)?;
        }
        compute_stress(particles.points_mut(), self.materials)?;
        {
            let (points, cache) = particles.points_mut_and_cache();
            update_pore_pressure(points, cache, nodes, self.dt);
        }
        if self.pore_pressure_smoothing {
            smooth_pressure(Phase::Liquid, nodes, particles, halo)?;
        }
        Ok(())
    }
}

/// Strain rate `sym(Σ v ⊗ ∇N)` from the nodal velocity of each point's
/// kinematic phase, and the increment `rate * dt`.
pub fn compute_strain(points: &mut [MaterialPoint], cache: &[ShapeFunctions], nodes: &NodeFields, dt: Real) {
    for (point, sf) in points.iter_mut().zip(cache.iter()) {
        if point.cell.is_none() {
            point.strain_rate = zero_matrix();
            point.strain_increment = zero_matrix();
            continue;
        }
        let ph = point.kinematic_phase().index();
        let gradient = sf
            .iter()
            .fold(zero_matrix(), |acc, (node, _, dn)| acc + outer_product(nodes.velocity[ph][node], dn));
        point.strain_rate = symmetric_part(&gradient);
        let increment = point.strain_rate * dt;
        point.strain_increment = increment;
        if let Some(solid) = point.solid_state_mut() {
            solid.strain += increment;
        }
    }
}

pub fn update_volume(points: &mut [MaterialPoint]) {
    for point in points.iter_mut().filter(|p| p.cell.is_some()) {
        point.volume *= 1.0 + point.volumetric_strain_increment();
    }
}

/// Solid volume is conserved: `n' = 1 - (1 - n) / (1 + Δε_v)`.
pub fn update_porosity(points: &mut [MaterialPoint]) {
    for point in points.iter_mut() {
        if point.cell.is_none() || !point.carries(Phase::Solid) {
            continue;
        }
        let dilation = 1.0 + point.volumetric_strain_increment();
        point.porosity = (1.0 - (1.0 - point.porosity) / dilation).clamp(0.0, 1.0);
    }
}

pub fn compute_stress(points: &mut [MaterialPoint], materials: &MaterialTable) -> MpmResult<()> {
    for point in points.iter_mut() {
        if point.cell.is_none() || !ops(point.phase()).updates_stress {
            continue;
        }
        let increment = point.strain_increment;
        if let Some(solid) = point.solid_state_mut() {
            let model = materials.get(solid.material)?;
            solid.stress = model.compute_stress(&solid.stress, &increment);
        }
    }
    Ok(())
}

/// Pore pressure from the volumetric strain rates of both phases.
pub fn update_pore_pressure(
    points: &mut [MaterialPoint],
    cache: &[ShapeFunctions],
    nodes: &NodeFields,
    dt: Real,
) {
    let divergence = |sf: &ShapeFunctions, ph: usize| -> Real {
        sf.iter()
            .map(|(node, _, dn)| nodes.velocity[ph][node].dot(dn))
            .sum()
    };
    for (point, sf) in points.iter_mut().zip(cache.iter()) {
        if point.cell.is_none() || !ops(point.phase()).updates_pore_pressure {
            continue;
        }
        let solid_rate = divergence(sf, Phase::Solid.index());
        let liquid_rate = divergence(sf, Phase::Liquid.index());
        let porosity = point.porosity;
        if let Some(liquid) = point.liquid_state_mut() {
            liquid.pore_pressure += families::pore_pressure_increment(
                dt,
                liquid.bulk_modulus,
                porosity,
                solid_rate,
                liquid_rate,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{LiquidState, SolidState, compute_shape_functions};
    use crate::materials::{FluidParams, LinearElastic};
    use crate::math::{Matrix, Vector, matrix_trace};
    use crate::parallel::{Communicator, SingleRank};
    use std::sync::Arc;

    /// Unit cell whose nodes move with `v = (rate * x, 0)`.
    fn stretching_grid(rate: Real, phase: Phase) -> Grid {
        let mut grid = Grid::uniform(Vector::ZERO, 1.0, 1, 1).unwrap();
        let positions: Vec<Vector> = (0..4).map(|n| grid.geometry().node_position(n)).collect();
        let nodes = grid.nodes_mut();
        for (node, x) in positions.iter().enumerate() {
            nodes.active[node] = true;
            nodes.velocity[phase.index()][node] = Vector::new(rate * x.x, 0.0);
        }
        grid
    }

    fn located(grid: &Grid, points: Vec<MaterialPoint>) -> ParticleSet {
        let mut set = ParticleSet::from_points(points);
        for point in set.points_mut() {
            point.cell = grid.geometry().locate(point.position);
        }
        let (points, cache) = set.points_and_cache_mut();
        compute_shape_functions(grid.geometry(), points, cache);
        set
    }

    #[test]
    fn uniaxial_stretch_updates_strain_volume_and_porosity() {
        let mut grid = stretching_grid(0.1, Phase::Solid);
        let mut materials = MaterialTable::new();
        materials.insert(Arc::new(LinearElastic::new(1.0e6, 0.3).unwrap()));
        let mut set = located(
            &grid,
            vec![MaterialPoint::solid(0, Vector::new(0.4, 0.6), 1.0, 0.5, SolidState::new(0, 2000.0))],
        );
        let comm: Arc<dyn Communicator> = Arc::new(SingleRank);
        let mut halo = HaloExchange::new(comm);
        let update = StressStrainUpdate {
            dt: 0.1,
            materials: &materials,
            pressure_smoothing: false,
            pore_pressure_smoothing: false,
        };
        update.run(&mut grid, &mut set, &mut halo).unwrap();

        let p = &set.points()[0];
        assert!((p.strain_increment.x_axis.x - 0.01).abs() < 1e-12);
        assert!(p.strain_increment.y_axis.y.abs() < 1e-12);
        assert!((matrix_trace(&p.strain_rate) - 0.1).abs() < 1e-12);
        assert!((p.volume - 1.01).abs() < 1e-12);
        assert!((p.porosity - (1.0 - 0.5 / 1.01)).abs() < 1e-12);
        let stress: Matrix = p.solid_state().unwrap().stress;
        assert!(stress.x_axis.x > 0.0);
        assert!((p.solid_state().unwrap().strain.x_axis.x - 0.01).abs() < 1e-12);
    }

    #[test]
    fn expanding_liquid_loses_pore_pressure() {
        let grid = stretching_grid(0.2, Phase::Liquid);
        let fluid = FluidParams::new("water", 1000.0, 1.0e6, 1.0e-3);
        let mut set = located(
            &grid,
            vec![MaterialPoint::liquid(
                0,
                Vector::new(0.5, 0.5),
                1.0,
                0.4,
                LiquidState::new(&fluid).with_pore_pressure(100.0),
            )],
        );
        let (points, cache) = set.points_mut_and_cache();
        update_pore_pressure(points, cache, grid.nodes(), 0.01);
        let expected = 100.0 - 0.01 * 1.0e6 / 0.4 * (0.4 * 0.2);
        let p = set.points()[0].pressure(Phase::Liquid).unwrap();
        assert!((p - expected).abs() < 1e-9);
    }
}
