#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use mpm2p::core::Grid;
use mpm2p::error::{InitError, WriterError};
use mpm2p::io::{OutputFrame, ResultWriter};
use mpm2p::materials::MaterialTable;
use mpm2p::math::{Real, Vector};
use mpm2p::setup::ModelLoader;
use mpm2p::solver::{Axis, LoadSet, NodalVelocityConstraint};
use mpm2p::{
    AnalysisConfig, FluidParams, LinearElastic, MaterialPoint, MeshSpec, Phase, ScenarioModel, SolidState,
};

pub fn elastic() -> Arc<LinearElastic> {
    Arc::new(LinearElastic::new(1.0e6, 0.3).unwrap())
}

pub fn config(dt: Real, nsteps: u64) -> AnalysisConfig {
    AnalysisConfig::new(dt, nsteps).with_threads(2)
}

/// Saturated column on a fixed base between two rollers.
pub fn saturated_column(cells_x: usize, cells_y: usize, fill_rows: usize) -> ScenarioModel {
    let mesh = MeshSpec::new(Vector::ZERO, 0.25, cells_x, cells_y);
    let mut loads = LoadSet::new().fix_nodes(mesh.bottom_nodes());
    for node in mesh.side_nodes() {
        for phase in Phase::ALL {
            loads = loads.with_nodal_constraint(NodalVelocityConstraint {
                node,
                phase,
                axis: Axis::X,
                velocity: 0.0,
            });
        }
    }
    ScenarioModel::new(mesh)
        .with_material(elastic())
        .with_loads(loads)
        .saturated_column(fill_rows, 2, 0.4, 2650.0, &FluidParams::water())
}

/// A 2×2-cell block of dry solid points, free of any constraint, whose
/// lower edge sits `drop_height` above the bottom of a 4×`cells_y` mesh.
pub fn falling_block(cells_y: usize, drop_height: Real) -> ScenarioModel {
    let spacing = 0.25;
    let h = spacing / 2.0;
    let mut points = Vec::new();
    for j in 0..4 {
        for i in 0..4 {
            let position = Vector::new(spacing + (i as Real + 0.5) * h, drop_height + (j as Real + 0.5) * h);
            points.push(MaterialPoint::solid(
                points.len() as u64,
                position,
                h * h,
                0.3,
                SolidState::new(0, 2000.0),
            ));
        }
    }
    ScenarioModel::new(MeshSpec::new(Vector::ZERO, spacing, 4, cells_y))
        .with_material(elastic())
        .with_points(points)
}

pub fn assert_close(a: Real, b: Real, tolerance: Real, what: &str) {
    assert!(
        (a - b).abs() <= tolerance * b.abs().max(1.0),
        "{what}: {a} vs {b}"
    );
}

/// Compare two point sets by id.
pub fn assert_same_points(mut a: Vec<MaterialPoint>, mut b: Vec<MaterialPoint>, tolerance: Real) {
    a.sort_by_key(|p| p.id);
    b.sort_by_key(|p| p.id);
    assert_eq!(a.len(), b.len());
    for (p, q) in a.iter().zip(&b) {
        assert_eq!(p.id, q.id);
        assert_close(p.position.x, q.position.x, tolerance, "x");
        assert_close(p.position.y, q.position.y, tolerance, "y");
        assert_close(p.volume, q.volume, tolerance, "volume");
        for phase in Phase::ALL {
            if let (Some(u), Some(v)) = (p.velocity(phase), q.velocity(phase)) {
                assert_close(u.x, v.x, tolerance, "vx");
                assert_close(u.y, v.y, tolerance, "vy");
            }
            if let (Some(s), Some(t)) = (p.pressure(phase), q.pressure(phase)) {
                assert_close(s, t, tolerance, "pressure");
            }
        }
    }
}

/// Loader that fails at the mesh stage.
pub struct BrokenMesh;

impl ModelLoader for BrokenMesh {
    fn materials(&mut self) -> Result<MaterialTable, InitError> {
        let mut table = MaterialTable::new();
        table.insert(elastic());
        Ok(table)
    }

    fn mesh(&mut self) -> Result<Grid, InitError> {
        Err(InitError::new("mesh file is empty"))
    }

    fn particles(&mut self, _grid: &Grid) -> Result<Vec<MaterialPoint>, InitError> {
        Ok(Vec::new())
    }

    fn loads(&mut self, _grid: &Grid) -> Result<LoadSet, InitError> {
        Ok(LoadSet::default())
    }
}

/// Counts its calls and always fails.
pub struct FailingWriter {
    pub calls: Arc<AtomicUsize>,
}

impl ResultWriter for FailingWriter {
    fn name(&self) -> &str {
        "failing"
    }

    fn write(&mut self, _frame: &OutputFrame<'_>) -> Result<(), WriterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(WriterError::Other("disk full".to_string()))
    }
}
