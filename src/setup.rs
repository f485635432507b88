//! Model initialisation.
//!
//! The stepper pulls materials, mesh, points and loads from a
//! [`ModelLoader`], in that order, before the first step.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::{Grid, LiquidState, MaterialPoint, SolidState};
use crate::error::InitError;
use crate::materials::utils::check;
use crate::materials::{ConstitutiveModel, FluidParams, MaterialTable};
use crate::math::{Real, Vector};
use crate::solver::LoadSet;

pub trait ModelLoader: Send {
    fn materials(&mut self) -> Result<MaterialTable, InitError>;

    fn mesh(&mut self) -> Result<Grid, InitError>;

    /// The complete initial point set. Every rank receives all of it.
    fn particles(&mut self, grid: &Grid) -> Result<Vec<MaterialPoint>, InitError>;

    fn loads(&mut self, grid: &Grid) -> Result<LoadSet, InitError>;
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MeshSpec {
    pub origin: Vector,
    pub spacing: Real,
    pub cells_x: usize,
    pub cells_y: usize,
}

impl MeshSpec {
    pub fn new(origin: Vector, spacing: Real, cells_x: usize, cells_y: usize) -> Self {
        Self {
            origin,
            spacing,
            cells_x,
            cells_y,
        }
    }

    /// Nodes on the bottom row.
    pub fn bottom_nodes(&self) -> impl Iterator<Item = usize> {
        0..=self.cells_x
    }

    /// Nodes on the left and right columns.
    pub fn side_nodes(&self) -> impl Iterator<Item = usize> + '_ {
        let row = self.cells_x + 1;
        (0..=self.cells_y).flat_map(move |j| [j * row, j * row + self.cells_x])
    }
}

/// In-memory model description.
#[derive(Clone, Debug)]
pub struct ScenarioModel {
    pub mesh: MeshSpec,
    pub materials: Vec<Arc<dyn ConstitutiveModel>>,
    pub points: Vec<MaterialPoint>,
    pub loads: LoadSet,
}

impl ScenarioModel {
    pub fn new(mesh: MeshSpec) -> Self {
        Self {
            mesh,
            materials: Vec::new(),
            points: Vec::new(),
            loads: LoadSet::default(),
        }
    }

    pub fn with_material(mut self, model: Arc<dyn ConstitutiveModel>) -> Self {
        self.materials.push(model);
        self
    }

    pub fn with_points(mut self, points: impl IntoIterator<Item = MaterialPoint>) -> Self {
        self.points.extend(points);
        self
    }

    pub fn with_loads(mut self, loads: LoadSet) -> Self {
        self.loads = loads;
        self
    }

    /// Saturated column filling the lower `fill_rows` rows of the mesh with
    /// `per_side × per_side` mixture points per cell.
    pub fn saturated_column(
        mut self,
        fill_rows: usize,
        per_side: usize,
        porosity: Real,
        grain_density: Real,
        fluid: &FluidParams,
    ) -> Self {
        let h = self.mesh.spacing / per_side as Real;
        let volume = h * h;
        let mut id = self.points.iter().map(|p| p.id + 1).max().unwrap_or(0);
        for j in 0..fill_rows.min(self.mesh.cells_y) * per_side {
            for i in 0..self.mesh.cells_x * per_side {
                let position = self.mesh.origin + Vector::new((i as Real + 0.5) * h, (j as Real + 0.5) * h);
                self.points.push(MaterialPoint::mixture(
                    id,
                    position,
                    volume,
                    porosity,
                    SolidState::new(0, grain_density),
                    LiquidState::new(fluid),
                ));
                id += 1;
            }
        }
        self
    }
}

impl ModelLoader for ScenarioModel {
    fn materials(&mut self) -> Result<MaterialTable, InitError> {
        if self.materials.is_empty() {
            return Err(InitError::new("no materials defined"));
        }
        let mut table = MaterialTable::new();
        for model in &self.materials {
            table.insert(Arc::clone(model));
        }
        Ok(table)
    }

    fn mesh(&mut self) -> Result<Grid, InitError> {
        let spec = &self.mesh;
        Grid::uniform(spec.origin, spec.spacing, spec.cells_x, spec.cells_y)
            .map_err(|e| InitError::new(e.to_string()))
    }

    fn particles(&mut self, grid: &Grid) -> Result<Vec<MaterialPoint>, InitError> {
        let mut ids = HashSet::with_capacity(self.points.len());
        for point in &self.points {
            if !ids.insert(point.id) {
                return Err(InitError::new(format!("duplicate point id {}", point.id)));
            }
            if !(point.volume.is_finite() && point.volume > 0.0) {
                return Err(InitError::new(format!("point {} has volume {}", point.id, point.volume)));
            }
            if !check::porosity_ok(point.porosity) {
                return Err(InitError::new(format!(
                    "point {} has porosity {}",
                    point.id, point.porosity
                )));
            }
            let solid_ok = point.solid_state().is_none_or(|s| check::density_ok(s.density));
            let liquid_ok = point.liquid_state().is_none_or(|l| check::density_ok(l.density));
            if !(solid_ok && liquid_ok) {
                return Err(InitError::new(format!("point {} has an invalid density", point.id)));
            }
            if grid.geometry().locate(point.position).is_none() {
                return Err(InitError::new(format!(
                    "point {} at ({}, {}) lies outside the mesh",
                    point.id, point.position.x, point.position.y
                )));
            }
        }
        Ok(self.points.clone())
    }

    fn loads(&mut self, grid: &Grid) -> Result<LoadSet, InitError> {
        self.loads
            .check_nodes(grid.geometry().node_count())
            .map_err(|node| InitError::new(format!("load references missing node {node}")))?;
        Ok(self.loads.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::materials::LinearElastic;

    fn model() -> ScenarioModel {
        ScenarioModel::new(MeshSpec::new(Vector::ZERO, 0.5, 2, 4))
            .with_material(Arc::new(LinearElastic::new(1.0e6, 0.3).unwrap()))
            .saturated_column(2, 2, 0.4, 2650.0, &FluidParams::water())
    }

    #[test]
    fn column_fills_lower_rows() {
        let mut model = model();
        let grid = model.mesh().unwrap();
        let points = model.particles(&grid).unwrap();
        assert_eq!(points.len(), 2 * 2 * 2 * 2);
        assert!(points.iter().all(|p| p.position.y < 1.0));
        assert!((points[0].volume - 0.0625).abs() < 1e-12);
    }

    #[test]
    fn boundary_node_helpers() {
        let spec = MeshSpec::new(Vector::ZERO, 1.0, 2, 1);
        assert_eq!(spec.bottom_nodes().collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(spec.side_nodes().collect::<Vec<_>>(), vec![0, 2, 3, 5]);
    }

    #[test]
    fn duplicate_ids_fail_particle_stage() {
        let mut model = model();
        let duplicate = model.points[0].clone();
        model.points.push(duplicate);
        let grid = model.mesh().unwrap();
        assert!(model.particles(&grid).is_err());
    }

    #[test]
    fn missing_materials_fail() {
        let mut model = ScenarioModel::new(MeshSpec::new(Vector::ZERO, 1.0, 1, 1));
        assert!(model.materials().is_err());
    }
}
