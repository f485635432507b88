//! Materials for the two-phase stepper
//!
//! * `ConstitutiveModel` - effective-stress update for the solid skeleton
//! * `LinearElastic` - plane-strain Hooke's law
//! * `FluidParams` - pore-liquid properties and Darcy coupling

pub mod families;
pub mod linear_elastic;
pub mod utils;

use std::fmt::Debug;
use std::sync::Arc;

use crate::error::{InitError, MpmError, MpmResult};
use crate::math::Matrix;

pub use families::FluidParams;
pub use linear_elastic::LinearElastic;

pub type MaterialId = usize;

/// Effective-stress closure for the solid skeleton.
pub trait ConstitutiveModel: Debug + Send + Sync {
    fn name(&self) -> &str;

    /// Stress after applying `strain_increment` to `stress`.
    fn compute_stress(&self, stress: &Matrix, strain_increment: &Matrix) -> Matrix;
}

#[derive(Clone, Debug, Default)]
pub struct MaterialTable {
    models: Vec<Arc<dyn ConstitutiveModel>>,
}

impl MaterialTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, model: Arc<dyn ConstitutiveModel>) -> MaterialId {
        self.models.push(model);
        self.models.len() - 1
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn get(&self, id: MaterialId) -> MpmResult<&dyn ConstitutiveModel> {
        self.models
            .get(id)
            .map(|model| model.as_ref())
            .ok_or_else(|| MpmError::InvalidState(format!("unknown material id {id}")))
    }

    pub fn check(&self, id: MaterialId) -> Result<(), InitError> {
        if id < self.models.len() {
            Ok(())
        } else {
            Err(InitError::new(format!(
                "material id {id} not defined ({} materials loaded)",
                self.models.len()
            )))
        }
    }
}
