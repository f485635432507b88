//! Material points for the two-phase stepper
//!
//! A point is solid skeleton, pore liquid, or a saturated mixture carrying
//! both. The phase set is closed, so the variant is an enum and per-phase
//! behaviour lives in the solver's phase table.

use serde::{Deserialize, Serialize};

use crate::materials::{FluidParams, MaterialId};
use crate::math::{
    DecomposedTensor, Matrix, Real, Vector, matrix_is_finite, matrix_trace, zero_matrix,
    zero_vector,
};

use super::grid::{CellId, Phase};

pub type PointId = u64;

/// Solid-skeleton state carried by a point.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SolidState {
    pub material: MaterialId,
    /// Grain density, `ρ_s`.
    pub density: Real,
    pub velocity: Vector,
    /// Effective stress, tension positive.
    pub stress: Matrix,
    pub strain: Matrix,
}

impl SolidState {
    pub fn new(material: MaterialId, density: Real) -> Self {
        Self {
            material,
            density,
            velocity: zero_vector(),
            stress: zero_matrix(),
            strain: zero_matrix(),
        }
    }

    pub fn with_velocity(mut self, velocity: Vector) -> Self {
        self.velocity = velocity;
        self
    }

    pub fn with_stress(mut self, stress: Matrix) -> Self {
        self.stress = stress;
        self
    }

    /// Mean pressure, compression positive.
    #[inline]
    pub fn mean_pressure(&self) -> Real {
        -DecomposedTensor::decompose(&self.stress).spherical_part
    }
}

/// Pore-liquid state carried by a point.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LiquidState {
    pub density: Real,
    pub bulk_modulus: Real,
    /// Intrinsic permeability in velocity units (Darcy `k`).
    pub permeability: Real,
    pub velocity: Vector,
    /// Pore pressure, compression positive.
    pub pore_pressure: Real,
}

impl LiquidState {
    pub fn new(fluid: &FluidParams) -> Self {
        Self {
            density: fluid.density,
            bulk_modulus: fluid.bulk_modulus,
            permeability: fluid.permeability,
            velocity: zero_vector(),
            pore_pressure: 0.0,
        }
    }

    pub fn with_velocity(mut self, velocity: Vector) -> Self {
        self.velocity = velocity;
        self
    }

    pub fn with_pore_pressure(mut self, pore_pressure: Real) -> Self {
        self.pore_pressure = pore_pressure;
        self
    }
}

/// Runtime tag of a point's phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PointPhase {
    Solid = 0,
    Liquid = 1,
    Mixture = 2,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum PhaseState {
    Solid(SolidState),
    Liquid(LiquidState),
    Mixture { solid: SolidState, liquid: LiquidState },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MaterialPoint {
    pub id: PointId,
    pub position: Vector,
    pub volume: Real,
    pub porosity: Real,
    /// Containing cell; stale between a position update and relocation,
    /// `None` outside the mesh.
    pub cell: Option<CellId>,
    pub state: PhaseState,

    // Per-step kinematics, recomputed by the stress-strain update
    #[serde(skip, default = "zero_matrix")]
    pub strain_rate: Matrix,
    #[serde(skip, default = "zero_matrix")]
    pub strain_increment: Matrix,
}

impl MaterialPoint {
    pub fn new(id: PointId, position: Vector, volume: Real, porosity: Real, state: PhaseState) -> Self {
        Self {
            id,
            position,
            volume,
            porosity,
            cell: None,
            state,
            strain_rate: zero_matrix(),
            strain_increment: zero_matrix(),
        }
    }

    pub fn solid(id: PointId, position: Vector, volume: Real, porosity: Real, solid: SolidState) -> Self {
        Self::new(id, position, volume, porosity, PhaseState::Solid(solid))
    }

    pub fn liquid(id: PointId, position: Vector, volume: Real, porosity: Real, liquid: LiquidState) -> Self {
        Self::new(id, position, volume, porosity, PhaseState::Liquid(liquid))
    }

    pub fn mixture(
        id: PointId,
        position: Vector,
        volume: Real,
        porosity: Real,
        solid: SolidState,
        liquid: LiquidState,
    ) -> Self {
        Self::new(id, position, volume, porosity, PhaseState::Mixture { solid, liquid })
    }

    pub fn phase(&self) -> PointPhase {
        match self.state {
            PhaseState::Solid(_) => PointPhase::Solid,
            PhaseState::Liquid(_) => PointPhase::Liquid,
            PhaseState::Mixture { .. } => PointPhase::Mixture,
        }
    }

    pub fn solid_state(&self) -> Option<&SolidState> {
        match &self.state {
            PhaseState::Solid(solid) | PhaseState::Mixture { solid, .. } => Some(solid),
            PhaseState::Liquid(_) => None,
        }
    }

    pub fn solid_state_mut(&mut self) -> Option<&mut SolidState> {
        match &mut self.state {
            PhaseState::Solid(solid) | PhaseState::Mixture { solid, .. } => Some(solid),
            PhaseState::Liquid(_) => None,
        }
    }

    pub fn liquid_state(&self) -> Option<&LiquidState> {
        match &self.state {
            PhaseState::Liquid(liquid) | PhaseState::Mixture { liquid, .. } => Some(liquid),
            PhaseState::Solid(_) => None,
        }
    }

    pub fn liquid_state_mut(&mut self) -> Option<&mut LiquidState> {
        match &mut self.state {
            PhaseState::Liquid(liquid) | PhaseState::Mixture { liquid, .. } => Some(liquid),
            PhaseState::Solid(_) => None,
        }
    }

    pub fn carries(&self, phase: Phase) -> bool {
        match phase {
            Phase::Solid => self.solid_state().is_some(),
            Phase::Liquid => self.liquid_state().is_some(),
        }
    }

    /// Mass of `phase` held by this point: `(1-n) ρ_s V` or `n ρ_l V`.
    pub fn phase_mass(&self, phase: Phase) -> Real {
        match phase {
            Phase::Solid => self
                .solid_state()
                .map_or(0.0, |s| (1.0 - self.porosity) * s.density * self.volume),
            Phase::Liquid => self
                .liquid_state()
                .map_or(0.0, |l| self.porosity * l.density * self.volume),
        }
    }

    pub fn velocity(&self, phase: Phase) -> Option<Vector> {
        match phase {
            Phase::Solid => self.solid_state().map(|s| s.velocity),
            Phase::Liquid => self.liquid_state().map(|l| l.velocity),
        }
    }

    pub fn velocity_mut(&mut self, phase: Phase) -> Option<&mut Vector> {
        match phase {
            Phase::Solid => self.solid_state_mut().map(|s| &mut s.velocity),
            Phase::Liquid => self.liquid_state_mut().map(|l| &mut l.velocity),
        }
    }

    pub fn momentum(&self, phase: Phase) -> Vector {
        self.velocity(phase)
            .map_or(zero_vector(), |v| v * self.phase_mass(phase))
    }

    /// The phase whose velocity advects the point's position.
    pub fn kinematic_phase(&self) -> Phase {
        if self.carries(Phase::Solid) {
            Phase::Solid
        } else {
            Phase::Liquid
        }
    }

    /// Pressure of `phase` (solid mean pressure or pore pressure).
    pub fn pressure(&self, phase: Phase) -> Option<Real> {
        match phase {
            Phase::Solid => self.solid_state().map(SolidState::mean_pressure),
            Phase::Liquid => self.liquid_state().map(|l| l.pore_pressure),
        }
    }

    /// Replace the pressure of `phase`, keeping any deviatoric stress.
    pub fn set_pressure(&mut self, phase: Phase, pressure: Real) {
        match phase {
            Phase::Solid => {
                if let Some(solid) = self.solid_state_mut() {
                    let mut decomposed = DecomposedTensor::decompose(&solid.stress);
                    decomposed.spherical_part = -pressure;
                    solid.stress = decomposed.recompose();
                }
            }
            Phase::Liquid => {
                if let Some(liquid) = self.liquid_state_mut() {
                    liquid.pore_pressure = pressure;
                }
            }
        }
    }

    pub fn volumetric_strain_increment(&self) -> Real {
        matrix_trace(&self.strain_increment)
    }

    pub fn is_healthy(&self) -> bool {
        let solid_ok = self
            .solid_state()
            .is_none_or(|s| s.velocity.is_finite() && matrix_is_finite(&s.stress));
        let liquid_ok = self
            .liquid_state()
            .is_none_or(|l| l.velocity.is_finite() && l.pore_pressure.is_finite());
        self.position.is_finite() && self.volume.is_finite() && self.volume > 0.0 && solid_ok && liquid_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fluid() -> FluidParams {
        FluidParams::new("water", 1000.0, 2.0e6, 1.0e-3)
    }

    #[test]
    fn phase_masses_split_by_porosity() {
        let p = MaterialPoint::mixture(
            0,
            Vector::ZERO,
            2.0,
            0.25,
            SolidState::new(0, 2600.0),
            LiquidState::new(&fluid()),
        );
        assert!((p.phase_mass(Phase::Solid) - 0.75 * 2600.0 * 2.0).abs() < 1e-9);
        assert!((p.phase_mass(Phase::Liquid) - 0.25 * 1000.0 * 2.0).abs() < 1e-9);
        assert_eq!(p.phase(), PointPhase::Mixture);
    }

    #[test]
    fn solid_point_has_no_liquid_mass() {
        let p = MaterialPoint::solid(1, Vector::ZERO, 1.0, 0.3, SolidState::new(0, 2000.0));
        assert_eq!(p.phase_mass(Phase::Liquid), 0.0);
        assert!(p.velocity(Phase::Liquid).is_none());
        assert_eq!(p.kinematic_phase(), Phase::Solid);
    }

    #[test]
    fn set_pressure_keeps_deviatoric_stress() {
        let stress = Matrix::from_cols(Vector::new(-3.0, 1.0), Vector::new(1.0, -1.0));
        let mut p = MaterialPoint::solid(
            2,
            Vector::ZERO,
            1.0,
            0.3,
            SolidState::new(0, 2000.0).with_stress(stress),
        );
        assert_eq!(p.pressure(Phase::Solid), Some(2.0));
        p.set_pressure(Phase::Solid, 5.0);
        let s = p.solid_state().unwrap().stress;
        assert_eq!(s.x_axis, Vector::new(-6.0, 1.0));
        assert_eq!(s.y_axis, Vector::new(1.0, -4.0));
    }
}
