//! Phase-keyed operation table.
//!
//! The phase set is closed, so the per-phase behaviour of a point is looked
//! up in a static table indexed by its [`PointPhase`] tag instead of going
//! through a trait object per point.

use crate::core::{MaterialPoint, Phase, PointPhase, ShapeFunctions};
use crate::math::Vector;

/// Scatters a point's internal force into the `[mixture, liquid]` slots.
pub type InternalForceFn = fn(&MaterialPoint, &ShapeFunctions, &mut [Vec<Vector>; 2]);

pub struct PhaseOps {
    pub tag: PointPhase,
    /// Node slots receiving this point's mass and momentum.
    pub node_phases: &'static [Phase],
    pub internal_force: InternalForceFn,
    /// Runs the constitutive model on the skeleton stress.
    pub updates_stress: bool,
    /// Integrates the pore-pressure equation.
    pub updates_pore_pressure: bool,
}

static TABLE: [PhaseOps; 3] = [
    PhaseOps {
        tag: PointPhase::Solid,
        node_phases: &[Phase::Solid],
        internal_force: solid_internal_force,
        updates_stress: true,
        updates_pore_pressure: false,
    },
    PhaseOps {
        tag: PointPhase::Liquid,
        node_phases: &[Phase::Liquid],
        internal_force: liquid_internal_force,
        updates_stress: false,
        updates_pore_pressure: true,
    },
    PhaseOps {
        tag: PointPhase::Mixture,
        node_phases: &[Phase::Solid, Phase::Liquid],
        internal_force: mixture_internal_force,
        updates_stress: true,
        updates_pore_pressure: true,
    },
];

#[inline(always)]
pub fn ops(tag: PointPhase) -> &'static PhaseOps {
    &TABLE[tag as usize]
}

/// Effective stress: `f_mix -= V σ' ∇N`.
fn solid_internal_force(point: &MaterialPoint, sf: &ShapeFunctions, force: &mut [Vec<Vector>; 2]) {
    let Some(solid) = point.solid_state() else {
        return;
    };
    let mixture = &mut force[Phase::Solid.index()];
    for (node, _, gradient) in sf.iter() {
        mixture[node] -= solid.stress * gradient * point.volume;
    }
}

/// Pore pressure acts on the mixture with the full volume and on the liquid
/// with its volume fraction.
fn liquid_internal_force(point: &MaterialPoint, sf: &ShapeFunctions, force: &mut [Vec<Vector>; 2]) {
    let Some(liquid) = point.liquid_state() else {
        return;
    };
    let p = liquid.pore_pressure;
    for (node, _, gradient) in sf.iter() {
        let contribution = gradient * (point.volume * p);
        force[Phase::Solid.index()][node] += contribution;
        force[Phase::Liquid.index()][node] += contribution * point.porosity;
    }
}

fn mixture_internal_force(point: &MaterialPoint, sf: &ShapeFunctions, force: &mut [Vec<Vector>; 2]) {
    solid_internal_force(point, sf, force);
    liquid_internal_force(point, sf, force);
}
