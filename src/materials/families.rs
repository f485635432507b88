//! Shared parameter packs for pore liquids.

use serde::{Deserialize, Serialize};

use crate::config::constants;
use crate::math::Real;

/// Parameters describing a pore liquid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FluidParams {
    pub name: String,
    pub density: Real,
    pub bulk_modulus: Real,
    /// Darcy permeability `k` (m/s). Zero disables inter-phase drag.
    pub permeability: Real,
}

impl FluidParams {
    pub fn new(name: &str, density: Real, bulk_modulus: Real, permeability: Real) -> Self {
        Self {
            name: name.to_string(),
            density,
            bulk_modulus,
            permeability,
        }
    }

    pub fn water() -> Self {
        Self::new(
            "water",
            constants::WATER_DENSITY,
            constants::WATER_BULK_MODULUS,
            constants::DEFAULT_PERMEABILITY,
        )
    }
}

impl Default for FluidParams {
    fn default() -> Self {
        Self::water()
    }
}

/// Darcy drag coefficient per unit volume, `n² ρ_l g / k`, with `k` a
/// hydraulic conductivity and `g` the standard gravity.
#[inline]
pub fn drag_coefficient(porosity: Real, density: Real, permeability: Real) -> Real {
    if permeability > 0.0 {
        porosity * porosity * density * constants::STANDARD_GRAVITY / permeability
    } else {
        0.0
    }
}

/// Pore-pressure increment from the volumetric strain rates of both phases.
#[inline]
pub fn pore_pressure_increment(
    dt: Real,
    bulk_modulus: Real,
    porosity: Real,
    solid_volumetric_rate: Real,
    liquid_volumetric_rate: Real,
) -> Real {
    if porosity <= 0.0 {
        return 0.0;
    }
    -dt * bulk_modulus / porosity
        * ((1.0 - porosity) * solid_volumetric_rate + porosity * liquid_volumetric_rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_permeability_disables_drag() {
        assert_eq!(drag_coefficient(0.3, 1000.0, 0.0), 0.0);
        let c = drag_coefficient(0.5, 1000.0, 1.0e-2);
        assert!((c - 0.25 * 1000.0 * 9.81 / 1.0e-2).abs() < 1e-6);
    }

    #[test]
    fn compression_raises_pore_pressure() {
        let dp = pore_pressure_increment(1.0e-3, 2.0e6, 0.4, -0.5, -0.5);
        assert!(dp > 0.0);
        assert_eq!(pore_pressure_increment(1.0, 1.0, 0.0, -1.0, -1.0), 0.0);
    }
}
