//! Helper functions for materials
//!
//! Math and validity checks shared by the material models.

/// Elastic parameter conversions
pub mod physics {
    use crate::math::Real;

    /// Lamé parameters (lambda, mu) from Young's modulus and Poisson ratio
    #[inline]
    pub fn lame_lambda_mu(young_modulus: Real, poisson_ratio: Real) -> (Real, Real) {
        let lambda =
            young_modulus * poisson_ratio / ((1.0 + poisson_ratio) * (1.0 - 2.0 * poisson_ratio));
        let mu = shear_modulus(young_modulus, poisson_ratio);
        (lambda, mu)
    }

    #[inline]
    pub fn shear_modulus(young_modulus: Real, poisson_ratio: Real) -> Real {
        young_modulus / (2.0 * (1.0 + poisson_ratio))
    }
}

/// Check if material properties make sense
pub mod check {
    use crate::math::Real;

    #[inline]
    pub fn density_ok(density: Real) -> bool {
        density > 0.0 && density < 50000.0 && density.is_finite()
    }

    #[inline]
    pub fn porosity_ok(porosity: Real) -> bool {
        (0.0..=1.0).contains(&porosity)
    }

    /// Check if Young's modulus is physically reasonable
    #[inline]
    pub fn young_modulus_ok(e: Real) -> bool {
        e > 0.0 && e < 1e12 && e.is_finite()
    }

    /// Check if Poisson ratio is in valid range
    #[inline]
    pub fn poisson_ratio_ok(nu: Real) -> bool {
        nu > -1.0 && nu < 0.5 && nu.is_finite()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lame_parameters_for_steel_like_solid() {
        let (lambda, mu) = physics::lame_lambda_mu(200.0e9, 0.3);
        assert!((mu - 76.923e9).abs() / 76.923e9 < 1e-4);
        assert!((lambda - 115.385e9).abs() / 115.385e9 < 1e-4);
    }
}
