//! Plane-strain linear elasticity.

use nalgebra::{Matrix3, Vector3};

use crate::error::InitError;
use crate::math::{Matrix, Real, Vector};

use super::ConstitutiveModel;
use super::utils::{check, physics};

#[derive(Debug, Clone)]
pub struct LinearElastic {
    youngs_modulus: Real,
    poisson_ratio: Real,
    /// Voigt stiffness `[xx, yy, xy(engineering)]`.
    stiffness: Matrix3<Real>,
}

impl LinearElastic {
    pub fn new(youngs_modulus: Real, poisson_ratio: Real) -> Result<Self, InitError> {
        if !check::young_modulus_ok(youngs_modulus) {
            return Err(InitError::new(format!(
                "invalid Young's modulus {youngs_modulus}"
            )));
        }
        if !check::poisson_ratio_ok(poisson_ratio) {
            return Err(InitError::new(format!("invalid Poisson ratio {poisson_ratio}")));
        }
        let (lambda, mu) = physics::lame_lambda_mu(youngs_modulus, poisson_ratio);
        #[rustfmt::skip]
        let stiffness = Matrix3::new(
            lambda + 2.0 * mu, lambda,             0.0,
            lambda,            lambda + 2.0 * mu,  0.0,
            0.0,               0.0,                mu,
        );
        Ok(Self {
            youngs_modulus,
            poisson_ratio,
            stiffness,
        })
    }

    pub fn youngs_modulus(&self) -> Real {
        self.youngs_modulus
    }

    pub fn poisson_ratio(&self) -> Real {
        self.poisson_ratio
    }
}

impl ConstitutiveModel for LinearElastic {
    fn name(&self) -> &str {
        "linear_elastic"
    }

    fn compute_stress(&self, stress: &Matrix, strain_increment: &Matrix) -> Matrix {
        let de = Vector3::new(
            strain_increment.x_axis.x,
            strain_increment.y_axis.y,
            strain_increment.y_axis.x + strain_increment.x_axis.y,
        );
        let ds = self.stiffness * de;
        *stress + Matrix::from_cols(Vector::new(ds[0], ds[2]), Vector::new(ds[2], ds[1]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniaxial_strain_response() {
        let model = LinearElastic::new(1.0e6, 0.25).unwrap();
        let de = Matrix::from_cols(Vector::new(-1.0e-3, 0.0), Vector::new(0.0, 0.0));
        let s = model.compute_stress(&Matrix::ZERO, &de);
        let (lambda, mu) = physics::lame_lambda_mu(1.0e6, 0.25);
        assert!((s.x_axis.x + (lambda + 2.0 * mu) * 1.0e-3).abs() < 1e-6);
        assert!((s.y_axis.y + lambda * 1.0e-3).abs() < 1e-6);
        assert_eq!(s.x_axis.y, 0.0);
    }

    #[test]
    fn shear_is_symmetric() {
        let model = LinearElastic::new(1.0e6, 0.2).unwrap();
        let de = Matrix::from_cols(Vector::new(0.0, 1.0e-4), Vector::new(1.0e-4, 0.0));
        let s = model.compute_stress(&Matrix::ZERO, &de);
        assert_eq!(s.x_axis.y, s.y_axis.x);
        assert!((s.x_axis.y - physics::shear_modulus(1.0e6, 0.2) * 2.0e-4).abs() < 1e-9);
    }

    #[test]
    fn rejects_incompressible_poisson_ratio() {
        assert!(LinearElastic::new(1.0e6, 0.5).is_err());
    }
}
