use bevy::math::{DMat2, DVec2};

pub type Real = f64;
pub const DIM: usize = 2;

pub type Vector = DVec2;
pub type Matrix = DMat2;

#[inline(always)]
pub fn zero_vector() -> Vector {
    DVec2::ZERO
}

#[inline(always)]
pub fn zero_matrix() -> Matrix {
    DMat2::ZERO
}

#[inline(always)]
pub fn matrix_trace(m: &Matrix) -> Real {
    m.x_axis.x + m.y_axis.y
}

/// Symmetric part of a tensor, `(m + mᵀ) / 2`.
#[inline(always)]
pub fn symmetric_part(m: &Matrix) -> Matrix {
    (*m + m.transpose()) * 0.5
}

/// Dyadic product `a ⊗ b`, i.e. `M_ij = a_i b_j`.
#[inline(always)]
pub fn outer_product(a: Vector, b: Vector) -> Matrix {
    DMat2::from_cols(a * b.x, a * b.y)
}

/// Component-wise sign with `sign(0) = 0`.
///
/// `DVec2::signum` maps `+0.0` to `1.0`, which would damp nodes at rest.
#[inline(always)]
pub fn sign_or_zero(v: Vector) -> Vector {
    let sign = |x: Real| {
        if x > 0.0 {
            1.0
        } else if x < 0.0 {
            -1.0
        } else {
            0.0
        }
    };
    Vector::new(sign(v.x), sign(v.y))
}

pub fn matrix_is_finite(m: &Matrix) -> bool {
    m.x_axis.is_finite() && m.y_axis.is_finite()
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DecomposedTensor {
    pub deviatoric_part: Matrix,
    pub spherical_part: Real,
}

impl DecomposedTensor {
    pub fn decompose(tensor: &Matrix) -> Self {
        let spherical_part = matrix_trace(tensor) / (DIM as Real);
        let mut deviatoric_part = *tensor;
        deviatoric_part.x_axis.x -= spherical_part;
        deviatoric_part.y_axis.y -= spherical_part;
        Self {
            deviatoric_part,
            spherical_part,
        }
    }

    pub fn recompose(&self) -> Matrix {
        let mut result = self.deviatoric_part;
        result.x_axis.x += self.spherical_part;
        result.y_axis.y += self.spherical_part;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outer_product_layout() {
        let m = outer_product(Vector::new(1.0, 2.0), Vector::new(3.0, 4.0));
        // column-major: x_axis is column 0
        assert_eq!(m.x_axis, Vector::new(3.0, 6.0));
        assert_eq!(m.y_axis, Vector::new(4.0, 8.0));
    }

    #[test]
    fn decompose_round_trips_spherical_part() {
        let m = Matrix::from_cols(Vector::new(-4.0, 1.0), Vector::new(1.0, -2.0));
        let d = DecomposedTensor::decompose(&m);
        assert_eq!(d.spherical_part, -3.0);
        assert_eq!(matrix_trace(&d.deviatoric_part), 0.0);
        assert_eq!(d.recompose(), m);
    }

    #[test]
    fn sign_of_zero_is_zero() {
        assert_eq!(sign_or_zero(Vector::new(0.0, -2.0)), Vector::new(0.0, -1.0));
    }
}
