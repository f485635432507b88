// Physical and numerical constants for the two-phase stepper
use crate::math::Real;

/// Magnitude used to turn hydraulic conductivity into Darcy drag. Fixed,
/// whatever body force the analysis applies.
pub const STANDARD_GRAVITY: Real = 9.81;

pub const GRAVITY: [Real; 2] = [0.0, -STANDARD_GRAVITY];

// Pore water
pub const WATER_DENSITY: Real = 1000.0;
pub const WATER_BULK_MODULUS: Real = 2.0e9;
pub const DEFAULT_PERMEABILITY: Real = 1.0e-4;

/// Nodal mass below which a phase is treated as absent at a node.
pub const MASS_TOLERANCE: Real = 1.0e-12;
