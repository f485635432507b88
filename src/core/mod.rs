pub mod grid;
pub mod kernel;
pub mod particle;
pub mod particle_set;

pub use grid::{CellId, Grid, GridGeometry, NodeFields, NodeId, Phase, reset_and_activate};
pub use kernel::{NODES_PER_CELL, ShapeFunctions};
pub use particle::{LiquidState, MaterialPoint, PhaseState, PointId, PointPhase, SolidState};
pub use particle_set::{ParticleSet, compute_shape_functions};
