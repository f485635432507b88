// src/solver/mod.rs
pub mod g2p;
pub mod grid_update;
pub mod loads;
pub mod p2g;
pub mod phase_table;
pub mod smoothing;
pub mod stress;

// Re-export from the solver module
pub use g2p::*;
pub use grid_update::*;
pub use loads::*;
pub use p2g::*;
pub use phase_table::{PhaseOps, ops};
pub use smoothing::smooth_pressure;
pub use stress::*;
