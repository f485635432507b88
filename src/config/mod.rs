//! Configuration and parameters
//!
//! Constants and analysis settings.

pub mod analysis;
pub mod constants;

pub use analysis::*;
pub use constants::*;
