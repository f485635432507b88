pub mod config;
pub mod core;
pub mod error;
pub mod io;
pub mod materials;
pub mod math;
pub mod orchestrator;
pub mod parallel;
pub mod plugin;
pub mod setup;
pub mod solver;

// Public re-exports for clean API
pub use config::{AnalysisConfig, Damping, GRAVITY, OutOfDomainPolicy, StressUpdate, VelocityUpdate};
pub use core::{Grid, LiquidState, MaterialPoint, ParticleSet, Phase, SolidState};
pub use error::{MpmError, MpmResult};
pub use materials::{ConstitutiveModel, FluidParams, LinearElastic, MaterialTable};
pub use orchestrator::{
    Collaborators, RankOutcome, RunSummary, SimulationContext, StepCounter, StepReport,
    TimeStepOrchestrator, run_partitioned, solve,
};
pub use plugin::{MpmPlugin, Simulation, SimulationStatus};
pub use setup::{MeshSpec, ModelLoader, ScenarioModel};
