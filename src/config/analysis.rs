use std::path::Path;

use bevy::prelude::Resource;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::math::{Real, Vector};

use super::constants::GRAVITY;

/// When the stress-strain update runs relative to the nodal kinematics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StressUpdate {
    /// Update stress first, from the velocity mapped at the start of the step
    #[default]
    Usf,
    /// Update stress last, from the velocity after the momentum update
    Usl,
}

/// How point velocities are recovered from the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VelocityUpdate {
    /// Increment by interpolated nodal acceleration
    #[default]
    Flip,
    /// Replace by interpolated nodal velocity
    Pic,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Damping {
    #[default]
    None,
    /// Local non-viscous damping proportional to the unbalanced force
    Cundall { damping_factor: Real },
}

/// What to do with a point that leaves every cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutOfDomainPolicy {
    #[default]
    Fail,
    Drop,
}

/// Analysis options. Loaded and validated once, read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Resource)]
pub struct AnalysisConfig {
    pub dt: Real,
    pub nsteps: u64,

    #[serde(default = "default_output_steps")]
    pub output_steps: u64,

    #[serde(default)]
    pub stress_update: StressUpdate,

    #[serde(default)]
    pub velocity_update: VelocityUpdate,

    #[serde(default)]
    pub damping: Damping,

    #[serde(default)]
    pub pressure_smoothing: bool,

    #[serde(default)]
    pub pore_pressure_smoothing: bool,

    /// Rebalance partitions every this many steps; 0 never rebalances.
    #[serde(default)]
    pub load_balance_steps: u64,

    #[serde(default)]
    pub resume: bool,

    /// Checkpoint step to resume from; latest when absent.
    #[serde(default)]
    pub resume_step: Option<u64>,

    #[serde(default)]
    pub particle_out_of_domain: OutOfDomainPolicy,

    #[serde(default = "default_gravity")]
    pub gravity: Vector,

    /// Worker threads for intra-partition task batches.
    #[serde(default)]
    pub threads: Option<usize>,
}

fn default_output_steps() -> u64 {
    100
}

fn default_gravity() -> Vector {
    Vector::from_array(GRAVITY)
}

impl AnalysisConfig {
    pub fn new(dt: Real, nsteps: u64) -> Self {
        Self {
            dt,
            nsteps,
            output_steps: default_output_steps(),
            stress_update: StressUpdate::default(),
            velocity_update: VelocityUpdate::default(),
            damping: Damping::default(),
            pressure_smoothing: false,
            pore_pressure_smoothing: false,
            load_balance_steps: 0,
            resume: false,
            resume_step: None,
            particle_out_of_domain: OutOfDomainPolicy::default(),
            gravity: default_gravity(),
            threads: None,
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.dt.is_finite() && self.dt > 0.0) {
            return Err(ConfigError::InvalidValue {
                key: "dt",
                reason: format!("must be positive and finite, got {}", self.dt),
            });
        }
        if self.output_steps == 0 {
            return Err(ConfigError::InvalidValue {
                key: "output_steps",
                reason: "must be at least 1".to_string(),
            });
        }
        if let Damping::Cundall { damping_factor } = self.damping {
            if !(0.0..1.0).contains(&damping_factor) {
                return Err(ConfigError::InvalidValue {
                    key: "damping",
                    reason: format!("damping factor must lie in [0, 1), got {damping_factor}"),
                });
            }
        }
        if !self.gravity.is_finite() {
            return Err(ConfigError::InvalidValue {
                key: "gravity",
                reason: "must be finite".to_string(),
            });
        }
        if self.threads == Some(0) {
            return Err(ConfigError::InvalidValue {
                key: "threads",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    pub fn with_output_steps(mut self, output_steps: u64) -> Self {
        self.output_steps = output_steps;
        self
    }

    pub fn with_stress_update(mut self, mode: StressUpdate) -> Self {
        self.stress_update = mode;
        self
    }

    pub fn with_velocity_update(mut self, mode: VelocityUpdate) -> Self {
        self.velocity_update = mode;
        self
    }

    pub fn with_damping(mut self, damping: Damping) -> Self {
        self.damping = damping;
        self
    }

    pub fn with_smoothing(mut self, pressure: bool, pore_pressure: bool) -> Self {
        self.pressure_smoothing = pressure;
        self.pore_pressure_smoothing = pore_pressure;
        self
    }

    pub fn with_load_balance_steps(mut self, steps: u64) -> Self {
        self.load_balance_steps = steps;
        self
    }

    pub fn with_resume(mut self, step: Option<u64>) -> Self {
        self.resume = true;
        self.resume_step = step;
        self
    }

    pub fn with_out_of_domain(mut self, policy: OutOfDomainPolicy) -> Self {
        self.particle_out_of_domain = policy;
        self
    }

    pub fn with_gravity(mut self, gravity: Vector) -> Self {
        self.gravity = gravity;
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    pub fn is_output_step(&self, step: u64) -> bool {
        step % self.output_steps == 0
    }

    pub fn is_rebalance_step(&self, step: u64) -> bool {
        self.load_balance_steps > 0 && step != 0 && step % self.load_balance_steps == 0
    }
}
