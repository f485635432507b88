//! Error types for the stepper and its collaborators.

use std::fmt;

use crate::core::PointId;
use crate::math::Vector;

/// Initialization stage that produced a fatal error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStage {
    Materials,
    Mesh,
    Particles,
    Loads,
}

impl fmt::Display for InitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InitStage::Materials => "materials",
            InitStage::Mesh => "mesh",
            InitStage::Particles => "particles",
            InitStage::Loads => "loads",
        };
        f.write_str(name)
    }
}

/// Failure reported by a model loader.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct InitError(pub String);

impl InitError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid value for '{key}': {reason}")]
    InvalidValue { key: &'static str, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("format error: {0}")]
    Format(#[from] serde_json::Error),

    #[error("no checkpoint for rank {rank}")]
    NotFound { rank: usize },

    #[error("checkpoint belongs to rank {found}, expected rank {expected}")]
    RankMismatch { expected: usize, found: usize },

    #[error("checkpoint format version {found} is not supported (expected {expected})")]
    Version { expected: u32, found: u32 },

    #[error("resume requested but no checkpoint store is configured")]
    NoStore,
}

/// Failure inside a result writer. Never aborts the step loop.
#[derive(Debug, thiserror::Error)]
pub enum WriterError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, thiserror::Error)]
pub enum MpmError {
    #[error("{stage} initialization failed: {source}")]
    Init {
        stage: InitStage,
        #[source]
        source: InitError,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error("material point {id} left the mesh at ({}, {})", .position.x, .position.y)]
    ParticleOutsideDomain { id: PointId, position: Vector },

    #[error("run aborted after a failure on another rank")]
    RemoteAbort,

    #[error("partition error: {0}")]
    Partition(String),

    #[error("communication error: {0}")]
    Communication(String),

    #[error("invalid state: {0}")]
    InvalidState(String),
}

pub type MpmResult<T> = Result<T, MpmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_error_names_stage() {
        let err = MpmError::Init {
            stage: InitStage::Mesh,
            source: InitError::new("bad cell count"),
        };
        assert_eq!(err.to_string(), "mesh initialization failed: bad cell count");
    }

    #[test]
    fn outside_domain_reports_position() {
        let err = MpmError::ParticleOutsideDomain {
            id: 7,
            position: Vector::new(1.5, -0.25),
        };
        assert!(err.to_string().contains("1.5"));
        assert!(err.to_string().contains("point 7"));
    }
}
