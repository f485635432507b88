//! Result writers invoked at output steps.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;

use crate::core::{Grid, MaterialPoint, Phase};
use crate::error::WriterError;

use super::checkpoint::{Checkpoint, CheckpointStore};

/// Everything a writer may look at for one output step.
pub struct OutputFrame<'a> {
    pub step: u64,
    pub max_steps: u64,
    pub rank: usize,
    pub grid: &'a Grid,
    pub points: &'a [MaterialPoint],
}

/// An output sink. Failures are reported to the caller, which logs them and
/// carries on stepping.
pub trait ResultWriter: Send + Sync {
    fn name(&self) -> &str;

    fn write(&mut self, frame: &OutputFrame<'_>) -> Result<(), WriterError>;
}

/// Saves a checkpoint of the frame's points.
pub struct CheckpointWriter {
    store: Arc<dyn CheckpointStore>,
}

impl CheckpointWriter {
    pub fn new(store: Arc<dyn CheckpointStore>) -> Self {
        Self { store }
    }
}

impl ResultWriter for CheckpointWriter {
    fn name(&self) -> &str {
        "checkpoint"
    }

    fn write(&mut self, frame: &OutputFrame<'_>) -> Result<(), WriterError> {
        let checkpoint = Checkpoint::new(frame.step, frame.rank, frame.points.to_vec());
        self.store.save(&checkpoint)?;
        Ok(())
    }
}

/// Point table in CSV, one file per rank and step.
pub struct ParticleCsvWriter {
    directory: PathBuf,
}

impl ParticleCsvWriter {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn path_for(&self, rank: usize, step: u64) -> PathBuf {
        self.directory.join(format!("particles_r{rank}_s{step:08}.csv"))
    }
}

impl ResultWriter for ParticleCsvWriter {
    fn name(&self) -> &str {
        "particle_csv"
    }

    fn write(&mut self, frame: &OutputFrame<'_>) -> Result<(), WriterError> {
        fs::create_dir_all(&self.directory)?;
        let mut out = BufWriter::new(fs::File::create(self.path_for(frame.rank, frame.step))?);
        writeln!(out, "id,x,y,volume,porosity,vx,vy,pressure,pore_pressure")?;
        for point in frame.points {
            let velocity = point.velocity(point.kinematic_phase()).unwrap_or_default();
            writeln!(
                out,
                "{},{},{},{},{},{},{},{},{}",
                point.id,
                point.position.x,
                point.position.y,
                point.volume,
                point.porosity,
                velocity.x,
                velocity.y,
                point.pressure(Phase::Solid).unwrap_or(0.0),
                point.pressure(Phase::Liquid).unwrap_or(0.0),
            )?;
        }
        out.flush()?;
        Ok(())
    }
}
