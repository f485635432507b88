//! Checkpoint save/restore.
//!
//! A checkpoint holds one rank's points and the step they were written at.
//! Node accumulators are rebuilt every step and cell ownership is recomputed
//! on resume, so neither is stored.

use std::collections::BTreeMap;
use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::core::MaterialPoint;
use crate::error::CheckpointError;

pub const CHECKPOINT_VERSION: u32 = 1;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub version: u32,
    pub step: u64,
    pub rank: usize,
    pub points: Vec<MaterialPoint>,
}

impl Checkpoint {
    pub fn new(step: u64, rank: usize, points: Vec<MaterialPoint>) -> Self {
        Self {
            version: CHECKPOINT_VERSION,
            step,
            rank,
            points,
        }
    }

    fn validate(self, rank: usize) -> Result<Self, CheckpointError> {
        if self.version != CHECKPOINT_VERSION {
            return Err(CheckpointError::Version {
                expected: CHECKPOINT_VERSION,
                found: self.version,
            });
        }
        if self.rank != rank {
            return Err(CheckpointError::RankMismatch {
                expected: rank,
                found: self.rank,
            });
        }
        Ok(self)
    }
}

/// Durable storage for per-rank checkpoints.
pub trait CheckpointStore: Send + Sync {
    fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError>;

    /// The checkpoint of `rank` at `step`, or its latest one.
    fn load(&self, rank: usize, step: Option<u64>) -> Result<Checkpoint, CheckpointError>;
}

/// Keeps checkpoints in memory; for tests and in-process resumes.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    entries: Mutex<BTreeMap<(usize, u64), Checkpoint>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn steps(&self, rank: usize) -> Vec<u64> {
        self.entries
            .lock()
            .keys()
            .filter(|(r, _)| *r == rank)
            .map(|&(_, step)| step)
            .collect()
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        self.entries
            .lock()
            .insert((checkpoint.rank, checkpoint.step), checkpoint.clone());
        Ok(())
    }

    fn load(&self, rank: usize, step: Option<u64>) -> Result<Checkpoint, CheckpointError> {
        let entries = self.entries.lock();
        let found = match step {
            Some(step) => entries.get(&(rank, step)),
            None => entries
                .range((rank, 0)..=(rank, u64::MAX))
                .next_back()
                .map(|(_, cp)| cp),
        };
        found
            .cloned()
            .ok_or(CheckpointError::NotFound { rank })?
            .validate(rank)
    }
}

/// One JSON file per rank and step: `checkpoint_r{rank}_s{step:08}.json`.
#[derive(Clone, Debug)]
pub struct JsonCheckpointStore {
    directory: PathBuf,
}

impl JsonCheckpointStore {
    pub fn new(directory: impl Into<PathBuf>) -> Result<Self, CheckpointError> {
        let directory = directory.into();
        fs::create_dir_all(&directory)?;
        Ok(Self { directory })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn path_for(&self, rank: usize, step: u64) -> PathBuf {
        self.directory.join(format!("checkpoint_r{rank}_s{step:08}.json"))
    }

    fn latest_step(&self, rank: usize) -> Result<Option<u64>, CheckpointError> {
        let prefix = format!("checkpoint_r{rank}_s");
        let mut latest = None;
        for entry in fs::read_dir(&self.directory)? {
            let name = entry?.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            let step = name
                .strip_prefix(&prefix)
                .and_then(|rest| rest.strip_suffix(".json"))
                .and_then(|digits| digits.parse::<u64>().ok());
            if let Some(step) = step {
                latest = latest.max(Some(step));
            }
        }
        Ok(latest)
    }
}

impl CheckpointStore for JsonCheckpointStore {
    fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        let path = self.path_for(checkpoint.rank, checkpoint.step);
        // write then rename so a crash never leaves a truncated checkpoint
        let staging = path.with_extension("json.tmp");
        {
            let mut writer = BufWriter::new(fs::File::create(&staging)?);
            serde_json::to_writer(&mut writer, checkpoint)?;
            writer.flush()?;
        }
        fs::rename(&staging, &path)?;
        Ok(())
    }

    fn load(&self, rank: usize, step: Option<u64>) -> Result<Checkpoint, CheckpointError> {
        let step = match step {
            Some(step) => step,
            None => self.latest_step(rank)?.ok_or(CheckpointError::NotFound { rank })?,
        };
        let path = self.path_for(rank, step);
        if !path.exists() {
            return Err(CheckpointError::NotFound { rank });
        }
        let reader = BufReader::new(fs::File::open(path)?);
        let checkpoint: Checkpoint = serde_json::from_reader(reader)?;
        checkpoint.validate(rank)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{LiquidState, SolidState};
    use crate::materials::FluidParams;
    use crate::math::{Matrix, Vector};

    fn points() -> Vec<MaterialPoint> {
        vec![MaterialPoint::mixture(
            4,
            Vector::new(0.25, 0.5),
            0.1,
            0.35,
            SolidState::new(0, 2650.0)
                .with_velocity(Vector::new(0.0, -0.5))
                .with_stress(Matrix::from_cols(Vector::new(-10.0, 1.0), Vector::new(1.0, -20.0))),
            LiquidState::new(&FluidParams::water()).with_pore_pressure(12.5),
        )]
    }

    #[test]
    fn memory_store_returns_latest_by_default() {
        let store = MemoryCheckpointStore::new();
        store.save(&Checkpoint::new(10, 0, points())).unwrap();
        store.save(&Checkpoint::new(20, 0, Vec::new())).unwrap();
        store.save(&Checkpoint::new(30, 1, Vec::new())).unwrap();
        assert_eq!(store.load(0, None).unwrap().step, 20);
        assert_eq!(store.load(0, Some(10)).unwrap().points, points());
        assert_eq!(store.steps(0), vec![10, 20]);
        assert!(matches!(store.load(2, None), Err(CheckpointError::NotFound { rank: 2 })));
    }

    #[test]
    fn json_store_round_trips_point_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonCheckpointStore::new(dir.path()).unwrap();
        store.save(&Checkpoint::new(5, 1, points())).unwrap();
        store.save(&Checkpoint::new(15, 1, points())).unwrap();

        let loaded = store.load(1, None).unwrap();
        assert_eq!(loaded.step, 15);
        assert_eq!(loaded.points, points());
        assert!(store.path_for(1, 5).exists());
        assert!(!store.path_for(1, 5).with_extension("json.tmp").exists());
        assert!(matches!(store.load(0, None), Err(CheckpointError::NotFound { rank: 0 })));
    }

    #[test]
    fn json_store_rejects_foreign_rank() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonCheckpointStore::new(dir.path()).unwrap();
        store.save(&Checkpoint::new(5, 3, Vec::new())).unwrap();
        std::fs::rename(store.path_for(3, 5), store.path_for(0, 5)).unwrap();
        assert!(matches!(
            store.load(0, Some(5)),
            Err(CheckpointError::RankMismatch { expected: 0, found: 3 })
        ));
    }
}
