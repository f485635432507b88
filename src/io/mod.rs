pub mod checkpoint;
pub mod writer;

pub use checkpoint::{
    CHECKPOINT_VERSION, Checkpoint, CheckpointStore, JsonCheckpointStore, MemoryCheckpointStore,
};
pub use writer::{CheckpointWriter, OutputFrame, ParticleCsvWriter, ResultWriter};
