//! Distributed and intra-partition parallelism
//!
//! * `Communicator` - all-gather between ranks (single rank or thread group)
//! * `HaloExchange` - sum-reduction of shared node quantities
//! * `DomainDecomposer` - cell partitioning and point migration
//! * `TaskScheduler` - concurrent batches with a join barrier

pub mod comm;
pub mod decomposer;
pub mod halo;
pub mod scheduler;

pub use comm::{
    Communicator, Packet, SingleRank, ThreadCommunicator, ThreadGroup, all_reduce_counts, any_rank,
};
pub use decomposer::{
    BlockPartitioner, CellGraph, DecompositionSummary, DomainDecomposer, GraphPartitioner,
};
pub use halo::{HaloExchange, HaloField, NodeFieldView, NodeQuantity};
pub use scheduler::{JoinHandle, TaskBatch, TaskScheduler};
