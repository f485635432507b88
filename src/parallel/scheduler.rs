//! Intra-partition task batches.
//!
//! Batches handed to one [`TaskScheduler::run_concurrently`] call must not
//! write anything another batch of the same call reads or writes. Callers
//! get this from disjoint borrows of separate node fields, so overlapping
//! batches fail to borrow-check rather than race.

use bevy::tasks::{TaskPool, TaskPoolBuilder};

use crate::error::MpmResult;

/// One unit of concurrent work.
pub type TaskBatch<'env> = Box<dyn FnOnce() -> MpmResult<()> + Send + 'env>;

/// Outcomes of a finished group of batches, in submission order.
#[must_use = "join the handle to observe batch failures"]
pub struct JoinHandle {
    outcomes: Vec<MpmResult<()>>,
}

impl JoinHandle {
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

pub struct TaskScheduler {
    pool: TaskPool,
}

impl TaskScheduler {
    pub fn new(threads: Option<usize>, rank: usize) -> Self {
        let mut builder = TaskPoolBuilder::new().thread_name(format!("mpm2p rank {rank}"));
        if let Some(threads) = threads {
            builder = builder.num_threads(threads);
        }
        Self {
            pool: builder.build(),
        }
    }

    pub fn thread_num(&self) -> usize {
        self.pool.thread_num()
    }

    /// Run every batch concurrently. Returns once all of them have finished;
    /// none may outlive the call.
    pub fn run_concurrently<'env>(&self, batches: Vec<TaskBatch<'env>>) -> JoinHandle {
        let outcomes = self.pool.scope(|scope| {
            for batch in batches {
                scope.spawn(async move { batch() });
            }
        });
        JoinHandle { outcomes }
    }

    /// The first batch error, in submission order.
    pub fn join(&self, handle: JoinHandle) -> MpmResult<()> {
        handle.outcomes.into_iter().collect()
    }
}
