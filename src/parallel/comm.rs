//! Rank-to-rank communication.
//!
//! Every exchange the stepper needs is an all-gather: each rank contributes a
//! packet and receives every rank's packet in rank order. All ranks must
//! call it the same number of times.

use std::sync::{Arc, Barrier};

use parking_lot::Mutex;

use crate::core::{MaterialPoint, NodeId};
use crate::error::{MpmError, MpmResult};
use crate::math::Real;

#[derive(Clone, Debug, PartialEq)]
pub enum Packet {
    /// `width` values per listed node, flattened.
    NodeValues {
        width: usize,
        nodes: Vec<NodeId>,
        values: Vec<Real>,
    },
    /// Points with their destination rank.
    Points(Vec<(usize, MaterialPoint)>),
    Counts(Vec<u64>),
    Flag(bool),
}

pub trait Communicator: Send + Sync {
    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    /// Contribute `packet` and receive all packets, indexed by rank.
    fn all_gather(&self, packet: Packet) -> MpmResult<Vec<Packet>>;
}

/// Element-wise sum of per-rank counts.
pub fn all_reduce_counts(comm: &dyn Communicator, counts: Vec<u64>) -> MpmResult<Vec<u64>> {
    if comm.size() == 1 {
        return Ok(counts);
    }
    let len = counts.len();
    let mut total = vec![0; len];
    for packet in comm.all_gather(Packet::Counts(counts))? {
        let Packet::Counts(counts) = packet else {
            return Err(MpmError::Communication("expected counts".to_string()));
        };
        if counts.len() != len {
            return Err(MpmError::Communication(format!(
                "count length mismatch: {} vs {len}",
                counts.len()
            )));
        }
        for (sum, count) in total.iter_mut().zip(counts) {
            *sum += count;
        }
    }
    Ok(total)
}

/// True on every rank when `flag` is true on any rank.
pub fn any_rank(comm: &dyn Communicator, flag: bool) -> MpmResult<bool> {
    if comm.size() == 1 {
        return Ok(flag);
    }
    let mut any = false;
    for packet in comm.all_gather(Packet::Flag(flag))? {
        let Packet::Flag(flag) = packet else {
            return Err(MpmError::Communication("expected flag".to_string()));
        };
        any |= flag;
    }
    Ok(any)
}

/// The whole run on a single rank.
#[derive(Clone, Copy, Debug, Default)]
pub struct SingleRank;

impl Communicator for SingleRank {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn all_gather(&self, packet: Packet) -> MpmResult<Vec<Packet>> {
        Ok(vec![packet])
    }
}

struct Exchange {
    slots: Mutex<Vec<Option<Packet>>>,
    barrier: Barrier,
}

/// Factory for in-process ranks that run on separate threads.
pub struct ThreadGroup;

impl ThreadGroup {
    pub fn communicators(size: usize) -> Vec<ThreadCommunicator> {
        let exchange = Arc::new(Exchange {
            slots: Mutex::new(vec![None; size]),
            barrier: Barrier::new(size),
        });
        (0..size)
            .map(|rank| ThreadCommunicator {
                rank,
                size,
                exchange: Arc::clone(&exchange),
            })
            .collect()
    }
}

pub struct ThreadCommunicator {
    rank: usize,
    size: usize,
    exchange: Arc<Exchange>,
}

impl Communicator for ThreadCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn all_gather(&self, packet: Packet) -> MpmResult<Vec<Packet>> {
        self.exchange.slots.lock()[self.rank] = Some(packet);
        self.exchange.barrier.wait();
        let gathered: Option<Vec<Packet>> = self.exchange.slots.lock().iter().cloned().collect();
        // nobody reads again until every rank has copied its view
        self.exchange.barrier.wait();
        self.exchange.slots.lock()[self.rank] = None;
        gathered.ok_or_else(|| MpmError::Communication("missing contribution from a rank".to_string()))
    }
}
