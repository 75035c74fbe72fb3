//! Communicator abstraction.
//!
//! Wire conventions for the byte-level exchange: all integers are
//! little-endian fixed width, payloads are `bytemuck`-castable plain data,
//! and receivers learn exact lengths from the returned counts, so no size
//! pre-exchange is needed at this level.

use crate::arrays::ReduceOp;

/// Collective communication over a fixed set of ranks.
///
/// Only these calls may block; they are the globally observable ordering
/// points of the engine (every rank must reach them in the same order).
pub trait Comm: Send + Sync {
    /// Rank of this process, `0..size`.
    fn rank(&self) -> u32;
    /// Total number of ranks.
    fn size(&self) -> u32;
    /// Reduce an integer over all ranks; every rank gets the result.
    fn allreduce_i64(&self, x: i64, op: ReduceOp) -> i64;
    /// Reduce a double over all ranks. Results that feed branching
    /// decisions must come from integer quantities or reproducible sums.
    fn allreduce_f64(&self, x: f64, op: ReduceOp) -> f64;
    /// True only when every rank passes true.
    fn reduce_and(&self, x: bool) -> bool;
    /// True when any rank passes true.
    fn reduce_or(&self, x: bool) -> bool;
    /// Gather one value from every rank, indexed by rank.
    fn allgather_u64(&self, x: u64) -> Vec<u64>;
    /// All-to-all byte exchange: send `counts[r]` bytes (consecutive in
    /// `data`) to each rank `r`; returns per-source counts and the
    /// received bytes concatenated in rank order.
    fn exchange_u8(&self, counts: &[u32], data: &[u8]) -> (Vec<u32>, Vec<u8>);
}

/// Bit-reproducible global sum: the fixed-point accumulators are combined
/// exactly, so the result is identical for any rank count or summation
/// order. Use this for any reduction whose result feeds a branching
/// decision.
pub fn repro_sum_all(comm: &dyn Comm, values: &[f64]) -> f64 {
    use crate::arrays::{fixed_sum, FixedSum};
    let local_max = values.iter().fold(0.0f64, |m, &x| m.max(x.abs()));
    let global_max = comm.allreduce_f64(local_max, ReduceOp::Max);
    let local = fixed_sum(values, global_max);
    let los = comm.allgather_u64(local.acc as u64);
    let his = comm.allgather_u64((local.acc >> 64) as u64);
    let acc = los
        .iter()
        .zip(his.iter())
        .map(|(&lo, &hi)| (hi as i128).wrapping_shl(64) | lo as i128)
        .sum();
    FixedSum {
        acc,
        unit_exp: local.unit_exp,
    }
    .to_f64()
}

/// The one-rank communicator: collectives are identities and the exchange
/// loops bytes back.
#[derive(Clone, Debug, Default)]
pub struct SerialComm;

impl Comm for SerialComm {
    fn rank(&self) -> u32 {
        0
    }
    fn size(&self) -> u32 {
        1
    }
    fn allreduce_i64(&self, x: i64, _op: ReduceOp) -> i64 {
        x
    }
    fn allreduce_f64(&self, x: f64, _op: ReduceOp) -> f64 {
        x
    }
    fn reduce_and(&self, x: bool) -> bool {
        x
    }
    fn reduce_or(&self, x: bool) -> bool {
        x
    }
    fn allgather_u64(&self, x: u64) -> Vec<u64> {
        vec![x]
    }
    fn exchange_u8(&self, counts: &[u32], data: &[u8]) -> (Vec<u32>, Vec<u8>) {
        assert_eq!(counts.len(), 1);
        assert_eq!(counts[0] as usize, data.len());
        (counts.to_vec(), data.to_vec())
    }
}
