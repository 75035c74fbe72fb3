//! Linear partitioning of the global ID space.
//!
//! Globals `0..total` are split into contiguous blocks, the first
//! `total % size` ranks getting one extra entry. This fixed scheme lets any
//! rank compute the owner of any global without communication.

use std::sync::Arc;

use crate::arrays::ReduceOp;

use super::comm::Comm;
use super::dist::Dist;
use super::remotes::Remotes;

/// Number of globals the linear partition assigns to `rank`.
pub fn linear_partition_size(total: u64, comm_size: u32, rank: u32) -> u32 {
    let quot = (total / comm_size as u64) as u32;
    let rem = (total % comm_size as u64) as u32;
    quot + u32::from(rank < rem)
}

/// The linear-partition owner of each global.
pub fn globals_to_linear_owners(globals: &[u64], total: u64, comm_size: u32) -> Remotes {
    let quot = total / comm_size as u64;
    let rem = total % comm_size as u64;
    let split = (quot + 1) * rem;
    let mut ranks = Vec::with_capacity(globals.len());
    let mut idxs = Vec::with_capacity(globals.len());
    for &g in globals {
        debug_assert!(g < total);
        let (rank, idx) = if g < split {
            (g / (quot + 1), g % (quot + 1))
        } else {
            (rem + (g - split) / quot, (g - split) % quot)
        };
        ranks.push(rank as u32);
        idxs.push(idx as u32);
    }
    Remotes::new(ranks, idxs)
}

/// One more than the largest global present on any rank.
pub fn find_total_globals(comm: &dyn Comm, globals: &[u64]) -> u64 {
    let local_max = globals.iter().copied().max().map_or(-1, |g| g as i64);
    let global_max = comm.allreduce_i64(local_max, ReduceOp::Max);
    (global_max + 1) as u64
}

/// The distributed relation from local copies to their linear-partition
/// owners.
pub fn copies_to_linear_owners(comm: Arc<dyn Comm>, globals: &[u64]) -> Dist {
    let total = find_total_globals(comm.as_ref(), globals);
    let owners = globals_to_linear_owners(globals, total, comm.size());
    let nroots = linear_partition_size(total, comm.size(), comm.rank()) as usize;
    Dist::new(comm, owners, nroots)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_and_owners_for_seven_over_two() {
        assert_eq!(linear_partition_size(7, 2, 0), 4);
        assert_eq!(linear_partition_size(7, 2, 1), 3);
        let remotes = globals_to_linear_owners(&[6, 5, 4, 3, 2, 1, 0], 7, 2);
        assert_eq!(remotes.ranks, vec![1, 1, 1, 0, 0, 0, 0]);
        assert_eq!(remotes.idxs, vec![2, 1, 0, 3, 2, 1, 0]);
    }

    #[test]
    fn total_globals_from_serial_comm() {
        let comm = super::super::comm::SerialComm;
        assert_eq!(find_total_globals(&comm, &[3, 0, 2]), 4);
        assert_eq!(find_total_globals(&comm, &[]), 0);
    }
}
