//! Ownership updates after repartitioning or cavity rewrites.
//!
//! Each old owner is made responsible for all the new copies of its
//! entity and selects an owner among them; with a good old partition this
//! keeps the update scalable. When no explicit owner ranks are given the
//! choice prefers the rank holding the fewest new copies overall, ties
//! broken by the smallest rank.

use crate::arrays::ReduceOp;

use super::comm::Comm;
use super::dist::Dist;
use super::remotes::Remotes;

/// Sentinel for "no dictated owner" in [`update_ownership`].
const NO_RANK: u32 = u32::MAX;

/// Compute owners for the copies of a new partitioning from the relation
/// mapping new copies to their old owners. `own_ranks`, when given, holds
/// one dictated owner rank per new copy and must be consistent across the
/// copies of one entity.
pub fn update_ownership(new_ents2old_owners: &Dist, own_ranks: Option<&[u32]>) -> Remotes {
    let comm = new_ents2old_owners.comm().clone();
    let n = new_ents2old_owners.nitems();
    let payload: Vec<u8> = match own_ranks {
        Some(ranks) => {
            assert_eq!(ranks.len(), n);
            ranks.iter().flat_map(|r| r.to_le_bytes()).collect()
        }
        None => std::iter::repeat(NO_RANK.to_le_bytes())
            .take(n)
            .flatten()
            .collect(),
    };
    let collected = new_ents2old_owners.exch_collect(&payload, 4);
    let copies_per_rank = comm.allgather_u64(n as u64);
    let ncopies = collected.srcs.len();
    let mut chosen = vec![0u8; ncopies * 8];
    for root in 0..new_ents2old_owners.nroots() {
        let lo = collected.roots_fan[root] as usize;
        let hi = collected.roots_fan[root + 1] as usize;
        if lo == hi {
            continue;
        }
        let mut best: Option<(u64, u32, usize)> = None;
        for c in lo..hi {
            let rank = collected.srcs.ranks[c];
            let dictated = u32::from_le_bytes(collected.payload[c * 4..c * 4 + 4].try_into().unwrap());
            let key = if dictated != NO_RANK {
                // dictated owners sort ahead of every preference key
                (u64::from(rank != dictated), rank, c)
            } else {
                (copies_per_rank[rank as usize] + 2, rank, c)
            };
            if best.map_or(true, |b| key < b) {
                best = Some(key);
            }
        }
        let (_, rank, copy) = best.unwrap();
        let idx = collected.srcs.idxs[copy];
        for c in lo..hi {
            chosen[c * 8..c * 8 + 4].copy_from_slice(&rank.to_le_bytes());
            chosen[c * 8 + 4..c * 8 + 8].copy_from_slice(&idx.to_le_bytes());
        }
    }
    let answers = new_ents2old_owners.reply_to_copies(&collected, &chosen, 8);
    let mut ranks = Vec::with_capacity(n);
    let mut idxs = Vec::with_capacity(n);
    for a in answers.chunks_exact(8) {
        ranks.push(u32::from_le_bytes(a[0..4].try_into().unwrap()));
        idxs.push(u32::from_le_bytes(a[4..8].try_into().unwrap()));
    }
    Remotes::new(ranks, idxs)
}

/// Reduce per-copy data onto the owning copies.
pub fn reduce_data_to_owners(
    copy_data: &[f64],
    copies2owners: &Dist,
    ncomps: usize,
    op: ReduceOp,
) -> Vec<f64> {
    copies2owners.exch_reduce_f64(copy_data, ncomps, op)
}

/// Assign globally unique IDs: owned entities are numbered consecutively
/// in local order with a per-rank offset, and copies fetch the ID from
/// their owner.
pub fn globals_from_owners(comm: &std::sync::Arc<dyn Comm>, owners: &Remotes, n: usize) -> Vec<u64> {
    let rank = comm.rank();
    let owned: Vec<bool> = (0..n)
        .map(|i| owners.ranks[i] == rank && owners.idxs[i] == i as u32)
        .collect();
    let nowned = owned.iter().filter(|&&o| o).count() as u64;
    let counts = comm.allgather_u64(nowned);
    let offset: u64 = counts[..rank as usize].iter().sum();
    let mut local = vec![0u64; n];
    let mut next = offset;
    for (i, &is_owned) in owned.iter().enumerate() {
        if is_owned {
            local[i] = next;
            next += 1;
        }
    }
    let dist = Dist::new(comm.clone(), owners.clone(), n);
    let bytes: Vec<u8> = local.iter().flat_map(|g| g.to_le_bytes()).collect();
    let answers = dist.bcast_bytes(&bytes, 8);
    answers
        .chunks_exact(8)
        .map(|c| u64::from_le_bytes(c.try_into().unwrap()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::super::comm::SerialComm;
    use super::*;
    use std::sync::Arc;

    #[test]
    fn serial_ownership_is_identity_like() {
        let comm: Arc<dyn Comm> = Arc::new(SerialComm);
        let dist = Dist::identity(comm, 3);
        let owners = update_ownership(&dist, None);
        assert_eq!(owners.ranks, vec![0, 0, 0]);
        assert_eq!(owners.idxs, vec![0, 1, 2]);
    }

    #[test]
    fn copies_of_one_root_agree_on_the_owner() {
        let comm: Arc<dyn Comm> = Arc::new(SerialComm);
        // three new copies of one old entity
        let dist = Dist::new(comm, Remotes::new(vec![0; 3], vec![0; 3]), 1);
        let owners = update_ownership(&dist, None);
        assert_eq!(owners.ranks, vec![0, 0, 0]);
        // the smallest source index wins the tie
        assert_eq!(owners.idxs, vec![0, 0, 0]);
    }

    #[test]
    fn dictated_owner_rank_wins() {
        let comm: Arc<dyn Comm> = Arc::new(SerialComm);
        let dist = Dist::new(comm, Remotes::new(vec![0; 2], vec![0; 2]), 1);
        let owners = update_ownership(&dist, Some(&[0, 0]));
        assert_eq!(owners.ranks, vec![0, 0]);
    }

    #[test]
    fn serial_globals_are_dense() {
        let comm: Arc<dyn Comm> = Arc::new(SerialComm);
        let owners = Remotes::identity(0, 4);
        assert_eq!(globals_from_owners(&comm, &owners, 4), vec![0, 1, 2, 3]);
    }
}
