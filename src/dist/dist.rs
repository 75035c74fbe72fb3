//! `Dist`: a many-to-many relation between two distributed index spaces.
//!
//! The forward direction maps local items to `(rank, index)` destinations
//! ("roots"); the reverse direction is realized by reply routing, so both
//! stay consistent by construction. Every exchange round tags records with
//! the source index, which is what lets roots answer their copies without
//! any separately maintained reverse tables.

use std::sync::Arc;

use crate::arrays::{fan_reduce, invert_funnel, sort_by_keys, ReduceOp};

use super::comm::Comm;
use super::remotes::Remotes;

/// Byte-level record layout: destination index, source index, payload.
const HEADER_BYTES: usize = 8;

/// A distributed index relation; see the module docs.
#[derive(Clone)]
pub struct Dist {
    comm: Arc<dyn Comm>,
    dest: Remotes,
    nroots: usize,
}

/// The root-side view of one exchange: copies grouped per root in
/// deterministic `(root, source rank, source index)` order.
pub struct Collected {
    /// Offsets of each root's copies, length `nroots + 1`.
    pub roots_fan: Vec<u32>,
    /// Copy payloads in grouped order.
    pub payload: Vec<u8>,
    /// Source of each copy in grouped order.
    pub srcs: Remotes,
}

impl Dist {
    pub fn new(comm: Arc<dyn Comm>, dest: Remotes, nroots: usize) -> Self {
        debug_assert!(dest
            .ranks
            .iter()
            .zip(dest.idxs.iter())
            .all(|(&r, &i)| r < comm.size() && (r != comm.rank() || (i as usize) < nroots)));
        Dist { comm, dest, nroots }
    }

    /// The identity relation on `n` local items.
    pub fn identity(comm: Arc<dyn Comm>, n: usize) -> Self {
        let rank = comm.rank();
        Dist::new(comm, Remotes::identity(rank, n), n)
    }

    pub fn comm(&self) -> &Arc<dyn Comm> {
        &self.comm
    }

    pub fn nitems(&self) -> usize {
        self.dest.len()
    }

    pub fn nroots(&self) -> usize {
        self.nroots
    }

    pub fn dest(&self) -> &Remotes {
        &self.dest
    }

    /// Ship one `item_bytes`-wide record per item to its destination and
    /// return the root-side grouping.
    pub fn exch_collect(&self, data: &[u8], item_bytes: usize) -> Collected {
        let n = self.dest.len();
        assert_eq!(data.len(), n * item_bytes);
        let rec = HEADER_BYTES + item_bytes;
        let nranks = self.comm.size() as usize;
        // stable sort groups items by destination rank, items in order within
        let perm = sort_by_keys(&self.dest.ranks, 1);
        let mut counts = vec![0u32; nranks];
        for &r in &self.dest.ranks {
            counts[r as usize] += rec as u32;
        }
        let mut buf = Vec::with_capacity(n * rec);
        for &i in &perm {
            let i = i as usize;
            buf.extend_from_slice(&self.dest.idxs[i].to_le_bytes());
            buf.extend_from_slice(&(i as u32).to_le_bytes());
            buf.extend_from_slice(&data[i * item_bytes..(i + 1) * item_bytes]);
        }
        let (rcounts, rbuf) = self.comm.exchange_u8(&counts, &buf);
        assert_eq!(rbuf.len() % rec, 0);
        let nrecv = rbuf.len() / rec;
        let mut keys = Vec::with_capacity(nrecv * 3);
        let mut src_ranks = Vec::with_capacity(nrecv);
        let mut src_idxs = Vec::with_capacity(nrecv);
        let mut dest_idxs = Vec::with_capacity(nrecv);
        let mut at = 0usize;
        for (rank, &rc) in rcounts.iter().enumerate() {
            let seg_end = at + rc as usize;
            while at < seg_end {
                let r = &rbuf[at..at + rec];
                let dest_idx = u32::from_le_bytes(r[0..4].try_into().unwrap());
                let src_idx = u32::from_le_bytes(r[4..8].try_into().unwrap());
                keys.push(dest_idx as u64);
                keys.push(rank as u64);
                keys.push(src_idx as u64);
                dest_idxs.push(dest_idx);
                src_ranks.push(rank as u32);
                src_idxs.push(src_idx);
                at += rec;
            }
        }
        let order = sort_by_keys(&keys, 3);
        let sorted_dests: Vec<u32> = order.iter().map(|&i| dest_idxs[i as usize]).collect();
        let roots_fan = invert_funnel(&sorted_dests, self.nroots);
        let mut payload = Vec::with_capacity(nrecv * item_bytes);
        for &i in &order {
            let s = i as usize * rec + HEADER_BYTES;
            payload.extend_from_slice(&rbuf[s..s + item_bytes]);
        }
        let srcs = Remotes::new(
            order.iter().map(|&i| src_ranks[i as usize]).collect(),
            order.iter().map(|&i| src_idxs[i as usize]).collect(),
        );
        Collected {
            roots_fan,
            payload,
            srcs,
        }
    }

    /// Send one record per collected copy back to where it came from.
    /// Returns an array over local items (every item must have been routed
    /// through the collection being answered).
    pub fn reply_to_copies(
        &self,
        collected: &Collected,
        per_copy: &[u8],
        item_bytes: usize,
    ) -> Vec<u8> {
        let ncopies = collected.srcs.len();
        assert_eq!(per_copy.len(), ncopies * item_bytes);
        let rec = HEADER_BYTES + item_bytes;
        let nranks = self.comm.size() as usize;
        let perm = sort_by_keys(&collected.srcs.ranks, 1);
        let mut counts = vec![0u32; nranks];
        for &r in &collected.srcs.ranks {
            counts[r as usize] += rec as u32;
        }
        let mut buf = Vec::with_capacity(ncopies * rec);
        for &i in &perm {
            let i = i as usize;
            buf.extend_from_slice(&collected.srcs.idxs[i].to_le_bytes());
            buf.extend_from_slice(&0u32.to_le_bytes());
            buf.extend_from_slice(&per_copy[i * item_bytes..(i + 1) * item_bytes]);
        }
        let (rcounts, rbuf) = self.comm.exchange_u8(&counts, &buf);
        let _ = rcounts;
        assert_eq!(rbuf.len(), self.nitems() * rec);
        let mut out = vec![0u8; self.nitems() * item_bytes];
        let mut seen = vec![false; self.nitems()];
        let mut at = 0usize;
        while at < rbuf.len() {
            let r = &rbuf[at..at + rec];
            let item = u32::from_le_bytes(r[0..4].try_into().unwrap()) as usize;
            debug_assert!(!seen[item], "item answered twice");
            seen[item] = true;
            out[item * item_bytes..(item + 1) * item_bytes]
                .copy_from_slice(&r[HEADER_BYTES..rec]);
            at += rec;
        }
        debug_assert!(seen.iter().all(|&s| s));
        out
    }

    /// Reduce `f64` copy data onto roots.
    pub fn exch_reduce_f64(&self, data: &[f64], width: usize, op: ReduceOp) -> Vec<f64> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let collected = self.exch_collect(bytes, width * 8);
        let payload: &[f64] = bytemuck::cast_slice(&collected.payload);
        fan_reduce(&collected.roots_fan, payload, width, op)
    }

    /// Fetch each item's root value (roots broadcast to their copies).
    pub fn bcast_bytes(&self, root_data: &[u8], item_bytes: usize) -> Vec<u8> {
        assert_eq!(root_data.len(), self.nroots * item_bytes);
        let collected = self.exch_collect(&vec![0u8; self.nitems()], 1);
        let mut per_copy = Vec::with_capacity(collected.srcs.len() * item_bytes);
        for root in 0..self.nroots {
            let lo = collected.roots_fan[root] as usize;
            let hi = collected.roots_fan[root + 1] as usize;
            let val = &root_data[root * item_bytes..(root + 1) * item_bytes];
            for _ in lo..hi {
                per_copy.extend_from_slice(val);
            }
        }
        self.reply_to_copies(&collected, &per_copy, item_bytes)
    }

    /// [`bcast_bytes`](Self::bcast_bytes) for `f64` arrays of `width`
    /// components.
    pub fn bcast_f64(&self, root_data: &[f64], width: usize) -> Vec<f64> {
        let out = self.bcast_bytes(bytemuck::cast_slice(root_data), width * 8);
        bytemuck::cast_slice(&out).to_vec()
    }
}
