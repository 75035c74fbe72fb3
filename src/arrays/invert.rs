//! Map inversion: many-to-one maps turned into offset/value (CSR) form.

use std::sync::atomic::{AtomicU32, Ordering};

use rayon::prelude::*;

use super::{offset_scan, sort_by_keys};

/// Filler for unmatched slots of an inverted injective map.
pub const INVALID: u32 = u32::MAX;

/// An offset/value pair describing a one-to-many relation: the targets of
/// `a` are `ab2b[a2ab[a] .. a2ab[a+1]]`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Graph {
    pub a2ab: Vec<u32>,
    pub ab2b: Vec<u32>,
}

impl Graph {
    pub fn new(a2ab: Vec<u32>, ab2b: Vec<u32>) -> Self {
        debug_assert_eq!(*a2ab.last().unwrap_or(&0) as usize, ab2b.len());
        Self { a2ab, ab2b }
    }

    /// Number of source nodes.
    pub fn nnodes(&self) -> usize {
        self.a2ab.len().saturating_sub(1)
    }

    /// Number of edges.
    pub fn nedges(&self) -> usize {
        self.ab2b.len()
    }

    /// The targets of node `a`.
    pub fn row(&self, a: u32) -> &[u32] {
        let lo = self.a2ab[a as usize] as usize;
        let hi = self.a2ab[a as usize + 1] as usize;
        &self.ab2b[lo..hi]
    }
}

fn bucket_counts(a2b: &[u32], nb: usize) -> Vec<u32> {
    let mut counts = vec![0u32; nb];
    for &b in a2b {
        counts[b as usize] += 1;
    }
    counts
}

/// Invert a many-to-one map by sorting. Deterministic: within each bucket
/// the sources appear in ascending order.
pub fn invert_map_by_sorting(a2b: &[u32], nb: usize) -> Graph {
    let perm = sort_by_keys(a2b, 1);
    let sorted: Vec<u32> = perm.iter().map(|&i| a2b[i as usize]).collect();
    let a2ab = super::invert_funnel(&sorted, nb);
    Graph::new(a2ab, perm)
}

/// Invert a many-to-one map by atomic counters. Faster than sorting but the
/// order of sources within a bucket is unspecified; callers that need
/// determinism must use [`invert_map_by_sorting`].
pub fn invert_map_by_atomics(a2b: &[u32], nb: usize) -> Graph {
    let a2ab = offset_scan(&bucket_counts(a2b, nb));
    let cursors: Vec<AtomicU32> = a2ab[..nb].iter().map(|&o| AtomicU32::new(o)).collect();
    let ab2b: Vec<AtomicU32> = (0..*a2ab.last().unwrap())
        .map(|_| AtomicU32::new(INVALID))
        .collect();
    a2b.par_iter().enumerate().for_each(|(a, &b)| {
        let slot = cursors[b as usize].fetch_add(1, Ordering::Relaxed);
        ab2b[slot as usize].store(a as u32, Ordering::Relaxed);
    });
    let ab2b = ab2b.into_iter().map(AtomicU32::into_inner).collect();
    Graph::new(a2ab, ab2b)
}

/// Invert an injective map; unmatched slots hold [`INVALID`].
pub fn invert_injective_map(a2b: &[u32], nb: usize) -> Vec<u32> {
    let mut out = vec![INVALID; nb];
    for (a, &b) in a2b.iter().enumerate() {
        debug_assert_eq!(out[b as usize], INVALID, "map is not injective");
        out[b as usize] = a as u32;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check_inversion(invert: fn(&[u32], usize) -> Graph) {
        let empty = invert(&[], 4);
        assert_eq!(empty.a2ab, vec![0; 5]);
        assert_eq!(empty.ab2b, Vec::<u32>::new());
        let identity = invert(&[0, 1, 2, 3], 4);
        assert_eq!(identity.a2ab, vec![0, 1, 2, 3, 4]);
        assert_eq!(identity.ab2b, vec![0, 1, 2, 3]);
    }

    #[test]
    fn degree_one_maps() {
        check_inversion(invert_map_by_sorting);
        check_inversion(invert_map_by_atomics);
    }

    #[test]
    fn sorting_inversion_orders_buckets() {
        let g = invert_map_by_sorting(&[1, 0, 1, 0, 1], 2);
        assert_eq!(g.a2ab, vec![0, 2, 5]);
        assert_eq!(g.ab2b, vec![1, 3, 0, 2, 4]);
    }

    #[test]
    fn atomics_inversion_has_same_buckets() {
        let g = invert_map_by_atomics(&[1, 0, 1, 0, 1], 2);
        assert_eq!(g.a2ab, vec![0, 2, 5]);
        let mut row0 = g.row(0).to_vec();
        let mut row1 = g.row(1).to_vec();
        row0.sort_unstable();
        row1.sort_unstable();
        assert_eq!(row0, vec![1, 3]);
        assert_eq!(row1, vec![0, 2, 4]);
    }

    #[test]
    fn inversion_offsets_match_multiplicity_histogram() {
        let a2b = [2u32, 2, 0, 3, 2, 0];
        let g = invert_map_by_sorting(&a2b, 4);
        let hist = super::bucket_counts(&a2b, 4);
        assert_eq!(g.a2ab, crate::arrays::offset_scan(&hist));
    }

    #[test]
    fn injective_inversion() {
        let primes2ints = [2u32, 3, 5, 7];
        let ints2primes = invert_injective_map(&primes2ints, 8);
        assert_eq!(
            ints2primes,
            vec![INVALID, INVALID, 0, 1, INVALID, 2, INVALID, 3]
        );
    }
}
